//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Level;
use crate::pipeline::GenerationResult;
use crate::progress::{LevelTrack, ProgressRecord, ProgressSummary, Stage, TrackEvent};
use crate::request::{ArtifactKind, EvaluationInput, RoadmapInput};
use crate::store::PersistCounts;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// Model name, or null when generation runs on local fallbacks.
    pub generator: Option<String>,
    pub store: String,
    pub persistence: PersistCounts,
}

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    pub kind: ArtifactKind,
    #[serde(default)]
    pub params: Value,
}

/// Roadmap request; `userId` + `subject` additionally start a level track.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapIn {
    #[serde(flatten)]
    pub input: RoadmapInput,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Serialize)]
pub struct RoadmapOut {
    #[serde(flatten)]
    pub result: GenerationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackOut>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateIn {
    #[serde(flatten)]
    pub input: EvaluationInput,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct EvaluateOut {
    #[serde(flatten)]
    pub result: GenerationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked: Option<ProgressRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackOut {
    pub track: LevelTrack,
    pub stage: Stage,
    pub summary: ProgressSummary,
}

impl From<LevelTrack> for TrackOut {
    fn from(track: LevelTrack) -> Self {
        Self { stage: track.stage(), summary: track.summary(), track }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicToggleIn {
    pub user_id: String,
    pub subject: String,
    pub unit_id: String,
    #[serde(default = "default_true")]
    pub completed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicToggleOut {
    pub changed: bool,
    pub event: Option<TrackEvent>,
    pub advanced_to: Option<Level>,
    pub regeneration_degraded: bool,
    #[serde(flatten)]
    pub track: TrackOut,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressIn {
    pub user_id: String,
    pub unit_id: String,
    #[serde(default = "default_true")]
    pub completed: bool,
}

#[derive(Serialize)]
pub struct ProgressOut {
    pub records: Vec<ProgressRecord>,
    pub summary: ProgressSummary,
}

#[derive(Debug, Deserialize)]
pub struct ChatIn {
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Serialize)]
pub struct ChatOut {
    pub reply: String,
    pub degraded: bool,
}

fn default_true() -> bool {
    true
}
