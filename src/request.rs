//! Generation requests: what to generate, with validated and defaulted parameters.
//!
//! A `GenerationRequest` can only be built through the constructors below, which
//! apply per-kind defaults and reject missing required fields. The cache key is
//! derived once from the kind and the normalized parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::domain::{Difficulty, Level};
use crate::error::RequestError;
use crate::util::to_canonical_json;

const MAX_ITEMS: u32 = 20;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
  Roadmap,
  Quiz,
  ChallengeSet,
  Notes,
  SolutionEvaluation,
  CuratedResources,
}

impl ArtifactKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ArtifactKind::Roadmap => "roadmap",
      ArtifactKind::Quiz => "quiz",
      ArtifactKind::ChallengeSet => "challenge-set",
      ArtifactKind::Notes => "notes",
      ArtifactKind::SolutionEvaluation => "solution-evaluation",
      ArtifactKind::CuratedResources => "curated-resources",
    }
  }
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Difficulty filter for challenge sets: a concrete difficulty or a spread.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyFilter {
  Mixed,
  Only(Difficulty),
}

impl DifficultyFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      DifficultyFilter::Mixed => "mixed",
      DifficultyFilter::Only(d) => d.as_str(),
    }
  }
}

// --- Raw inputs (what callers send; everything optional) ---

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapInput {
  #[serde(default)] pub career_goal: Option<String>,
  #[serde(default)] pub experience_level: Option<String>,
  #[serde(default)] pub skills: Option<Vec<String>>,
  #[serde(default)] pub hours_per_week: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizInput {
  #[serde(default)] pub topic: Option<String>,
  #[serde(default)] pub difficulty: Option<String>,
  #[serde(default)] pub question_count: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSetInput {
  #[serde(default, alias = "skill")] pub category: Option<String>,
  #[serde(default)] pub difficulty: Option<String>,
  #[serde(default)] pub count: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesInput {
  #[serde(default)] pub topic: Option<String>,
  #[serde(default)] pub level: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
  #[serde(default)] pub challenge_id: Option<String>,
  #[serde(default)] pub code: Option<String>,
  #[serde(default)] pub language: Option<String>,
  #[serde(default)] pub problem: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesInput {
  #[serde(default)] pub topic: Option<String>,
  #[serde(default)] pub level: Option<String>,
  #[serde(default)] pub count: Option<u32>,
}

// --- Validated parameters ---

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapParams {
  pub career_goal: String,
  pub experience_level: Level,
  pub skills: Vec<String>,
  pub hours_per_week: u32,
}

impl RoadmapParams {
  /// Same subject, one level up. Used when a track advances.
  pub fn at_level(&self, level: Level) -> RoadmapParams {
    RoadmapParams { experience_level: level, ..self.clone() }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizParams {
  pub topic: String,
  pub difficulty: Difficulty,
  pub question_count: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSetParams {
  pub category: String,
  pub difficulty: DifficultyFilter,
  pub count: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotesParams {
  pub topic: String,
  pub level: Level,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationParams {
  pub challenge_id: String,
  pub code: String,
  pub language: String,
  pub problem: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesParams {
  pub topic: String,
  pub level: Level,
  pub count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GenerationParams {
  Roadmap(RoadmapParams),
  Quiz(QuizParams),
  ChallengeSet(ChallengeSetParams),
  Notes(NotesParams),
  SolutionEvaluation(EvaluationParams),
  CuratedResources(ResourcesParams),
}

impl GenerationParams {
  pub fn kind(&self) -> ArtifactKind {
    match self {
      GenerationParams::Roadmap(_) => ArtifactKind::Roadmap,
      GenerationParams::Quiz(_) => ArtifactKind::Quiz,
      GenerationParams::ChallengeSet(_) => ArtifactKind::ChallengeSet,
      GenerationParams::Notes(_) => ArtifactKind::Notes,
      GenerationParams::SolutionEvaluation(_) => ArtifactKind::SolutionEvaluation,
      GenerationParams::CuratedResources(_) => ArtifactKind::CuratedResources,
    }
  }

  /// Parameters in cache-key form: topic-like names lowercased, skill lists sorted.
  fn normalized(&self) -> Value {
    match self {
      GenerationParams::Roadmap(p) => json!({
        "careerGoal": fold(&p.career_goal),
        "experienceLevel": p.experience_level.as_str(),
        "skills": p.skills.iter().map(|s| fold(s)).collect::<std::collections::BTreeSet<_>>(),
        "hoursPerWeek": p.hours_per_week,
      }),
      GenerationParams::Quiz(p) => json!({
        "topic": fold(&p.topic),
        "difficulty": p.difficulty.as_str(),
        "questionCount": p.question_count,
      }),
      GenerationParams::ChallengeSet(p) => json!({
        "category": fold(&p.category),
        "difficulty": p.difficulty.as_str(),
        "count": p.count,
      }),
      GenerationParams::Notes(p) => json!({
        "topic": fold(&p.topic),
        "level": p.level.as_str(),
      }),
      // Code is case-sensitive; only the surrounding labels are folded.
      GenerationParams::SolutionEvaluation(p) => json!({
        "challengeId": p.challenge_id,
        "code": p.code,
        "language": fold(&p.language),
        "problem": p.problem,
      }),
      GenerationParams::CuratedResources(p) => json!({
        "topic": fold(&p.topic),
        "level": p.level.as_str(),
        "count": p.count,
      }),
    }
  }
}

/// Immutable, validated generation request.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
  params: GenerationParams,
  cache_key: String,
}

impl GenerationRequest {
  fn from_params(params: GenerationParams) -> Self {
    let canonical = to_canonical_json(&params.normalized());
    let digest = Sha256::digest(canonical.as_bytes());
    let cache_key = format!("{}:{:x}", params.kind(), digest);
    Self { params, cache_key }
  }

  pub fn kind(&self) -> ArtifactKind {
    self.params.kind()
  }

  pub fn params(&self) -> &GenerationParams {
    &self.params
  }

  pub fn cache_key(&self) -> &str {
    &self.cache_key
  }

  pub fn roadmap(input: RoadmapInput) -> Self {
    let mut skills: Vec<String> = input
      .skills
      .unwrap_or_default()
      .into_iter()
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .collect();
    skills.dedup();
    Self::from_params(GenerationParams::Roadmap(RoadmapParams {
      career_goal: non_blank(input.career_goal).unwrap_or_else(|| "Software Developer".into()),
      experience_level: input.experience_level.as_deref().and_then(Level::parse).unwrap_or_default(),
      skills,
      hours_per_week: input.hours_per_week.unwrap_or(10).max(1),
    }))
  }

  /// Build a roadmap request from parameters that were already validated (track regeneration).
  pub fn roadmap_from(params: RoadmapParams) -> Self {
    Self::from_params(GenerationParams::Roadmap(params))
  }

  pub fn quiz(input: QuizInput) -> Result<Self, RequestError> {
    let topic = non_blank(input.topic).ok_or_else(|| RequestError::missing("topic"))?;
    let difficulty = non_blank(input.difficulty).ok_or_else(|| RequestError::missing("difficulty"))?;
    let difficulty = Difficulty::parse(&difficulty)
      .ok_or_else(|| RequestError::invalid("difficulty", "must be easy, medium or hard"))?;
    let question_count = required_count(input.question_count, "questionCount")?;
    Ok(Self::from_params(GenerationParams::Quiz(QuizParams { topic, difficulty, question_count })))
  }

  pub fn challenge_set(input: ChallengeSetInput) -> Self {
    let difficulty = input
      .difficulty
      .as_deref()
      .and_then(Difficulty::parse)
      .map(DifficultyFilter::Only)
      .unwrap_or(DifficultyFilter::Mixed);
    Self::from_params(GenerationParams::ChallengeSet(ChallengeSetParams {
      category: non_blank(input.category).unwrap_or_else(|| "general".into()),
      difficulty,
      count: input.count.unwrap_or(6).clamp(1, MAX_ITEMS),
    }))
  }

  pub fn notes(input: NotesInput) -> Self {
    Self::from_params(GenerationParams::Notes(NotesParams {
      topic: non_blank(input.topic).unwrap_or_else(|| "Programming Fundamentals".into()),
      level: input.level.as_deref().and_then(Level::parse).unwrap_or_default(),
    }))
  }

  pub fn evaluation(input: EvaluationInput) -> Result<Self, RequestError> {
    let challenge_id = non_blank(input.challenge_id).ok_or_else(|| RequestError::missing("challengeId"))?;
    let code = input
      .code
      .filter(|c| !c.trim().is_empty())
      .ok_or_else(|| RequestError::missing("code"))?;
    let language = non_blank(input.language).ok_or_else(|| RequestError::missing("language"))?;
    Ok(Self::from_params(GenerationParams::SolutionEvaluation(EvaluationParams {
      challenge_id,
      code,
      language,
      problem: non_blank(input.problem).unwrap_or_default(),
    })))
  }

  pub fn resources(input: ResourcesInput) -> Self {
    Self::from_params(GenerationParams::CuratedResources(ResourcesParams {
      topic: non_blank(input.topic).unwrap_or_else(|| "Programming Fundamentals".into()),
      level: input.level.as_deref().and_then(Level::parse).unwrap_or_default(),
      count: input.count.unwrap_or(6).clamp(1, MAX_ITEMS),
    }))
  }

  /// Generic entry point: `kind` plus a JSON object of named parameters.
  pub fn from_json(kind: ArtifactKind, params: Value) -> Result<Self, RequestError> {
    let params = if params.is_null() { json!({}) } else { params };
    if !params.is_object() {
      return Err(RequestError::invalid("params", "must be a JSON object"));
    }
    let bad = |e: serde_json::Error| RequestError::invalid("params", e.to_string());
    match kind {
      ArtifactKind::Roadmap => Ok(Self::roadmap(serde_json::from_value(params).map_err(bad)?)),
      ArtifactKind::Quiz => Self::quiz(serde_json::from_value(params).map_err(bad)?),
      ArtifactKind::ChallengeSet => Ok(Self::challenge_set(serde_json::from_value(params).map_err(bad)?)),
      ArtifactKind::Notes => Ok(Self::notes(serde_json::from_value(params).map_err(bad)?)),
      ArtifactKind::SolutionEvaluation => Self::evaluation(serde_json::from_value(params).map_err(bad)?),
      ArtifactKind::CuratedResources => Ok(Self::resources(serde_json::from_value(params).map_err(bad)?)),
    }
  }
}

fn non_blank(s: Option<String>) -> Option<String> {
  s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn fold(s: &str) -> String {
  s.trim().to_lowercase()
}

fn required_count(n: Option<u32>, field: &str) -> Result<u32, RequestError> {
  match n {
    None => Err(RequestError::missing(field)),
    Some(0) => Err(RequestError::invalid(field, "must be at least 1")),
    Some(n) => Ok(n.min(MAX_ITEMS)),
  }
}
