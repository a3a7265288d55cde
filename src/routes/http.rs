//! HTTP endpoint handlers. These are thin wrappers that forward to the pipeline and core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, Json};
use tracing::{info, instrument};

use crate::error::{ApiError, RequestError};
use crate::logic::*;
use crate::pipeline::GenerationResult;
use crate::progress::{LearnerStats, ProgressRecord};
use crate::protocol::*;
use crate::request::{ChallengeSetInput, GenerationParams, GenerationRequest, NotesInput, QuizInput, ResourcesInput};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut {
    ok: true,
    generator: state.pipeline.generator_name().map(str::to_string),
    store: state.store().name().to_string(),
    persistence: state.persistence.stats(),
  })
}

#[instrument(level = "info", skip(state, body), fields(kind = %body.kind))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> ApiResult<GenerationResult> {
  let req = GenerationRequest::from_json(body.kind, body.params)?;
  Ok(Json(state.pipeline.generate(&req).await))
}

#[instrument(level = "info", skip(state, body), fields(user_id = ?body.user_id, subject = ?body.subject))]
pub async fn http_roadmap(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RoadmapIn>,
) -> ApiResult<RoadmapOut> {
  let req = GenerationRequest::roadmap(body.input);
  let result = state.pipeline.generate(&req).await;

  let owner = body.user_id.filter(|u| !u.trim().is_empty())
    .zip(body.subject.filter(|s| !s.trim().is_empty()));
  let track = match (owner, req.params(), result.artifact().clone().into_roadmap()) {
    (Some((user_id, subject)), GenerationParams::Roadmap(params), Some(roadmap)) => {
      Some(start_track(&state, &user_id, &subject, params.clone(), roadmap).await.into())
    }
    _ => None,
  };
  Ok(Json(RoadmapOut { result, track }))
}

#[instrument(level = "info", skip(state, body), fields(topic = ?body.topic))]
pub async fn http_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizInput>,
) -> ApiResult<GenerationResult> {
  let req = GenerationRequest::quiz(body)?;
  Ok(Json(state.pipeline.generate(&req).await))
}

#[instrument(level = "info", skip(state), fields(category = ?q.category, difficulty = ?q.difficulty))]
pub async fn http_challenges(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ChallengeSetInput>,
) -> Json<GenerationResult> {
  let req = GenerationRequest::challenge_set(q);
  Json(state.pipeline.generate(&req).await)
}

#[instrument(level = "info", skip(state, body), fields(challenge_id = ?body.input.challenge_id, user_id = ?body.user_id))]
pub async fn http_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EvaluateIn>,
) -> ApiResult<EvaluateOut> {
  let req = GenerationRequest::evaluation(body.input)?;
  let challenge_id = match req.params() {
    GenerationParams::SolutionEvaluation(p) => p.challenge_id.clone(),
    _ => String::new(),
  };
  let user_id = body.user_id.filter(|u| !u.trim().is_empty());
  let (result, marked) = evaluate_and_mark(&state, user_id.as_deref(), &challenge_id, &req).await;
  info!(target: "generation", %challenge_id, degraded = result.is_degraded(), marked = marked.is_some(), "Solution evaluated");
  Ok(Json(EvaluateOut { result, marked }))
}

#[instrument(level = "info", skip(state, body), fields(topic = ?body.topic))]
pub async fn http_notes(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NotesInput>,
) -> Json<GenerationResult> {
  Json(state.pipeline.generate(&GenerationRequest::notes(body)).await)
}

#[instrument(level = "info", skip(state, body), fields(topic = ?body.topic))]
pub async fn http_resources(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ResourcesInput>,
) -> Json<GenerationResult> {
  Json(state.pipeline.generate(&GenerationRequest::resources(body)).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_track(
  State(state): State<Arc<AppState>>,
  Path((user_id, subject)): Path<(String, String)>,
) -> ApiResult<TrackOut> {
  let track = get_track(&state, &user_id, &subject).await
    .ok_or_else(|| ApiError::NotFound(format!("track for {user_id}/{subject}")))?;
  Ok(Json(track.into()))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, subject = %body.subject, unit_id = %body.unit_id))]
pub async fn http_toggle_topic(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TopicToggleIn>,
) -> ApiResult<TopicToggleOut> {
  let t = toggle_topic(&state, &body.user_id, &body.subject, &body.unit_id, body.completed).await?;
  Ok(Json(TopicToggleOut {
    changed: t.changed,
    event: t.event,
    advanced_to: t.advanced_to,
    regeneration_degraded: t.regeneration_degraded,
    track: t.track.into(),
  }))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, unit_id = %body.unit_id))]
pub async fn http_post_progress(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProgressIn>,
) -> ApiResult<ProgressRecord> {
  if body.user_id.trim().is_empty() {
    return Err(RequestError::missing("userId").into());
  }
  if body.unit_id.trim().is_empty() {
    return Err(RequestError::missing("unitId").into());
  }
  Ok(Json(mark_item(&state, &body.user_id, &body.unit_id, body.completed).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Json<ProgressOut> {
  let (records, summary) = user_progress(&state, &user_id).await;
  Json(ProgressOut { records, summary })
}

#[instrument(level = "info", skip(state))]
pub async fn http_leaderboard(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Json<LearnerStats> {
  Json(learner_stats(&state, &user_id).await)
}

#[instrument(level = "info", skip(state, body), fields(message_len = body.message.len()))]
pub async fn http_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatIn>,
) -> ApiResult<ChatOut> {
  if body.message.trim().is_empty() {
    return Err(RequestError::missing("message").into());
  }
  let (reply, degraded) = chat_reply(&state, &body.message, body.context.as_deref()).await;
  Ok(Json(ChatOut { reply, degraded }))
}
