//! Generation pipeline: request in, artifact out, always.
//!
//! Flow per call:
//!   cache lookup → prompt → bounded invoke → parse/repair/normalize → cache store
//! Any failure after the cache lookup degrades to a deterministic fallback from
//! `seeds`. Degraded results are never cached, so the next call retries.
//! There is no single-flight: concurrent misses on one key may both call upstream.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::ArtifactCache;
use crate::config::{CacheTtls, Prompts};
use crate::domain::LearningArtifact;
use crate::error::{LlmError, ParseError};
use crate::llm::{InvokeOptions, Prompt, TextGenerator};
use crate::parse::normalize;
use crate::request::{ArtifactKind, GenerationParams, GenerationRequest};
use crate::seeds::fallback_artifact;
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Source {
  Fresh,
  Cached,
}

/// Why a degraded result was served.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum DegradeReason {
  Timeout,
  MalformedOutput(String),
  UpstreamError(String),
  /// No generator configured.
  Unavailable,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationResult {
  Success { artifact: LearningArtifact, source: Source },
  Degraded { artifact: LearningArtifact, reason: DegradeReason },
}

impl GenerationResult {
  pub fn artifact(&self) -> &LearningArtifact {
    match self {
      GenerationResult::Success { artifact, .. } | GenerationResult::Degraded { artifact, .. } => artifact,
    }
  }

  pub fn into_artifact(self) -> LearningArtifact {
    match self {
      GenerationResult::Success { artifact, .. } | GenerationResult::Degraded { artifact, .. } => artifact,
    }
  }

  pub fn is_degraded(&self) -> bool {
    matches!(self, GenerationResult::Degraded { .. })
  }

  fn label(&self) -> &'static str {
    match self {
      GenerationResult::Success { source: Source::Fresh, .. } => "fresh",
      GenerationResult::Success { source: Source::Cached, .. } => "cached",
      GenerationResult::Degraded { .. } => "degraded",
    }
  }
}

impl From<LlmError> for DegradeReason {
  fn from(e: LlmError) -> Self {
    match e {
      LlmError::Timeout => DegradeReason::Timeout,
      other => DegradeReason::UpstreamError(other.to_string()),
    }
  }
}

impl From<ParseError> for DegradeReason {
  fn from(e: ParseError) -> Self {
    DegradeReason::MalformedOutput(e.to_string())
  }
}

/// Sampling settings per kind: lower temperature where scoring must be stable.
pub fn invoke_options(kind: ArtifactKind) -> InvokeOptions {
  let (temperature, max_tokens) = match kind {
    ArtifactKind::Roadmap => (0.7, 4000),
    ArtifactKind::Quiz => (0.7, 2000),
    ArtifactKind::ChallengeSet => (0.8, 2500),
    ArtifactKind::Notes => (0.7, 3000),
    ArtifactKind::SolutionEvaluation => (0.3, 800),
    ArtifactKind::CuratedResources => (0.6, 1500),
  };
  InvokeOptions { temperature, max_tokens, json_mode: kind != ArtifactKind::Notes }
}

pub fn build_prompt(prompts: &Prompts, params: &GenerationParams) -> Prompt {
  let (system, user) = match params {
    GenerationParams::Roadmap(p) => {
      let skills = if p.skills.is_empty() { "none yet".to_string() } else { p.skills.join(", ") };
      let hours = p.hours_per_week.to_string();
      (
        &prompts.roadmap_system,
        fill_template(&prompts.roadmap_user_template, &[
          ("level", p.experience_level.as_str()),
          ("career_goal", &p.career_goal),
          ("skills", &skills),
          ("hours_per_week", &hours),
        ]),
      )
    }
    GenerationParams::Quiz(p) => {
      let count = p.question_count.to_string();
      (
        &prompts.quiz_system,
        fill_template(&prompts.quiz_user_template, &[
          ("difficulty", p.difficulty.as_str()),
          ("topic", &p.topic),
          ("count", &count),
        ]),
      )
    }
    GenerationParams::ChallengeSet(p) => {
      let count = p.count.to_string();
      (
        &prompts.challenge_system,
        fill_template(&prompts.challenge_user_template, &[
          ("count", &count),
          ("category", &p.category),
          ("difficulty", p.difficulty.as_str()),
        ]),
      )
    }
    GenerationParams::Notes(p) => (
      &prompts.notes_system,
      fill_template(&prompts.notes_user_template, &[("level", p.level.as_str()), ("topic", &p.topic)]),
    ),
    GenerationParams::SolutionEvaluation(p) => {
      let problem = if p.problem.is_empty() { "(see challenge id)" } else { p.problem.as_str() };
      (
        &prompts.evaluation_system,
        fill_template(&prompts.evaluation_user_template, &[
          ("challenge_id", &p.challenge_id),
          ("problem", problem),
          ("language", &p.language),
          ("code", &p.code),
        ]),
      )
    }
    GenerationParams::CuratedResources(p) => {
      let count = p.count.to_string();
      (
        &prompts.resources_system,
        fill_template(&prompts.resources_user_template, &[
          ("count", &count),
          ("level", p.level.as_str()),
          ("topic", &p.topic),
        ]),
      )
    }
  };
  Prompt { system: system.clone(), user }
}

pub struct GenerationPipeline {
  generator: Option<Arc<dyn TextGenerator>>,
  cache: Arc<dyn ArtifactCache>,
  prompts: Prompts,
  ttls: CacheTtls,
  timeout: Duration,
}

impl GenerationPipeline {
  pub fn new(
    generator: Option<Arc<dyn TextGenerator>>,
    cache: Arc<dyn ArtifactCache>,
    prompts: Prompts,
    ttls: CacheTtls,
    timeout: Duration,
  ) -> Self {
    Self { generator, cache, prompts, ttls, timeout }
  }

  pub fn generator_name(&self) -> Option<&str> {
    self.generator.as_deref().map(|g| g.name())
  }

  #[instrument(level = "info", skip(self, request), fields(kind = %request.kind(), key = %request.cache_key()))]
  pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
    let result = self.run(request).await;
    info!(target: "generation", kind = %request.kind(), outcome = result.label(), "Generation finished");
    result
  }

  async fn run(&self, request: &GenerationRequest) -> GenerationResult {
    let key = request.cache_key();
    if let Some(entry) = self.cache.get(key) {
      debug!(target: "generation", key = %entry.key, created_at = %entry.created_at, "Cache hit");
      return GenerationResult::Success { artifact: entry.artifact, source: Source::Cached };
    }

    match self.fresh(request).await {
      Ok(artifact) => {
        self.cache.set(key, artifact.clone(), self.ttls.for_kind(request.kind()));
        GenerationResult::Success { artifact, source: Source::Fresh }
      }
      Err(reason) => {
        warn!(target: "generation", kind = %request.kind(), ?reason, "Serving fallback artifact");
        GenerationResult::Degraded { artifact: fallback_artifact(request.params()), reason }
      }
    }
  }

  async fn fresh(&self, request: &GenerationRequest) -> Result<LearningArtifact, DegradeReason> {
    let generator = self.generator.as_ref().ok_or(DegradeReason::Unavailable)?;
    let prompt = build_prompt(&self.prompts, request.params());
    let options = invoke_options(request.kind());

    let raw = match tokio::time::timeout(self.timeout, generator.invoke(&prompt, &options)).await {
      Ok(res) => res?,
      Err(_) => return Err(DegradeReason::Timeout),
    };

    let (artifact, repaired) = normalize(request.params(), &raw).map_err(|e| {
      warn!(target: "generation", error = %e, preview = %trunc_for_log(&raw, 120), "Model output rejected");
      DegradeReason::from(e)
    })?;
    if repaired {
      debug!(target: "generation", kind = %request.kind(), "Recovered JSON from surrounding prose");
    }
    Ok(artifact)
  }

  /// Free-form assistant reply. Not cached; the caller picks a local reply on error.
  #[instrument(level = "info", skip(self, message, context), fields(message_len = message.len()))]
  pub async fn chat(&self, message: &str, context: Option<&str>) -> Result<String, DegradeReason> {
    let generator = self.generator.as_ref().ok_or(DegradeReason::Unavailable)?;
    let user = match context {
      Some(c) if !c.trim().is_empty() => format!("Context: {}\n\n{}", c.trim(), message),
      _ => message.to_string(),
    };
    let prompt = Prompt { system: self.prompts.chat_system.clone(), user };
    let options = InvokeOptions { temperature: 0.7, max_tokens: 1000, json_mode: false };
    match tokio::time::timeout(self.timeout, generator.invoke(&prompt, &options)).await {
      Ok(res) => Ok(res?),
      Err(_) => Err(DegradeReason::Timeout),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{ManualClock, MemoryCache};
  use crate::domain::{Difficulty, MilestoneStatus};
  use crate::llm::testing::{Reply, StubGenerator};
  use crate::request::{
    ChallengeSetInput, EvaluationInput, NotesInput, QuizInput, ResourcesInput, RoadmapInput,
  };
  use serde_json::json;

  fn pipeline_with(stub: Arc<StubGenerator>, clock: Arc<ManualClock>) -> GenerationPipeline {
    GenerationPipeline::new(
      Some(stub),
      Arc::new(MemoryCache::with_clock(clock)),
      Prompts::default(),
      CacheTtls::default(),
      Duration::from_secs(10),
    )
  }

  fn quiz_request() -> GenerationRequest {
    GenerationRequest::quiz(QuizInput { topic: Some("SQL".into()), difficulty: Some("easy".into()), question_count: Some(1) }).unwrap()
  }

  fn quiz_json() -> String {
    json!({
      "title": "SQL Basics",
      "questions": [{ "id": "1", "text": "SELECT?", "options": ["a", "b", "c", "d"], "correctOptionIndex": 0, "explanation": "" }]
    })
    .to_string()
  }

  fn all_requests() -> Vec<GenerationRequest> {
    vec![
      GenerationRequest::roadmap(RoadmapInput::default()),
      quiz_request(),
      GenerationRequest::challenge_set(ChallengeSetInput { difficulty: Some("hard".into()), ..Default::default() }),
      GenerationRequest::notes(NotesInput { topic: Some("Closures".into()), level: None }),
      GenerationRequest::evaluation(EvaluationInput {
        challenge_id: Some("two-sum".into()),
        code: Some("fn two_sum() {}".into()),
        language: Some("rust".into()),
        problem: None,
      })
      .unwrap(),
      GenerationRequest::resources(ResourcesInput { topic: Some("Docker".into()), ..Default::default() }),
    ]
  }

  fn roadmap_json(n: usize) -> String {
    let milestones: Vec<_> = (1..=n)
      .map(|i| json!({
        "id": format!("m{i}"),
        "title": format!("Milestone {i}"),
        "description": "desc",
        "skills": ["http"],
        "estimatedWeeks": 2,
        "status": "completed",
        "topics": [{ "name": "Topic A", "description": "" }, { "name": "Topic B", "description": "" }]
      }))
      .collect();
    json!({ "title": "Backend Developer Path", "milestones": milestones }).to_string()
  }

  #[tokio::test]
  async fn second_call_within_ttl_is_cached() {
    let stub = Arc::new(StubGenerator::new(vec![Reply::Text(quiz_json()), Reply::Text(quiz_json())]));
    let clock = Arc::new(ManualClock::new());
    let p = pipeline_with(stub.clone(), clock.clone());
    let req = quiz_request();

    let first = p.generate(&req).await;
    assert!(matches!(first, GenerationResult::Success { source: Source::Fresh, .. }));
    let second = p.generate(&req).await;
    match &second {
      GenerationResult::Success { source: Source::Cached, artifact } => assert_eq!(artifact, first.artifact()),
      other => panic!("expected cached success, got {other:?}"),
    }
    assert_eq!(stub.call_count(), 1);

    clock.advance(CacheTtls::default().for_kind(ArtifactKind::Quiz));
    let third = p.generate(&req).await;
    assert!(matches!(third, GenerationResult::Success { source: Source::Fresh, .. }));
    assert_eq!(stub.call_count(), 2);
  }

  #[tokio::test]
  async fn every_kind_degrades_on_upstream_failure() {
    for req in all_requests() {
      let stub = Arc::new(StubGenerator::new(vec![Reply::Fail(LlmError::Http { status: 503, message: "down".into() })]));
      let p = pipeline_with(stub, Arc::new(ManualClock::new()));
      let res = p.generate(&req).await;
      match &res {
        GenerationResult::Degraded { reason: DegradeReason::UpstreamError(_), .. } => {}
        other => panic!("{}: expected degraded, got {other:?}", req.kind()),
      }
      assert_shape(req.kind(), res.artifact());
    }
  }

  #[tokio::test]
  async fn every_kind_degrades_on_unparseable_output() {
    for req in all_requests() {
      let raw = if req.kind() == ArtifactKind::Notes { "   " } else { "I cannot help with that." };
      let stub = Arc::new(StubGenerator::text(raw));
      let p = pipeline_with(stub, Arc::new(ManualClock::new()));
      let res = p.generate(&req).await;
      assert!(matches!(res, GenerationResult::Degraded { reason: DegradeReason::MalformedOutput(_), .. }), "{}", req.kind());
      assert_shape(req.kind(), res.artifact());
    }
  }

  fn assert_shape(kind: ArtifactKind, artifact: &LearningArtifact) {
    match (kind, artifact) {
      (ArtifactKind::Roadmap, LearningArtifact::Roadmap(r)) => {
        assert!(!r.milestones.is_empty());
        assert_eq!(r.milestones[0].status, MilestoneStatus::Current);
        assert!(r.milestones.iter().all(|m| m.estimated_weeks >= 1));
      }
      (ArtifactKind::Quiz, LearningArtifact::Quiz(q)) => {
        assert!(q.questions.iter().all(|q| q.options.len() == 4 && q.correct_option_index < 4));
      }
      (ArtifactKind::ChallengeSet, LearningArtifact::ChallengeSet(s)) => {
        assert!(!s.challenges.is_empty());
        assert!(s.challenges.iter().all(|c| c.difficulty == Difficulty::Hard && c.acceptance_rate <= 100));
      }
      (ArtifactKind::Notes, LearningArtifact::Notes(n)) => assert!(n.markdown.starts_with("# Closures")),
      (ArtifactKind::SolutionEvaluation, LearningArtifact::SolutionEvaluation(e)) => {
        assert!(e.score <= 100 && e.tests_passed <= e.tests_total);
      }
      (ArtifactKind::CuratedResources, LearningArtifact::CuratedResources(r)) => assert!(!r.resources.is_empty()),
      (k, a) => panic!("artifact {a:?} does not match kind {k}"),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn slow_generator_times_out_and_degrades() {
    let stub = Arc::new(StubGenerator::new(vec![Reply::Slow(Duration::from_secs(60), quiz_json())]));
    let p = pipeline_with(stub, Arc::new(ManualClock::new()));
    let res = p.generate(&quiz_request()).await;
    assert!(matches!(res, GenerationResult::Degraded { reason: DegradeReason::Timeout, .. }));
  }

  #[tokio::test]
  async fn degraded_results_are_not_cached() {
    let stub = Arc::new(StubGenerator::new(vec![Reply::Text("garbage".into()), Reply::Text(quiz_json())]));
    let p = pipeline_with(stub.clone(), Arc::new(ManualClock::new()));
    let req = quiz_request();
    assert!(p.generate(&req).await.is_degraded());
    assert!(matches!(p.generate(&req).await, GenerationResult::Success { source: Source::Fresh, .. }));
    assert_eq!(stub.call_count(), 2);
  }

  #[tokio::test]
  async fn json_embedded_in_prose_is_a_success() {
    let raw = format!("Here is your quiz: {} Hope that helps!", quiz_json());
    let p = pipeline_with(Arc::new(StubGenerator::text(raw)), Arc::new(ManualClock::new()));
    match p.generate(&quiz_request()).await {
      GenerationResult::Success { artifact: LearningArtifact::Quiz(q), source: Source::Fresh } => {
        assert_eq!(q.title, "SQL Basics");
        assert_eq!(q.questions.len(), 1);
      }
      other => panic!("expected success, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn missing_generator_degrades_as_unavailable() {
    let p = GenerationPipeline::new(
      None,
      Arc::new(MemoryCache::new()),
      Prompts::default(),
      CacheTtls::default(),
      Duration::from_secs(1),
    );
    let res = p.generate(&quiz_request()).await;
    assert_eq!(
      serde_json::to_value(&res).unwrap()["reason"],
      json!({ "type": "unavailable" })
    );
  }

  #[tokio::test]
  async fn backend_roadmap_end_to_end() {
    let stub = Arc::new(StubGenerator::text(roadmap_json(6)));
    let p = pipeline_with(stub.clone(), Arc::new(ManualClock::new()));
    let req = GenerationRequest::roadmap(RoadmapInput {
      career_goal: Some("Backend Developer".into()),
      experience_level: Some("beginner".into()),
      skills: Some(vec![]),
      hours_per_week: Some(10),
    });

    let res = p.generate(&req).await;
    let GenerationResult::Success { artifact: LearningArtifact::Roadmap(r), source: Source::Fresh } = res else {
      panic!("expected fresh roadmap success");
    };
    assert_eq!(r.milestones.len(), 6);
    assert_eq!(r.milestones[0].status, MilestoneStatus::Current);
    assert!(r.milestones[1..].iter().all(|m| m.status == MilestoneStatus::Locked));

    let calls = stub.calls.lock().unwrap();
    let (prompt, opts) = &calls[0];
    assert!(prompt.user.contains("Backend Developer"));
    assert!(prompt.user.contains("\"milestones\""));
    assert!(opts.json_mode);
    assert_eq!(opts.max_tokens, 4000);
  }

  #[tokio::test]
  async fn chat_passes_context_and_plain_text_mode() {
    let stub = Arc::new(StubGenerator::text("Use a HashMap."));
    let p = pipeline_with(stub.clone(), Arc::new(ManualClock::new()));
    let reply = p.chat("How do I count words?", Some("Rust roadmap")).await.unwrap();
    assert_eq!(reply, "Use a HashMap.");

    let calls = stub.calls.lock().unwrap();
    assert!(calls[0].0.user.starts_with("Context: Rust roadmap"));
    assert!(!calls[0].1.json_mode);
  }

  #[test]
  fn evaluation_runs_colder_than_creative_kinds() {
    assert!(invoke_options(ArtifactKind::SolutionEvaluation).temperature < 0.5);
    assert!(invoke_options(ArtifactKind::ChallengeSet).temperature >= 0.7);
    assert!(!invoke_options(ArtifactKind::Notes).json_mode);
  }
}
