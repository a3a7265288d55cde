//! Loading agent configuration (prompts, cache TTLs, generator limits) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema. Every section is
//! optional; missing values fall back to the defaults below.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::request::ArtifactKind;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub cache: CacheTtls,
  #[serde(default)]
  pub generator: GeneratorSettings,
}

/// Per-kind cache lifetimes, in seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
  pub roadmap: u64,
  pub quiz: u64,
  pub challenge_set: u64,
  pub notes: u64,
  pub solution_evaluation: u64,
  pub curated_resources: u64,
}

impl Default for CacheTtls {
  fn default() -> Self {
    Self {
      roadmap: 900,
      quiz: 300,
      challenge_set: 300,
      notes: 900,
      solution_evaluation: 300,
      curated_resources: 900,
    }
  }
}

impl CacheTtls {
  pub fn for_kind(&self, kind: ArtifactKind) -> Duration {
    let secs = match kind {
      ArtifactKind::Roadmap => self.roadmap,
      ArtifactKind::Quiz => self.quiz,
      ArtifactKind::ChallengeSet => self.challenge_set,
      ArtifactKind::Notes => self.notes,
      ArtifactKind::SolutionEvaluation => self.solution_evaluation,
      ArtifactKind::CuratedResources => self.curated_resources,
    };
    Duration::from_secs(secs)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
  /// Upper bound for a single generation call. No retries follow a timeout.
  pub timeout_secs: u64,
}

impl Default for GeneratorSettings {
  fn default() -> Self {
    Self { timeout_secs: 30 }
  }
}

impl GeneratorSettings {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

/// Prompts used by the generation pipeline. Each structured kind spells out the exact JSON
/// shape expected back; `notes` is free-form markdown.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub roadmap_system: String,
  pub roadmap_user_template: String,
  pub quiz_system: String,
  pub quiz_user_template: String,
  pub challenge_system: String,
  pub challenge_user_template: String,
  pub notes_system: String,
  pub notes_user_template: String,
  pub evaluation_system: String,
  pub evaluation_user_template: String,
  pub resources_system: String,
  pub resources_user_template: String,
  pub chat_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      roadmap_system: "You are an expert career mentor who designs learning roadmaps for software learners. Respond ONLY with strict JSON.".into(),
      roadmap_user_template: "Create a {level} learning roadmap for someone who wants to become a {career_goal}.\nSkills they already know: {skills}.\nTime available: {hours_per_week} hours per week.\n\nReturn JSON: {\"title\": string, \"milestones\": [{\"id\": string, \"title\": string, \"description\": string, \"skills\": [string], \"estimatedWeeks\": integer >= 1, \"topics\": [{\"name\": string, \"description\": string}]}]}\nProduce exactly 6 milestones in learning order, each with 3 to 5 topics. Do not repeat skills they already know.".into(),
      quiz_system: "You are a programming instructor who writes multiple-choice quizzes. Respond ONLY with strict JSON.".into(),
      quiz_user_template: "Write a {difficulty} quiz about {topic} with exactly {count} questions.\n\nReturn JSON: {\"title\": string, \"questions\": [{\"id\": string, \"text\": string, \"options\": [string, string, string, string], \"correctOptionIndex\": integer 0-3, \"explanation\": string}]}\nEvery question has exactly 4 options. Vary the position of the correct option.".into(),
      challenge_system: "You are a coding-challenge author for a practice arena. Respond ONLY with strict JSON.".into(),
      challenge_user_template: "Create {count} coding challenges in the category '{category}' at difficulty '{difficulty}'.\n\nReturn JSON: {\"challenges\": [{\"id\": string, \"title\": string, \"difficulty\": \"easy\" | \"medium\" | \"hard\", \"category\": string, \"description\": string, \"acceptanceRate\": number 0-100, \"skills\": [string], \"points\": integer}]}\nIf the difficulty is 'mixed', spread the challenges across easy, medium and hard.".into(),
      notes_system: "You are a patient teacher writing concise study notes in GitHub-flavored markdown.".into(),
      notes_user_template: "Write {level} study notes about {topic}. Use headings, short explanations, one small code example where it helps, common pitfalls, and a short summary. Output ONLY markdown.".into(),
      evaluation_system: "You are a strict code reviewer grading solutions to programming challenges. Be concise. Output JSON only.".into(),
      evaluation_user_template: "Challenge: {challenge_id}\nProblem: {problem}\nLanguage: {language}\nSubmitted code:\n```\n{code}\n```\n\nReturn JSON: {\"passed\": boolean, \"score\": number 0-100, \"feedback\": string, \"strengths\": [string], \"improvements\": [string], \"complexityNote\": string, \"testsPassed\": integer, \"testsTotal\": integer}\n'passed' = true only if the solution is correct for all reasonable inputs.".into(),
      resources_system: "You are a librarian of free programming learning resources. Recommend only well-known, stable URLs. Respond ONLY with strict JSON.".into(),
      resources_user_template: "Recommend {count} {level} learning resources about {topic}.\n\nReturn JSON: {\"resources\": [{\"title\": string, \"url\": string, \"type\": \"video\" | \"article\" | \"course\" | \"documentation\", \"description\": string}]}".into(),
      chat_system: "You are EduPath's learning assistant. Answer programming and career questions clearly in a few short paragraphs.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from EDUPATH_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("EDUPATH_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "edupath_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "edupath_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "edupath_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
