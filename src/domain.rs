//! Domain models: learning artifacts produced by the generation pipeline.
//!
//! Every artifact shape here is "fully populated": optional model output is
//! backfilled during normalization (see `parse`), so consumers never branch on
//! missing fields.

use serde::{Deserialize, Serialize};

/// Learner level. Tracks only move forward through these.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Level {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

impl Level {
  pub fn next(self) -> Option<Level> {
    match self {
      Level::Beginner => Some(Level::Intermediate),
      Level::Intermediate => Some(Level::Advanced),
      Level::Advanced => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Level::Beginner => "beginner",
      Level::Intermediate => "intermediate",
      Level::Advanced => "advanced",
    }
  }

  /// Lenient parse used for user/model input ("Beginner", " advanced ").
  pub fn parse(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
      "beginner" | "novice" | "basic" => Some(Level::Beginner),
      "intermediate" => Some(Level::Intermediate),
      "advanced" | "expert" => Some(Level::Advanced),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
  Locked,
  Current,
  Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
  pub name: String,
  pub description: String,
  pub is_completed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
  pub id: String,
  pub title: String,
  pub description: String,
  pub skills: Vec<String>,
  pub estimated_weeks: u32,
  pub status: MilestoneStatus,
  pub topics: Vec<Topic>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
  pub title: String,
  pub level: Level,
  pub milestones: Vec<Milestone>,
}

impl Roadmap {
  /// Reset progressive disclosure: first milestone current, the rest locked, no topic completed.
  pub fn reset_statuses(&mut self) {
    for (i, m) in self.milestones.iter_mut().enumerate() {
      m.status = if i == 0 { MilestoneStatus::Current } else { MilestoneStatus::Locked };
      for t in m.topics.iter_mut() {
        t.is_completed = false;
      }
    }
  }

  pub fn topic_count(&self) -> usize {
    self.milestones.iter().map(|m| m.topics.len()).sum()
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub text: String,
  pub options: Vec<String>,
  pub correct_option_index: usize,
  pub explanation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
  pub title: String,
  pub questions: Vec<Question>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn parse(s: &str) -> Option<Difficulty> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" | "beginner" => Some(Difficulty::Easy),
      "medium" | "intermediate" => Some(Difficulty::Medium),
      "hard" | "advanced" => Some(Difficulty::Hard),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  /// Points awarded when the model does not supply any.
  pub fn default_points(self) -> u32 {
    match self {
      Difficulty::Easy => 10,
      Difficulty::Medium => 20,
      Difficulty::Hard => 30,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
  pub id: String,
  pub title: String,
  pub difficulty: Difficulty,
  pub category: String,
  pub description: String,
  pub acceptance_rate: u8,
  pub skills: Vec<String>,
  pub points: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSet {
  pub challenges: Vec<Challenge>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SolutionEvaluation {
  pub passed: bool,
  pub score: u8,
  pub feedback: String,
  pub strengths: Vec<String>,
  pub improvements: Vec<String>,
  pub complexity_note: String,
  pub tests_passed: u32,
  pub tests_total: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notes {
  pub topic: String,
  pub markdown: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
  Video,
  Article,
  Course,
  Documentation,
}

impl ResourceType {
  pub fn parse(s: &str) -> Option<ResourceType> {
    match s.trim().to_ascii_lowercase().as_str() {
      "video" | "youtube" => Some(ResourceType::Video),
      "article" | "blog" | "tutorial" => Some(ResourceType::Article),
      "course" => Some(ResourceType::Course),
      "documentation" | "docs" | "reference" => Some(ResourceType::Documentation),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
  pub title: String,
  pub url: String,
  #[serde(rename = "type")]
  pub resource_type: ResourceType,
  pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CuratedResources {
  pub topic: String,
  pub resources: Vec<Resource>,
}

/// Output of one generation request, polymorphic over the request kind.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "artifact", rename_all = "kebab-case")]
pub enum LearningArtifact {
  Roadmap(Roadmap),
  Quiz(Quiz),
  ChallengeSet(ChallengeSet),
  Notes(Notes),
  SolutionEvaluation(SolutionEvaluation),
  CuratedResources(CuratedResources),
}

impl LearningArtifact {
  pub fn into_roadmap(self) -> Option<Roadmap> {
    match self {
      LearningArtifact::Roadmap(r) => Some(r),
      _ => None,
    }
  }

  pub fn as_evaluation(&self) -> Option<&SolutionEvaluation> {
    match self {
      LearningArtifact::SolutionEvaluation(e) => Some(e),
      _ => None,
    }
  }
}
