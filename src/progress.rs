//! Progress tracking and the per-subject leveling state machine.
//!
//! A `LevelTrack` owns the roadmap for one (user, subject) pair and the set of
//! completed topic units. Completing every unit of the current level emits a
//! single `TrackEvent`; the caller regenerates the next roadmap and commits it
//! with `advance_level`. The track never calls the pipeline itself.
//!
//!   beginner ─▶ intermediate ─▶ advanced ─▶ mastered (terminal)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Level, MilestoneStatus, Roadmap};
use crate::error::ProgressError;
use crate::request::RoadmapParams;

/// Identity of a learning unit: a roadmap topic or a bare id (video, challenge).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnitId {
  Topic { milestone_id: String, topic_index: usize },
  Bare(String),
}

impl UnitId {
  pub fn topic(milestone_id: &str, topic_index: usize) -> Self {
    UnitId::Topic { milestone_id: milestone_id.to_string(), topic_index }
  }

  /// `"<milestoneId>/<topicIndex>"` is a topic, anything else is bare.
  pub fn parse(s: &str) -> Self {
    let s = s.trim();
    if let Some((milestone, idx)) = s.rsplit_once('/') {
      if let Ok(topic_index) = idx.parse::<usize>() {
        if !milestone.is_empty() {
          return UnitId::topic(milestone, topic_index);
        }
      }
    }
    UnitId::Bare(s.to_string())
  }
}

impl fmt::Display for UnitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UnitId::Topic { milestone_id, topic_index } => write!(f, "{milestone_id}/{topic_index}"),
      UnitId::Bare(id) => f.write_str(id),
    }
  }
}

/// Flat per-(user, unit) completion flag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
  pub user_id: String,
  pub unit_id: String,
  pub completed: bool,
  pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
  pub fn new(user_id: &str, unit: &UnitId, completed: bool, now: DateTime<Utc>) -> Self {
    Self {
      user_id: user_id.to_string(),
      unit_id: unit.to_string(),
      completed,
      completed_at: completed.then_some(now),
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
  pub completed_count: usize,
  pub total_count: usize,
  pub completion_percent: u8,
}

impl ProgressSummary {
  pub fn from_counts(completed: usize, total: usize) -> Self {
    let completion_percent = if total == 0 {
      0
    } else {
      ((100.0 * completed.min(total) as f64) / total as f64).round() as u8
    };
    Self { completed_count: completed, total_count: total, completion_percent }
  }
}

/// Summary over a flat record list; every record counts toward the total.
pub fn summarize(records: &[ProgressRecord]) -> ProgressSummary {
  let completed = records.iter().filter(|r| r.completed).count();
  ProgressSummary::from_counts(completed, records.len())
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Beginner,
  Intermediate,
  Advanced,
  Mastered,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackEvent {
  /// Caller should generate a roadmap at `next` and commit it via `advance_level`.
  AdvanceLevel { next: Level },
  Mastered,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome {
  /// False when the unit was already in the requested state.
  pub changed: bool,
  pub event: Option<TrackEvent>,
  pub summary: ProgressSummary,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelTrack {
  pub id: Uuid,
  pub user_id: String,
  pub subject: String,
  pub params: RoadmapParams,
  pub current_level: Level,
  pub mastered: bool,
  pub pending_advance: bool,
  pub artifact: Roadmap,
  pub completed_unit_ids: BTreeSet<String>,
  pub completed_at: BTreeMap<String, DateTime<Utc>>,
  #[serde(default)]
  pub completed_levels: Vec<Level>,
  /// Days with at least one completion, across every level of this track.
  #[serde(default)]
  pub active_days: BTreeSet<NaiveDate>,
  /// Topics finished at levels already left behind.
  #[serde(default)]
  pub earlier_level_topics: usize,
}

impl LevelTrack {
  pub fn new(user_id: &str, subject: &str, params: RoadmapParams, mut roadmap: Roadmap) -> Self {
    roadmap.reset_statuses();
    Self {
      id: Uuid::new_v4(),
      user_id: user_id.to_string(),
      subject: subject.to_string(),
      params,
      current_level: roadmap.level,
      mastered: false,
      pending_advance: false,
      artifact: roadmap,
      completed_unit_ids: BTreeSet::new(),
      completed_at: BTreeMap::new(),
      completed_levels: Vec::new(),
      active_days: BTreeSet::new(),
      earlier_level_topics: 0,
    }
  }

  pub fn stage(&self) -> Stage {
    if self.mastered {
      return Stage::Mastered;
    }
    match self.current_level {
      Level::Beginner => Stage::Beginner,
      Level::Intermediate => Stage::Intermediate,
      Level::Advanced => Stage::Advanced,
    }
  }

  pub fn summary(&self) -> ProgressSummary {
    ProgressSummary::from_counts(self.completed_unit_ids.len(), self.artifact.topic_count())
  }

  /// Ids of every unit at the current level, in roadmap order.
  pub fn unit_ids(&self) -> Vec<String> {
    self.artifact.milestones.iter()
      .flat_map(|m| (0..m.topics.len()).map(move |i| UnitId::topic(&m.id, i).to_string()))
      .collect()
  }

  fn all_complete(&self) -> bool {
    let units = self.unit_ids();
    !units.is_empty() && units.iter().all(|id| self.completed_unit_ids.contains(id))
  }

  pub fn mark_unit(&mut self, unit: &UnitId, completed: bool, now: DateTime<Utc>) -> Result<MarkOutcome, ProgressError> {
    let unknown = || ProgressError::UnknownUnit(unit.to_string());
    let UnitId::Topic { milestone_id, topic_index } = unit else {
      return Err(unknown());
    };
    let was_complete = self.all_complete();
    let topic = self.artifact.milestones.iter_mut()
      .find(|m| &m.id == milestone_id)
      .and_then(|m| m.topics.get_mut(*topic_index))
      .ok_or_else(unknown)?;

    let key = unit.to_string();
    topic.is_completed = completed;
    let changed = if completed {
      let inserted = self.completed_unit_ids.insert(key.clone());
      if inserted {
        self.completed_at.insert(key, now);
        self.active_days.insert(now.date_naive());
      }
      inserted
    } else {
      self.completed_at.remove(&key);
      self.completed_unit_ids.remove(&key)
    };
    self.refresh_statuses();

    let event = if !was_complete && self.all_complete() && !self.pending_advance && !self.mastered {
      Some(match self.current_level.next() {
        Some(next) => {
          self.pending_advance = true;
          TrackEvent::AdvanceLevel { next }
        }
        None => {
          self.mastered = true;
          self.completed_levels.push(self.current_level);
          TrackEvent::Mastered
        }
      })
    } else {
      None
    };

    debug!(target: "progress", user = %self.user_id, subject = %self.subject, unit = %unit, completed, changed, ?event, "Unit marked");
    Ok(MarkOutcome { changed, event, summary: self.summary() })
  }

  /// Commit a pending advance with the roadmap generated for the next level.
  pub fn advance_level(&mut self, mut roadmap: Roadmap) -> Result<Level, ProgressError> {
    if self.mastered {
      return Err(ProgressError::AlreadyMastered);
    }
    if !self.pending_advance {
      return Err(ProgressError::NoPendingAdvance);
    }
    let next = self.current_level.next().ok_or(ProgressError::NoPendingAdvance)?;

    roadmap.level = next;
    roadmap.reset_statuses();
    self.completed_levels.push(self.current_level);
    self.current_level = next;
    self.params = self.params.at_level(next);
    self.artifact = roadmap;
    self.earlier_level_topics += self.completed_unit_ids.len();
    self.completed_unit_ids.clear();
    self.completed_at.clear();
    self.pending_advance = false;

    debug!(target: "progress", user = %self.user_id, subject = %self.subject, level = next.as_str(), "Level advanced");
    Ok(next)
  }

  /// Completed milestones stay completed; the first unfinished one is current.
  fn refresh_statuses(&mut self) {
    let mut current_assigned = false;
    for m in self.artifact.milestones.iter_mut() {
      let done = !m.topics.is_empty() && m.topics.iter().all(|t| t.is_completed);
      m.status = if done {
        MilestoneStatus::Completed
      } else if !current_assigned {
        current_assigned = true;
        MilestoneStatus::Current
      } else {
        MilestoneStatus::Locked
      };
    }
  }
}

/// Leaderboard row for one learner. Rank needs a global view and is left empty.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LearnerStats {
  pub completed_topics: usize,
  pub achievements: usize,
  pub streak_days: u32,
  pub xp: u64,
  pub rank: Option<u32>,
}

impl LearnerStats {
  pub fn compute<'a>(
    tracks: impl IntoIterator<Item = &'a LevelTrack>,
    records: &[ProgressRecord],
    today: NaiveDate,
  ) -> Self {
    let mut completed_topics = records.iter().filter(|r| r.completed).count();
    let mut achievements = 0;
    let mut days: BTreeSet<NaiveDate> = records.iter()
      .filter_map(|r| r.completed_at)
      .map(|t| t.date_naive())
      .collect();

    for track in tracks {
      completed_topics += track.earlier_level_topics + track.completed_unit_ids.len();
      achievements += track.completed_levels.len();
      days.extend(track.active_days.iter().copied());
      days.extend(track.completed_at.values().map(|t| t.date_naive()));
    }

    let streak_days = streak_days(&days, today);
    Self {
      completed_topics,
      achievements,
      streak_days,
      xp: xp(completed_topics, achievements, streak_days),
      rank: None,
    }
  }
}

pub fn xp(completed_topics: usize, achievements: usize, streak_days: u32) -> u64 {
  completed_topics as u64 * 50 + achievements as u64 * 100 + u64::from(streak_days) * 10
}

/// Consecutive active days ending today, or yesterday if nothing happened today yet.
pub fn streak_days(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
  let yesterday = today - Duration::days(1);
  let mut day = if days.contains(&today) {
    today
  } else if days.contains(&yesterday) {
    yesterday
  } else {
    return 0;
  };
  let mut streak = 0;
  while days.contains(&day) {
    streak += 1;
    day -= Duration::days(1);
  }
  streak
}
