//! Time-bounded artifact cache.
//!
//! The pipeline talks to `ArtifactCache`, never to a global map. `MemoryCache`
//! is the single-process implementation; expiry is computed against an
//! injected `Clock`, so tests can move time forward without sleeping.
//! There is no size-based eviction: entries live until overwritten, and expired
//! ones read as absent.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::LearningArtifact;

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
  pub key: String,
  pub artifact: LearningArtifact,
  pub created_at: DateTime<Utc>,
  pub ttl: Duration,
}

impl CacheEntry {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(self.ttl) {
      Ok(ttl) => now >= self.created_at + ttl,
      // A TTL too large for chrono never expires in practice.
      Err(_) => false,
    }
  }
}

pub trait ArtifactCache: Send + Sync {
  /// Live entry for `key`, or None when absent or expired.
  fn get(&self, key: &str) -> Option<CacheEntry>;

  /// Insert or overwrite the entry for `key`.
  fn set(&self, key: &str, artifact: LearningArtifact, ttl: Duration);
}

pub struct MemoryCache {
  entries: RwLock<HashMap<String, CacheEntry>>,
  clock: Arc<dyn Clock>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(SystemClock))
  }

  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self { entries: RwLock::new(HashMap::new()), clock }
  }
}

impl Default for MemoryCache {
  fn default() -> Self {
    Self::new()
  }
}

impl ArtifactCache for MemoryCache {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    let entries = self.entries.read().unwrap_or_else(|poisoned| {
      warn!(target: "generation", "MemoryCache read lock poisoned, recovering");
      poisoned.into_inner()
    });
    let entry = entries.get(key)?;
    if entry.is_expired(self.clock.now()) {
      None
    } else {
      Some(entry.clone())
    }
  }

  fn set(&self, key: &str, artifact: LearningArtifact, ttl: Duration) {
    let entry = CacheEntry {
      key: key.to_string(),
      artifact,
      created_at: self.clock.now(),
      ttl,
    };
    let mut entries = self.entries.write().unwrap_or_else(|poisoned| {
      warn!(target: "generation", "MemoryCache write lock poisoned, recovering");
      poisoned.into_inner()
    });
    entries.insert(key.to_string(), entry);
  }
}

/// Test clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
  now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new() -> Self {
    Self { now: std::sync::Mutex::new(Utc::now()) }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap();
    *now += chrono::Duration::from_std(by).unwrap();
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap()
  }
}
