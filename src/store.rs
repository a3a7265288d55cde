//! Durable progress storage.
//!
//! Handlers never await the store. They enqueue snapshots on the
//! `PersistenceQueue`, whose worker writes them in order and only logs and
//! counts failures. Reads (track hydration) go to the store directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::error::StoreError;
use crate::progress::{LevelTrack, ProgressRecord};

#[async_trait]
pub trait ProgressStore: Send + Sync {
  fn name(&self) -> &str;

  async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError>;

  async fn upsert_track(&self, track: &LevelTrack) -> Result<(), StoreError>;

  async fn load_track(&self, user_id: &str, subject: &str) -> Result<Option<LevelTrack>, StoreError>;
}

// --- Supabase (PostgREST) ---

const PROGRESS_TABLE: &str = "unit_progress";
const TRACKS_TABLE: &str = "level_tracks";

#[derive(Clone)]
pub struct SupabaseStore {
  client: reqwest::Client,
  base_url: String,
  service_key: String,
}

impl SupabaseStore {
  /// Construct the store if SUPABASE_URL and SUPABASE_SERVICE_KEY are both set.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("SUPABASE_URL").ok().filter(|s| !s.trim().is_empty())?;
    let service_key = std::env::var("SUPABASE_SERVICE_KEY").ok().filter(|s| !s.trim().is_empty())?;
    Some(Self::new(base_url, service_key))
  }

  pub fn new(base_url: String, service_key: String) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.trim_end_matches('/').to_string(),
      service_key,
    }
  }

  fn table_url(&self, table: &str) -> String {
    format!("{}/rest/v1/{}", self.base_url, table)
  }

  fn headers(&self) -> Result<HeaderMap, StoreError> {
    let bad_key = |_| StoreError::Http { status: 0, message: "service key is not a valid header value".into() };
    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(&self.service_key).map_err(bad_key)?);
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", self.service_key)).map_err(bad_key)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
  }

  async fn upsert(&self, table: &str, on_conflict: &str, row: &impl Serialize) -> Result<(), StoreError> {
    let res = self.client.post(self.table_url(table))
      .headers(self.headers()?)
      .header("Prefer", "resolution=merge-duplicates,return=minimal")
      .query(&[("on_conflict", on_conflict)])
      .json(row)
      .send()
      .await?;
    check_status(res).await.map(|_| ())
  }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, StoreError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let message = res.text().await.unwrap_or_default();
  Err(StoreError::Http { status, message })
}

#[async_trait]
impl ProgressStore for SupabaseStore {
  fn name(&self) -> &str {
    "supabase"
  }

  #[instrument(level = "debug", skip(self, record), fields(user = %record.user_id, unit = %record.unit_id))]
  async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
    let row = json!({
      "user_id": record.user_id,
      "unit_id": record.unit_id,
      "completed": record.completed,
      "completed_at": record.completed_at,
    });
    self.upsert(PROGRESS_TABLE, "user_id,unit_id", &row).await
  }

  #[instrument(level = "debug", skip(self, track), fields(user = %track.user_id, subject = %track.subject))]
  async fn upsert_track(&self, track: &LevelTrack) -> Result<(), StoreError> {
    let row = json!({
      "id": track.id,
      "user_id": track.user_id,
      "subject": track.subject,
      "current_level": track.current_level,
      "mastered": track.mastered,
      "track": serde_json::to_value(track)?,
    });
    self.upsert(TRACKS_TABLE, "user_id,subject", &row).await
  }

  #[instrument(level = "debug", skip(self))]
  async fn load_track(&self, user_id: &str, subject: &str) -> Result<Option<LevelTrack>, StoreError> {
    let res = self.client.get(self.table_url(TRACKS_TABLE))
      .headers(self.headers()?)
      .query(&[
        ("select", "track".to_string()),
        ("user_id", format!("eq.{user_id}")),
        ("subject", format!("eq.{subject}")),
        ("limit", "1".to_string()),
      ])
      .send()
      .await?;
    let rows: Vec<Value> = check_status(res).await?.json().await?;
    match rows.into_iter().next().and_then(|mut row| row.get_mut("track").map(Value::take)) {
      Some(track) => Ok(Some(serde_json::from_value(track)?)),
      None => Ok(None),
    }
  }
}

// --- In-memory ---

/// Process-local store used when Supabase is not configured.
#[derive(Default)]
pub struct MemoryStore {
  records: RwLock<HashMap<(String, String), ProgressRecord>>,
  tracks: RwLock<HashMap<(String, String), LevelTrack>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ProgressStore for MemoryStore {
  fn name(&self) -> &str {
    "memory"
  }

  async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
    let mut records = self.records.write().unwrap_or_else(|poisoned| {
      warn!(target: "persistence", "MemoryStore records lock poisoned, recovering");
      poisoned.into_inner()
    });
    records.insert((record.user_id.clone(), record.unit_id.clone()), record.clone());
    Ok(())
  }

  async fn upsert_track(&self, track: &LevelTrack) -> Result<(), StoreError> {
    let mut tracks = self.tracks.write().unwrap_or_else(|poisoned| {
      warn!(target: "persistence", "MemoryStore tracks lock poisoned, recovering");
      poisoned.into_inner()
    });
    tracks.insert((track.user_id.clone(), track.subject.clone()), track.clone());
    Ok(())
  }

  async fn load_track(&self, user_id: &str, subject: &str) -> Result<Option<LevelTrack>, StoreError> {
    let tracks = self.tracks.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(tracks.get(&(user_id.to_string(), subject.to_string())).cloned())
  }
}

// --- Background persistence ---

#[derive(Debug)]
pub enum PersistJob {
  Progress(ProgressRecord),
  Track(Box<LevelTrack>),
}

impl PersistJob {
  fn label(&self) -> &'static str {
    match self {
      PersistJob::Progress(_) => "progress",
      PersistJob::Track(_) => "track",
    }
  }
}

#[derive(Debug, Default)]
pub struct PersistStats {
  pub enqueued: AtomicU64,
  pub written: AtomicU64,
  pub failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct PersistCounts {
  pub enqueued: u64,
  pub written: u64,
  pub failed: u64,
}

impl PersistStats {
  pub fn snapshot(&self) -> PersistCounts {
    PersistCounts {
      enqueued: self.enqueued.load(Ordering::Relaxed),
      written: self.written.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
    }
  }
}

/// Fire-and-forget writer in front of a `ProgressStore`.
pub struct PersistenceQueue {
  tx: std::sync::Mutex<Option<mpsc::UnboundedSender<PersistJob>>>,
  worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
  stats: Arc<PersistStats>,
  store: Arc<dyn ProgressStore>,
}

impl PersistenceQueue {
  /// Spawns the worker; must be called inside a tokio runtime.
  pub fn spawn(store: Arc<dyn ProgressStore>) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();
    let stats = Arc::new(PersistStats::default());
    let worker_stats = stats.clone();
    let worker_store = store.clone();

    let worker = tokio::spawn(async move {
      while let Some(job) = rx.recv().await {
        let kind = job.label();
        let res = match &job {
          PersistJob::Progress(r) => worker_store.upsert_progress(r).await,
          PersistJob::Track(t) => worker_store.upsert_track(t).await,
        };
        match res {
          Ok(()) => {
            worker_stats.written.fetch_add(1, Ordering::Relaxed);
            debug!(target: "persistence", kind, store = worker_store.name(), "Persisted");
          }
          Err(e) => {
            worker_stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(target: "persistence", kind, store = worker_store.name(), error = %e, "Persist failed");
          }
        }
      }
      debug!(target: "persistence", "Persistence worker stopped");
    });

    Self {
      tx: std::sync::Mutex::new(Some(tx)),
      worker: tokio::sync::Mutex::new(Some(worker)),
      stats,
      store,
    }
  }

  pub fn store(&self) -> &Arc<dyn ProgressStore> {
    &self.store
  }

  pub fn stats(&self) -> PersistCounts {
    self.stats.snapshot()
  }

  /// Never blocks. Jobs enqueued after shutdown are dropped with a warning.
  pub fn enqueue(&self, job: PersistJob) {
    let tx = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match tx.as_ref() {
      Some(tx) if tx.send(job).is_ok() => {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
      }
      _ => warn!(target: "persistence", "Persistence queue closed; dropping job"),
    }
  }

  pub fn enqueue_progress(&self, record: ProgressRecord) {
    self.enqueue(PersistJob::Progress(record));
  }

  pub fn enqueue_track(&self, track: &LevelTrack) {
    self.enqueue(PersistJob::Track(Box::new(track.clone())));
  }

  /// Close the queue and wait for every job already enqueued to be written.
  pub async fn shutdown(&self) {
    let sender = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
    drop(sender);
    if let Some(worker) = self.worker.lock().await.take() {
      if let Err(e) = worker.await {
        error!(target: "persistence", error = %e, "Persistence worker panicked");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Level, Milestone, MilestoneStatus, Roadmap, Topic};
  use crate::progress::UnitId;
  use crate::request::RoadmapParams;
  use chrono::Utc;
  use wiremock::matchers::{header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn track() -> LevelTrack {
    let roadmap = Roadmap {
      title: "Backend".into(),
      level: Level::Beginner,
      milestones: vec![Milestone {
        id: "m1".into(),
        title: "HTTP".into(),
        description: String::new(),
        skills: vec![],
        estimated_weeks: 2,
        status: MilestoneStatus::Current,
        topics: vec![Topic { name: "Verbs".into(), description: String::new(), is_completed: false }],
      }],
    };
    let params = RoadmapParams {
      career_goal: "Backend Developer".into(),
      experience_level: Level::Beginner,
      skills: vec![],
      hours_per_week: 10,
    };
    LevelTrack::new("u1", "backend", params, roadmap)
  }

  struct FailingStore;

  #[async_trait]
  impl ProgressStore for FailingStore {
    fn name(&self) -> &str {
      "failing"
    }
    async fn upsert_progress(&self, _: &ProgressRecord) -> Result<(), StoreError> {
      Err(StoreError::Http { status: 503, message: "unavailable".into() })
    }
    async fn upsert_track(&self, _: &LevelTrack) -> Result<(), StoreError> {
      Err(StoreError::Http { status: 503, message: "unavailable".into() })
    }
    async fn load_track(&self, _: &str, _: &str) -> Result<Option<LevelTrack>, StoreError> {
      Ok(None)
    }
  }

  #[tokio::test]
  async fn queue_writes_through_to_memory_store() {
    let store = Arc::new(MemoryStore::new());
    let queue = PersistenceQueue::spawn(store.clone());
    let t = track();
    queue.enqueue_track(&t);
    queue.enqueue_progress(ProgressRecord::new("u1", &UnitId::Bare("two-sum".into()), true, Utc::now()));
    queue.shutdown().await;

    assert_eq!(queue.stats(), PersistCounts { enqueued: 2, written: 2, failed: 0 });
    assert_eq!(store.load_track("u1", "backend").await.unwrap(), Some(t));
    assert!(store.load_track("u1", "frontend").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn failures_are_counted_not_raised() {
    let queue = PersistenceQueue::spawn(Arc::new(FailingStore));
    queue.enqueue_progress(ProgressRecord::new("u1", &UnitId::topic("m1", 0), true, Utc::now()));
    queue.enqueue_track(&track());
    queue.shutdown().await;
    assert_eq!(queue.stats(), PersistCounts { enqueued: 2, written: 0, failed: 2 });

    queue.enqueue_track(&track());
    assert_eq!(queue.stats().enqueued, 2);
  }

  #[tokio::test]
  async fn supabase_upsert_uses_merge_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/unit_progress"))
      .and(query_param("on_conflict", "user_id,unit_id"))
      .and(header("apikey", "svc"))
      .and(header("authorization", "Bearer svc"))
      .and(header("prefer", "resolution=merge-duplicates,return=minimal"))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let store = SupabaseStore::new(server.uri(), "svc".into());
    let record = ProgressRecord::new("u1", &UnitId::topic("m1", 0), true, Utc::now());
    store.upsert_progress(&record).await.unwrap();
  }

  #[tokio::test]
  async fn supabase_load_track_decodes_json_column() {
    let server = MockServer::start().await;
    let t = track();
    Mock::given(method("GET"))
      .and(path("/rest/v1/level_tracks"))
      .and(query_param("user_id", "eq.u1"))
      .and(query_param("subject", "eq.backend"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "track": t }])))
      .mount(&server)
      .await;

    let store = SupabaseStore::new(server.uri(), "svc".into());
    assert_eq!(store.load_track("u1", "backend").await.unwrap(), Some(t));
  }

  #[tokio::test]
  async fn supabase_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
      .mount(&server)
      .await;

    let store = SupabaseStore::new(server.uri(), "svc".into());
    match store.upsert_track(&track()).await {
      Err(StoreError::Http { status, message }) => {
        assert_eq!(status, 401);
        assert_eq!(message, "invalid api key");
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }
}
