//! Application state: generation pipeline, learner tracks, flat progress, and persistence.
//!
//! This module owns:
//!   - the generation pipeline (Groq client if configured, artifact cache, prompts)
//!   - level tracks keyed by (user, subject)
//!   - flat per-user unit progress (videos, challenges)
//!   - the background persistence queue in front of the durable store
//!
//! Without GROQ_API_KEY every generation degrades to local fallbacks; without
//! Supabase credentials snapshots go to an in-process store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::cache::{Clock, MemoryCache, SystemClock};
use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::llm::{GroqClient, TextGenerator};
use crate::pipeline::GenerationPipeline;
use crate::progress::{LevelTrack, ProgressRecord};
use crate::store::{MemoryStore, PersistenceQueue, ProgressStore, SupabaseStore};

pub type TrackKey = (String, String);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GenerationPipeline>,
    pub tracks: Arc<RwLock<HashMap<TrackKey, LevelTrack>>>,
    /// user id -> unit id -> record
    pub records: Arc<RwLock<HashMap<String, BTreeMap<String, ProgressRecord>>>>,
    pub persistence: Arc<PersistenceQueue>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Build state from env: load config, pick generator and store, spawn the persistence worker.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let generator: Option<Arc<dyn TextGenerator>> = match GroqClient::from_env() {
            Some(groq) => {
                info!(target: "edupath_backend", base_url = %groq.base_url, model = %groq.model, "Groq enabled.");
                Some(Arc::new(groq))
            }
            None => {
                info!(target: "edupath_backend", "Groq disabled (no GROQ_API_KEY). Serving local fallbacks.");
                None
            }
        };

        let store: Arc<dyn ProgressStore> = match SupabaseStore::from_env() {
            Some(s) => Arc::new(s),
            None => {
                info!(target: "edupath_backend", "Supabase not configured; progress kept in memory only.");
                Arc::new(MemoryStore::new())
            }
        };
        info!(target: "edupath_backend", store = store.name(), "Progress store ready");

        Self::with_parts(generator, store, cfg, Arc::new(SystemClock))
    }

    /// Assemble state from explicit collaborators. Must run inside a tokio runtime.
    pub fn with_parts(
        generator: Option<Arc<dyn TextGenerator>>,
        store: Arc<dyn ProgressStore>,
        cfg: AgentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let pipeline = GenerationPipeline::new(
            generator,
            cache,
            cfg.prompts,
            cfg.cache,
            cfg.generator.timeout(),
        );
        Self {
            pipeline: Arc::new(pipeline),
            tracks: Arc::new(RwLock::new(HashMap::new())),
            records: Arc::new(RwLock::new(HashMap::new())),
            persistence: Arc::new(PersistenceQueue::spawn(store)),
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        self.persistence.store()
    }
}

pub fn track_key(user_id: &str, subject: &str) -> TrackKey {
    (user_id.to_string(), subject.trim().to_lowercase())
}
