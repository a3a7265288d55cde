//! EduPath · Learning Path Backend
//!
//! - Axum HTTP API for AI-generated learning artifacts (roadmaps, quizzes,
//!   challenges, notes, solution reviews, curated resources)
//! - Per-subject level tracks: beginner → intermediate → advanced → mastered
//! - Optional Groq and Supabase integrations (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   GROQ_API_KEY          : enables generation; without it every artifact is a local fallback
//!   GROQ_BASE_URL         : default "https://api.groq.com/openai/v1"
//!   GROQ_MODEL            : default "llama-3.3-70b-versatile"
//!   GROQ_TIMEOUT_SECS     : HTTP client timeout (default 30)
//!   SUPABASE_URL          : with SUPABASE_SERVICE_KEY, enables durable progress storage
//!   SUPABASE_SERVICE_KEY  : service role key for PostgREST
//!   EDUPATH_CONFIG_PATH   : path to TOML config (prompts, cache TTLs, generator timeout)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod request;
mod cache;
mod llm;
mod parse;
mod seeds;
mod pipeline;
mod progress;
mod store;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: pipeline (generator + cache), tracks, persistence worker.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "edupath_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  // Flush queued progress writes before exiting.
  state.persistence.shutdown().await;
  info!(target: "edupath_backend", persisted = ?state.persistence.stats(), "Shutdown complete");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "edupath_backend", error = %e, "Failed to listen for shutdown signal");
  }
}
