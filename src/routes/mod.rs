//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - generation endpoints under `/api/v1/...`
/// - track, progress and leaderboard endpoints
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Generation
        .route("/api/v1/generate", post(http::http_generate))
        .route("/api/v1/roadmap", post(http::http_roadmap))
        .route("/api/v1/quiz", post(http::http_quiz))
        .route("/api/v1/challenges", get(http::http_challenges))
        .route("/api/v1/challenges/evaluate", post(http::http_evaluate))
        .route("/api/v1/notes", post(http::http_notes))
        .route("/api/v1/resources", post(http::http_resources))
        .route("/api/v1/chat", post(http::http_chat))
        // Progress
        .route("/api/v1/tracks/topic", post(http::http_toggle_topic))
        .route("/api/v1/tracks/:user_id/:subject", get(http::http_get_track))
        .route("/api/v1/progress", post(http::http_post_progress))
        .route("/api/v1/progress/:user_id", get(http::http_get_progress))
        .route("/api/v1/leaderboard/:user_id", get(http::http_leaderboard))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
