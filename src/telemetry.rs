//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,generation=debug,persistence=warn"). It replaces the defaults entirely.
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Default level per target:
//! - `generation` debug: cache hits and degrade reasons.
//! - `progress` debug: every unit mark and level commit.
//! - `persistence` info: successful writes and hydration log at debug and stay hidden.
//!   Failed writes and dropped jobs still show.
//! - `edupath_backend` debug: handler spans and startup.

use tracing_subscriber::EnvFilter;

const TARGET_DIRECTIVES: &[&str] = &[
    "generation=debug",
    "progress=debug",
    "persistence=info",
    "edupath_backend=debug",
    "tower_http=info",
    "axum=info",
];

fn default_filter() -> EnvFilter {
    let directives = std::iter::once("info").chain(TARGET_DIRECTIVES.iter().copied()).collect::<Vec<_>>();
    EnvFilter::new(directives.join(","))
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| default_filter());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
