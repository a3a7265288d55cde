//! Error taxonomy.
//!
//! Only `RequestError` crosses the generation pipeline boundary. Upstream and
//! parse failures are folded into a degraded result, persistence failures are
//! logged by the persistence queue. `ApiError` is the HTTP-facing wrapper.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

/// Caller mistake: a required generation parameter is missing or unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
  #[error("invalid request: `{field}` {message}")]
  InvalidRequest { field: String, message: String },
}

impl RequestError {
  pub fn missing(field: &str) -> Self {
    RequestError::InvalidRequest { field: field.to_string(), message: "is required".into() }
  }

  pub fn invalid(field: &str, message: impl Into<String>) -> Self {
    RequestError::InvalidRequest { field: field.to_string(), message: message.into() }
  }
}

/// Failure talking to the text-generation service.
#[derive(Debug, Error)]
pub enum LlmError {
  #[error("generation request timed out")]
  Timeout,

  #[error("generator returned status {status}: {message}")]
  Http { status: u16, message: String },

  #[error("transport error: {0}")]
  Transport(String),

  #[error("generator returned no content")]
  EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      LlmError::Timeout
    } else {
      LlmError::Transport(e.to_string())
    }
  }
}

/// Model output could not be turned into the expected artifact shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("no JSON object found in model output")]
  NoJson,

  #[error("model output is missing or has invalid `{0}`")]
  Malformed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressError {
  #[error("unit `{0}` is not part of this track")]
  UnknownUnit(String),

  #[error("no level advance is pending for this track")]
  NoPendingAdvance,

  #[error("track is already mastered")]
  AlreadyMastered,
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store returned status {status}: {message}")]
  Http { status: u16, message: String },

  #[error("store transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("could not decode stored row: {0}")]
  Decode(#[from] serde_json::Error),
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Request(#[from] RequestError),

  #[error(transparent)]
  Progress(#[from] ProgressError),

  #[error("{0} not found")]
  NotFound(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::Request(_) => StatusCode::BAD_REQUEST,
      ApiError::Progress(ProgressError::UnknownUnit(_)) => StatusCode::NOT_FOUND,
      ApiError::Progress(_) => StatusCode::CONFLICT,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
