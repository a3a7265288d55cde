//! Text-generation client (Groq, OpenAI-compatible chat completions).
//!
//! The pipeline only sees the `TextGenerator` trait: one role-structured prompt
//! in, raw text out. `GroqClient` is the production implementation; it asks
//! for a JSON object when the caller wants structured output.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::LlmError;

/// System framing plus the user request.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
  pub system: String,
  pub user: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvokeOptions {
  pub temperature: f32,
  pub max_tokens: u32,
  /// Ask the service to constrain output to a single JSON object.
  pub json_mode: bool,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
  /// Human-readable name for logs and the health endpoint.
  fn name(&self) -> &str;

  async fn invoke(&self, prompt: &Prompt, options: &InvokeOptions) -> Result<String, LlmError>;
}

#[derive(Clone)]
pub struct GroqClient {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl GroqClient {
  /// Construct the client if we find GROQ_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GROQ_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("GROQ_BASE_URL").unwrap_or_else(|_| "https://api.groq.com/openai/v1".into());
    let model =
      std::env::var("GROQ_MODEL").unwrap_or_else(|_| "llama-3.3-70b-versatile".into());
    let timeout_secs = std::env::var("GROQ_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(30);

    Self::new(api_key, base_url, model, Duration::from_secs(timeout_secs)).ok()
  }

  pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }
}

#[async_trait]
impl TextGenerator for GroqClient {
  fn name(&self) -> &str {
    &self.model
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, json = options.json_mode, max_tokens = options.max_tokens))]
  async fn invoke(&self, prompt: &Prompt, options: &InvokeOptions) -> Result<String, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: prompt.system.clone() },
        ChatMessageReq { role: "user".into(), content: prompt.user.clone() },
      ],
      temperature: options.temperature,
      response_format: options.json_mode.then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(options.max_tokens),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "edupath-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or(body);
      return Err(LlmError::Http { status: status.as_u16(), message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Groq usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .unwrap_or_default();

    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    if text.is_empty() {
      return Err(LlmError::EmptyResponse);
    }
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

/// Scripted generator for tests: replays canned replies in order and records every call.
#[cfg(test)]
pub mod testing {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;

  pub enum Reply {
    Text(String),
    Fail(LlmError),
    /// Sleep before answering; used with paused tokio time to trigger timeouts.
    Slow(Duration, String),
  }

  #[derive(Default)]
  pub struct StubGenerator {
    replies: Mutex<VecDeque<Reply>>,
    pub calls: Mutex<Vec<(Prompt, InvokeOptions)>>,
  }

  impl StubGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
      Self { replies: Mutex::new(replies.into()), calls: Mutex::new(Vec::new()) }
    }

    pub fn text(s: impl Into<String>) -> Self {
      Self::new(vec![Reply::Text(s.into())])
    }

    pub fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl TextGenerator for StubGenerator {
    fn name(&self) -> &str {
      "stub"
    }

    async fn invoke(&self, prompt: &Prompt, options: &InvokeOptions) -> Result<String, LlmError> {
      self.calls.lock().unwrap().push((prompt.clone(), *options));
      let next = self.replies.lock().unwrap().pop_front();
      match next {
        Some(Reply::Text(t)) => Ok(t),
        Some(Reply::Fail(e)) => Err(e),
        Some(Reply::Slow(d, t)) => {
          tokio::time::sleep(d).await;
          Ok(t)
        }
        None => Err(LlmError::Transport("stub has no reply left".into())),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{bearer_token, body_partial_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client(server: &MockServer) -> GroqClient {
    GroqClient::new("test-key".into(), server.uri(), "llama-test".into(), Duration::from_secs(5)).unwrap()
  }

  fn prompt() -> Prompt {
    Prompt { system: "sys".into(), user: "usr".into() }
  }

  #[tokio::test]
  async fn sends_json_mode_and_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(bearer_token("test-key"))
      .and(body_partial_json(json!({
        "model": "llama-test",
        "max_tokens": 800,
        "response_format": { "type": "json_object" }
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": "  {\"ok\": true}  " } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
      })))
      .expect(1)
      .mount(&server)
      .await;

    let opts = InvokeOptions { temperature: 0.3, max_tokens: 800, json_mode: true };
    let out = client(&server).invoke(&prompt(), &opts).await.unwrap();
    assert_eq!(out, "{\"ok\": true}");
  }

  #[tokio::test]
  async fn maps_error_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(429).set_body_json(json!({
        "error": { "message": "Rate limit reached" }
      })))
      .mount(&server)
      .await;

    let opts = InvokeOptions { temperature: 0.7, max_tokens: 100, json_mode: false };
    match client(&server).invoke(&prompt(), &opts).await {
      Err(LlmError::Http { status, message }) => {
        assert_eq!(status, 429);
        assert_eq!(message, "Rate limit reached");
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[tokio::test]
  async fn empty_choice_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
      .mount(&server)
      .await;

    let opts = InvokeOptions { temperature: 0.7, max_tokens: 100, json_mode: false };
    assert!(matches!(client(&server).invoke(&prompt(), &opts).await, Err(LlmError::EmptyResponse)));
  }
}
