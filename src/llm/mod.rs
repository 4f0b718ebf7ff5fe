//! Text generation through a local Ollama runtime.
//!
//! One non-streaming `POST /api/generate` per call, with the sampling options taken from
//! [`LlmSettings`]. No retry: callers decide what a failed call means for the run.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::config::LlmSettings;

/// Errors surfaced by generation calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The runtime could not be reached or the call timed out.
    #[error("LLM unavailable: {0}")]
    Unavailable(String),
    /// The runtime answered with a non-success status.
    #[error("LLM returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, possibly empty.
        body: String,
    },
    /// The response body could not be decoded.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// A single generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Complete prompt.
    pub prompt: String,
    /// Output token cap (`num_predict`).
    pub num_predict: u32,
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for the prompt; the returned text is trimmed.
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError>;
}

/// Ollama `/api/generate` client.
pub struct OllamaClient {
    http: Client,
    settings: LlmSettings,
}

impl OllamaClient {
    /// Build a client with the configured per-call timeout.
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("dceassist/llm")
            .timeout(settings.timeout)
            .build()
            .map_err(|error| {
                LlmError::Unavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self { http, settings })
    }

    fn payload(&self, request: &GenerationRequest) -> Value {
        let mut options = Map::new();
        options.insert("temperature".into(), json!(self.settings.temperature));
        options.insert("num_predict".into(), json!(request.num_predict));
        options.insert("num_ctx".into(), json!(self.settings.num_ctx));
        if let Some(num_gpu) = self.settings.num_gpu {
            options.insert("num_gpu".into(), json!(num_gpu));
        }
        if let Some(num_thread) = self.settings.num_thread {
            options.insert("num_thread".into(), json!(num_thread));
        }
        json!({
            "model": self.settings.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: Option<bool>,
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        let payload = self.payload(&request);
        let response = self
            .http
            .post(&self.settings.url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                let reason = if error.is_timeout() {
                    format!("timed out after {}s", self.settings.timeout.as_secs())
                } else {
                    format!("failed to reach {}: {error}", self.settings.url)
                };
                LlmError::Unavailable(reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode generate response: {error}"))
        })?;
        if body.done == Some(false) {
            return Err(LlmError::InvalidResponse(
                "response incomplete (streaming not supported)".into(),
            ));
        }

        tracing::debug!(
            model = %self.settings.model,
            prompt_chars = request.prompt.len(),
            num_predict = request.num_predict,
            response_chars = body.response.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "LLM generation complete"
        );
        Ok(body.response.trim().to_string())
    }
}
