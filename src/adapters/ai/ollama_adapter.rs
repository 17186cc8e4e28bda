//! Ollama chat adapter.
//!
//! Thin wrapper over the `/api/chat` endpoint of a local Ollama instance.
//! Implements `ChatPort`; every request is bounded by the configured timeout
//! and failures map to `DomainError::Inference`.

use crate::domain::DomainError;
use crate::ports::{ChatMessage, ChatOptions, ChatPort, ChatRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct OllamaAdapter {
    client: reqwest::Client,
    chat_url: String,
    request_timeout: Duration,
}

impl OllamaAdapter {
    /// # Arguments
    /// * `base_url` - Ollama host (e.g., "http://127.0.0.1:11434")
    /// * `request_timeout_ms` - per-request upper bound; must be positive
    pub fn new(base_url: &str, request_timeout_ms: u64) -> Result<Self, DomainError> {
        if base_url.trim().is_empty() {
            return Err(DomainError::Config("Missing Ollama base URL".to_string()));
        }
        if request_timeout_ms == 0 {
            return Err(DomainError::Config(
                "Invalid Ollama request timeout".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Wire shape of an Ollama chat call. `stream` is always false; the pipeline
/// consumes whole replies.
#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
    options: &'a ChatOptions,
}

#[derive(Deserialize)]
struct WireResponse {
    message: Option<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: String,
}

#[async_trait::async_trait]
impl ChatPort for OllamaAdapter {
    async fn chat(&self, request: &ChatRequest) -> Result<String, DomainError> {
        let wire = WireRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            format: request.format.as_ref(),
            options: &request.options,
        };

        let response = self
            .client
            .post(&self.chat_url)
            .timeout(self.request_timeout)
            .json(&wire)
            .send()
            .await
            .map_err(|e| DomainError::Inference(format!("chat request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body.chars().take(200).collect::<String>(), "ollama returned error");
            return Err(DomainError::Inference(format!("chat API error {}", status)));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Inference(format!("failed to parse chat response: {}", e)))?;

        let content = parsed
            .message
            .map(|m| m.content)
            .ok_or_else(|| DomainError::Inference("no message in chat response".to_string()))?;

        debug!(reply_len = content.len(), "received chat reply");
        Ok(content)
    }
}
