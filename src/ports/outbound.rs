//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{ActivityRow, AliasMappingRow, CandidateEvent, DomainError, EventWindowQuery};
use serde::{Deserialize, Serialize};

/// Read-side repository port. Alias mappings, activity lookups, windowed
/// event fetches. Ingestion writes these tables out-of-process.
#[async_trait::async_trait]
pub trait QueryRepository: Send + Sync {
    /// All active alias->activity mappings, for the in-memory resolver cache.
    async fn list_active_alias_mappings(&self) -> Result<Vec<AliasMappingRow>, DomainError>;

    /// Activity ids by exact normalized names, scoped to one category.
    async fn find_activity_ids_by_names_and_category(
        &self,
        names: &[String],
        category: &str,
    ) -> Result<Vec<ActivityRow>, DomainError>;

    /// Activities by exact normalized names across all categories.
    async fn find_activities_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<ActivityRow>, DomainError>;

    /// Upcoming events for the given activity ids with
    /// `window_start <= starts_at < window_end`, ordered by start time.
    /// Implementations clamp `limit` to at most 500.
    async fn list_events_by_activity_ids_within_window(
        &self,
        query: &EventWindowQuery,
    ) -> Result<Vec<CandidateEvent>, DomainError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling/context options passed through to the model backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// One chat completion request. `format` carries an optional JSON schema the
/// backend constrains its output to.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<serde_json::Value>,
    pub options: ChatOptions,
    pub messages: Vec<ChatMessage>,
}

/// Chat inference port. Returns the reply content as plain text; adapters
/// bound each call with the configured request timeout and map transport or
/// empty-reply failures to `DomainError::Inference`.
#[async_trait::async_trait]
pub trait ChatPort: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<String, DomainError>;
}
