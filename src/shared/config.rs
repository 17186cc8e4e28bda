//! Application configuration. Model endpoints, pipeline tuning, paths.

use crate::domain::ScopeCategory;
use serde::Deserialize;
use std::collections::HashMap;

/// Hard cap applied to any configured candidate fetch limit.
pub const MAX_CANDIDATE_LIMIT: usize = 500;

/// Configured per-category default activities. Guarantees a non-empty result
/// set for broad queries within a known scope even when no term resolves.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDefault {
    pub category_name: String,
    pub activity_names: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// SQLite database path. Read from RECFIND_DB_PATH.
    pub db_path: Option<String>,

    /// Provider tag rows are scoped to. Read from RECFIND_PROVIDER.
    #[serde(default)]
    pub provider: Option<String>,

    /// Ollama host, e.g. http://127.0.0.1:11434. Read from RECFIND_OLLAMA_BASE_URL.
    #[serde(default)]
    pub ollama_base_url: Option<String>,

    /// Per-request timeout for chat calls in ms. Read from RECFIND_OLLAMA_REQUEST_TIMEOUT_MS.
    #[serde(default)]
    pub ollama_request_timeout_ms: Option<u64>,

    /// Model used for intent extraction. Read from RECFIND_MODEL_UNDERSTANDING.
    #[serde(default)]
    pub model_understanding: Option<String>,

    /// Model used for summaries. Read from RECFIND_MODEL_SUMMARY.
    #[serde(default)]
    pub model_summary: Option<String>,

    /// Upper bound for the whole understanding call in ms. Read from RECFIND_UNDERSTANDING_TIMEOUT_MS.
    #[serde(default)]
    pub understanding_timeout_ms: Option<u64>,

    /// Fallback fetch window in days when no time signal resolves. Read from RECFIND_DEFAULT_WINDOW_DAYS.
    #[serde(default)]
    pub default_window_days: Option<i64>,

    /// Max events fetched per query (clamped to MAX_CANDIDATE_LIMIT). Read from RECFIND_CANDIDATE_LIMIT.
    #[serde(default)]
    pub candidate_limit: Option<usize>,

    /// Base fuzzy-match threshold in [0,1]. Read from RECFIND_RANKING_THRESHOLD.
    #[serde(default)]
    pub ranking_threshold: Option<f64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("RECFIND"));
        if let Ok(path) = std::env::var("RECFIND_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn db_path_or_default(&self) -> String {
        self.db_path
            .clone()
            .unwrap_or_else(|| "./data/recfind.db".to_string())
    }

    pub fn provider_or_default(&self) -> String {
        self.provider
            .clone()
            .unwrap_or_else(|| "activeCommunities".to_string())
    }

    pub fn ollama_base_url_or_default(&self) -> String {
        self.ollama_base_url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:11434".to_string())
    }

    pub fn ollama_request_timeout_ms_or_default(&self) -> u64 {
        self.ollama_request_timeout_ms.unwrap_or(20_000)
    }

    pub fn model_understanding_or_default(&self) -> String {
        self.model_understanding
            .clone()
            .unwrap_or_else(|| "qwen2.5:3b".to_string())
    }

    pub fn model_summary_or_default(&self) -> String {
        self.model_summary
            .clone()
            .unwrap_or_else(|| "llama3.2:3b".to_string())
    }

    pub fn understanding_timeout_ms_or_default(&self) -> u64 {
        self.understanding_timeout_ms.unwrap_or(20_000)
    }

    pub fn default_window_days_or_default(&self) -> i64 {
        self.default_window_days.unwrap_or(30)
    }

    pub fn candidate_limit_or_default(&self) -> usize {
        self.candidate_limit
            .unwrap_or(200)
            .clamp(1, MAX_CANDIDATE_LIMIT)
    }

    pub fn ranking_threshold_or_default(&self) -> f64 {
        self.ranking_threshold.unwrap_or(0.5)
    }

    /// Category-level default activity sets. Both known-sports and unknown
    /// scopes fall back to the catch-all "Other" activity in Sports.
    pub fn category_defaults(&self) -> HashMap<ScopeCategory, CategoryDefault> {
        let sports = CategoryDefault {
            category_name: "Sports".to_string(),
            activity_names: vec!["Other".to_string()],
        };
        let mut defaults = HashMap::new();
        defaults.insert(ScopeCategory::Sports, sports.clone());
        defaults.insert(ScopeCategory::Unknown, sports);
        defaults
    }
}
