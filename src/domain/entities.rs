//! Domain entities. Pure data structures for the query pipeline.
//!
//! Field names mirror the JSON record shape shared with the offline
//! temporal-extraction dataset tooling, so keep serde names stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured intent extracted from a raw user query.
///
/// Produced once per query (model path or heuristic fallback), immutable
/// afterwards. `start_date_iso`/`end_date_iso` stay raw strings here because
/// the model may emit unparseable values; the time window resolver validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub activity_terms: Vec<String>,
    pub time_hint: Option<String>,
    pub time_range_type: TimeRangeType,
    pub start_date_iso: Option<String>,
    pub end_date_iso: Option<String>,
    pub duration_value: Option<f64>,
    pub duration_unit: Option<DurationUnit>,
    pub duration_modifier: Option<DurationModifier>,
    pub location_hint: Option<String>,
    pub scope_category: ScopeCategory,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRangeType {
    Relative,
    Absolute,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Day,
    Week,
    Month,
}

impl DurationUnit {
    /// Approximate day count used when converting relative durations.
    pub fn days(self) -> f64 {
        match self {
            DurationUnit::Day => 1.0,
            DurationUnit::Week => 7.0,
            DurationUnit::Month => 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationModifier {
    Half,
    Next,
    This,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeCategory {
    Sports,
    Unknown,
}

impl ScopeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeCategory::Sports => "sports",
            ScopeCategory::Unknown => "unknown",
        }
    }
}

/// Which cascade rule produced the fetch window. Required output for
/// observability, not optional logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    StructuredAbsolute,
    StructuredRelative,
    Today,
    WeekHint,
    MonthHint,
    DaysHint,
    PhraseHint,
    DefaultWindow,
}

/// Concrete half-open `[start, end)` fetch window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub strategy: WindowStrategy,
    #[serde(rename = "window_start_iso")]
    pub window_start: DateTime<Utc>,
    #[serde(rename = "window_end_iso")]
    pub window_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_text: Option<String>,
}

/// Denormalized event row joining event + activity + centre. Read-only here;
/// produced by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub event_id: i64,
    pub event_external_id: Option<String>,
    pub event_title: String,
    pub event_description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub event_url: Option<String>,
    pub activity_id: i64,
    pub activity_name: Option<String>,
    pub activity_category: Option<String>,
    pub centre_id: i64,
    pub centre_name: Option<String>,
    pub centre_city: Option<String>,
    pub centre_state: Option<String>,
    pub centre_country: Option<String>,
}

/// Match provenance attached to a ranked event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchMeta {
    pub matched_term: String,
    pub term_is_alias: bool,
    pub threshold_used: f64,
    pub exact_alias_hit: bool,
    pub included_by_exact_alias_override: bool,
}

/// A candidate event with its ranking outcome. `match_score` is `None` when
/// there were no terms to match against (pass-through ordering by start time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEvent {
    #[serde(flatten)]
    pub event: CandidateEvent,
    pub match_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_meta: Option<MatchMeta>,
}

/// Per-event scoring diagnostics, emitted for every fetched event whether or
/// not it made the ranked list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub event_id: i64,
    pub event_title: String,
    pub best_score: Option<f64>,
    pub match_score: Option<f64>,
    pub matched_term: Option<String>,
    pub term_is_alias: bool,
    pub exact_alias_hit: bool,
    pub included_by_exact_alias_override: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingDiagnostics {
    pub normalized_terms: Vec<String>,
    pub alias_terms: Vec<String>,
    pub scored_fetched_events: Vec<ScoredEvent>,
}

/// Where a term's activity ids came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Alias,
    ActivityName,
    None,
}

/// A resolved activity reference (denormalized name/category).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRef {
    pub id: i64,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Per-term resolution diagnostics. Invariant: `match_source == None`
/// implies `activity_ids` is empty and the term is recorded as unmapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermResolution {
    pub input_term: String,
    pub match_source: MatchSource,
    pub alias_candidates: Vec<String>,
    pub matched_aliases: Vec<String>,
    pub activity_ids: Vec<i64>,
    pub activities: Vec<ActivityRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub mapped_activity_ids: Vec<i64>,
    pub unmapped_terms: Vec<String>,
    pub mapping_details: Vec<TermResolution>,
}

/// Outcome of applying configured category-level defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsResolution {
    pub applied: bool,
    pub scope_category: ScopeCategory,
    pub category_name: Option<String>,
    pub configured_activity_names: Vec<String>,
    pub resolved_activity_ids: Vec<i64>,
}

/// Aggregated stats fed to summary generation and reported back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySignals {
    pub total_events: usize,
    pub top_time_slots: Vec<String>,
    pub top_centres: Vec<String>,
    pub top_activities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub text: String,
    pub signals: SummarySignals,
    pub model_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_retry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Term resolution enriched with the final id set and defaults outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    #[serde(flatten)]
    pub outcome: ResolutionOutcome,
    pub final_activity_ids: Vec<i64>,
    pub defaults_resolution: DefaultsResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateReport {
    pub window: TimeWindow,
    pub limit: usize,
    pub fetched_count: usize,
    pub count: usize,
    pub events: Vec<RankedEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub summary: SummaryResult,
    pub events: Vec<RankedEvent>,
}

/// Composite result of one query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub understanding: Understanding,
    pub resolution: ResolutionReport,
    pub candidates: CandidateReport,
    pub response: ResponsePayload,
}

/// Raw alias mapping row as loaded from the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasMappingRow {
    pub alias_normalized: String,
    pub activity_id: i64,
    pub activity_name: Option<String>,
}

/// Raw activity row as loaded from the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRow {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
}

/// Parameters for the windowed candidate fetch.
#[derive(Debug, Clone)]
pub struct EventWindowQuery {
    pub activity_ids: Vec<i64>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub limit: usize,
}
