//! Query understanding: raw text into a structured `Understanding`.
//!
//! Primary path is one schema-constrained chat call; any failure there
//! (timeout, transport, malformed output) degrades to a deterministic
//! heuristic extractor. Both paths are then reconciled against the
//! date-phrase parser, which outranks the model on concrete dates.
//! Only blank input is an error.

use crate::domain::{
    DomainError, DurationModifier, DurationUnit, ScopeCategory, TimeRangeType, Understanding,
};
use crate::ports::{ChatMessage, ChatOptions, ChatPort, ChatRequest};
use crate::shared::datephrase;
use crate::usecases::time_window::parse_days_phrase;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::warn;

const SYSTEM_PROMPT: &str = "Extract structured intent from user recreation queries into \
activity_terms, time_hint, time_range_type, start_date_iso, end_date_iso, duration_value, \
duration_unit, duration_modifier, location_hint, scope_category, confidence. Use \
time_range_type='absolute' when dates can be resolved, 'relative' when only relative duration \
is known, 'none' if no time signal. For relative hints, fill duration fields (e.g. 'half week' \
=> duration_value=1, duration_unit='week', duration_modifier='half'). Use \
scope_category='sports' for sports-related queries, otherwise 'unknown'. Return only valid \
JSON matching the provided schema.";

const STOPWORDS: &[&str] = &[
    "i", "me", "my", "want", "need", "find", "show", "looking", "for", "to", "play", "do", "in",
    "at", "near", "around", "on", "this", "next", "today", "tomorrow", "week", "month", "weekend",
    "days", "day", "a", "an", "the",
];

const SPORTS_KEYWORDS: &[&str] = &[
    "sport",
    "sports",
    "badminton",
    "pickleball",
    "basketball",
    "soccer",
    "football",
    "volleyball",
    "tennis",
    "hockey",
    "baseball",
    "cricket",
    "swim",
    "swimming",
    "yoga",
    "gym",
];

pub struct UnderstandingService {
    chat: Arc<dyn ChatPort>,
    model: String,
    timeout: StdDuration,
}

impl UnderstandingService {
    /// The effective call budget is `understanding_timeout_ms` clamped into
    /// `[1000, client_timeout_ms]`, so the service never waits past the
    /// adapter's own request timeout.
    pub fn new(
        chat: Arc<dyn ChatPort>,
        model: impl Into<String>,
        understanding_timeout_ms: u64,
        client_timeout_ms: u64,
    ) -> Result<Self, DomainError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(DomainError::Config("Missing understanding model".to_string()));
        }
        if understanding_timeout_ms == 0 {
            return Err(DomainError::Config(
                "Invalid understanding_timeout_ms".to_string(),
            ));
        }
        if client_timeout_ms == 0 {
            return Err(DomainError::Config("Invalid client timeout".to_string()));
        }
        let effective_ms = understanding_timeout_ms.max(1000).min(client_timeout_ms);
        Ok(Self {
            chat,
            model,
            timeout: StdDuration::from_millis(effective_ms),
        })
    }

    /// Errors only on blank input; model failures degrade to the heuristic.
    pub async fn understand_query(&self, user_query: &str) -> Result<Understanding, DomainError> {
        let query_text = user_query.trim();
        if query_text.is_empty() {
            return Err(DomainError::EmptyQuery);
        }

        let understanding = match self.call_model(query_text).await {
            Ok(understanding) => understanding,
            Err(reason) => {
                warn!(%reason, "understanding_fallback_used");
                build_heuristic_understanding(query_text)
            }
        };

        Ok(reconcile_with_date_phrases(
            query_text,
            understanding,
            Utc::now(),
        ))
    }

    async fn call_model(&self, query_text: &str) -> Result<Understanding, String> {
        let request = ChatRequest {
            model: self.model.clone(),
            format: Some(understanding_schema()),
            options: ChatOptions {
                temperature: 0.0,
                top_p: None,
                num_ctx: Some(1536),
                num_predict: Some(120),
            },
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(query_text),
            ],
        };

        let reply = tokio::time::timeout(self.timeout, self.chat.chat(&request))
            .await
            .map_err(|_| "understanding_timeout".to_string())?
            .map_err(|e| e.to_string())?;

        let raw: Value =
            serde_json::from_str(&reply).map_err(|e| format!("malformed model output: {}", e))?;
        Ok(normalize_understanding(&raw))
    }
}

/// JSON schema the model's output is constrained to.
fn understanding_schema() -> Value {
    json!({
        "type": "object",
        "required": [
            "activity_terms",
            "time_hint",
            "time_range_type",
            "start_date_iso",
            "end_date_iso",
            "duration_value",
            "duration_unit",
            "duration_modifier",
            "location_hint",
            "scope_category",
            "confidence"
        ],
        "properties": {
            "activity_terms": { "type": "array", "items": { "type": "string" } },
            "time_hint": { "type": ["string", "null"] },
            "time_range_type": { "type": "string", "enum": ["relative", "absolute", "none"] },
            "start_date_iso": { "type": ["string", "null"] },
            "end_date_iso": { "type": ["string", "null"] },
            "duration_value": { "type": ["number", "null"] },
            "duration_unit": { "type": ["string", "null"], "enum": ["day", "week", "month", null] },
            "duration_modifier": { "type": ["string", "null"], "enum": ["half", "next", "this", null] },
            "location_hint": { "type": ["string", "null"] },
            "scope_category": { "type": "string", "enum": ["sports", "unknown"] },
            "confidence": { "type": "number" }
        },
        "additionalProperties": false
    })
}

fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Clamps raw model JSON into the canonical shape. Unknown enum values fall
/// back to neutral variants rather than failing the whole call.
pub(crate) fn normalize_understanding(raw: &Value) -> Understanding {
    let mut activity_terms = Vec::new();
    if let Some(items) = raw.get("activity_terms").and_then(Value::as_array) {
        for item in items {
            let Some(term) = item.as_str() else { continue };
            let term = term.trim().to_lowercase();
            if !term.is_empty() && !activity_terms.contains(&term) {
                activity_terms.push(term);
            }
        }
    }

    let time_range_type = match raw.get("time_range_type").and_then(Value::as_str) {
        Some("relative") => TimeRangeType::Relative,
        Some("absolute") => TimeRangeType::Absolute,
        _ => TimeRangeType::None,
    };
    let duration_unit = match raw.get("duration_unit").and_then(Value::as_str) {
        Some("day") => Some(DurationUnit::Day),
        Some("week") => Some(DurationUnit::Week),
        Some("month") => Some(DurationUnit::Month),
        _ => None,
    };
    let duration_modifier = match raw.get("duration_modifier").and_then(Value::as_str) {
        Some("half") => Some(DurationModifier::Half),
        Some("next") => Some(DurationModifier::Next),
        Some("this") => Some(DurationModifier::This),
        _ => None,
    };
    let scope_category = match raw.get("scope_category").and_then(Value::as_str) {
        Some("sports") => ScopeCategory::Sports,
        _ => ScopeCategory::Unknown,
    };

    let duration_value = raw
        .get("duration_value")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite());
    let confidence = raw
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Understanding {
        activity_terms,
        time_hint: raw.get("time_hint").map(non_empty_string).unwrap_or(None),
        time_range_type,
        start_date_iso: raw
            .get("start_date_iso")
            .map(non_empty_string)
            .unwrap_or(None),
        end_date_iso: raw
            .get("end_date_iso")
            .map(non_empty_string)
            .unwrap_or(None),
        duration_value,
        duration_unit,
        duration_modifier,
        location_hint: raw
            .get("location_hint")
            .map(non_empty_string)
            .unwrap_or(None),
        scope_category,
        confidence,
    }
}

/// Deterministic extractor used when the model path fails: stopword-dropped
/// terms, substring time hints, keyword-based scope, low fixed confidence.
pub(crate) fn build_heuristic_understanding(query_text: &str) -> Understanding {
    let normalized = query_text.trim().to_lowercase();

    let mut activity_terms = Vec::new();
    for word in normalized.split_whitespace() {
        if activity_terms.len() == 3 {
            break;
        }
        let mut chars = word.chars();
        let plausible = chars.next().is_some_and(|c| c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if plausible && !STOPWORDS.contains(&word) && !activity_terms.contains(&word.to_string()) {
            activity_terms.push(word.to_string());
        }
    }

    let days = parse_days_phrase(&normalized);
    let (time_hint, duration_value, duration_unit) = if normalized.contains("today") {
        (Some("today".to_string()), Some(1.0), Some(DurationUnit::Day))
    } else if normalized.contains("tomorrow") {
        (
            Some("tomorrow".to_string()),
            Some(1.0),
            Some(DurationUnit::Day),
        )
    } else if normalized.contains("weekend") {
        (
            Some("this weekend".to_string()),
            Some(1.0),
            Some(DurationUnit::Week),
        )
    } else if normalized.contains("week") {
        (
            Some("this week".to_string()),
            Some(1.0),
            Some(DurationUnit::Week),
        )
    } else if normalized.contains("month") {
        (
            Some("this month".to_string()),
            Some(1.0),
            Some(DurationUnit::Month),
        )
    } else if let Some(n) = days {
        (
            Some(format!("{} days", n)),
            Some(n as f64),
            Some(DurationUnit::Day),
        )
    } else {
        (None, None, None)
    };

    let time_range_type = if time_hint.is_some() {
        TimeRangeType::Relative
    } else {
        TimeRangeType::None
    };
    let scope_category = if SPORTS_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        ScopeCategory::Sports
    } else {
        ScopeCategory::Unknown
    };

    Understanding {
        activity_terms,
        time_hint,
        time_range_type,
        start_date_iso: None,
        end_date_iso: None,
        duration_value,
        duration_unit,
        duration_modifier: None,
        location_hint: None,
        scope_category,
        confidence: 0.35,
    }
}

/// Reconciles temporal fields with the date-phrase parser. The parser wins
/// when the model gave no temporal signal, when the two disagree by two days
/// or more, or when the parser found a concrete single day the model blurred
/// into a multi-day relative span. Applied after both paths.
pub(crate) fn reconcile_with_date_phrases(
    query_text: &str,
    understanding: Understanding,
    now: DateTime<Utc>,
) -> Understanding {
    let Some(parsed) = datephrase::parse_forward(query_text, now) else {
        return understanding;
    };

    let parsed_start = parsed.start;
    let parsed_end = parsed.end.unwrap_or(parsed_start + Duration::days(1));
    let parsed_days = ceil_span_days(parsed_end - parsed_start);
    let model_days = estimate_model_duration_days(&understanding);

    let model_has_temporal_signal = understanding.time_range_type != TimeRangeType::None
        || understanding.time_hint.is_some()
        || understanding.start_date_iso.is_some()
        || understanding.end_date_iso.is_some();
    let is_inconsistent = model_days.is_some_and(|days| (days - parsed_days).abs() >= 2);
    let parser_single_day = parsed.end.is_none() || parsed_days == 1;
    let model_is_broad_relative = understanding.time_range_type == TimeRangeType::Relative
        && model_days.is_some_and(|days| days > 1);

    if model_has_temporal_signal
        && !is_inconsistent
        && !(parser_single_day && model_is_broad_relative)
    {
        return understanding;
    }

    let confidence = understanding.confidence.max(0.8);
    let time_hint = Some(parsed.text)
        .filter(|t| !t.is_empty())
        .or_else(|| understanding.time_hint.clone());
    Understanding {
        time_hint,
        time_range_type: TimeRangeType::Absolute,
        start_date_iso: Some(parsed_start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        end_date_iso: Some(parsed_end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        duration_value: None,
        duration_unit: None,
        duration_modifier: None,
        confidence,
        ..understanding
    }
}

/// Whole-day count of a span, partial days rounded up, minimum 1.
pub(crate) fn ceil_span_days(span: Duration) -> i64 {
    (span.num_seconds() + 86_399).div_euclid(86_400).max(1)
}

/// Relative duration fields as an approximate day count, for comparison with
/// the parser's span.
pub(crate) fn estimate_model_duration_days(understanding: &Understanding) -> Option<i64> {
    if understanding.time_range_type != TimeRangeType::Relative {
        return None;
    }
    let value = understanding.duration_value.filter(|v| v.is_finite() && *v > 0.0)?;
    let days_per_unit = understanding.duration_unit.map_or(1.0, DurationUnit::days);
    let factor = match understanding.duration_modifier {
        Some(DurationModifier::Half) => 0.5,
        _ => 1.0,
    };
    Some(((value * days_per_unit * factor).ceil() as i64).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockChatAdapter;

    const NOW: &str = "2026-08-29T15:30:00Z"; // a Saturday

    fn at(iso: &str) -> DateTime<Utc> {
        iso.parse().unwrap()
    }

    fn service(chat: MockChatAdapter) -> UnderstandingService {
        UnderstandingService::new(Arc::new(chat), "qwen2.5:3b", 20_000, 20_000).unwrap()
    }

    #[test]
    fn test_constructor_validates_inputs() {
        let chat: Arc<dyn ChatPort> = Arc::new(MockChatAdapter::unreachable());
        assert!(UnderstandingService::new(chat.clone(), "  ", 20_000, 20_000).is_err());
        assert!(UnderstandingService::new(chat.clone(), "m", 0, 20_000).is_err());
        assert!(UnderstandingService::new(chat, "m", 20_000, 0).is_err());
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let svc = service(MockChatAdapter::unreachable());
        let err = svc.understand_query("   ").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_model_path_normalizes_output() {
        let reply = serde_json::json!({
            "activity_terms": ["Badminton", "badminton", "  "],
            "time_hint": "next week",
            "time_range_type": "relative",
            "start_date_iso": null,
            "end_date_iso": null,
            "duration_value": 1,
            "duration_unit": "week",
            "duration_modifier": "next",
            "location_hint": null,
            "scope_category": "sports",
            "confidence": 3.5
        })
        .to_string();
        let svc = service(MockChatAdapter::with_replies(vec![Ok(reply)]));

        let u = svc.understand_query("badminton next week").await.unwrap();
        assert_eq!(u.activity_terms, vec!["badminton".to_string()]);
        assert_eq!(u.time_range_type, TimeRangeType::Relative);
        assert_eq!(u.duration_unit, Some(DurationUnit::Week));
        assert_eq!(u.confidence, 1.0);
        assert_eq!(u.scope_category, ScopeCategory::Sports);
    }

    #[tokio::test]
    async fn test_inference_error_falls_back_to_heuristic() {
        let svc = service(MockChatAdapter::with_replies(vec![Err(
            "connection refused".to_string(),
        )]));

        let u = svc
            .understand_query("I want to play badminton next week")
            .await
            .unwrap();
        assert_eq!(u.activity_terms, vec!["badminton".to_string()]);
        assert_eq!(u.time_hint.as_deref(), Some("this week"));
        assert_eq!(u.time_range_type, TimeRangeType::Relative);
        assert_eq!(u.confidence, 0.35);
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back() {
        let svc = service(MockChatAdapter::with_replies(vec![Ok(
            "not json at all".to_string()
        )]));
        let u = svc.understand_query("pickleball this month").await.unwrap();
        assert_eq!(u.confidence, 0.35);
        assert_eq!(u.time_hint.as_deref(), Some("this month"));
        assert_eq!(u.duration_unit, Some(DurationUnit::Month));
    }

    #[test]
    fn test_heuristic_extracts_terms_and_days_hint() {
        let u = build_heuristic_understanding("find swimming lanes in 5 days");
        assert_eq!(
            u.activity_terms,
            vec!["swimming".to_string(), "lanes".to_string()]
        );
        assert_eq!(u.time_hint.as_deref(), Some("5 days"));
        assert_eq!(u.duration_value, Some(5.0));
        assert_eq!(u.scope_category, ScopeCategory::Sports);
    }

    #[test]
    fn test_heuristic_no_time_signal() {
        let u = build_heuristic_understanding("pottery classes");
        assert_eq!(u.time_range_type, TimeRangeType::None);
        assert!(u.time_hint.is_none());
        assert_eq!(u.scope_category, ScopeCategory::Unknown);
    }

    #[test]
    fn test_reconcile_noop_without_concrete_date() {
        let u = build_heuristic_understanding("badminton next week");
        let reconciled = reconcile_with_date_phrases("badminton next week", u.clone(), at(NOW));
        assert_eq!(reconciled.time_range_type, TimeRangeType::Relative);
        assert_eq!(reconciled.duration_unit, u.duration_unit);
    }

    #[test]
    fn test_reconcile_overrides_broad_relative_on_single_day() {
        let mut u = build_heuristic_understanding("badminton on tuesday");
        u.time_range_type = TimeRangeType::Relative;
        u.duration_value = Some(1.0);
        u.duration_unit = Some(DurationUnit::Week);

        let reconciled = reconcile_with_date_phrases("badminton on tuesday", u, at(NOW));
        assert_eq!(reconciled.time_range_type, TimeRangeType::Absolute);
        // Next Tuesday after Saturday 2026-08-29.
        assert_eq!(
            reconciled.start_date_iso.as_deref(),
            Some("2026-09-01T00:00:00Z")
        );
        assert_eq!(
            reconciled.end_date_iso.as_deref(),
            Some("2026-09-02T00:00:00Z")
        );
        assert!(reconciled.duration_value.is_none());
        assert!(reconciled.confidence >= 0.8);
    }

    #[test]
    fn test_reconcile_keeps_consistent_single_day_model() {
        let mut u = build_heuristic_understanding("badminton tomorrow");
        assert_eq!(u.duration_value, Some(1.0));
        u.confidence = 0.6;

        let reconciled = reconcile_with_date_phrases("badminton tomorrow", u, at(NOW));
        assert_eq!(reconciled.time_range_type, TimeRangeType::Relative);
        assert_eq!(reconciled.confidence, 0.6);
    }

    #[test]
    fn test_reconcile_fills_missing_model_signal() {
        let u = Understanding {
            activity_terms: vec!["pickleball".to_string()],
            time_hint: None,
            time_range_type: TimeRangeType::None,
            start_date_iso: None,
            end_date_iso: None,
            duration_value: None,
            duration_unit: None,
            duration_modifier: None,
            location_hint: None,
            scope_category: ScopeCategory::Sports,
            confidence: 0.9,
        };
        let reconciled = reconcile_with_date_phrases("pickleball on september 4", u, at(NOW));
        assert_eq!(reconciled.time_range_type, TimeRangeType::Absolute);
        assert_eq!(
            reconciled.start_date_iso.as_deref(),
            Some("2026-09-04T00:00:00Z")
        );
        assert_eq!(reconciled.confidence, 0.9);
    }

    #[test]
    fn test_ceil_span_days_rounds_partial_days_up() {
        assert_eq!(ceil_span_days(Duration::hours(5)), 1);
        assert_eq!(ceil_span_days(Duration::hours(24)), 1);
        assert_eq!(ceil_span_days(Duration::hours(30)), 2);
        assert_eq!(ceil_span_days(Duration::days(3)), 3);
        assert_eq!(ceil_span_days(Duration::zero()), 1);
    }

    #[test]
    fn test_estimate_model_duration_days() {
        let mut u = build_heuristic_understanding("badminton next week");
        assert_eq!(estimate_model_duration_days(&u), Some(7));
        u.duration_modifier = Some(DurationModifier::Half);
        assert_eq!(estimate_model_duration_days(&u), Some(4));
        u.time_range_type = TimeRangeType::None;
        assert_eq!(estimate_model_duration_days(&u), None);
    }
}
