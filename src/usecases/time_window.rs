//! Time window resolution: temporal understanding into `[start, end)` bounds.
//!
//! An ordered cascade of rules; the first applicable rule wins and tags the
//! window with its strategy. Keeping the rules in one list keeps cascade
//! order auditable and testable per rule.

use crate::domain::{
    DomainError, DurationModifier, TimeRangeType, TimeWindow, Understanding, WindowStrategy,
};
use crate::shared::datephrase;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Upper bound on any resolved window span, to prevent unbounded fetches.
pub const MAX_WINDOW_DAYS: i64 = 60;

struct RuleCtx<'a> {
    hint: &'a str,
    understanding: &'a Understanding,
    now: DateTime<Utc>,
}

type Rule = fn(&RuleCtx) -> Option<TimeWindow>;

/// First applicable rule wins. Order is the contract.
const CASCADE: &[Rule] = &[
    structured_absolute,
    structured_relative,
    today_hint,
    week_hint,
    month_hint,
    days_hint,
    phrase_hint,
];

pub struct TimeWindowResolver {
    default_window_days: i64,
}

impl TimeWindowResolver {
    pub fn new(default_window_days: i64) -> Result<Self, DomainError> {
        if default_window_days <= 0 {
            return Err(DomainError::Config(
                "Invalid default_window_days".to_string(),
            ));
        }
        Ok(Self {
            default_window_days,
        })
    }

    pub fn resolve_window_from_time_hint(
        &self,
        time_hint: Option<&str>,
        understanding: &Understanding,
    ) -> TimeWindow {
        self.resolve_at(time_hint, understanding, Utc::now())
    }

    /// Same cascade with a pinned clock.
    pub fn resolve_at(
        &self,
        time_hint: Option<&str>,
        understanding: &Understanding,
        now: DateTime<Utc>,
    ) -> TimeWindow {
        let hint = time_hint.unwrap_or("").trim().to_lowercase();
        let ctx = RuleCtx {
            hint: &hint,
            understanding,
            now,
        };

        for rule in CASCADE {
            if let Some(window) = rule(&ctx) {
                return window;
            }
        }

        TimeWindow {
            strategy: WindowStrategy::DefaultWindow,
            window_start: now,
            window_end: now + Duration::days(self.default_window_days),
            hint_days: None,
            parsed_text: None,
        }
    }
}

/// RFC 3339 first, then a bare calendar date at UTC midnight. Models emit both.
fn parse_flexible_ts(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn structured_absolute(ctx: &RuleCtx) -> Option<TimeWindow> {
    if ctx.understanding.time_range_type != TimeRangeType::Absolute {
        return None;
    }
    let start = ctx
        .understanding
        .start_date_iso
        .as_deref()
        .and_then(parse_flexible_ts)
        .unwrap_or(ctx.now);
    let end = ctx
        .understanding
        .end_date_iso
        .as_deref()
        .and_then(parse_flexible_ts)?;
    if end <= start {
        return None;
    }
    Some(TimeWindow {
        strategy: WindowStrategy::StructuredAbsolute,
        window_start: start,
        window_end: end,
        hint_days: None,
        parsed_text: None,
    })
}

fn structured_relative(ctx: &RuleCtx) -> Option<TimeWindow> {
    if ctx.understanding.time_range_type != TimeRangeType::Relative {
        return None;
    }
    let unit = ctx.understanding.duration_unit?;
    let value = ctx.understanding.duration_value?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let modifier_factor = match ctx.understanding.duration_modifier {
        Some(DurationModifier::Half) => 0.5,
        _ => 1.0,
    };
    let days = ((value * unit.days() * modifier_factor).ceil() as i64).clamp(1, MAX_WINDOW_DAYS);

    Some(TimeWindow {
        strategy: WindowStrategy::StructuredRelative,
        window_start: ctx.now,
        window_end: ctx.now + Duration::days(days),
        hint_days: Some(days),
        parsed_text: None,
    })
}

fn today_hint(ctx: &RuleCtx) -> Option<TimeWindow> {
    ctx.hint.contains("today").then(|| TimeWindow {
        strategy: WindowStrategy::Today,
        window_start: ctx.now,
        window_end: ctx.now + Duration::days(1),
        hint_days: None,
        parsed_text: None,
    })
}

fn week_hint(ctx: &RuleCtx) -> Option<TimeWindow> {
    ctx.hint.contains("week").then(|| TimeWindow {
        strategy: WindowStrategy::WeekHint,
        window_start: ctx.now,
        window_end: ctx.now + Duration::days(7),
        hint_days: None,
        parsed_text: None,
    })
}

fn month_hint(ctx: &RuleCtx) -> Option<TimeWindow> {
    ctx.hint.contains("month").then(|| TimeWindow {
        strategy: WindowStrategy::MonthHint,
        window_start: ctx.now,
        window_end: ctx.now + Duration::days(30),
        hint_days: None,
        parsed_text: None,
    })
}

/// "(next) N days" anywhere in the hint.
fn days_hint(ctx: &RuleCtx) -> Option<TimeWindow> {
    let days = parse_days_phrase(ctx.hint)?.clamp(1, MAX_WINDOW_DAYS);
    Some(TimeWindow {
        strategy: WindowStrategy::DaysHint,
        window_start: ctx.now,
        window_end: ctx.now + Duration::days(days),
        hint_days: Some(days),
        parsed_text: None,
    })
}

/// Last resort before the default: a concrete date phrase in the hint,
/// forward-dated, ending one day after the parsed date. Only used when it
/// actually lands in the future.
fn phrase_hint(ctx: &RuleCtx) -> Option<TimeWindow> {
    if ctx.hint.is_empty() {
        return None;
    }
    let parsed = datephrase::parse_forward(ctx.hint, ctx.now)?;
    let end = parsed.end.unwrap_or(parsed.start) + Duration::days(1);
    if end <= ctx.now {
        return None;
    }
    Some(TimeWindow {
        strategy: WindowStrategy::PhraseHint,
        window_start: ctx.now,
        window_end: end,
        hint_days: None,
        parsed_text: Some(parsed.text),
    })
}

/// Extracts N from "N days" or the attached form "Ndays"; N limited to two
/// digits.
pub(crate) fn parse_days_phrase(text: &str) -> Option<i64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let in_range = |n: i64| (1..100).contains(&n);

    for (i, raw) in tokens.iter().enumerate() {
        let token = raw.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if let Some(n) = token
            .strip_suffix("days")
            .or_else(|| token.strip_suffix("day"))
            .and_then(|digits| digits.parse::<i64>().ok())
            .filter(|n| in_range(*n))
        {
            return Some(n);
        }

        let unit = tokens
            .get(i + 1)
            .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphabetic()));
        if matches!(unit, Some("day" | "days")) {
            if let Some(n) = token.parse::<i64>().ok().filter(|n| in_range(*n)) {
                return Some(n);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DurationUnit, ScopeCategory};

    fn at(iso: &str) -> DateTime<Utc> {
        iso.parse().unwrap()
    }

    const NOW: &str = "2026-08-29T12:00:00Z";

    fn understanding() -> Understanding {
        Understanding {
            activity_terms: vec![],
            time_hint: None,
            time_range_type: TimeRangeType::None,
            start_date_iso: None,
            end_date_iso: None,
            duration_value: None,
            duration_unit: None,
            duration_modifier: None,
            location_hint: None,
            scope_category: ScopeCategory::Unknown,
            confidence: 0.0,
        }
    }

    fn resolver() -> TimeWindowResolver {
        TimeWindowResolver::new(30).unwrap()
    }

    #[test]
    fn test_invalid_default_window_rejected() {
        assert!(TimeWindowResolver::new(0).is_err());
        assert!(TimeWindowResolver::new(-5).is_err());
    }

    #[test]
    fn test_structured_absolute_wins() {
        let mut u = understanding();
        u.time_range_type = TimeRangeType::Absolute;
        u.start_date_iso = Some("2026-09-01T00:00:00Z".to_string());
        u.end_date_iso = Some("2026-09-04T00:00:00Z".to_string());

        let window = resolver().resolve_at(Some("this week"), &u, at(NOW));
        assert_eq!(window.strategy, WindowStrategy::StructuredAbsolute);
        assert_eq!(window.window_start, at("2026-09-01T00:00:00Z"));
        assert_eq!(window.window_end, at("2026-09-04T00:00:00Z"));
    }

    #[test]
    fn test_structured_absolute_end_not_after_start_falls_through() {
        let mut u = understanding();
        u.time_range_type = TimeRangeType::Absolute;
        u.start_date_iso = Some("2026-09-04T00:00:00Z".to_string());
        u.end_date_iso = Some("2026-09-01T00:00:00Z".to_string());

        let window = resolver().resolve_at(None, &u, at(NOW));
        assert_eq!(window.strategy, WindowStrategy::DefaultWindow);
    }

    #[test]
    fn test_structured_relative_half_week() {
        let mut u = understanding();
        u.time_range_type = TimeRangeType::Relative;
        u.duration_value = Some(1.0);
        u.duration_unit = Some(DurationUnit::Week);
        u.duration_modifier = Some(DurationModifier::Half);

        let window = resolver().resolve_at(None, &u, at(NOW));
        assert_eq!(window.strategy, WindowStrategy::StructuredRelative);
        assert_eq!(window.hint_days, Some(4)); // ceil(3.5)
        assert_eq!(window.window_end - window.window_start, Duration::days(4));
    }

    #[test]
    fn test_relative_span_clamped_to_max() {
        let mut u = understanding();
        u.time_range_type = TimeRangeType::Relative;
        u.duration_value = Some(12.0);
        u.duration_unit = Some(DurationUnit::Month);

        let window = resolver().resolve_at(None, &u, at(NOW));
        assert_eq!(window.hint_days, Some(MAX_WINDOW_DAYS));
    }

    #[test]
    fn test_week_hint_seven_days() {
        let window = resolver().resolve_at(Some("next week"), &understanding(), at(NOW));
        assert_eq!(window.strategy, WindowStrategy::WeekHint);
        assert_eq!(window.window_end - window.window_start, Duration::days(7));
    }

    #[test]
    fn test_days_hint_clamped() {
        let window = resolver().resolve_at(Some("next 90 days"), &understanding(), at(NOW));
        assert_eq!(window.strategy, WindowStrategy::DaysHint);
        assert_eq!(window.hint_days, Some(60));
    }

    #[test]
    fn test_days_hint_attached_unit() {
        let window = resolver().resolve_at(Some("next 10days"), &understanding(), at(NOW));
        assert_eq!(window.strategy, WindowStrategy::DaysHint);
        assert_eq!(window.hint_days, Some(10));
    }

    #[test]
    fn test_parse_days_phrase_forms() {
        assert_eq!(parse_days_phrase("in 5 days"), Some(5));
        assert_eq!(parse_days_phrase("in 5days"), Some(5));
        assert_eq!(parse_days_phrase("next days"), None);
        assert_eq!(parse_days_phrase("0 days"), None);
        assert_eq!(parse_days_phrase("500 days"), None);
    }

    #[test]
    fn test_phrase_hint_parses_weekday() {
        let window = resolver().resolve_at(Some("on tuesday"), &understanding(), at(NOW));
        assert_eq!(window.strategy, WindowStrategy::PhraseHint);
        // Tuesday 2026-09-01 plus one day.
        assert_eq!(window.window_end, at("2026-09-02T00:00:00Z"));
        assert_eq!(window.parsed_text.as_deref(), Some("tuesday"));
    }

    #[test]
    fn test_default_window_when_nothing_matches() {
        let window = resolver().resolve_at(Some("whenever"), &understanding(), at(NOW));
        assert_eq!(window.strategy, WindowStrategy::DefaultWindow);
        assert_eq!(window.window_end - window.window_start, Duration::days(30));
    }
}
