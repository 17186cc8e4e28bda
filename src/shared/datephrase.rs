//! Deterministic, forward-dated parsing of concrete date phrases.
//!
//! Recognizes expressions that name an actual calendar point or range:
//! today/tomorrow, weekends, weekday names, "in N days", explicit dates, and
//! "from X to Y" ranges. Vague relative spans ("next week", "this month") are
//! deliberately out of scope: those are the structured-understanding and
//! hint-substring rules' job, while this parser is the authority on concrete
//! dates the model tends to resolve badly.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// A date expression found in free text. `end` is absent for single-day hits.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpan {
    /// The matched phrase, normalized to lowercase tokens.
    pub text: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl ParsedSpan {
    /// Implied span length in whole days, minimum 1.
    pub fn span_days(&self) -> i64 {
        match self.end {
            Some(end) => ((end - self.start).num_days()).max(1),
            None => 1,
        }
    }
}

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Finds the first concrete date expression in `text`, forward-dated from
/// `now`. Returns `None` when the text names no concrete date.
pub fn parse_forward(text: &str, now: DateTime<Utc>) -> Option<ParsedSpan> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();

    for i in 0..tokens.len() {
        if let Some(span) = parse_range_at(&tokens, i, now) {
            return Some(span);
        }
        if let Some((start, end, consumed)) = parse_date_at(&tokens, i, now) {
            return Some(ParsedSpan {
                text: tokens[i..i + consumed].join(" "),
                start,
                end,
            });
        }
    }
    None
}

/// "from X to Y" / "between X and Y" ranges built from two single-date parses.
fn parse_range_at(tokens: &[String], i: usize, now: DateTime<Utc>) -> Option<ParsedSpan> {
    let connector_ok = |lead: &str, mid: &str| match lead {
        "from" => matches!(mid, "to" | "until" | "till" | "through"),
        "between" => mid == "and",
        _ => false,
    };
    let lead = tokens.get(i)?.as_str();
    if lead != "from" && lead != "between" {
        return None;
    }

    let (start, _, consumed_a) = parse_date_at(tokens, i + 1, now)?;
    let mid = tokens.get(i + 1 + consumed_a)?.as_str();
    if !connector_ok(lead, mid) {
        return None;
    }
    let (range_end, _, consumed_b) = parse_date_at(tokens, i + 2 + consumed_a, now)?;
    if range_end <= start {
        return None;
    }

    let total = 2 + consumed_a + consumed_b;
    Some(ParsedSpan {
        text: tokens[i..i + total].join(" "),
        start,
        end: Some(range_end),
    })
}

/// Tries to read a single date expression at `i`.
/// Returns (start, optional end, tokens consumed).
fn parse_date_at(
    tokens: &[String],
    i: usize,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>, usize)> {
    let token = tokens.get(i)?.as_str();

    match token {
        "today" | "tonight" => return Some((midnight(now), None, 1)),
        "tomorrow" => return Some((midnight(now) + Duration::days(1), None, 1)),
        "weekend" => {
            let start = upcoming_weekday(now, Weekday::Sat, false);
            return Some((start, Some(start + Duration::days(2)), 1));
        }
        "this" | "next" | "on" => {
            let next = tokens.get(i + 1)?.as_str();
            if next == "weekend" {
                let start = upcoming_weekday(now, Weekday::Sat, false);
                return Some((start, Some(start + Duration::days(2)), 2));
            }
            if let Some(wd) = weekday_from(next) {
                let skip_today = token == "next";
                return Some((upcoming_weekday(now, wd, skip_today), None, 2));
            }
            return None;
        }
        "in" => {
            let n: i64 = tokens.get(i + 1)?.parse().ok()?;
            let unit = tokens.get(i + 2)?.as_str();
            if n > 0 && matches!(unit, "day" | "days") {
                return Some((midnight(now) + Duration::days(n), None, 3));
            }
            return None;
        }
        _ => {}
    }

    if let Some(wd) = weekday_from(token) {
        return Some((upcoming_weekday(now, wd, false), None, 1));
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some((to_utc_midnight(date), None, 1));
    }

    // "june 5" / "june 5 2026"
    if let Some(month) = month_from(token) {
        if let Some(day) = day_number(tokens.get(i + 1)?) {
            let (date, consumed) = with_optional_year(tokens, i + 2, month, day, now)?;
            return Some((to_utc_midnight(date), None, 2 + consumed));
        }
        return None;
    }

    // "5 june" / "5 june 2026"
    if let Some(day) = day_number(token) {
        if let Some(month) = tokens.get(i + 1).and_then(|t| month_from(t)) {
            let (date, consumed) = with_optional_year(tokens, i + 2, month, day, now)?;
            return Some((to_utc_midnight(date), None, 2 + consumed));
        }
    }

    None
}

fn weekday_from(token: &str) -> Option<Weekday> {
    WEEKDAYS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, wd)| *wd)
}

fn month_from(token: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == token || (token.len() == 3 && name.starts_with(token)))
        .map(|(_, m)| *m)
}

/// Day-of-month with optional ordinal suffix ("5", "5th", "21st").
fn day_number(token: &str) -> Option<u32> {
    let digits = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

/// Month-day with an optional trailing 4-digit year; forward-dated to next
/// year when the date without a year has already passed.
fn with_optional_year(
    tokens: &[String],
    i: usize,
    month: u32,
    day: u32,
    now: DateTime<Utc>,
) -> Option<(NaiveDate, usize)> {
    if let Some(year) = tokens
        .get(i)
        .and_then(|t| (t.len() == 4).then(|| t.parse::<i32>().ok()).flatten())
    {
        return NaiveDate::from_ymd_opt(year, month, day).map(|d| (d, 1));
    }

    let today = now.date_naive();
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    let date = if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)?
    } else {
        this_year
    };
    Some((date, 0))
}

fn midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    to_utc_midnight(now.date_naive())
}

fn to_utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Next occurrence of `wd` at midnight. Same-day counts unless `skip_today`.
fn upcoming_weekday(now: DateTime<Utc>, wd: Weekday, skip_today: bool) -> DateTime<Utc> {
    let today = now.weekday().num_days_from_monday() as i64;
    let target = wd.num_days_from_monday() as i64;
    let mut ahead = (target - today).rem_euclid(7);
    if ahead == 0 && skip_today {
        ahead = 7;
    }
    midnight(now) + Duration::days(ahead)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(iso: &str) -> DateTime<Utc> {
        iso.parse().unwrap()
    }

    // 2026-08-29 is a Saturday.
    const NOW: &str = "2026-08-29T15:30:00Z";

    #[test]
    fn test_tomorrow() {
        let span = parse_forward("badminton tomorrow evening", at(NOW)).unwrap();
        assert_eq!(span.text, "tomorrow");
        assert_eq!(span.start, at("2026-08-30T00:00:00Z"));
        assert_eq!(span.end, None);
        assert_eq!(span.span_days(), 1);
    }

    #[test]
    fn test_weekday_forward_dated() {
        let span = parse_forward("yoga on tuesday", at(NOW)).unwrap();
        assert_eq!(span.start, at("2026-09-01T00:00:00Z"));
    }

    #[test]
    fn test_next_weekday_skips_today() {
        let span = parse_forward("next saturday", at(NOW)).unwrap();
        assert_eq!(span.start, at("2026-09-05T00:00:00Z"));
    }

    #[test]
    fn test_weekend_two_day_span() {
        let span = parse_forward("pickup soccer this weekend", at(NOW)).unwrap();
        assert_eq!(span.start, at("2026-08-29T00:00:00Z"));
        assert_eq!(span.span_days(), 2);
    }

    #[test]
    fn test_in_n_days() {
        let span = parse_forward("swimming in 3 days", at(NOW)).unwrap();
        assert_eq!(span.start, at("2026-09-01T00:00:00Z"));
    }

    #[test]
    fn test_explicit_iso_date() {
        let span = parse_forward("tennis 2026-12-24", at(NOW)).unwrap();
        assert_eq!(span.start, at("2026-12-24T00:00:00Z"));
    }

    #[test]
    fn test_month_day_rolls_to_next_year() {
        let span = parse_forward("hockey march 5", at(NOW)).unwrap();
        assert_eq!(span.start, at("2027-03-05T00:00:00Z"));
    }

    #[test]
    fn test_range_from_to() {
        let span = parse_forward("camps from monday to thursday", at(NOW)).unwrap();
        assert_eq!(span.start, at("2026-08-31T00:00:00Z"));
        assert_eq!(span.end, Some(at("2026-09-03T00:00:00Z")));
        assert_eq!(span.span_days(), 3);
    }

    #[test]
    fn test_vague_relative_spans_ignored() {
        assert!(parse_forward("badminton next week", at(NOW)).is_none());
        assert!(parse_forward("gym this month", at(NOW)).is_none());
        assert!(parse_forward("volleyball courts", at(NOW)).is_none());
    }

    #[test]
    fn test_bare_may_not_a_date() {
        assert!(parse_forward("classes i may join", at(NOW)).is_none());
    }
}
