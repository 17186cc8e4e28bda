//! Event ranking: fuzzy title matching with deterministic alias overrides.
//!
//! Alias strings discovered during resolution rank first with a relaxed
//! threshold; raw terms use the base threshold. Literal alias containment in
//! a title is a stronger signal than fuzzy similarity, so it force-includes
//! the event at a perfect score.

use crate::domain::{
    CandidateEvent, DomainError, MatchMeta, RankedEvent, RankingDiagnostics, ScoredEvent,
    TermResolution,
};
use crate::shared::text::normalize_text;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Scores a query term against a normalized event title.
/// Distance in [0,1], 0 = perfect; `None` when nothing is comparable.
/// Behind a trait so the underlying algorithm is swappable without touching
/// ranking policy.
pub trait TitleMatcher: Send + Sync {
    fn distance(&self, term: &str, normalized_title: &str) -> Option<f64>;
}

/// strsim-backed matcher: best normalized Levenshtein distance between the
/// term and any contiguous token window of the title (window sizes around
/// the term's own token count, plus the whole title).
pub struct WindowedLevenshtein;

impl TitleMatcher for WindowedLevenshtein {
    fn distance(&self, term: &str, normalized_title: &str) -> Option<f64> {
        if term.is_empty() || normalized_title.is_empty() {
            return None;
        }
        let mut best = 1.0 - strsim::normalized_levenshtein(term, normalized_title);

        let title_tokens: Vec<&str> = normalized_title.split(' ').collect();
        let term_len = term.split(' ').count();
        let min_size = term_len.saturating_sub(1).max(1);
        for size in min_size..=term_len + 1 {
            if size > title_tokens.len() {
                break;
            }
            for window in title_tokens.windows(size) {
                let candidate = window.join(" ");
                let distance = 1.0 - strsim::normalized_levenshtein(term, &candidate);
                if distance < best {
                    best = distance;
                }
            }
        }
        Some(best)
    }
}

struct BestMatch {
    event_index: usize,
    score: f64,
    matched_term: String,
    threshold_used: f64,
    term_is_alias: bool,
    included_by_exact_alias_override: bool,
    exact_alias_hit: bool,
}

pub struct EventRankingService {
    base_threshold: f64,
    matcher: Arc<dyn TitleMatcher>,
}

impl EventRankingService {
    pub fn new(ranking_threshold: f64) -> Result<Self, DomainError> {
        Self::with_matcher(ranking_threshold, Arc::new(WindowedLevenshtein))
    }

    pub fn with_matcher(
        ranking_threshold: f64,
        matcher: Arc<dyn TitleMatcher>,
    ) -> Result<Self, DomainError> {
        if !ranking_threshold.is_finite() || !(0.0..=1.0).contains(&ranking_threshold) {
            return Err(DomainError::Config("Invalid ranking_threshold".to_string()));
        }
        Ok(Self {
            base_threshold: ranking_threshold,
            matcher,
        })
    }

    /// Ranks fetched events against resolution terms. Pure and deterministic:
    /// the same inputs always produce the same order and scores.
    pub fn rank_events_by_activity_terms(
        &self,
        events: &[CandidateEvent],
        activity_terms: &[String],
        mapping_details: &[TermResolution],
    ) -> (Vec<RankedEvent>, RankingDiagnostics) {
        if events.is_empty() {
            return (
                Vec::new(),
                RankingDiagnostics {
                    normalized_terms: Vec::new(),
                    alias_terms: Vec::new(),
                    scored_fetched_events: Vec::new(),
                },
            );
        }

        let (normalized_terms, alias_terms) = build_ranking_terms(activity_terms, mapping_details);
        let alias_threshold = (self.base_threshold + 0.15).min(0.65);

        let titles: Vec<String> = events
            .iter()
            .map(|event| normalize_text(&event.event_title))
            .collect();

        if normalized_terms.is_empty() {
            return self.pass_through(events, &normalized_terms, &alias_terms);
        }

        let mut best_by_event: HashMap<i64, BestMatch> = HashMap::new();

        for term in &normalized_terms {
            let term_is_alias = alias_terms.contains(term);
            let term_threshold = if term_is_alias {
                alias_threshold
            } else {
                self.base_threshold
            };

            for (index, title) in titles.iter().enumerate() {
                let Some(score) = self.matcher.distance(term, title) else {
                    continue;
                };
                if !score.is_finite() || score > term_threshold {
                    continue;
                }
                let event_id = events[index].event_id;
                let better = best_by_event
                    .get(&event_id)
                    .is_none_or(|existing| score < existing.score);
                if better {
                    best_by_event.insert(
                        event_id,
                        BestMatch {
                            event_index: index,
                            score,
                            matched_term: term.clone(),
                            threshold_used: term_threshold,
                            term_is_alias,
                            included_by_exact_alias_override: false,
                            exact_alias_hit: false,
                        },
                    );
                }
            }
        }

        // Deterministic override: a title literally containing an alias term
        // is included at a perfect score even when distance scoring missed it.
        for (index, title) in titles.iter().enumerate() {
            let Some(matched_alias) = alias_terms
                .iter()
                .find(|term| has_exact_normalized_phrase(title, term))
            else {
                continue;
            };
            let event_id = events[index].event_id;
            match best_by_event.get_mut(&event_id) {
                Some(existing) => existing.exact_alias_hit = true,
                None => {
                    best_by_event.insert(
                        event_id,
                        BestMatch {
                            event_index: index,
                            score: 0.0,
                            matched_term: matched_alias.clone(),
                            threshold_used: alias_threshold,
                            term_is_alias: true,
                            included_by_exact_alias_override: true,
                            exact_alias_hit: true,
                        },
                    );
                }
            }
        }

        let scored_fetched_events = events
            .iter()
            .zip(&titles)
            .map(|(event, title)| {
                let best = best_by_event.get(&event.event_id);
                let exact_alias_hit = alias_terms
                    .iter()
                    .any(|term| has_exact_normalized_phrase(title, term));
                ScoredEvent {
                    event_id: event.event_id,
                    event_title: event.event_title.clone(),
                    best_score: best.map(|b| round4(b.score)),
                    match_score: best.map(|b| round4(1.0 - b.score)),
                    matched_term: best.map(|b| b.matched_term.clone()),
                    term_is_alias: best.is_some_and(|b| b.term_is_alias),
                    exact_alias_hit,
                    included_by_exact_alias_override: best
                        .is_some_and(|b| b.included_by_exact_alias_override),
                }
            })
            .collect();

        // Fetch position breaks full ties so the order is total and stable
        // across calls regardless of map iteration order.
        let mut matches: Vec<BestMatch> = best_by_event.into_values().collect();
        matches.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    events[a.event_index]
                        .starts_at
                        .cmp(&events[b.event_index].starts_at)
                })
                .then_with(|| a.event_index.cmp(&b.event_index))
        });

        let ranked_events = matches
            .into_iter()
            .map(|best| RankedEvent {
                event: events[best.event_index].clone(),
                match_score: Some(round4(1.0 - best.score)),
                match_meta: Some(MatchMeta {
                    matched_term: best.matched_term,
                    term_is_alias: best.term_is_alias,
                    threshold_used: best.threshold_used,
                    exact_alias_hit: best.exact_alias_hit,
                    included_by_exact_alias_override: best.included_by_exact_alias_override,
                }),
            })
            .collect();

        (
            ranked_events,
            RankingDiagnostics {
                normalized_terms,
                alias_terms,
                scored_fetched_events,
            },
        )
    }

    /// No terms to match: every event passes through unranked, ordered by
    /// start time ascending.
    fn pass_through(
        &self,
        events: &[CandidateEvent],
        normalized_terms: &[String],
        alias_terms: &[String],
    ) -> (Vec<RankedEvent>, RankingDiagnostics) {
        let mut ranked: Vec<RankedEvent> = events
            .iter()
            .map(|event| RankedEvent {
                event: event.clone(),
                match_score: None,
                match_meta: None,
            })
            .collect();
        ranked.sort_by_key(|r| r.event.starts_at);

        let scored_fetched_events = events
            .iter()
            .map(|event| ScoredEvent {
                event_id: event.event_id,
                event_title: event.event_title.clone(),
                best_score: None,
                match_score: None,
                matched_term: None,
                term_is_alias: false,
                exact_alias_hit: false,
                included_by_exact_alias_override: false,
            })
            .collect();

        (
            ranked,
            RankingDiagnostics {
                normalized_terms: normalized_terms.to_vec(),
                alias_terms: alias_terms.to_vec(),
                scored_fetched_events,
            },
        )
    }
}

/// Ordered, deduplicated ranking terms: matched aliases first, then raw
/// terms. Returns (ordered terms, alias terms).
fn build_ranking_terms(
    activity_terms: &[String],
    mapping_details: &[TermResolution],
) -> (Vec<String>, Vec<String>) {
    let alias_terms: Vec<String> = mapping_details
        .iter()
        .flat_map(|detail| detail.matched_aliases.iter())
        .map(|alias| normalize_text(alias))
        .filter(|alias| !alias.is_empty())
        .collect();

    let mut ordered = Vec::new();
    for term in alias_terms.iter().chain(activity_terms.iter()) {
        let normalized = normalize_text(term);
        if !normalized.is_empty() && !ordered.contains(&normalized) {
            ordered.push(normalized);
        }
    }

    let mut unique_aliases = Vec::new();
    for alias in alias_terms {
        if !unique_aliases.contains(&alias) {
            unique_aliases.push(alias);
        }
    }
    (ordered, unique_aliases)
}

/// Whole-word-bounded containment of `term` in `title`, both normalized.
fn has_exact_normalized_phrase(normalized_title: &str, normalized_term: &str) -> bool {
    if normalized_title.is_empty() || normalized_term.is_empty() {
        return false;
    }
    format!(" {} ", normalized_title).contains(&format!(" {} ", normalized_term))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
