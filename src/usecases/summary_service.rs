//! Summary generation for ranked results.
//!
//! One creative chat call, one conservative retry, then a deterministic
//! template. The caller always gets a `SummaryResult`; degradation shows up
//! as `model_generated: false` plus a failure reason, never as an error.

use crate::domain::{DomainError, RankedEvent, SummaryResult, SummarySignals, TimeWindow, Understanding};
use crate::ports::{ChatMessage, ChatOptions, ChatPort, ChatRequest};
use chrono::Timelike;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// How many ranked events are inlined into the model prompt.
const SUMMARY_EVENT_CONTEXT_LIMIT: usize = 20;

const PRIMARY_PROMPT: &str = "You summarize activity search results. Write one concise, \
natural paragraph (2-4 sentences) based only on provided data. Prioritize decision-useful \
patterns (timing concentration, centre distribution, activity mix, standout matches). Keep it \
factual. Vary phrasing and sentence structure across responses for similar inputs. If no \
events exist, clearly say so and suggest broadening date/activity. Return only plain text \
with no markdown.";

const RETRY_PROMPT: &str = "Write a concise user-facing summary in 2-3 sentences based only \
on provided activity results. Keep it factual and useful. No markdown.";

pub struct SummaryService {
    chat: Arc<dyn ChatPort>,
    model: String,
}

impl SummaryService {
    pub fn new(chat: Arc<dyn ChatPort>, model: impl Into<String>) -> Result<Self, DomainError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(DomainError::Config("Missing summary model".to_string()));
        }
        Ok(Self { chat, model })
    }

    /// Never errors. The signals are computed up front and returned with
    /// whichever text source ends up being used.
    pub async fn generate_events_summary(
        &self,
        query: &str,
        events: &[RankedEvent],
        understanding: &Understanding,
        window: &TimeWindow,
    ) -> SummaryResult {
        let signals = build_summary_signals(events);
        let events_for_summary = events
            .iter()
            .take(SUMMARY_EVENT_CONTEXT_LIMIT)
            .map(|ranked| {
                json!({
                    "title": ranked.event.event_title,
                    "starts_at": ranked.event.starts_at,
                    "centre_name": ranked.event.centre_name,
                    "activity_name": ranked.event.activity_name,
                    "match_score": ranked.match_score,
                })
            })
            .collect::<Vec<_>>();

        let primary = ChatRequest {
            model: self.model.clone(),
            format: None,
            options: ChatOptions {
                temperature: 0.75,
                top_p: Some(0.92),
                num_ctx: Some(2048),
                num_predict: Some(140),
            },
            messages: vec![
                ChatMessage::system(PRIMARY_PROMPT),
                ChatMessage::user(
                    json!({
                        "query": query,
                        "understanding": understanding,
                        "window": {
                            "start": window.window_start,
                            "end": window.window_end,
                            "strategy": window.strategy,
                        },
                        "signals": signals,
                        "summary_context": {
                            "total_ranked_events": events.len(),
                            "included_events_count": events_for_summary.len(),
                        },
                        "events_for_summary": events_for_summary,
                    })
                    .to_string(),
                ),
            ],
        };

        let failure_reason = match self.chat.chat(&primary).await {
            Ok(content) => {
                let text = content.trim().to_string();
                if !text.is_empty() {
                    return SummaryResult {
                        text,
                        signals,
                        model_generated: true,
                        used_retry: None,
                        failure_reason: None,
                    };
                }
                "empty_or_unparseable_summary".to_string()
            }
            Err(error) => {
                warn!(%error, "summary_generation_failed");
                error.to_string()
            }
        };

        if let Some(text) = self.retry(query, &signals, &events_for_summary).await {
            return SummaryResult {
                text,
                signals,
                model_generated: true,
                used_retry: Some(true),
                failure_reason: None,
            };
        }

        SummaryResult {
            text: build_deterministic_summary(query, &signals, events),
            signals,
            model_generated: false,
            used_retry: None,
            failure_reason: Some(failure_reason),
        }
    }

    /// Lower-context retry. Returns `None` on failure or empty output.
    async fn retry(
        &self,
        query: &str,
        signals: &SummarySignals,
        events_for_summary: &[serde_json::Value],
    ) -> Option<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            format: None,
            options: ChatOptions {
                temperature: 0.5,
                top_p: Some(0.9),
                num_ctx: Some(1024),
                num_predict: Some(90),
            },
            messages: vec![
                ChatMessage::system(RETRY_PROMPT),
                ChatMessage::user(
                    json!({
                        "query": query,
                        "signals": signals,
                        "events_for_summary": events_for_summary,
                    })
                    .to_string(),
                ),
            ],
        };

        match self.chat.chat(&request).await {
            Ok(content) => {
                let text = content.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Err(error) => {
                warn!(%error, "summary_retry_failed");
                None
            }
        }
    }
}

/// One-hour UTC slot label for a start time, e.g. "18:00-19:00".
fn hour_bucket_label(ranked: &RankedEvent) -> String {
    let hour = ranked.event.starts_at.hour();
    format!("{:02}:00-{:02}:00", hour, (hour + 1) % 24)
}

/// Top-N labels by frequency; ties break lexicographically so the output is
/// stable across runs.
fn top_labels(values: impl Iterator<Item = Option<String>>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values.flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().take(limit).map(|(label, _)| label).collect()
}

pub(crate) fn build_summary_signals(events: &[RankedEvent]) -> SummarySignals {
    let non_blank = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    SummarySignals {
        total_events: events.len(),
        top_time_slots: top_labels(events.iter().map(|e| Some(hour_bucket_label(e))), 3),
        top_centres: top_labels(events.iter().map(|e| non_blank(&e.event.centre_name)), 5),
        top_activities: top_labels(events.iter().map(|e| non_blank(&e.event.activity_name)), 5),
    }
}

/// Template fallback when no model text is available.
pub(crate) fn build_deterministic_summary(
    query: &str,
    signals: &SummarySignals,
    events: &[RankedEvent],
) -> String {
    if signals.total_events == 0 {
        return format!(
            "No matching events were found for \"{}\". Try a broader date range or different activity.",
            query
        );
    }

    let mut parts = vec![format!(
        "I found {} matching events for \"{}\".",
        signals.total_events, query
    )];

    if !signals.top_time_slots.is_empty() {
        let slots: Vec<&str> = signals
            .top_time_slots
            .iter()
            .take(2)
            .map(String::as_str)
            .collect();
        parts.push(format!("Most options cluster around {}.", slots.join(" and ")));
    }
    if !signals.top_centres.is_empty() {
        let centres: Vec<&str> = signals
            .top_centres
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        parts.push(format!("Frequent centres include {}.", centres.join(", ")));
    }
    if let Some(top) = events.first() {
        let centre = top
            .event
            .centre_name
            .as_deref()
            .map(|name| format!(" at {}", name))
            .unwrap_or_default();
        parts.push(format!("A strong match is \"{}\"{}.", top.event.event_title, centre));
    }

    parts.join(" ")
}
