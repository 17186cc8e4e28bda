//! Query execution orchestrator: one natural-language query in, one
//! composite `QueryResponse` out.
//!
//! Stage order is understanding, term resolution, category defaults, time
//! window, candidate fetch, ranking, summary. Only blank input and
//! repository failures surface as errors; model-side failures are absorbed
//! by the stage fallbacks. Per-stage timings and counters are logged once
//! per query as `execution_stats`.

use crate::domain::{
    CandidateReport, DomainError, EventWindowQuery, QueryResponse, ResolutionReport,
    ResponsePayload,
};
use crate::ports::{ChatPort, QueryRepository};
use crate::shared::config::CategoryDefault;
use crate::usecases::activity_resolution::ActivityResolutionService;
use crate::usecases::alias_resolver::AliasResolver;
use crate::usecases::event_ranking::EventRankingService;
use crate::usecases::summary_service::SummaryService;
use crate::usecases::time_window::TimeWindowResolver;
use crate::usecases::understanding_service::UnderstandingService;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Tuning knobs for one pipeline instance, resolved from `AppConfig` by the
/// composition root.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub understanding_model: String,
    pub summary_model: String,
    pub understanding_timeout_ms: u64,
    pub chat_timeout_ms: u64,
    pub default_window_days: i64,
    pub candidate_limit: usize,
    pub ranking_threshold: f64,
    pub category_defaults: HashMap<crate::domain::ScopeCategory, CategoryDefault>,
}

pub struct QueryExecutionService {
    understanding: UnderstandingService,
    activity_resolution: ActivityResolutionService,
    time_window: TimeWindowResolver,
    ranking: EventRankingService,
    summary: SummaryService,
    repo: Arc<dyn QueryRepository>,
    candidate_limit: usize,
    ranking_threshold: f64,
}

impl QueryExecutionService {
    /// Wires the stage services. Fails fast on invalid tuning values so a
    /// misconfigured process never serves queries.
    pub fn new(
        chat: Arc<dyn ChatPort>,
        repo: Arc<dyn QueryRepository>,
        alias_resolver: Arc<AliasResolver>,
        config: PipelineConfig,
    ) -> Result<Self, DomainError> {
        if config.candidate_limit == 0 {
            return Err(DomainError::Config("Invalid candidate_limit".to_string()));
        }

        let understanding = UnderstandingService::new(
            chat.clone(),
            config.understanding_model,
            config.understanding_timeout_ms,
            config.chat_timeout_ms,
        )?;
        let activity_resolution =
            ActivityResolutionService::new(alias_resolver, repo.clone(), config.category_defaults);
        let time_window = TimeWindowResolver::new(config.default_window_days)?;
        let ranking = EventRankingService::new(config.ranking_threshold)?;
        let summary = SummaryService::new(chat, config.summary_model)?;

        Ok(Self {
            understanding,
            activity_resolution,
            time_window,
            ranking,
            summary,
            repo,
            candidate_limit: config.candidate_limit,
            ranking_threshold: config.ranking_threshold,
        })
    }

    pub async fn execute_query(&self, query_text: &str) -> Result<QueryResponse, DomainError> {
        let started = Instant::now();
        let query = query_text.trim().to_string();
        if query.is_empty() {
            return Err(DomainError::EmptyQuery);
        }

        let stage = Instant::now();
        let understanding = self.understanding.understand_query(&query).await?;
        let understand_query_ms = stage.elapsed().as_millis() as u64;

        let activity_terms = understanding.activity_terms.clone();

        let stage = Instant::now();
        let outcome = self
            .activity_resolution
            .resolve_activity_terms(&activity_terms)
            .await?;
        let resolve_activity_terms_ms = stage.elapsed().as_millis() as u64;

        let stage = Instant::now();
        let defaults_resolution = self
            .activity_resolution
            .resolve_default_activity_ids(understanding.scope_category)
            .await?;
        let resolve_default_activity_ids_ms = stage.elapsed().as_millis() as u64;

        // Defaults are additive, never a replacement for mapped terms.
        let final_activity_ids: Vec<i64> = outcome
            .mapped_activity_ids
            .iter()
            .chain(defaults_resolution.resolved_activity_ids.iter())
            .copied()
            .collect::<BTreeSet<i64>>()
            .into_iter()
            .collect();

        let stage = Instant::now();
        let window = self
            .time_window
            .resolve_window_from_time_hint(understanding.time_hint.as_deref(), &understanding);
        let resolve_time_window_ms = stage.elapsed().as_millis() as u64;

        let stage = Instant::now();
        let fetched = self
            .repo
            .list_events_by_activity_ids_within_window(&EventWindowQuery {
                activity_ids: final_activity_ids.clone(),
                window_start: window.window_start,
                window_end: window.window_end,
                limit: self.candidate_limit,
            })
            .await?;
        let fetch_events_ms = stage.elapsed().as_millis() as u64;

        let stage = Instant::now();
        let (ranked_events, diagnostics) = self.ranking.rank_events_by_activity_terms(
            &fetched,
            &activity_terms,
            &outcome.mapping_details,
        );
        let rank_events_ms = stage.elapsed().as_millis() as u64;

        let mut buckets = [0usize; 4];
        for scored in &diagnostics.scored_fetched_events {
            let Some(score) = scored.match_score.filter(|s| s.is_finite()) else {
                continue;
            };
            let bucket = if score >= 0.9 {
                0
            } else if score >= 0.7 {
                1
            } else if score >= 0.5 {
                2
            } else {
                3
            };
            buckets[bucket] += 1;
        }

        let stage = Instant::now();
        let summary = self
            .summary
            .generate_events_summary(&query, &ranked_events, &understanding, &window)
            .await;
        let summary_generation_ms = stage.elapsed().as_millis() as u64;

        info!(
            understand_query_ms,
            resolve_activity_terms_ms,
            resolve_default_activity_ids_ms,
            resolve_time_window_ms,
            fetch_events_ms,
            rank_events_ms,
            summary_generation_ms,
            total_ms = started.elapsed().as_millis() as u64,
            activity_terms_count = activity_terms.len(),
            mapped_activity_ids_count = outcome.mapped_activity_ids.len(),
            unmapped_terms_count = outcome.unmapped_terms.len(),
            default_activity_ids_count = defaults_resolution.resolved_activity_ids.len(),
            final_activity_ids_count = final_activity_ids.len(),
            fetched_events_count = fetched.len(),
            ranked_events_count = ranked_events.len(),
            score_ge_09 = buckets[0],
            score_ge_07 = buckets[1],
            score_ge_05 = buckets[2],
            score_lt_05 = buckets[3],
            summary_model_generated = summary.model_generated,
            summary_failure_reason = summary.failure_reason.as_deref().unwrap_or(""),
            scope_category = understanding.scope_category.as_str(),
            ranking_threshold = self.ranking_threshold,
            candidate_limit = self.candidate_limit,
            time_window_strategy = ?window.strategy,
            "execution_stats"
        );

        Ok(QueryResponse {
            query,
            understanding,
            resolution: ResolutionReport {
                outcome,
                final_activity_ids,
                defaults_resolution,
            },
            candidates: CandidateReport {
                window,
                limit: self.candidate_limit,
                fetched_count: fetched.len(),
                count: ranked_events.len(),
                events: ranked_events.clone(),
            },
            response: ResponsePayload {
                summary,
                events: ranked_events,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockChatAdapter;
    use crate::domain::{
        ActivityRow, AliasMappingRow, CandidateEvent, ScopeCategory, WindowStrategy,
    };
    use chrono::{Duration, Utc};

    struct InMemoryRepo {
        mappings: Vec<AliasMappingRow>,
        events: Vec<CandidateEvent>,
    }

    #[async_trait::async_trait]
    impl QueryRepository for InMemoryRepo {
        async fn list_active_alias_mappings(&self) -> Result<Vec<AliasMappingRow>, DomainError> {
            Ok(self.mappings.clone())
        }

        async fn find_activity_ids_by_names_and_category(
            &self,
            _names: &[String],
            _category: &str,
        ) -> Result<Vec<ActivityRow>, DomainError> {
            Ok(Vec::new())
        }

        async fn find_activities_by_names(
            &self,
            _names: &[String],
        ) -> Result<Vec<ActivityRow>, DomainError> {
            Ok(Vec::new())
        }

        async fn list_events_by_activity_ids_within_window(
            &self,
            query: &EventWindowQuery,
        ) -> Result<Vec<CandidateEvent>, DomainError> {
            Ok(self
                .events
                .iter()
                .filter(|event| {
                    query.activity_ids.contains(&event.activity_id)
                        && event.starts_at >= query.window_start
                        && event.starts_at < query.window_end
                })
                .take(query.limit)
                .cloned()
                .collect())
        }
    }

    fn badminton_event(starts_at: chrono::DateTime<Utc>) -> CandidateEvent {
        CandidateEvent {
            event_id: 100,
            event_external_id: None,
            event_title: "Drop-in Badminton".to_string(),
            event_description: None,
            starts_at,
            ends_at: None,
            event_url: None,
            activity_id: 42,
            activity_name: Some("Badminton".to_string()),
            activity_category: Some("Sports".to_string()),
            centre_id: 7,
            centre_name: Some("Hillcrest".to_string()),
            centre_city: None,
            centre_state: None,
            centre_country: None,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            understanding_model: "qwen2.5:3b".to_string(),
            summary_model: "llama3.2:3b".to_string(),
            understanding_timeout_ms: 2_000,
            chat_timeout_ms: 2_000,
            default_window_days: 30,
            candidate_limit: 200,
            ranking_threshold: 0.5,
            category_defaults: HashMap::new(),
        }
    }

    async fn pipeline(repo: InMemoryRepo, chat: MockChatAdapter) -> QueryExecutionService {
        let repo = Arc::new(repo);
        let alias_resolver = Arc::new(AliasResolver::new(repo.clone()));
        alias_resolver.refresh().await.unwrap();
        QueryExecutionService::new(Arc::new(chat), repo, alias_resolver, config()).unwrap()
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let svc = pipeline(
            InMemoryRepo {
                mappings: vec![],
                events: vec![],
            },
            MockChatAdapter::unreachable(),
        )
        .await;

        let err = svc.execute_query("  ").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_badminton_next_week_end_to_end() {
        let repo = InMemoryRepo {
            mappings: vec![AliasMappingRow {
                alias_normalized: "badminton".to_string(),
                activity_id: 42,
                activity_name: Some("Badminton".to_string()),
            }],
            events: vec![
                badminton_event(Utc::now() + Duration::days(5)),
                // Outside any weekly window.
                badminton_event(Utc::now() + Duration::days(25)),
            ],
        };

        // Unreachable chat: heuristic understanding + deterministic summary.
        let svc = pipeline(repo, MockChatAdapter::unreachable()).await;
        let response = svc
            .execute_query("I want to play badminton next week")
            .await
            .unwrap();

        assert!(response.resolution.final_activity_ids.contains(&42));
        assert_eq!(response.candidates.count, 1);
        assert_eq!(response.candidates.fetched_count, 1);

        let window = &response.candidates.window;
        assert_eq!(window.strategy, WindowStrategy::WeekHint);
        assert_eq!(window.window_end - window.window_start, Duration::days(7));

        let top = &response.response.events[0];
        assert_eq!(top.event.event_id, 100);
        let meta = top.match_meta.as_ref().unwrap();
        assert!(meta.exact_alias_hit);

        assert!(!response.response.summary.model_generated);
        assert_eq!(response.understanding.scope_category, ScopeCategory::Sports);
    }

    #[tokio::test]
    async fn test_no_matches_yields_not_found_summary() {
        let svc = pipeline(
            InMemoryRepo {
                mappings: vec![],
                events: vec![],
            },
            MockChatAdapter::unreachable(),
        )
        .await;

        let response = svc.execute_query("quantum knitting today").await.unwrap();
        assert!(response.resolution.final_activity_ids.is_empty());
        assert_eq!(response.candidates.count, 0);
        assert!(response
            .response
            .summary
            .text
            .starts_with("No matching events were found"));
    }
}
