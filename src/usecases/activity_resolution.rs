//! Activity term resolution: free-text terms to canonical activity ids.
//!
//! Per term, alias candidates are tried against the in-memory cache first;
//! if none hit, the activity table is probed by exact normalized name. A term
//! with no matches from either source is recorded as unmapped, never an error.

use crate::domain::{
    ActivityRef, DefaultsResolution, DomainError, MatchSource, ResolutionOutcome, ScopeCategory,
    TermResolution,
};
use crate::ports::QueryRepository;
use crate::shared::config::CategoryDefault;
use crate::shared::text::build_alias_candidates;
use crate::usecases::alias_resolver::AliasResolver;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub struct ActivityResolutionService {
    alias_resolver: Arc<AliasResolver>,
    repo: Arc<dyn QueryRepository>,
    category_defaults: HashMap<ScopeCategory, CategoryDefault>,
}

impl ActivityResolutionService {
    pub fn new(
        alias_resolver: Arc<AliasResolver>,
        repo: Arc<dyn QueryRepository>,
        category_defaults: HashMap<ScopeCategory, CategoryDefault>,
    ) -> Self {
        Self {
            alias_resolver,
            repo,
            category_defaults,
        }
    }

    /// Resolves each term through alias candidates, then by exact activity
    /// name across all candidates when no alias hit. Repository failures
    /// propagate; unmapped terms do not.
    pub async fn resolve_activity_terms(
        &self,
        activity_terms: &[String],
    ) -> Result<ResolutionOutcome, DomainError> {
        let mut unique_activity_ids = BTreeSet::new();
        let mut mapping_details = Vec::new();
        let mut unmapped_terms = Vec::new();

        for term in activity_terms {
            let alias_candidates = build_alias_candidates(term);
            let mut matched_ids = BTreeSet::new();
            let mut matched_by_id: BTreeMap<i64, ActivityRef> = BTreeMap::new();
            let mut matched_aliases = Vec::new();
            let mut match_source = MatchSource::Alias;

            for candidate in &alias_candidates {
                let resolution = self
                    .alias_resolver
                    .resolve_activities_by_alias(candidate)
                    .await;
                if resolution.activity_ids.is_empty() {
                    continue;
                }
                if !matched_aliases.contains(&resolution.normalized_alias) {
                    matched_aliases.push(resolution.normalized_alias.clone());
                }
                matched_ids.extend(resolution.activity_ids.iter().copied());
                for activity in resolution.activities {
                    matched_by_id.insert(activity.id, activity);
                }
            }

            if matched_ids.is_empty() && !alias_candidates.is_empty() {
                let name_matches = self.repo.find_activities_by_names(&alias_candidates).await?;
                if !name_matches.is_empty() {
                    match_source = MatchSource::ActivityName;
                }
                for row in name_matches {
                    matched_ids.insert(row.id);
                    matched_by_id.insert(
                        row.id,
                        ActivityRef {
                            id: row.id,
                            name: row.name,
                            category: row.category,
                        },
                    );
                }
            }

            if matched_ids.is_empty() {
                unmapped_terms.push(term.clone());
            } else {
                unique_activity_ids.extend(matched_ids.iter().copied());
            }

            mapping_details.push(TermResolution {
                input_term: term.clone(),
                match_source: if matched_ids.is_empty() {
                    MatchSource::None
                } else {
                    match_source
                },
                alias_candidates,
                matched_aliases,
                activity_ids: matched_ids.into_iter().collect(),
                activities: matched_by_id.into_values().collect(),
            });
        }

        Ok(ResolutionOutcome {
            mapped_activity_ids: unique_activity_ids.into_iter().collect(),
            unmapped_terms,
            mapping_details,
        })
    }

    /// Resolves the configured default activity set for a scope category.
    /// Guarantees broad queries in a known scope still fetch something even
    /// when every term failed to map. Missing configuration applies nothing.
    pub async fn resolve_default_activity_ids(
        &self,
        scope_category: ScopeCategory,
    ) -> Result<DefaultsResolution, DomainError> {
        let Some(default_config) = self.category_defaults.get(&scope_category) else {
            return Ok(DefaultsResolution {
                applied: false,
                scope_category,
                category_name: None,
                configured_activity_names: Vec::new(),
                resolved_activity_ids: Vec::new(),
            });
        };

        let category_name = default_config.category_name.trim().to_string();
        let configured_activity_names: Vec<String> = default_config
            .activity_names
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        if category_name.is_empty() || configured_activity_names.is_empty() {
            return Ok(DefaultsResolution {
                applied: false,
                scope_category,
                category_name: (!category_name.is_empty()).then_some(category_name),
                configured_activity_names,
                resolved_activity_ids: Vec::new(),
            });
        }

        let rows = self
            .repo
            .find_activity_ids_by_names_and_category(&configured_activity_names, &category_name)
            .await?;

        Ok(DefaultsResolution {
            applied: true,
            scope_category,
            category_name: Some(category_name),
            configured_activity_names,
            resolved_activity_ids: rows.into_iter().map(|row| row.id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityRow, AliasMappingRow, CandidateEvent, EventWindowQuery};

    struct StubRepo {
        mappings: Vec<AliasMappingRow>,
        by_name: Vec<ActivityRow>,
        by_name_and_category: Vec<ActivityRow>,
    }

    #[async_trait::async_trait]
    impl QueryRepository for StubRepo {
        async fn list_active_alias_mappings(&self) -> Result<Vec<AliasMappingRow>, DomainError> {
            Ok(self.mappings.clone())
        }

        async fn find_activity_ids_by_names_and_category(
            &self,
            _names: &[String],
            _category: &str,
        ) -> Result<Vec<ActivityRow>, DomainError> {
            Ok(self.by_name_and_category.clone())
        }

        async fn find_activities_by_names(
            &self,
            _names: &[String],
        ) -> Result<Vec<ActivityRow>, DomainError> {
            Ok(self.by_name.clone())
        }

        async fn list_events_by_activity_ids_within_window(
            &self,
            _query: &EventWindowQuery,
        ) -> Result<Vec<CandidateEvent>, DomainError> {
            Ok(Vec::new())
        }
    }

    async fn service(repo: StubRepo) -> ActivityResolutionService {
        let repo = Arc::new(repo);
        let resolver = Arc::new(AliasResolver::new(repo.clone()));
        resolver.refresh().await.unwrap();

        let mut defaults = HashMap::new();
        defaults.insert(
            ScopeCategory::Sports,
            CategoryDefault {
                category_name: "Sports".to_string(),
                activity_names: vec!["Other".to_string()],
            },
        );
        ActivityResolutionService::new(resolver, repo, defaults)
    }

    fn mapping(alias: &str, id: i64) -> AliasMappingRow {
        AliasMappingRow {
            alias_normalized: alias.to_string(),
            activity_id: id,
            activity_name: Some(alias.to_string()),
        }
    }

    #[tokio::test]
    async fn test_alias_match_through_ngram_candidate() {
        let svc = service(StubRepo {
            mappings: vec![mapping("badminton", 42)],
            by_name: vec![],
            by_name_and_category: vec![],
        })
        .await;

        let outcome = svc
            .resolve_activity_terms(&["play badminton".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.mapped_activity_ids, vec![42]);
        assert!(outcome.unmapped_terms.is_empty());
        let detail = &outcome.mapping_details[0];
        assert_eq!(detail.match_source, MatchSource::Alias);
        assert_eq!(detail.matched_aliases, vec!["badminton".to_string()]);
    }

    #[tokio::test]
    async fn test_name_fallback_when_no_alias_hits() {
        let svc = service(StubRepo {
            mappings: vec![],
            by_name: vec![ActivityRow {
                id: 9,
                name: Some("Pickleball".to_string()),
                category: Some("Sports".to_string()),
            }],
            by_name_and_category: vec![],
        })
        .await;

        let outcome = svc
            .resolve_activity_terms(&["pickleball".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.mapped_activity_ids, vec![9]);
        assert_eq!(
            outcome.mapping_details[0].match_source,
            MatchSource::ActivityName
        );
    }

    #[tokio::test]
    async fn test_unmapped_term_recorded_not_error() {
        let svc = service(StubRepo {
            mappings: vec![],
            by_name: vec![],
            by_name_and_category: vec![],
        })
        .await;

        let outcome = svc
            .resolve_activity_terms(&["underwater basket weaving".to_string()])
            .await
            .unwrap();

        assert!(outcome.mapped_activity_ids.is_empty());
        assert_eq!(outcome.unmapped_terms.len(), 1);
        let detail = &outcome.mapping_details[0];
        assert_eq!(detail.match_source, MatchSource::None);
        assert!(detail.activity_ids.is_empty());
    }

    #[tokio::test]
    async fn test_category_defaults_applied_and_absent() {
        let svc = service(StubRepo {
            mappings: vec![],
            by_name: vec![],
            by_name_and_category: vec![ActivityRow {
                id: 1,
                name: Some("Other".to_string()),
                category: Some("Sports".to_string()),
            }],
        })
        .await;

        let applied = svc
            .resolve_default_activity_ids(ScopeCategory::Sports)
            .await
            .unwrap();
        assert!(applied.applied);
        assert_eq!(applied.resolved_activity_ids, vec![1]);

        let absent = svc
            .resolve_default_activity_ids(ScopeCategory::Unknown)
            .await
            .unwrap();
        assert!(!absent.applied);
        assert!(absent.resolved_activity_ids.is_empty());
    }
}
