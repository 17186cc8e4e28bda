//! In-memory alias cache with an explicit refresh lifecycle.
//!
//! Loaded wholesale from the repository at startup and on demand. Staleness
//! between refreshes is accepted; what is not accepted is a reader observing
//! a half-built cache, so refresh builds a fresh index and swaps it in one
//! write-lock assignment.

use crate::domain::{ActivityRef, DomainError};
use crate::ports::QueryRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Result of one exact alias lookup.
#[derive(Debug, Clone)]
pub struct AliasResolution {
    pub normalized_alias: String,
    pub activity_ids: Vec<i64>,
    pub activities: Vec<ActivityRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasCacheStats {
    pub aliases_loaded: usize,
    pub mappings_loaded: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct AliasIndex {
    alias_to_ids: HashMap<String, BTreeSet<i64>>,
    name_by_id: HashMap<i64, Option<String>>,
    mapping_count: usize,
    loaded_at: Option<DateTime<Utc>>,
}

/// Alias lookups use a lighter normalization than title matching: lowercase
/// and whitespace collapse only, matching how ingestion writes
/// `alias_normalized` rows.
fn normalize_alias_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub struct AliasResolver {
    repo: Arc<dyn QueryRepository>,
    index: RwLock<AliasIndex>,
}

impl AliasResolver {
    /// Starts empty; call `refresh` before serving queries.
    pub fn new(repo: Arc<dyn QueryRepository>) -> Self {
        Self {
            repo,
            index: RwLock::new(AliasIndex::default()),
        }
    }

    /// Reloads all active mappings and atomically replaces the index.
    /// Readers see either the old cache or the new one, never a partial.
    pub async fn refresh(&self) -> Result<AliasCacheStats, DomainError> {
        let rows = self.repo.list_active_alias_mappings().await?;

        let mut fresh = AliasIndex {
            loaded_at: Some(Utc::now()),
            ..AliasIndex::default()
        };
        for row in rows {
            let normalized = normalize_alias_text(&row.alias_normalized);
            if normalized.is_empty() {
                continue;
            }
            fresh
                .alias_to_ids
                .entry(normalized)
                .or_default()
                .insert(row.activity_id);
            fresh.name_by_id.insert(row.activity_id, row.activity_name);
            fresh.mapping_count += 1;
        }

        let stats = AliasCacheStats {
            aliases_loaded: fresh.alias_to_ids.len(),
            mappings_loaded: fresh.mapping_count,
            loaded_at: fresh.loaded_at,
        };

        *self.index.write().await = fresh;

        info!(
            aliases = stats.aliases_loaded,
            mappings = stats.mappings_loaded,
            "alias cache refreshed"
        );
        Ok(stats)
    }

    /// Exact lookup on normalized alias text. Misses return empty sets.
    pub async fn resolve_activities_by_alias(&self, raw_alias: &str) -> AliasResolution {
        let normalized_alias = normalize_alias_text(raw_alias);
        if normalized_alias.is_empty() {
            return AliasResolution {
                normalized_alias,
                activity_ids: Vec::new(),
                activities: Vec::new(),
            };
        }

        let index = self.index.read().await;
        let activity_ids: Vec<i64> = index
            .alias_to_ids
            .get(&normalized_alias)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let activities = activity_ids
            .iter()
            .map(|id| ActivityRef {
                id: *id,
                name: index.name_by_id.get(id).cloned().flatten(),
                category: None,
            })
            .collect();

        AliasResolution {
            normalized_alias,
            activity_ids,
            activities,
        }
    }

    pub async fn stats(&self) -> AliasCacheStats {
        let index = self.index.read().await;
        AliasCacheStats {
            aliases_loaded: index.alias_to_ids.len(),
            mappings_loaded: index.mapping_count,
            loaded_at: index.loaded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityRow, AliasMappingRow, CandidateEvent, EventWindowQuery};

    struct StubRepo {
        mappings: Vec<AliasMappingRow>,
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
            _query: &EventWindowQuery,
        ) -> Result<Vec<CandidateEvent>, DomainError> {
            Ok(Vec::new())
        }
    }

    fn mapping(alias: &str, id: i64, name: &str) -> AliasMappingRow {
        AliasMappingRow {
            alias_normalized: alias.to_string(),
            activity_id: id,
            activity_name: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn test_refresh_then_resolve() {
        let resolver = AliasResolver::new(Arc::new(StubRepo {
            mappings: vec![
                mapping("badminton", 42, "Badminton"),
                mapping("  Badminton ", 43, "Badminton Drop-in"),
            ],
        }));

        let stats = resolver.refresh().await.unwrap();
        assert_eq!(stats.aliases_loaded, 1);
        assert_eq!(stats.mappings_loaded, 2);

        let resolution = resolver.resolve_activities_by_alias("BADMINTON").await;
        assert_eq!(resolution.normalized_alias, "badminton");
        assert_eq!(resolution.activity_ids, vec![42, 43]);
        assert_eq!(resolution.activities.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_between_refreshes() {
        let resolver = AliasResolver::new(Arc::new(StubRepo {
            mappings: vec![mapping("yoga", 7, "Yoga")],
        }));
        resolver.refresh().await.unwrap();

        let first = resolver.resolve_activities_by_alias("yoga").await;
        let second = resolver.resolve_activities_by_alias("yoga").await;
        assert_eq!(first.activity_ids, second.activity_ids);
    }

    #[tokio::test]
    async fn test_unloaded_cache_resolves_empty() {
        let resolver = AliasResolver::new(Arc::new(StubRepo { mappings: vec![] }));
        let resolution = resolver.resolve_activities_by_alias("badminton").await;
        assert!(resolution.activity_ids.is_empty());
        assert!(resolver.stats().await.loaded_at.is_none());
    }
}
