//! SQLite-backed query repository via libsql.
//!
//! Read side of the catalog the ingestion process writes: activities, alias
//! mappings, centres, events. One database file; rows scoped by provider.
//! Timestamps are stored as RFC 3339 UTC text, so lexicographic range
//! comparisons match chronological order.

use crate::domain::{
    ActivityRow, AliasMappingRow, CandidateEvent, DomainError, EventWindowQuery,
};
use crate::ports::QueryRepository;
use crate::shared::config::MAX_CANDIDATE_LIMIT;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{params, params_from_iter, Database, Value};
use std::path::{Path, PathBuf};
use tracing::info;

const ACTIVITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS activity (
    id INTEGER PRIMARY KEY,
    provider TEXT NOT NULL,
    name TEXT NOT NULL,
    category TEXT
)"#;

const ACTIVITY_ALIAS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS activity_alias (
    alias_normalized TEXT NOT NULL,
    activity_id INTEGER NOT NULL REFERENCES activity (id),
    is_active INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (alias_normalized, activity_id)
)"#;

const CENTRE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS centre (
    id INTEGER PRIMARY KEY,
    name TEXT,
    city TEXT,
    state TEXT,
    country TEXT
)"#;

const EVENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event (
    id INTEGER PRIMARY KEY,
    provider TEXT NOT NULL,
    external_id TEXT,
    title TEXT NOT NULL,
    description TEXT,
    starts_at TEXT NOT NULL,
    ends_at TEXT,
    url TEXT,
    activity_id INTEGER NOT NULL REFERENCES activity (id),
    centre_id INTEGER NOT NULL REFERENCES centre (id)
)"#;

const EVENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_event_activity_starts ON event (activity_id, starts_at)";

/// SQLite repository. One database file; safe to share via Arc.
pub struct SqliteQueryRepository {
    db: Database,
    provider: String,
}

impl SqliteQueryRepository {
    /// Connect to (or create) the database and ensure the schema exists.
    /// WAL mode for concurrent readers alongside the ingestion writer.
    pub async fn connect(db_path: impl AsRef<Path>, provider: &str) -> Result<Self, DomainError> {
        let db_path: PathBuf = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DomainError::Repo(e.to_string()))?;
        }
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?;
        let conn = db.connect().map_err(|e| DomainError::Repo(e.to_string()))?;

        // PRAGMA returns a row (new value); consume rows since execute fails when rows are returned.
        let mut wal_rows = conn
            .query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DomainError::Repo(format!("WAL pragma failed: {}", e)))?;
        while wal_rows
            .next()
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?
            .is_some()
        {}

        for ddl in [
            ACTIVITY_TABLE,
            ACTIVITY_ALIAS_TABLE,
            CENTRE_TABLE,
            EVENT_TABLE,
            EVENT_INDEX,
        ] {
            conn.execute(ddl, ())
                .await
                .map_err(|e| DomainError::Repo(e.to_string()))?;
        }

        info!(path = %db_path.display(), provider, "SQLite query repository connected");

        Ok(Self {
            db,
            provider: provider.to_string(),
        })
    }

    fn connection(&self) -> Result<libsql::Connection, DomainError> {
        self.db.connect().map_err(|e| DomainError::Repo(e.to_string()))
    }

    fn normalized_names(names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    fn parse_ts(value: &str) -> Result<DateTime<Utc>, DomainError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DomainError::Repo(format!("bad timestamp '{}': {}", value, e)))
    }
}

#[async_trait::async_trait]
impl QueryRepository for SqliteQueryRepository {
    async fn list_active_alias_mappings(&self) -> Result<Vec<AliasMappingRow>, DomainError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                r#"
                SELECT aa.alias_normalized, aa.activity_id, a.name
                FROM activity_alias aa
                INNER JOIN activity a ON a.id = aa.activity_id
                WHERE aa.is_active = 1 AND a.provider = ?1
                "#,
                params![self.provider.as_str()],
            )
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?;

        let mut mappings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?
        {
            mappings.push(AliasMappingRow {
                alias_normalized: row.get(0).map_err(|e| DomainError::Repo(e.to_string()))?,
                activity_id: row.get(1).map_err(|e| DomainError::Repo(e.to_string()))?,
                activity_name: row.get(2).ok(),
            });
        }
        Ok(mappings)
    }

    async fn find_activity_ids_by_names_and_category(
        &self,
        names: &[String],
        category: &str,
    ) -> Result<Vec<ActivityRow>, DomainError> {
        let normalized = Self::normalized_names(names);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT id, name, category
            FROM activity
            WHERE provider = ?
              AND lower(trim(category)) = lower(trim(?))
              AND lower(trim(name)) IN ({})
            "#,
            Self::placeholders(normalized.len())
        );
        let mut args: Vec<Value> = vec![
            Value::from(self.provider.clone()),
            Value::from(category.to_string()),
        ];
        args.extend(normalized.into_iter().map(Value::from));

        self.query_activities(&sql, args).await
    }

    async fn find_activities_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<ActivityRow>, DomainError> {
        let normalized = Self::normalized_names(names);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT id, name, category
            FROM activity
            WHERE provider = ?
              AND lower(trim(name)) IN ({})
            "#,
            Self::placeholders(normalized.len())
        );
        let mut args: Vec<Value> = vec![Value::from(self.provider.clone())];
        args.extend(normalized.into_iter().map(Value::from));

        self.query_activities(&sql, args).await
    }

    async fn list_events_by_activity_ids_within_window(
        &self,
        query: &EventWindowQuery,
    ) -> Result<Vec<CandidateEvent>, DomainError> {
        if query.activity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let limit = query.limit.clamp(1, MAX_CANDIDATE_LIMIT);

        let sql = format!(
            r#"
            SELECT
                e.id, e.external_id, e.title, e.description, e.starts_at, e.ends_at, e.url,
                a.id, a.name, a.category,
                c.id, c.name, c.city, c.state, c.country
            FROM event e
            INNER JOIN activity a ON a.id = e.activity_id
            INNER JOIN centre c ON c.id = e.centre_id
            WHERE e.provider = ?
              AND e.activity_id IN ({})
              AND e.starts_at >= ?
              AND e.starts_at < ?
            ORDER BY e.starts_at ASC
            LIMIT ?
            "#,
            Self::placeholders(query.activity_ids.len())
        );
        let mut args: Vec<Value> = vec![Value::from(self.provider.clone())];
        args.extend(query.activity_ids.iter().map(|id| Value::from(*id)));
        args.push(Value::from(
            query
                .window_start
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        args.push(Value::from(
            query.window_end.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        args.push(Value::from(limit as i64));

        let conn = self.connection()?;
        let mut rows = conn
            .query(&sql, params_from_iter(args))
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?
        {
            let starts_at: String = row.get(4).map_err(|e| DomainError::Repo(e.to_string()))?;
            let ends_at: Option<String> = row.get(5).ok();
            events.push(CandidateEvent {
                event_id: row.get(0).map_err(|e| DomainError::Repo(e.to_string()))?,
                event_external_id: row.get(1).ok(),
                event_title: row.get(2).map_err(|e| DomainError::Repo(e.to_string()))?,
                event_description: row.get(3).ok(),
                starts_at: Self::parse_ts(&starts_at)?,
                ends_at: ends_at.as_deref().map(Self::parse_ts).transpose()?,
                event_url: row.get(6).ok(),
                activity_id: row.get(7).map_err(|e| DomainError::Repo(e.to_string()))?,
                activity_name: row.get(8).ok(),
                activity_category: row.get(9).ok(),
                centre_id: row.get(10).map_err(|e| DomainError::Repo(e.to_string()))?,
                centre_name: row.get(11).ok(),
                centre_city: row.get(12).ok(),
                centre_state: row.get(13).ok(),
                centre_country: row.get(14).ok(),
            });
        }
        Ok(events)
    }
}

impl SqliteQueryRepository {
    async fn query_activities(
        &self,
        sql: &str,
        args: Vec<Value>,
    ) -> Result<Vec<ActivityRow>, DomainError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(sql, params_from_iter(args))
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?;

        let mut activities = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Repo(e.to_string()))?
        {
            activities.push(ActivityRow {
                id: row.get(0).map_err(|e| DomainError::Repo(e.to_string()))?,
                name: row.get(1).ok(),
                category: row.get(2).ok(),
            });
        }
        Ok(activities)
    }
}
