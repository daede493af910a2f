// PostgreSQL Storage Adapter
//!
//! Networked SQL backend:
//! - Connection pooling: `PgPool`, connected lazily on first query
//! - Schema: created once per process, serialized across processes by an
//!   advisory lock
//! - Writes: one transaction per `set`; a live key collision surfaces as a
//!   `UNIQUE(entry_key)` violation
//!
//! Tags live in one comma joined `tags` column; `search` and `tag_stats`
//! unnest it so every tag is matched on its own.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::like_pattern;
use crate::domain::{DocumentStore, ExpirationPolicy, NewDocument, SearchHit, TagCount};
use crate::error::{Result, StoreError};

/// Advisory lock id guarding schema creation
const SCHEMA_LOCK_ID: i64 = 0x7061_7374_6573;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS entries (
        id BIGSERIAL PRIMARY KEY,
        entry_key VARCHAR(255) NOT NULL UNIQUE,
        title VARCHAR(255) NOT NULL,
        tags TEXT,
        value TEXT NOT NULL,
        expiration BIGINT
    )",
    "CREATE INDEX IF NOT EXISTS idx_entries_expiration ON entries(expiration)",
];

/// Untitled documents are exempt
const UNIQUE_TITLE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_title ON entries(title) WHERE title <> ''";

/// Pool settings for `PostgresDocumentStore::connect_lazy`
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL Document Store (Production/Server)
pub struct PostgresDocumentStore {
    /// Connection pool for concurrent requests
    pool: PgPool,
    policy: ExpirationPolicy,
    unique_titles: bool,
    schema: OnceCell<()>,
}

impl PostgresDocumentStore {
    /// Build a pool without connecting; the first query opens connections
    ///
    /// # Example
    /// ```no_run
    /// use paste_store::domain::ExpirationPolicy;
    /// use paste_store::infrastructure::postgres_store::{PoolSettings, PostgresDocumentStore};
    ///
    /// let store = PostgresDocumentStore::connect_lazy(
    ///     "postgres://localhost/pastes",
    ///     PoolSettings::default(),
    ///     ExpirationPolicy::after(3600),
    /// )
    /// .unwrap();
    /// ```
    pub fn connect_lazy(
        database_url: &str,
        settings: PoolSettings,
        policy: ExpirationPolicy,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect_lazy(database_url)
            .map_err(|e| {
                StoreError::config(format!("Invalid PostgreSQL connection string: {}", e))
            })?;
        Ok(Self::from_pool(pool, policy))
    }

    pub fn from_pool(pool: PgPool, policy: ExpirationPolicy) -> Self {
        Self {
            pool,
            policy,
            unique_titles: false,
            schema: OnceCell::new(),
        }
    }

    /// Enforce one unreaped document per title
    pub fn with_unique_titles(mut self, unique_titles: bool) -> Self {
        self.unique_titles = unique_titles;
        self
    }

    /// Get connection pool reference (for advanced usage)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(SCHEMA_LOCK_ID)
                    .execute(&mut *tx)
                    .await?;
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&mut *tx).await?;
                }
                if self.unique_titles {
                    sqlx::query(UNIQUE_TITLE_INDEX).execute(&mut *tx).await?;
                }
                tx.commit().await?;
                info!("PostgreSQL schema ready");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, key: &str, skip_expire: bool) -> Result<Option<String>> {
        self.ensure_schema().await?;
        let now = self.policy.now();

        let row: Option<(i64, String, Option<i64>)> = sqlx::query_as(
            "SELECT id, value, expiration FROM entries
             WHERE entry_key = $1 AND (expiration IS NULL OR expiration > $2)",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, value, expiration)) = row else {
            return Ok(None);
        };

        if let Some(next) = self.policy.refreshed(expiration, skip_expire) {
            let refreshed = sqlx::query(
                "UPDATE entries SET expiration = $1
                 WHERE id = $2 AND expiration IS NOT NULL AND expiration < $1",
            )
            .bind(next)
            .bind(id)
            .execute(&self.pool)
            .await;
            if let Err(e) = refreshed {
                warn!("Failed to refresh expiration of {}: {}", key, e);
            }
        }
        Ok(Some(value))
    }

    async fn set(&self, doc: &NewDocument, skip_expire: bool) -> Result<()> {
        self.ensure_schema().await?;
        let now = self.policy.now();
        let deadline = self.policy.deadline(skip_expire);
        let tags = (!doc.tags.is_empty()).then(|| doc.tags.joined());

        let mut tx = self.pool.begin().await?;

        let retired = sqlx::query(
            "DELETE FROM entries
             WHERE expiration IS NOT NULL AND expiration <= $1
               AND (entry_key = $2 OR ($3 AND title = $4))",
        )
        .bind(now)
        .bind(&doc.key)
        .bind(self.unique_titles)
        .bind(&doc.title)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if retired > 0 {
            debug!("Retired {} expired occupant(s) before writing {}", retired, doc.key);
        }

        sqlx::query(
            "INSERT INTO entries (entry_key, title, tags, value, expiration)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&doc.key)
        .bind(&doc.title)
        .bind(tags)
        .bind(&doc.value)
        .bind(deadline)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query(
            "DELETE FROM entries
             WHERE entry_key = $1 AND (expiration IS NULL OR expiration > $2)",
        )
        .bind(key)
        .bind(self.policy.now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.ensure_schema().await?;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT entry_key, title FROM entries
             WHERE (title ILIKE $1
                    OR EXISTS (SELECT 1 FROM unnest(string_to_array(tags, ',')) AS t(tag)
                               WHERE t.tag ILIKE $1))
               AND (expiration IS NULL OR expiration > $2)
             ORDER BY entry_key COLLATE \"C\"",
        )
        .bind(like_pattern(term))
        .bind(self.policy.now())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, title)| SearchHit { key, title })
            .collect())
    }

    async fn tag_stats(&self) -> Result<Vec<TagCount>> {
        self.ensure_schema().await?;
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT tag, COUNT(*) AS cnt
             FROM (
                 SELECT unnest(string_to_array(tags, ',')) AS tag
                 FROM entries
                 WHERE tags IS NOT NULL AND tags <> ''
                   AND (expiration IS NULL OR expiration > $1)
             ) live_tags
             GROUP BY tag
             ORDER BY cnt DESC, tag COLLATE \"C\" ASC",
        )
        .bind(self.policy.now())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect())
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.ensure_schema().await?;
        let result =
            sqlx::query("DELETE FROM entries WHERE expiration IS NOT NULL AND expiration <= $1")
                .bind(self.policy.now())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() as usize)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
