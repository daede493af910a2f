//! SQLite Document Store
//!
//! File-based persistent storage using SQLite. Zero-config: the database file
//! and its parent directory are created on first use.
//!
//! Every operation opens its own connection on the blocking pool and drops it
//! on return. Writes run in one `IMMEDIATE` transaction each, so a document and
//! its tag rows are committed or rolled back together.
//!
//! The built-in `LIKE` folds ASCII letters only; search compares both sides
//! through `fold()`, a Unicode lowercase registered on every connection.
use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::like_pattern;
use crate::domain::{DocumentStore, ExpirationPolicy, NewDocument, SearchHit, TagCount};
use crate::error::{Result, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_key VARCHAR(255) NOT NULL UNIQUE,
    title VARCHAR(255) NOT NULL,
    value TEXT NOT NULL,
    expiration INTEGER
);
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_key VARCHAR(255) NOT NULL,
    tag VARCHAR(255) NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tags_entry_key ON tags(entry_key);
CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);
CREATE INDEX IF NOT EXISTS idx_entries_expiration ON entries(expiration);
";

/// Untitled documents are exempt
const UNIQUE_TITLE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_title ON entries(title) WHERE title <> ''";

/// SQLite-based DocumentStore implementation
#[derive(Clone)]
pub struct SqliteDocumentStore {
    path: Arc<PathBuf>,
    policy: ExpirationPolicy,
    unique_titles: bool,
    schema: Arc<OnceCell<()>>,
}

impl SqliteDocumentStore {
    /// Store backed by the database file at `path` (created lazily)
    pub fn new(path: impl Into<PathBuf>, policy: ExpirationPolicy) -> Self {
        Self {
            path: Arc::new(path.into()),
            policy,
            unique_titles: false,
            schema: Arc::new(OnceCell::new()),
        }
    }

    /// Enforce one live or expired-but-unreaped document per title
    pub fn with_unique_titles(mut self, unique_titles: bool) -> Self {
        self.unique_titles = unique_titles;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a fresh connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let mut conn = open(&path)?;
            f(&mut conn)
        })
        .await?
    }

    /// Create tables on first use; concurrent first callers wait for one
    /// initializer
    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                let path = Arc::clone(&self.path);
                let unique_titles = self.unique_titles;
                tokio::task::spawn_blocking(move || init_schema(&path, unique_titles)).await??;
                info!("SQLite schema ready at {}", self.path.display());
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    register_fold(&conn)?;
    Ok(conn)
}

/// `fold(text)`: Unicode lowercase, NULL stays NULL
fn register_fold(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

fn init_schema(path: &Path, unique_titles: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::backend(format!(
                "Failed to create database directory {}: {}",
                parent.display(),
                e
            ))
            .with_source(e)
        })?;
    }

    let mut conn = open(path)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(SCHEMA)?;
    if unique_titles {
        tx.execute(UNIQUE_TITLE_INDEX, [])?;
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, key: &str, skip_expire: bool) -> Result<Option<String>> {
        self.ensure_schema().await?;
        let key = key.to_string();
        let policy = self.policy.clone();

        self.with_connection(move |conn| {
            let now = policy.now();
            let row: Option<(i64, String, Option<i64>)> = conn
                .query_row(
                    "SELECT id, value, expiration FROM entries
                     WHERE entry_key = ?1 AND (expiration IS NULL OR expiration > ?2)",
                    params![key, now],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((id, value, expiration)) = row else {
                return Ok(None);
            };

            if let Some(next) = policy.refreshed(expiration, skip_expire) {
                let refreshed = conn.execute(
                    "UPDATE entries SET expiration = ?1
                     WHERE id = ?2 AND expiration IS NOT NULL AND expiration < ?1",
                    params![next, id],
                );
                if let Err(e) = refreshed {
                    warn!("Failed to refresh expiration of {}: {}", key, e);
                }
            }
            Ok(Some(value))
        })
        .await
    }

    async fn set(&self, doc: &NewDocument, skip_expire: bool) -> Result<()> {
        self.ensure_schema().await?;
        let doc = doc.clone();
        let now = self.policy.now();
        let deadline = self.policy.deadline(skip_expire);
        let unique_titles = self.unique_titles;

        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            // Expired occupants of the key (or title) give way to the new document
            let stale: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT entry_key FROM entries
                     WHERE expiration IS NOT NULL AND expiration <= ?1
                       AND (entry_key = ?2 OR (?3 AND title = ?4))",
                )?;
                let keys = stmt
                    .query_map(params![now, doc.key, unique_titles, doc.title], |row| {
                        row.get(0)
                    })?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                keys
            };
            for key in &stale {
                tx.execute("DELETE FROM tags WHERE entry_key = ?1", params![key])?;
                tx.execute("DELETE FROM entries WHERE entry_key = ?1", params![key])?;
            }
            if !stale.is_empty() {
                debug!("Retired {} expired occupant(s) before writing {}", stale.len(), doc.key);
            }

            tx.execute(
                "INSERT INTO entries (entry_key, title, value, expiration)
                 VALUES (?1, ?2, ?3, ?4)",
                params![doc.key, doc.title, doc.value, deadline],
            )?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO tags (entry_key, tag) VALUES (?1, ?2)")?;
                for tag in doc.tags.iter() {
                    stmt.execute(params![doc.key, tag])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_schema().await?;
        let key = key.to_string();
        let now = self.policy.now();

        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = tx.execute(
                "DELETE FROM entries
                 WHERE entry_key = ?1 AND (expiration IS NULL OR expiration > ?2)",
                params![key, now],
            )?;
            if removed > 0 {
                tx.execute("DELETE FROM tags WHERE entry_key = ?1", params![key])?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.ensure_schema().await?;
        let pattern = like_pattern(term);
        let now = self.policy.now();

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT e.entry_key, e.title FROM entries e
                 WHERE (e.expiration IS NULL OR e.expiration > ?2)
                   AND (fold(e.title) LIKE fold(?1) ESCAPE '\\'
                        OR EXISTS (SELECT 1 FROM tags t
                                   WHERE t.entry_key = e.entry_key
                                     AND fold(t.tag) LIKE fold(?1) ESCAPE '\\'))
                 ORDER BY e.entry_key",
            )?;
            let hits = stmt
                .query_map(params![pattern, now], |row| {
                    Ok(SearchHit {
                        key: row.get(0)?,
                        title: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
        .await
    }

    async fn tag_stats(&self) -> Result<Vec<TagCount>> {
        self.ensure_schema().await?;
        let now = self.policy.now();

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.tag, COUNT(*) AS cnt FROM tags t
                 JOIN entries e ON e.entry_key = t.entry_key
                 WHERE e.expiration IS NULL OR e.expiration > ?1
                 GROUP BY t.tag
                 ORDER BY cnt DESC, t.tag ASC",
            )?;
            let counts = stmt
                .query_map(params![now], |row| {
                    Ok(TagCount {
                        tag: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(counts)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.ensure_schema().await?;
        let now = self.policy.now();

        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM tags WHERE entry_key IN (
                     SELECT entry_key FROM entries
                     WHERE expiration IS NOT NULL AND expiration <= ?1)",
                params![now],
            )?;
            let purged = tx.execute(
                "DELETE FROM entries WHERE expiration IS NOT NULL AND expiration <= ?1",
                params![now],
            )?;
            tx.commit()?;
            Ok(purged)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
