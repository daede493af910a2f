//! Document Store Port (Trait Interface)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Key/value: Redis (shared multiplexed connection, native TTL)
//! - Relational: PostgreSQL (pooled, multi-node)
//! - Embedded: SQLite (single file, zero-config)
//! - Testing: in-memory key/value emulation

use async_trait::async_trait;

use super::models::{NewDocument, SearchHit, TagCount};
use crate::error::Result;

/// Document Store Port (Primary Interface)
///
/// All storage backends must implement this trait with the same contract.
///
/// "Not found" is never an error: lookups return `Ok(None)` / `Ok(false)` /
/// an empty vector. `Err` always means the backend itself failed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Documents
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Get a live document's value.
    ///
    /// Unless `skip_expire` is set (or no TTL is configured), a document that
    /// already carries a deadline gets it moved to now + TTL. A failed refresh
    /// is logged and does not fail the read.
    async fn get(&self, key: &str, skip_expire: bool) -> Result<Option<String>>;

    /// Create a document and its tag index entries atomically.
    ///
    /// A live document under the same key is a `ConstraintViolation`; an
    /// expired one is retired first.
    async fn set(&self, doc: &NewDocument, skip_expire: bool) -> Result<()>;

    /// Delete a live document and retire its tag counts.
    ///
    /// Returns `false` if the key did not exist or had expired.
    async fn delete(&self, key: &str) -> Result<bool>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Search & Statistics
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Case-insensitive substring search over titles and tags of live
    /// documents, ordered by key
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>>;

    /// Tag counts over live documents, count descending then tag ascending
    async fn tag_stats(&self) -> Result<Vec<TagCount>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Maintenance
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Physically remove expired documents and their tag contributions.
    ///
    /// Returns how many documents were reaped.
    async fn purge_expired(&self) -> Result<usize>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
