//! Infrastructure layer - Storage adapters
//!
//! - `kv_store`: Redis layout over a `KvConnection` (Redis or in-memory)
//! - `postgres_store`: networked SQL, pooled
//! - `sqlite_store`: embedded SQL, one file

pub mod kv;
pub mod kv_store;
pub mod postgres_store;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use kv::{InMemoryKv, KvConnection, KvOp, RedisConnection};
pub use kv_store::KeyValueDocumentStore;
pub use postgres_store::PostgresDocumentStore;

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteDocumentStore;

/// `LIKE` / `ILIKE` pattern matching `term` anywhere, with `\` as the escape
/// character so `%`, `_` and `\` in the term match literally
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
