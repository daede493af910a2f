//! Key/value connection abstraction
//!
//! The key/value document store only needs a handful of Redis primitives.
//! `KvConnection` names exactly those, so the store can run over a live Redis
//! connection or over the in-process emulation used by the `memory` backend and
//! the test suite.

use async_trait::async_trait;

use crate::error::Result;

pub mod memory;
pub mod redis_conn;

pub use self::memory::InMemoryKv;
pub use self::redis_conn::RedisConnection;

/// One write inside an atomic batch (`MULTI` ... `EXEC`)
#[derive(Debug, Clone, PartialEq)]
pub enum KvOp {
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    HDel {
        key: String,
        field: String,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    ZIncrBy {
        key: String,
        member: String,
        delta: f64,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
    Expire {
        key: String,
        seconds: u64,
    },
    Del {
        key: String,
    },
}

/// Redis primitives used by the key/value document store.
///
/// Implementations own their connection; the store receives one at
/// construction and never looks a client up globally.
#[async_trait]
pub trait KvConnection: Send + Sync {
    /// Backend name reported by the document store
    fn name(&self) -> &'static str;

    /// Apply all ops atomically: either every op is applied or none.
    async fn exec(&self, ops: Vec<KvOp>) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// Every member with its score
    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>>;

    /// Members with `score <= max`
    async fn zrange_by_score(&self, key: &str, max: f64) -> Result<Vec<String>>;

    /// Remove one member; `true` if this call removed it
    async fn zrem(&self, key: &str, member: &str) -> Result<bool>;

    /// All live keys (SCAN, not KEYS)
    async fn scan_keys(&self) -> Result<Vec<String>>;

    /// Physically remove keys whose TTL has passed; returns how many.
    ///
    /// Redis evicts expired keys on its own, so the default does nothing.
    async fn purge_expired_keys(&self) -> Result<usize> {
        Ok(0)
    }
}
