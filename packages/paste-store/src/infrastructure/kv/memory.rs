//! In-Memory Key/Value Connection
//!
//! HashMap-based emulation of the Redis primitives in `KvConnection`:
//! hashes, sets, sorted sets and per-key TTLs. Expired keys are invisible to
//! every read. They are dropped on the next write that touches them (Redis
//! passive expiry) or by `purge_expired_keys` (active expiry).
//!
//! One lock guards the whole keyspace, so `exec` batches are atomic.
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{KvConnection, KvOp};
use crate::error::{Result, StoreError};
use crate::shared::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
enum KvValue {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(HashMap<String, f64>),
}

impl KvValue {
    fn type_name(&self) -> &'static str {
        match self {
            KvValue::Hash(_) => "hash",
            KvValue::Set(_) => "set",
            KvValue::ZSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            KvValue::Hash(h) => h.is_empty(),
            KvValue::Set(s) => s.is_empty(),
            KvValue::ZSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: KvValue,
    /// Unix seconds; `None` = persistent
    expires_at: Option<i64>,
}

impl KvEntry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

type Keyspace = HashMap<String, KvEntry>;

#[derive(Clone)]
pub struct InMemoryKv {
    data: Arc<RwLock<Keyspace>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.data.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries held, expired ones included
    pub fn stored_len(&self) -> usize {
        self.data.read().len()
    }

    /// Remaining lifetime of a key in seconds (`TTL` semantics: `None` for
    /// missing or persistent keys)
    pub fn ttl(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        let data = self.data.read();
        let entry = data.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|deadline| deadline - now)
    }

    fn live<'a>(data: &'a Keyspace, key: &str, now: i64) -> Option<&'a KvEntry> {
        data.get(key).filter(|e| e.is_live(now))
    }

    fn check_type(data: &Keyspace, key: &str, expected: &str, now: i64) -> Result<()> {
        match Self::live(data, key, now) {
            Some(entry) if entry.value.type_name() != expected => Err(StoreError::backend(
                format!(
                    "WRONGTYPE key '{}' holds a {}, expected {}",
                    key,
                    entry.value.type_name(),
                    expected
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Live entry for writing, created with `init` when missing or expired
    fn entry_mut<'a>(
        data: &'a mut Keyspace,
        key: &str,
        now: i64,
        init: fn() -> KvValue,
    ) -> &'a mut KvEntry {
        if data.get(key).is_some_and(|e| !e.is_live(now)) {
            data.remove(key);
        }
        data.entry(key.to_string()).or_insert_with(|| KvEntry {
            value: init(),
            expires_at: None,
        })
    }

    fn validate(data: &Keyspace, op: &KvOp, now: i64) -> Result<()> {
        match op {
            KvOp::HSet { key, .. } | KvOp::HDel { key, .. } => {
                Self::check_type(data, key, "hash", now)
            }
            KvOp::SAdd { key, .. } => Self::check_type(data, key, "set", now),
            KvOp::ZIncrBy { key, .. } | KvOp::ZAdd { key, .. } | KvOp::ZRem { key, .. } => {
                Self::check_type(data, key, "zset", now)
            }
            KvOp::Expire { .. } | KvOp::Del { .. } => Ok(()),
        }
    }

    fn apply(data: &mut Keyspace, op: KvOp, now: i64) {
        match op {
            KvOp::HSet { key, fields } => {
                let entry = Self::entry_mut(data, &key, now, || KvValue::Hash(HashMap::new()));
                if let KvValue::Hash(hash) = &mut entry.value {
                    hash.extend(fields);
                }
            }
            KvOp::HDel { key, field } => {
                if let Some(entry) = data.get_mut(&key).filter(|e| e.is_live(now)) {
                    if let KvValue::Hash(hash) = &mut entry.value {
                        hash.remove(&field);
                    }
                }
                Self::drop_if_empty(data, &key);
            }
            KvOp::SAdd { key, members } => {
                let entry = Self::entry_mut(data, &key, now, || KvValue::Set(BTreeSet::new()));
                if let KvValue::Set(set) = &mut entry.value {
                    set.extend(members);
                }
            }
            KvOp::ZIncrBy { key, member, delta } => {
                let entry = Self::entry_mut(data, &key, now, || KvValue::ZSet(HashMap::new()));
                if let KvValue::ZSet(zset) = &mut entry.value {
                    *zset.entry(member).or_insert(0.0) += delta;
                }
            }
            KvOp::ZAdd { key, member, score } => {
                let entry = Self::entry_mut(data, &key, now, || KvValue::ZSet(HashMap::new()));
                if let KvValue::ZSet(zset) = &mut entry.value {
                    zset.insert(member, score);
                }
            }
            KvOp::ZRem { key, member } => {
                Self::zrem_locked(data, &key, &member, now);
            }
            KvOp::Expire { key, seconds } => {
                if let Some(entry) = data.get_mut(&key).filter(|e| e.is_live(now)) {
                    entry.expires_at = Some(now.saturating_add(seconds as i64));
                }
            }
            KvOp::Del { key } => {
                data.remove(&key);
            }
        }
    }

    fn zrem_locked(data: &mut Keyspace, key: &str, member: &str, now: i64) -> bool {
        let removed = match data.get_mut(key).filter(|e| e.is_live(now)) {
            Some(KvEntry {
                value: KvValue::ZSet(zset),
                ..
            }) => zset.remove(member).is_some(),
            _ => false,
        };
        Self::drop_if_empty(data, key);
        removed
    }

    // Redis deletes aggregates once their last element is gone
    fn drop_if_empty(data: &mut Keyspace, key: &str) {
        if data.get(key).is_some_and(|e| e.value.is_empty()) {
            data.remove(key);
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvConnection for InMemoryKv {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exec(&self, ops: Vec<KvOp>) -> Result<()> {
        let now = self.clock.now();
        let mut data = self.data.write();
        for op in &ops {
            Self::validate(&data, op, now)?;
        }
        for op in ops {
            Self::apply(&mut data, op, now);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(Self::live(&self.data.read(), key, now).is_some())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let data = self.data.read();
        Self::check_type(&data, key, "hash", now)?;
        Ok(match Self::live(&data, key, now) {
            Some(KvEntry {
                value: KvValue::Hash(hash),
                ..
            }) => hash.get(field).cloned(),
            _ => None,
        })
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let data = self.data.read();
        Self::check_type(&data, key, "set", now)?;
        Ok(match Self::live(&data, key, now) {
            Some(KvEntry {
                value: KvValue::Set(set),
                ..
            }) => set.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let now = self.clock.now();
        let data = self.data.read();
        Self::check_type(&data, key, "zset", now)?;
        Ok(match Self::live(&data, key, now) {
            Some(KvEntry {
                value: KvValue::ZSet(zset),
                ..
            }) => zset.get(member).copied(),
            _ => None,
        })
    }

    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let now = self.clock.now();
        let data = self.data.read();
        Self::check_type(&data, key, "zset", now)?;
        let mut members: Vec<(String, f64)> = match Self::live(&data, key, now) {
            Some(KvEntry {
                value: KvValue::ZSet(zset),
                ..
            }) => zset.iter().map(|(m, s)| (m.clone(), *s)).collect(),
            _ => Vec::new(),
        };
        // ZRANGE order: score, then member
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn zrange_by_score(&self, key: &str, max: f64) -> Result<Vec<String>> {
        Ok(self
            .zrange_with_scores(key)
            .await?
            .into_iter()
            .filter(|(_, score)| *score <= max)
            .map(|(member, _)| member)
            .collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut data = self.data.write();
        Self::check_type(&data, key, "zset", now)?;
        Ok(Self::zrem_locked(&mut data, key, member, now))
    }

    async fn scan_keys(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        Ok(self
            .data
            .read()
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn purge_expired_keys(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now));
        Ok(before - data.len())
    }
}
