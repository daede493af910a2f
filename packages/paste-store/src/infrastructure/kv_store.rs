//! Key/Value Document Store
//!
//! Redis-layout document store over any `KvConnection`:
//!
//! | Key            | Type       | Content                                   |
//! |----------------|------------|-------------------------------------------|
//! | `<key>`        | hash       | `value`, `title`                          |
//! | `<key>:tags`   | set        | normalized tags                           |
//! | `tags:stats`   | sorted set | tag -> document count                     |
//! | `docs:expiry`  | sorted set | document key -> deadline (unix seconds)   |
//! | `docs:tags`    | hash       | document key -> comma joined tags         |
//!
//! The engine drops expired keys on its own, which says nothing to
//! `tags:stats`. The two `docs:*` registries record every document that has a
//! deadline so the store can retire its tag counts once the document is gone.
//!
//! `search` scans the whole keyspace and is O(n) in the number of documents.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::kv::{KvConnection, KvOp};
use crate::domain::models::{matches_term, sort_tag_counts};
use crate::domain::{DocumentStore, ExpirationPolicy, NewDocument, SearchHit, TagCount, TagSet};
use crate::error::{Result, StoreError};

pub const TAG_STATS_KEY: &str = "tags:stats";
pub const EXPIRY_REGISTRY_KEY: &str = "docs:expiry";
pub const TAG_REGISTRY_KEY: &str = "docs:tags";

const VALUE_FIELD: &str = "value";
const TITLE_FIELD: &str = "title";

fn tags_key(key: &str) -> String {
    format!("{}:tags", key)
}

/// Store bookkeeping keys all contain `:`; document keys never do
fn is_reserved(key: &str) -> bool {
    key.contains(':')
}

/// Document store for Redis and the in-memory emulation
pub struct KeyValueDocumentStore<C> {
    conn: C,
    policy: ExpirationPolicy,
}

impl<C: KvConnection> KeyValueDocumentStore<C> {
    pub fn new(conn: C, policy: ExpirationPolicy) -> Self {
        Self { conn, policy }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Move the deadline of a document that already has one
    async fn refresh(&self, key: &str) -> Result<()> {
        let Some(ttl) = self.policy.ttl_secs() else {
            return Ok(());
        };
        let current = self.conn.zscore(EXPIRY_REGISTRY_KEY, key).await?;
        let Some(next) = self
            .policy
            .refreshed(current.map(|score| score as i64), false)
        else {
            return Ok(());
        };

        self.conn
            .exec(vec![
                KvOp::Expire {
                    key: key.to_string(),
                    seconds: ttl,
                },
                KvOp::Expire {
                    key: tags_key(key),
                    seconds: ttl,
                },
                KvOp::ZAdd {
                    key: EXPIRY_REGISTRY_KEY.to_string(),
                    member: key.to_string(),
                    score: next as f64,
                },
            ])
            .await?;
        debug!("Refreshed expiration of {} to {}", key, next);
        Ok(())
    }

    /// Retire the registry entry of a document that no longer exists.
    ///
    /// Only the caller whose `ZREM` succeeds decrements the tag counts, so
    /// concurrent reapers never count a document twice.
    async fn retire_registry_entry(&self, key: &str) -> Result<bool> {
        let tags = self
            .conn
            .hget(TAG_REGISTRY_KEY, key)
            .await?
            .map(|joined| TagSet::parse(&joined))
            .unwrap_or_default();

        if !self.conn.zrem(EXPIRY_REGISTRY_KEY, key).await? {
            return Ok(false);
        }

        let mut ops: Vec<KvOp> = tags
            .iter()
            .map(|tag| KvOp::ZIncrBy {
                key: TAG_STATS_KEY.to_string(),
                member: tag.to_string(),
                delta: -1.0,
            })
            .collect();
        ops.push(KvOp::HDel {
            key: TAG_REGISTRY_KEY.to_string(),
            field: key.to_string(),
        });
        self.conn.exec(ops).await?;

        debug!("Retired expired document {} ({} tags)", key, tags.len());
        Ok(true)
    }

    /// Retire every registry entry whose deadline has passed
    async fn reap_expired(&self) -> Result<usize> {
        let now = self.policy.now();
        let candidates = self
            .conn
            .zrange_by_score(EXPIRY_REGISTRY_KEY, now as f64)
            .await?;

        let mut reaped = 0;
        for key in candidates {
            // The engine's clock may lag ours; try again on the next pass
            if self.conn.exists(&key).await? {
                continue;
            }
            if self.retire_registry_entry(&key).await? {
                reaped += 1;
            }
        }
        Ok(reaped)
    }
}

#[async_trait]
impl<C: KvConnection> DocumentStore for KeyValueDocumentStore<C> {
    async fn get(&self, key: &str, skip_expire: bool) -> Result<Option<String>> {
        if is_reserved(key) {
            return Ok(None);
        }
        let value = self.conn.hget(key, VALUE_FIELD).await?;

        if value.is_some() && !skip_expire {
            if let Err(e) = self.refresh(key).await {
                warn!("Failed to refresh expiration of {}: {}", key, e);
            }
        }
        Ok(value)
    }

    async fn set(&self, doc: &NewDocument, skip_expire: bool) -> Result<()> {
        if is_reserved(&doc.key) {
            return Err(StoreError::constraint_violation(format!(
                "Document key is reserved: {}",
                doc.key
            )));
        }
        if self.conn.exists(&doc.key).await? {
            return Err(StoreError::constraint_violation(format!(
                "Document key already in use: {}",
                doc.key
            )));
        }
        // A previous occupant may have expired without being reaped
        self.retire_registry_entry(&doc.key).await?;

        let doc_tags_key = tags_key(&doc.key);
        let mut ops = vec![KvOp::HSet {
            key: doc.key.clone(),
            fields: vec![
                (VALUE_FIELD.to_string(), doc.value.clone()),
                (TITLE_FIELD.to_string(), doc.title.clone()),
            ],
        }];

        if !doc.tags.is_empty() {
            ops.push(KvOp::SAdd {
                key: doc_tags_key.clone(),
                members: doc.tags.iter().map(str::to_string).collect(),
            });
            ops.extend(doc.tags.iter().map(|tag| KvOp::ZIncrBy {
                key: TAG_STATS_KEY.to_string(),
                member: tag.to_string(),
                delta: 1.0,
            }));
        }

        if let (Some(deadline), Some(ttl)) =
            (self.policy.deadline(skip_expire), self.policy.ttl_secs())
        {
            ops.push(KvOp::Expire {
                key: doc.key.clone(),
                seconds: ttl,
            });
            ops.push(KvOp::Expire {
                key: doc_tags_key,
                seconds: ttl,
            });
            ops.push(KvOp::ZAdd {
                key: EXPIRY_REGISTRY_KEY.to_string(),
                member: doc.key.clone(),
                score: deadline as f64,
            });
            if !doc.tags.is_empty() {
                ops.push(KvOp::HSet {
                    key: TAG_REGISTRY_KEY.to_string(),
                    fields: vec![(doc.key.clone(), doc.tags.joined())],
                });
            }
        }

        self.conn.exec(ops).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        if is_reserved(key) || !self.conn.exists(key).await? {
            return Ok(false);
        }

        let doc_tags_key = tags_key(key);
        let mut tags = self.conn.smembers(&doc_tags_key).await?;
        if tags.is_empty() {
            // Tag set may have expired a moment before the document
            if let Some(joined) = self.conn.hget(TAG_REGISTRY_KEY, key).await? {
                tags = TagSet::parse(&joined).iter().map(str::to_string).collect();
            }
        }

        let mut ops: Vec<KvOp> = tags
            .into_iter()
            .map(|tag| KvOp::ZIncrBy {
                key: TAG_STATS_KEY.to_string(),
                member: tag,
                delta: -1.0,
            })
            .collect();
        ops.extend([
            KvOp::Del {
                key: key.to_string(),
            },
            KvOp::Del { key: doc_tags_key },
            KvOp::ZRem {
                key: EXPIRY_REGISTRY_KEY.to_string(),
                member: key.to_string(),
            },
            KvOp::HDel {
                key: TAG_REGISTRY_KEY.to_string(),
                field: key.to_string(),
            },
        ]);
        self.conn.exec(ops).await?;
        Ok(true)
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        let term = term.to_lowercase();
        let mut keys: Vec<String> = self
            .conn
            .scan_keys()
            .await?
            .into_iter()
            .filter(|key| !is_reserved(key))
            .collect();
        keys.sort();

        let mut hits = Vec::new();
        for key in keys {
            // Expired between SCAN and HGET
            let Some(title) = self.conn.hget(&key, TITLE_FIELD).await? else {
                continue;
            };
            let tags = self.conn.smembers(&tags_key(&key)).await?;

            if matches_term(&title, &term) || tags.iter().any(|tag| matches_term(tag, &term)) {
                hits.push(SearchHit { key, title });
            }
        }
        Ok(hits)
    }

    async fn tag_stats(&self) -> Result<Vec<TagCount>> {
        self.reap_expired().await?;

        let mut counts: Vec<TagCount> = self
            .conn
            .zrange_with_scores(TAG_STATS_KEY)
            .await?
            .into_iter()
            .map(|(tag, score)| TagCount {
                tag,
                count: score.round() as i64,
            })
            .collect();
        sort_tag_counts(&mut counts);
        Ok(counts)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let reaped = self.reap_expired().await?;
        let dropped = self.conn.purge_expired_keys().await?;
        if dropped > 0 {
            debug!("Dropped {} expired key(s) from the keyspace", dropped);
        }
        Ok(reaped)
    }

    fn backend_name(&self) -> &'static str {
        self.conn.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kv::InMemoryKv;
    use crate::shared::clock::ManualClock;
    use std::sync::Arc;

    fn store(ttl: Option<u64>) -> (KeyValueDocumentStore<InMemoryKv>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let kv = InMemoryKv::with_clock(Arc::new(clock.clone()));
        let policy = ExpirationPolicy::new(ttl, Arc::new(clock.clone()));
        (KeyValueDocumentStore::new(kv, policy), clock)
    }

    fn doc(key: &str, tags: &str) -> NewDocument {
        NewDocument::new(key, "body")
            .with_title(format!("title of {}", key))
            .with_tags(TagSet::parse(tags))
    }

    #[tokio::test]
    async fn test_set_writes_layout() {
        let (store, _) = store(Some(60));
        store.set(&doc("abc", "x,y"), false).await.unwrap();

        let kv = store.connection();
        assert_eq!(kv.hget("abc", "title").await.unwrap().as_deref(), Some("title of abc"));
        assert_eq!(kv.smembers("abc:tags").await.unwrap(), vec!["x", "y"]);
        assert_eq!(kv.zscore(TAG_STATS_KEY, "x").await.unwrap(), Some(1.0));
        assert_eq!(kv.zscore(EXPIRY_REGISTRY_KEY, "abc").await.unwrap(), Some(1_000_060.0));
        assert_eq!(kv.hget(TAG_REGISTRY_KEY, "abc").await.unwrap().as_deref(), Some("x,y"));
        assert_eq!(kv.ttl("abc"), Some(60));
        assert_eq!(kv.ttl("abc:tags"), Some(60));
    }

    #[tokio::test]
    async fn test_skip_expire_leaves_no_registry_entry() {
        let (store, _) = store(Some(60));
        store.set(&doc("abc", "x"), true).await.unwrap();

        let kv = store.connection();
        assert_eq!(kv.ttl("abc"), None);
        assert_eq!(kv.zscore(EXPIRY_REGISTRY_KEY, "abc").await.unwrap(), None);
        assert_eq!(kv.hget(TAG_REGISTRY_KEY, "abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_live_key_collision_is_constraint_violation() {
        let (store, _) = store(None);
        store.set(&doc("abc", ""), false).await.unwrap();
        let err = store.set(&doc("abc", ""), false).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_reuse_of_expired_key_retires_old_tags() {
        let (store, clock) = store(Some(10));
        store.set(&doc("abc", "old"), false).await.unwrap();
        clock.advance(11);

        store.set(&doc("abc", "new"), false).await.unwrap();

        let stats = store.tag_stats().await.unwrap();
        assert_eq!(
            stats,
            vec![
                TagCount { tag: "new".into(), count: 1 },
                TagCount { tag: "old".into(), count: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_moves_deadline_of_both_keys() {
        let (store, clock) = store(Some(60));
        store.set(&doc("abc", "x"), false).await.unwrap();
        clock.advance(30);

        store.get("abc", false).await.unwrap();

        let kv = store.connection();
        assert_eq!(kv.ttl("abc"), Some(60));
        assert_eq!(kv.ttl("abc:tags"), Some(60));
        assert_eq!(kv.zscore(EXPIRY_REGISTRY_KEY, "abc").await.unwrap(), Some(1_000_090.0));
    }

    #[tokio::test]
    async fn test_refresh_never_adds_deadline() {
        let (store, _) = store(Some(60));
        store.set(&doc("abc", "x"), true).await.unwrap();
        store.get("abc", false).await.unwrap();
        assert_eq!(store.connection().ttl("abc"), None);
    }

    #[tokio::test]
    async fn test_reserved_keys_are_never_documents() {
        let (store, _) = store(None);
        store.set(&doc("abc", "x"), false).await.unwrap();

        for key in [TAG_STATS_KEY, EXPIRY_REGISTRY_KEY, TAG_REGISTRY_KEY, "abc:tags"] {
            assert_eq!(store.get(key, false).await.unwrap(), None, "{}", key);
            assert!(!store.delete(key).await.unwrap(), "{}", key);
        }
        let err = store.set(&doc("tags:stats", ""), false).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ConstraintViolation);

        let kv = store.connection();
        assert_eq!(kv.zscore(TAG_STATS_KEY, "x").await.unwrap(), Some(1.0));
        assert_eq!(kv.smembers("abc:tags").await.unwrap(), vec!["x"]);

        assert!(store.delete("abc").await.unwrap());
        assert_eq!(kv.zscore(TAG_STATS_KEY, "x").await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_purge_drops_expired_entries_from_keyspace() {
        let (store, clock) = store(Some(10));
        for i in 0..100 {
            store.set(&doc(&format!("doc{}", i), "x,y"), false).await.unwrap();
        }
        store.set(&doc("kept", ""), true).await.unwrap();
        // 101 hashes, 100 tag sets, tags:stats and both registries
        assert_eq!(store.connection().stored_len(), 204);

        clock.advance(11);
        assert_eq!(store.purge_expired().await.unwrap(), 100);

        // `kept` and tags:stats (retired tags stay at zero)
        let kv = store.connection();
        assert_eq!(kv.stored_len(), 2);
        assert_eq!(kv.len(), 2);
        assert_eq!(kv.zscore(TAG_STATS_KEY, "x").await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_concurrent_reap_decrements_once() {
        let (store, clock) = store(Some(10));
        store.set(&doc("abc", "x"), false).await.unwrap();
        clock.advance(20);

        let (a, b) = tokio::join!(store.purge_expired(), store.purge_expired());
        assert_eq!(a.unwrap() + b.unwrap(), 1);
        assert_eq!(
            store.connection().zscore(TAG_STATS_KEY, "x").await.unwrap(),
            Some(0.0)
        );
    }
}
