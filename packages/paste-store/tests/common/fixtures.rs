//! Test fixtures
//!
//! Stores wired to a `ManualClock`, namespaced document builders and a
//! recording store wrapper for handler tests.

use async_trait::async_trait;
use paste_store::infrastructure::{InMemoryKv, KeyValueDocumentStore, SqliteDocumentStore};
use paste_store::{
    DocumentStore, ExpirationPolicy, KeyGenerator, ManualClock, NewDocument, RandomKeyGenerator,
    Result, SearchHit, TagCount, TagSet,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Document lifetime used by every contract fixture
pub const TTL: u64 = 100;

/// Fixed start instant for local fixtures
pub const START: i64 = 1_700_000_000;

/// A store under test plus the clock that drives its expiration
pub struct Fixture {
    pub store: Arc<dyn DocumentStore>,
    pub clock: ManualClock,
    _dir: Option<TempDir>,
}

pub fn memory_kv_store(clock: &ManualClock) -> KeyValueDocumentStore<InMemoryKv> {
    let kv = InMemoryKv::with_clock(Arc::new(clock.clone()));
    KeyValueDocumentStore::new(kv, ExpirationPolicy::new(Some(TTL), Arc::new(clock.clone())))
}

pub fn memory_fixture() -> Fixture {
    let clock = ManualClock::new(START);
    Fixture {
        store: Arc::new(memory_kv_store(&clock)),
        clock,
        _dir: None,
    }
}

pub fn sqlite_fixture() -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let clock = ManualClock::new(START);
    let policy = ExpirationPolicy::new(Some(TTL), Arc::new(clock.clone()));
    Fixture {
        store: Arc::new(SqliteDocumentStore::new(dir.path().join("pastes.db"), policy)),
        clock,
        _dir: Some(dir),
    }
}

/// Name prefix isolating one test run's keys and tags on a shared server
pub struct Ns(String);

impl Ns {
    /// No prefix: the store is private to the test
    pub fn local() -> Self {
        Ns(String::new())
    }

    /// Random prefix for live servers
    pub fn unique() -> Self {
        Ns(RandomKeyGenerator::new().create_key(8))
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.0, name)
    }

    pub fn tag(&self, name: &str) -> String {
        format!("{}{}", self.0, name)
    }

    /// Document `name` with a multi-line unicode body
    pub fn doc(&self, name: &str, title: &str, tags: &str) -> NewDocument {
        NewDocument::new(self.key(name), format!("body of {}\n  ✓ unicode\t", name))
            .with_title(title)
            .with_tags(TagSet::parse(tags))
    }
}

/// Store wrapper counting calls, optionally slowing every call down
pub struct RecordingStore {
    inner: Arc<dyn DocumentStore>,
    delay: Option<Duration>,
    gets: AtomicUsize,
    writes: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            delay: None,
            gets: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// `set` + `delete` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, key: &str, skip_expire: bool) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.get(key, skip_expire).await
    }

    async fn set(&self, doc: &NewDocument, skip_expire: bool) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.set(doc, skip_expire).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.delete(key).await
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.pause().await;
        self.inner.search(term).await
    }

    async fn tag_stats(&self) -> Result<Vec<TagCount>> {
        self.pause().await;
        self.inner.tag_stats().await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.pause().await;
        self.inner.purge_expired().await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}
