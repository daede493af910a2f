//! Document Handler
//!
//! Orchestrates a `KeyGenerator` and a `DocumentStore` for the inbound
//! operations of the paste service. Owns the policy the store does not:
//! payload limits, key selection under collision, not-found mapping and the
//! per-call backend timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::key_generator::KeyGenerator;
use crate::domain::{DocumentStore, NewDocument, SearchHit, StoredDocument, TagCount, TagSet};
use crate::error::{Result, StoreError};

pub const DEFAULT_KEY_LENGTH: usize = 10;
pub const DEFAULT_MAX_KEY_ATTEMPTS: u32 = 64;
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Width of the `title` column in both SQL schemas
pub const MAX_TITLE_LENGTH: usize = 255;

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub key_length: usize,
    /// Maximum payload length in characters; `None` = unlimited
    pub max_length: Option<usize>,
    pub max_key_attempts: u32,
    pub backend_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            max_length: None,
            max_key_attempts: DEFAULT_MAX_KEY_ATTEMPTS,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

pub struct DocumentHandler {
    store: Arc<dyn DocumentStore>,
    keys: Arc<dyn KeyGenerator>,
    config: HandlerConfig,
}

impl DocumentHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        keys: Arc<dyn KeyGenerator>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// One store round trip, bounded by `backend_timeout`
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.backend_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(
                    backend = self.store.backend_name(),
                    "Store {} failed: {}", operation, e
                );
                Err(e)
            }
            Err(_) => {
                error!(
                    backend = self.store.backend_name(),
                    "Store {} timed out after {:?}", operation, self.config.backend_timeout
                );
                Err(StoreError::backend(format!(
                    "{} timed out after {:?}",
                    operation, self.config.backend_timeout
                )))
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Write path
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Store a new document and return its key.
    ///
    /// `tags` is a comma separated list. Limits are checked before a key is
    /// chosen, so a rejected payload never reaches the store.
    pub async fn set(&self, value: &str, title: &str, tags: &str) -> Result<String> {
        if let Some(max_length) = self.config.max_length {
            let length = value.chars().count();
            if length > max_length {
                warn!("Document exceeds maxLength ({} > {})", length, max_length);
                return Err(StoreError::validation(format!(
                    "document length {} exceeds maximum {}",
                    length, max_length
                )));
            }
        }

        let title_length = title.chars().count();
        if title_length > MAX_TITLE_LENGTH {
            warn!("Title exceeds maxLength ({} > {})", title_length, MAX_TITLE_LENGTH);
            return Err(StoreError::validation(format!(
                "title length {} exceeds maximum {}",
                title_length, MAX_TITLE_LENGTH
            )));
        }

        let key = self.choose_key().await?;
        let doc = NewDocument::new(key.clone(), value)
            .with_title(title)
            .with_tags(TagSet::parse(tags));

        self.call("set", self.store.set(&doc, false)).await?;
        debug!("Added document {}", key);
        Ok(key)
    }

    /// Draw keys until one is free, at most `max_key_attempts` times
    async fn choose_key(&self) -> Result<String> {
        for attempt in 1..=self.config.max_key_attempts {
            let key = self.keys.create_key(self.config.key_length);
            match self.call("get", self.store.get(&key, true)).await? {
                None => return Ok(key),
                Some(_) => debug!("Key collision on attempt {}: {}", attempt, key),
            }
        }
        warn!(
            "No free key of length {} after {} attempts",
            self.config.key_length, self.config.max_key_attempts
        );
        Err(StoreError::keyspace_exhausted(self.config.max_key_attempts))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        if self.call("delete", self.store.delete(key)).await? {
            debug!("Deleted document {}", key);
            Ok(())
        } else {
            warn!("Document not found: {}", key);
            Err(StoreError::not_found(key))
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Read path
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn get(&self, key: &str, skip_expire: bool) -> Result<StoredDocument> {
        let data = self.fetch(key, skip_expire).await?;
        debug!("Retrieved document {}", key);
        Ok(StoredDocument {
            data,
            key: key.to_string(),
        })
    }

    pub async fn get_raw(&self, key: &str, skip_expire: bool) -> Result<Vec<u8>> {
        let data = self.fetch(key, skip_expire).await?;
        debug!("Retrieved raw document {}", key);
        Ok(data.into_bytes())
    }

    async fn fetch(&self, key: &str, skip_expire: bool) -> Result<String> {
        match self.call("get", self.store.get(key, skip_expire)).await? {
            Some(data) => Ok(data),
            None => {
                warn!("Document not found: {}", key);
                Err(StoreError::not_found(key))
            }
        }
    }

    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        let hits = self.call("search", self.store.search(term)).await?;
        debug!("Search '{}' matched {} document(s)", term, hits.len());
        Ok(hits)
    }

    pub async fn tag_stats(&self) -> Result<Vec<TagCount>> {
        self.call("tag_stats", self.store.tag_stats()).await
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        let purged = self
            .call("purge_expired", self.store.purge_expired())
            .await?;
        if purged > 0 {
            info!("Purged {} expired document(s)", purged);
        }
        Ok(purged)
    }
}
