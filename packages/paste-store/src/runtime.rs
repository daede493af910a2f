//! Store runtime
//!
//! Owns the process-wide pieces: the backend connection chosen by
//! configuration, the `DocumentHandler` built on it, and the background reaper
//! that purges expired documents. `init` and `shutdown` bracket their lifetime.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::{DocumentHandler, RandomKeyGenerator};
use crate::config::{BackendConfig, PasteStoreConfig};
use crate::domain::{DocumentStore, ExpirationPolicy, NewDocument, SearchHit, TagCount};
use crate::error::Result;
use crate::infrastructure::postgres_store::PoolSettings;
use crate::infrastructure::{
    InMemoryKv, KeyValueDocumentStore, PostgresDocumentStore, RedisConnection,
};
use crate::shared::clock::{Clock, SystemClock};

#[cfg(feature = "sqlite")]
use crate::infrastructure::SqliteDocumentStore;

/// The configured backend
pub enum Backend {
    Redis(KeyValueDocumentStore<RedisConnection>),
    Memory(KeyValueDocumentStore<InMemoryKv>),
    Postgres(PostgresDocumentStore),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteDocumentStore),
}

macro_rules! dispatch {
    ($backend:expr, $store:ident => $call:expr) => {
        match $backend {
            Backend::Redis($store) => $call,
            Backend::Memory($store) => $call,
            Backend::Postgres($store) => $call,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite($store) => $call,
        }
    };
}

impl Backend {
    /// Connect the backend selected in `config`
    pub async fn connect(config: &PasteStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let storage = &config.storage;
        let policy = ExpirationPolicy::new(storage.expire, Arc::clone(&clock));

        if storage.unique_titles
            && matches!(storage.backend, BackendConfig::Redis(_) | BackendConfig::Memory)
        {
            warn!(
                "unique_titles has no effect on the {} backend",
                storage.backend.name()
            );
        }

        let backend = match &storage.backend {
            BackendConfig::Redis(redis) => {
                let conn = RedisConnection::connect(&redis.connection_url()).await?;
                Backend::Redis(KeyValueDocumentStore::new(conn, policy))
            }
            BackendConfig::Memory => {
                let kv = InMemoryKv::with_clock(clock);
                Backend::Memory(KeyValueDocumentStore::new(kv, policy))
            }
            BackendConfig::Postgres(pg) => {
                let settings = PoolSettings {
                    max_connections: pg.max_connections,
                    acquire_timeout: Duration::from_millis(pg.acquire_timeout_ms),
                };
                let store = PostgresDocumentStore::connect_lazy(&pg.connection_url, settings, policy)?
                    .with_unique_titles(storage.unique_titles);
                Backend::Postgres(store)
            }
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite(sqlite) => Backend::Sqlite(
                SqliteDocumentStore::new(sqlite.file.clone(), policy)
                    .with_unique_titles(storage.unique_titles),
            ),
            #[cfg(not(feature = "sqlite"))]
            BackendConfig::Sqlite(_) => {
                return Err(crate::error::StoreError::config(
                    "sqlite backend requires the 'sqlite' feature",
                ))
            }
        };

        info!(
            "Storage backend '{}' ready (expire: {:?})",
            backend.backend_name(),
            storage.expire
        );
        Ok(backend)
    }

    /// Release connections
    pub async fn close(&self) {
        if let Backend::Postgres(store) = self {
            store.close().await;
        }
    }
}

#[async_trait]
impl DocumentStore for Backend {
    async fn get(&self, key: &str, skip_expire: bool) -> Result<Option<String>> {
        dispatch!(self, store => store.get(key, skip_expire).await)
    }

    async fn set(&self, doc: &NewDocument, skip_expire: bool) -> Result<()> {
        dispatch!(self, store => store.set(doc, skip_expire).await)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        dispatch!(self, store => store.delete(key).await)
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        dispatch!(self, store => store.search(term).await)
    }

    async fn tag_stats(&self) -> Result<Vec<TagCount>> {
        dispatch!(self, store => store.tag_stats().await)
    }

    async fn purge_expired(&self) -> Result<usize> {
        dispatch!(self, store => store.purge_expired().await)
    }

    fn backend_name(&self) -> &'static str {
        dispatch!(self, store => store.backend_name())
    }
}

pub struct StoreRuntime {
    backend: Arc<Backend>,
    handler: Arc<DocumentHandler>,
    shutdown_tx: watch::Sender<bool>,
    reaper: Option<JoinHandle<()>>,
}

impl StoreRuntime {
    /// Validate `config`, connect its backend and start the reaper.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn init(config: &PasteStoreConfig) -> Result<Self> {
        Self::init_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn init_with_clock(config: &PasteStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let backend = Arc::new(Backend::connect(config, clock).await?);
        let handler = Arc::new(DocumentHandler::new(
            Arc::clone(&backend) as Arc<dyn DocumentStore>,
            Arc::new(RandomKeyGenerator::new()),
            config.handler_config(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reaper = config.reap_interval().map(|interval| {
            info!("Reaper purging expired documents every {:?}", interval);
            tokio::spawn(reaper_task(Arc::clone(&handler), interval, shutdown_rx))
        });

        Ok(Self {
            backend,
            handler,
            shutdown_tx,
            reaper,
        })
    }

    pub fn handler(&self) -> Arc<DocumentHandler> {
        Arc::clone(&self.handler)
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Stop the reaper and close backend connections
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        if let Some(reaper) = self.reaper.take() {
            reaper.await?;
        }
        self.backend.close().await;
        info!("Storage backend '{}' shut down", self.backend.backend_name());
        Ok(())
    }
}

/// Background task that periodically purges expired documents
async fn reaper_task(
    handler: Arc<DocumentHandler>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; wait a full interval instead
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match handler.purge_expired().await {
                    Ok(purged) => debug!("Reaper pass removed {} document(s)", purged),
                    Err(e) => error!("Reaper pass failed: {}", e),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
