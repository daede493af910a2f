//! Configuration
//!
//! `PasteStoreConfig` is loaded from YAML (every field optional), patched from
//! the environment, then validated:
//!
//! ```yaml
//! key_length: 10
//! max_length: 400000
//! max_key_attempts: 64
//! backend_timeout_ms: 5000
//! reap_interval_secs: 300
//! storage:
//!   expire: 2592000
//!   unique_titles: false
//!   backend:
//!     type: redis        # redis | postgres | sqlite | memory
//!     host: 127.0.0.1
//!     port: 6379
//!     db: 0
//! ```
//!
//! `DATABASE_URL` replaces the data-source location of the selected backend:
//! the Redis URL, the PostgreSQL connection URL or the SQLite file.

pub mod error;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::document_handler::{
    HandlerConfig, DEFAULT_KEY_LENGTH, DEFAULT_MAX_KEY_ATTEMPTS,
};
use crate::infrastructure::kv::RedisConnection;
pub use error::{ConfigError, ConfigResult};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Longest key the SQL schemas can hold
const MAX_KEY_LENGTH: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PasteStoreConfig {
    pub key_length: usize,
    /// Maximum document length in characters; absent = unlimited
    pub max_length: Option<usize>,
    pub max_key_attempts: u32,
    pub backend_timeout_ms: u64,
    /// Background purge period; 0 disables the reaper
    pub reap_interval_secs: u64,
    pub storage: StorageConfig,
}

impl Default for PasteStoreConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            max_length: None,
            max_key_attempts: DEFAULT_MAX_KEY_ATTEMPTS,
            backend_timeout_ms: 5_000,
            reap_interval_secs: 300,
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Document lifetime in seconds; absent or 0 = never expire
    pub expire: Option<u64>,
    /// Reject a second document with the same title (SQL backends)
    pub unique_titles: bool,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Redis(RedisConfig),
    Postgres(PostgresConfig),
    Sqlite(SqliteConfig),
    #[default]
    Memory,
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Redis(_) => "redis",
            BackendConfig::Postgres(_) => "postgres",
            BackendConfig::Sqlite(_) => "sqlite",
            BackendConfig::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RedisConfig {
    /// Full `redis://` URL; wins over host/port/db/password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => RedisConnection::url_from(
                &self.host,
                self.port,
                self.db,
                self.password.as_deref(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PostgresConfig {
    pub connection_url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            connection_url: "postgres://localhost/pastes".to_string(),
            max_connections: 10,
            acquire_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SqliteConfig {
    pub file: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("data/pastes.db"),
        }
    }
}

impl PasteStoreConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load, apply process environment, validate
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty()) else {
            return;
        };
        match &mut self.storage.backend {
            BackendConfig::Redis(redis) => redis.url = Some(url),
            BackendConfig::Postgres(pg) => pg.connection_url = url,
            BackendConfig::Sqlite(sqlite) => sqlite.file = PathBuf::from(url),
            BackendConfig::Memory => {}
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.key_length == 0 || self.key_length > MAX_KEY_LENGTH {
            return Err(ConfigError::range_with_hint(
                "key_length",
                self.key_length,
                1,
                MAX_KEY_LENGTH,
                "Keys must fit the entry_key column.",
            ));
        }
        if self.max_key_attempts == 0 {
            return Err(ConfigError::range_with_hint(
                "max_key_attempts",
                0,
                1,
                u32::MAX,
                "At least one key must be tried.",
            ));
        }
        if self.max_length == Some(0) {
            return Err(ConfigError::range_with_hint(
                "max_length",
                0,
                1,
                usize::MAX,
                "Omit max_length for no limit.",
            ));
        }
        if self.backend_timeout_ms == 0 {
            return Err(ConfigError::range_with_hint(
                "backend_timeout_ms",
                0,
                1,
                u64::MAX,
                "Every store call needs a time budget.",
            ));
        }

        match &self.storage.backend {
            BackendConfig::Redis(redis) => {
                if redis.url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                    return Err(ConfigError::empty(
                        "storage.backend.url",
                        "Remove it to use host/port/db.",
                    ));
                }
                if redis.url.is_none() && redis.host.trim().is_empty() {
                    return Err(ConfigError::empty(
                        "storage.backend.host",
                        "Set host or url.",
                    ));
                }
            }
            BackendConfig::Postgres(pg) => {
                if pg.connection_url.trim().is_empty() {
                    return Err(ConfigError::empty(
                        "storage.backend.connection_url",
                        "Set it or export DATABASE_URL.",
                    ));
                }
                if pg.max_connections == 0 {
                    return Err(ConfigError::range_with_hint(
                        "storage.backend.max_connections",
                        0,
                        1,
                        u32::MAX,
                        "The pool needs at least one connection.",
                    ));
                }
            }
            BackendConfig::Sqlite(sqlite) => {
                if sqlite.file.as_os_str().is_empty() {
                    return Err(ConfigError::empty(
                        "storage.backend.file",
                        "Set it or export DATABASE_URL.",
                    ));
                }
            }
            BackendConfig::Memory => {}
        }
        Ok(())
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            key_length: self.key_length,
            max_length: self.max_length,
            max_key_attempts: self.max_key_attempts,
            backend_timeout: Duration::from_millis(self.backend_timeout_ms),
        }
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        (self.reap_interval_secs > 0).then(|| Duration::from_secs(self.reap_interval_secs))
    }
}
