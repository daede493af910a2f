//! paste-store - Document storage for a paste service
//!
//! Persists text documents under random keys, with optional title and tags,
//! title/tag search, tag-frequency statistics and time-based expiration.
//!
//! ## Core Contract
//!
//! 1. **Liveness**: a document is visible iff it has no deadline or its deadline
//!    is strictly after now
//! 2. **Atomic writes**: a document and its tag index entries are written together
//! 3. **Refresh on read**: reads push an existing deadline forward, never add one
//! 4. **Same contract everywhere**: Redis, PostgreSQL, SQLite and in-memory
//!    backends behave alike behind [`DocumentStore`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paste_store::{PasteStoreConfig, StoreRuntime};
//!
//! let config = PasteStoreConfig::load(Some("pastes.yaml".as_ref()))?;
//! let runtime = StoreRuntime::init(&config).await?;
//! let handler = runtime.handler();
//!
//! // 1. Store (key chosen for you)
//! let key = handler.set("fn main() {}", "Hello World", "rust, snippet").await?;
//!
//! // 2. Read back, refreshing the deadline
//! let doc = handler.get(&key, false).await?;
//!
//! // 3. Search titles and tags, case-insensitively
//! let hits = handler.search("hello").await?;
//!
//! runtime.shutdown().await?;
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod runtime;
pub mod shared;

pub use error::{ErrorKind, ErrorResponse, Result, StoreError};

pub use application::{DocumentHandler, HandlerConfig, KeyGenerator, RandomKeyGenerator};
pub use config::{BackendConfig, ConfigError, PasteStoreConfig};
pub use domain::{
    DocumentStore, ExpirationPolicy, NewDocument, SearchHit, StoredDocument, TagCount, TagSet,
};
pub use runtime::{Backend, StoreRuntime};
pub use shared::clock::{Clock, ManualClock, SystemClock};
