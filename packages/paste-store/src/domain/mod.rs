//! Domain layer
//!
//! # Domain Models
//!
//! - `NewDocument`: document handed to a backend (key chosen beforehand)
//! - `TagSet`: normalized tags; source of the derived tag index
//! - `StoredDocument`, `SearchHit`, `TagCount`: read models
//! - `ExpirationPolicy`: TTL arithmetic shared by every backend
//!
//! # Port Trait
//!
//! - `DocumentStore`: the contract every backend honors
//!
//! # Examples
//!
//! ```rust,ignore
//! use paste_store::domain::{DocumentStore, NewDocument, TagSet};
//!
//! async fn example(store: impl DocumentStore) -> paste_store::Result<()> {
//!     let doc = NewDocument::new("abcdefghjk", "fn main() {}")
//!         .with_title("Hello World")
//!         .with_tags(TagSet::parse("rust, snippet"));
//!     store.set(&doc, false).await?;
//!
//!     let value = store.get("abcdefghjk", false).await?;
//!     assert_eq!(value.as_deref(), Some("fn main() {}"));
//!
//!     let hits = store.search("hello").await?;
//!     assert_eq!(hits[0].key, "abcdefghjk");
//!     Ok(())
//! }
//! ```

pub mod expiration;
pub mod models;
pub mod ports;

pub use expiration::ExpirationPolicy;
pub use models::{DocumentKey, NewDocument, SearchHit, StoredDocument, TagCount, TagSet};
pub use ports::DocumentStore;
