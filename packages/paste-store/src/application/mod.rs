//! Application layer
//!
//! - `DocumentHandler`: inbound operations over one `DocumentStore`
//! - `KeyGenerator`: candidate keys for new documents

pub mod document_handler;
pub mod key_generator;

pub use document_handler::{DocumentHandler, HandlerConfig, MAX_TITLE_LENGTH};
pub use key_generator::{KeyGenerator, RandomKeyGenerator, DEFAULT_ALPHABET};
