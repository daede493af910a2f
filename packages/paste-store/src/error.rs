//! Error types for paste-store
//!
//! Every fallible operation in the crate returns [`StoreError`]. The `kind`
//! decides how a caller reacts; the `message` and `source` are diagnostic detail
//! meant for logs, never for end users (see [`StoreError::public_message`]).

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Key absent or expired
    NotFound,
    /// Payload exceeds limits, malformed input
    Validation,
    /// Uniqueness failure (key race, duplicate title)
    ConstraintViolation,
    /// Connection/transport failure, SQL fault, timeout
    BackendUnavailable,
    /// Collision retry ran out of attempts
    KeyspaceExhausted,
    /// Invalid configuration
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::KeyspaceExhausted => "keyspace_exhausted",
            ErrorKind::Config => "config",
        }
    }

    /// HTTP-equivalent status for the transport adapter
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::ConstraintViolation => 409,
            ErrorKind::BackendUnavailable => 500,
            ErrorKind::KeyspaceExhausted => 503,
            ErrorKind::Config => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StoreError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Caller-facing error body: `{"message": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("Document not found: {}", key.into()),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConstraintViolation, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn keyspace_exhausted(attempts: u32) -> Self {
        Self::new(
            ErrorKind::KeyspaceExhausted,
            format!("No free key after {} attempts", attempts),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Short message safe to show to a caller; never contains backend detail.
    pub fn public_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::NotFound => "Document not found.",
            ErrorKind::Validation => match self.message.as_str() {
                m if m.starts_with("title") => "Title exceeds maximum length.",
                _ => "Document exceeds maximum length.",
            },
            ErrorKind::ConstraintViolation => "Document conflicts with an existing one.",
            ErrorKind::BackendUnavailable => "Storage unavailable.",
            ErrorKind::KeyspaceExhausted => "Could not allocate a document key.",
            ErrorKind::Config => "Storage misconfigured.",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            message: self.public_message().to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                StoreError::constraint_violation(format!("SQLite constraint: {}", err))
                    .with_source(err)
            }
            _ => StoreError::backend(format!("SQLite error: {}", err)).with_source(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
        if unique {
            StoreError::constraint_violation(format!("PostgreSQL constraint: {}", err))
                .with_source(err)
        } else {
            StoreError::backend(format!("PostgreSQL error: {}", err)).with_source(err)
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::backend(format!("Redis error: {}", err)).with_source(err)
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::backend(format!("Blocking task failed: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;
