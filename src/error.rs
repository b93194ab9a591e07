//! Crate error types.
//!
//! Mirrors the teacher's two-tier split: a low-level `StoreError` for
//! persistence/serialization failures, wrapped by a high-level
//! `ThoughtMemoryError` that also carries validation and backend failures.

use thiserror::Error;

/// Low-level persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp: {0}")]
    DateParse(String),
}

/// Result alias for the low-level storage layer.
pub type StoreResult<T> = Result<T, StoreError>;

/// Crate-wide error type surfaced by the public API.
#[derive(Debug, Error)]
pub enum ThoughtMemoryError {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("vector backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("unsupported reflection mode: {0}")]
    UnsupportedMode(String),
}

impl ThoughtMemoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result alias for the public API.
pub type ThoughtMemoryResult<T> = Result<T, ThoughtMemoryError>;
