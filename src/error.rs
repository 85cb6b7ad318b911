//! Error types for mnemo

use thiserror::Error;

/// Result type alias for mnemo operations
pub type Result<T> = std::result::Result<T, MnemoError>;

/// Main error type for the memory core
#[derive(Error, Debug)]
pub enum MnemoError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Transient dependency failure: {0}")]
    Transient(String),

    #[error("Deadline exceeded after {0:?}")]
    Cancelled(std::time::Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MnemoError {
    /// Check if the error is worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MnemoError::ProviderUnavailable(_) | MnemoError::Transient(_) | MnemoError::Http(_)
        )
    }

    /// Convenience constructor for a missing item, phrased so that
    /// cross-workspace references are indistinguishable from unknown ids.
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        MnemoError::NotFound(id.to_string())
    }
}
