//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// The remote API answered with an error status.
    #[error("API error: {0}")]
    Api(String),

    /// Local or remote storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Remote object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was rejected before any remote call was made.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
