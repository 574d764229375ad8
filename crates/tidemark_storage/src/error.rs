//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is not a valid store key.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Another process holds the store directory lock.
    #[error("storage directory is locked by another process: {0}")]
    Locked(String),

    /// The store is closed or failing (used by test doubles as well).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
