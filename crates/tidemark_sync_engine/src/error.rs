//! Error types for the sync engine.

use thiserror::Error;
use tidemark_storage::StorageError;
use tidemark_sync_protocol::ProtocolError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote API calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for local store adapters.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Delta fetch or mutation replay failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// One or more records could not be merged into the local store.
    #[error("reconcile failed for {failed} record(s); first: {first}")]
    Reconcile {
        /// Number of records that failed.
        failed: usize,
        /// Description of the first failure.
        first: String,
    },

    /// Persisting engine state failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding or decoding persisted state failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A mutation was rejected at enqueue time.
    #[error("invalid mutation: {0}")]
    InvalidMutation(#[from] ProtocolError),

    /// A configuration change was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Returns true if a later cycle may succeed where this one failed.
    ///
    /// Every cycle failure follows the backoff path regardless; this is
    /// for callers deciding whether to surface an error as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Reconcile { .. } | SyncError::Storage(_) => true,
            SyncError::Codec(_) | SyncError::InvalidMutation(_) | SyncError::InvalidConfig(_) => {
                false
            }
        }
    }
}

/// Errors reported by a [`crate::RemoteApi`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection failed or dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("server rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Server message.
        message: String,
    },

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Returns true for failures that are expected to clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Rejected { status, .. } => *status >= 500 || *status == 429,
            RemoteError::Decode(_) => false,
        }
    }
}

/// Errors reported by a [`crate::LocalStore`] adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stored records could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The adapter refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::from(RemoteError::network("connection reset")).is_retryable());
        assert!(SyncError::from(RemoteError::Timeout).is_retryable());
        assert!(!SyncError::from(RemoteError::Decode("bad json".into())).is_retryable());
        assert!(SyncError::Reconcile {
            failed: 1,
            first: "disk full".into()
        }
        .is_retryable());
        assert!(!SyncError::InvalidConfig("interval".into()).is_retryable());
    }

    #[test]
    fn rejected_status_classes() {
        let server = RemoteError::Rejected {
            status: 503,
            message: "maintenance".into(),
        };
        let client = RemoteError::Rejected {
            status: 422,
            message: "bad deck".into(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Reconcile {
            failed: 2,
            first: "exams/e1: disk full".into(),
        };
        assert_eq!(
            err.to_string(),
            "reconcile failed for 2 record(s); first: exams/e1: disk full"
        );
        assert_eq!(RemoteError::Timeout.to_string(), "request timed out");
    }
}
