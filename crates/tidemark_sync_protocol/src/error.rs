//! Error types for protocol validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing or validating protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unknown entity kind name.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    /// Unknown mutation action name.
    #[error("unknown mutation action: {0}")]
    UnknownAction(String),

    /// Malformed mutation id.
    #[error("invalid mutation id: {0}")]
    InvalidMutationId(String),

    /// Payload does not have the shape required by its action.
    #[error("invalid {action} payload for {kind}: {reason}")]
    InvalidPayload {
        /// Entity kind name.
        kind: String,
        /// Action name.
        action: String,
        /// What is wrong with the payload.
        reason: String,
    },

    /// Record is malformed.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
