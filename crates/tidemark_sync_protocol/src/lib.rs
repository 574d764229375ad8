//! # Tidemark Sync Protocol
//!
//! Types shared by the Tidemark sync engine and its collaborators.
//!
//! This crate provides:
//! - [`EntityKind`] for the synchronized entity kinds
//! - [`Record`] for identified, timestamped records
//! - [`DeltaSet`] for server changes partitioned by kind
//! - [`QueuedMutation`] and [`MutationPayload`] for pending local writes
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod delta;
mod error;
mod kind;
mod mutation;
mod record;

pub use delta::DeltaSet;
pub use error::{ProtocolError, ProtocolResult};
pub use kind::EntityKind;
pub use mutation::{MutationAction, MutationId, MutationPayload, QueuedMutation};
pub use record::{LocalRecord, Record, RecordId, Timestamp};
