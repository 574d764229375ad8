//! Identified, timestamped records.

use crate::error::{ProtocolError, ProtocolResult};
use crate::kind::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Identity of a record within its kind.
pub type RecordId = String;

/// A record as held by the server or the local replica.
///
/// Only `id`, `updated_at` and `completed_at` are interpreted by the sync
/// engine. Everything else is carried in `fields` untouched.
///
/// # Example
///
/// ```rust
/// use tidemark_sync_protocol::{EntityKind, Record};
///
/// let exam = Record::new("e1").with_completed_at(1000);
/// assert_eq!(exam.effective_timestamp(EntityKind::Exam), 1000);
/// assert_eq!(exam.effective_timestamp(EntityKind::Deck), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identity.
    pub id: RecordId,
    /// Last modification time, if the server tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// Completion time for kinds that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Remaining fields, opaque to the engine.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A record held by the local replica.
pub type LocalRecord = Record;

impl Record {
    /// Creates a record with no timestamps and no fields.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            updated_at: None,
            completed_at: None,
            fields: Map::new(),
        }
    }

    /// Sets `updated_at`.
    pub fn with_updated_at(mut self, ts: Timestamp) -> Self {
        self.updated_at = Some(ts);
        self
    }

    /// Sets `completed_at`.
    pub fn with_completed_at(mut self, ts: Timestamp) -> Self {
        self.completed_at = Some(ts);
        self
    }

    /// Sets an opaque field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parses a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidRecord`] if the value is not an
    /// object, has no string `id`, or has non-integer timestamps.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let record: Record = serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidRecord(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Checks the record invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidRecord`] for an empty id.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id.trim().is_empty() {
            return Err(ProtocolError::InvalidRecord("empty id".into()));
        }
        Ok(())
    }

    /// Returns the timestamp used for last-write-wins comparison.
    ///
    /// `updated_at` wins when present. Otherwise kinds that have a
    /// completion time use `completed_at`. A record with neither compares
    /// as 0, so any timestamped version replaces it.
    pub fn effective_timestamp(&self, kind: EntityKind) -> Timestamp {
        if let Some(ts) = self.updated_at {
            return ts;
        }
        if kind.uses_completion_time() {
            if let Some(ts) = self.completed_at {
                return ts;
            }
        }
        0
    }
}
