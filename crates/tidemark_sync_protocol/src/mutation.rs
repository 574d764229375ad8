//! Pending local writes.

use crate::error::{ProtocolError, ProtocolResult};
use crate::kind::EntityKind;
use crate::record::{Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique id of a queued mutation.
///
/// Generated at enqueue time and sent with every replay as the
/// idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MutationId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidMutationId(s.to_string()))
    }
}

/// What a mutation does to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// Record was created locally.
    Create,
    /// Record was changed locally.
    Update,
    /// Record was deleted locally.
    Delete,
}

impl MutationAction {
    /// Returns the action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Create => "create",
            MutationAction::Update => "update",
            MutationAction::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(MutationAction::Create),
            "update" => Ok(MutationAction::Update),
            "delete" => Ok(MutationAction::Delete),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// Typed payload of a mutation.
///
/// The action is the variant, so a payload can never disagree with the
/// action it was queued under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MutationPayload {
    /// Full record to create.
    Create {
        /// The new record.
        record: Record,
    },
    /// Partial change to an existing record.
    Update {
        /// Target record id.
        id: RecordId,
        /// Changed fields.
        changes: Map<String, Value>,
    },
    /// Deletion of a record.
    Delete {
        /// Target record id.
        id: RecordId,
    },
}

impl MutationPayload {
    /// Returns the action this payload performs.
    pub fn action(&self) -> MutationAction {
        match self {
            MutationPayload::Create { .. } => MutationAction::Create,
            MutationPayload::Update { .. } => MutationAction::Update,
            MutationPayload::Delete { .. } => MutationAction::Delete,
        }
    }

    /// Returns the id of the targeted record.
    pub fn record_id(&self) -> &str {
        match self {
            MutationPayload::Create { record } => &record.id,
            MutationPayload::Update { id, .. } | MutationPayload::Delete { id } => id,
        }
    }

    /// Builds a typed payload from an untyped JSON value.
    ///
    /// Accepted shapes:
    /// - create: a record object (`{"id": .., ..fields}`)
    /// - update: an object with `id` and at least one other field
    /// - delete: an id string or `{"id": ..}`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] when the value does not
    /// have the shape its action requires.
    pub fn from_json(
        kind: EntityKind,
        action: MutationAction,
        value: Value,
    ) -> ProtocolResult<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidPayload {
            kind: kind.to_string(),
            action: action.to_string(),
            reason: reason.to_string(),
        };

        let payload = match action {
            MutationAction::Create => {
                let record = Record::from_value(value).map_err(|e| invalid(&e.to_string()))?;
                MutationPayload::Create { record }
            }
            MutationAction::Update => {
                let Value::Object(mut changes) = value else {
                    return Err(invalid("expected an object"));
                };
                let id = match changes.remove("id") {
                    Some(Value::String(id)) => id,
                    _ => return Err(invalid("missing string id")),
                };
                MutationPayload::Update { id, changes }
            }
            MutationAction::Delete => {
                let id = match value {
                    Value::String(id) => id,
                    Value::Object(mut map) => match map.remove("id") {
                        Some(Value::String(id)) => id,
                        _ => return Err(invalid("missing string id")),
                    },
                    _ => return Err(invalid("expected an id or an object")),
                };
                MutationPayload::Delete { id }
            }
        };

        payload.validate(kind)?;
        Ok(payload)
    }

    /// Checks the payload invariants for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] for empty ids, updates with
    /// no changes, and updates that try to change the id.
    pub fn validate(&self, kind: EntityKind) -> ProtocolResult<()> {
        let invalid = |reason: &str| ProtocolError::InvalidPayload {
            kind: kind.to_string(),
            action: self.action().to_string(),
            reason: reason.to_string(),
        };

        if self.record_id().trim().is_empty() {
            return Err(invalid("empty id"));
        }

        if let MutationPayload::Update { changes, .. } = self {
            if changes.is_empty() {
                return Err(invalid("no changes"));
            }
            if changes.contains_key("id") {
                return Err(invalid("id cannot be changed"));
            }
        }

        Ok(())
    }
}

/// An unacknowledged local write.
///
/// Everything except the retry counter is fixed at creation. The counter
/// only ever grows, and only the mutation queue advances it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    id: MutationId,
    kind: EntityKind,
    payload: MutationPayload,
    enqueued_at: Timestamp,
    retry_count: u32,
}

impl QueuedMutation {
    /// Creates a new entry with a fresh id and no retries.
    pub fn new(kind: EntityKind, payload: MutationPayload, enqueued_at: Timestamp) -> Self {
        Self {
            id: MutationId::new(),
            kind,
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    /// Returns the mutation id.
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Returns the entity kind.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the action.
    pub fn action(&self) -> MutationAction {
        self.payload.action()
    }

    /// Returns the payload.
    pub fn payload(&self) -> &MutationPayload {
        &self.payload
    }

    /// Returns the enqueue time.
    pub fn enqueued_at(&self) -> Timestamp {
        self.enqueued_at
    }

    /// Returns how many replays have failed so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Records one more failed replay and returns the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mutation_ids_are_unique() {
        let a = MutationId::new();
        let b = MutationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<MutationId>().unwrap(), a);
        assert!("not-a-uuid".parse::<MutationId>().is_err());
    }

    #[test]
    fn action_names() {
        for action in [
            MutationAction::Create,
            MutationAction::Update,
            MutationAction::Delete,
        ] {
            assert_eq!(action.as_str().parse::<MutationAction>().unwrap(), action);
        }
        assert!("upsert".parse::<MutationAction>().is_err());
    }

    #[test]
    fn create_from_json() {
        let payload = MutationPayload::from_json(
            EntityKind::Deck,
            MutationAction::Create,
            json!({"id": "d1", "title": "Biology"}),
        )
        .unwrap();

        assert_eq!(payload.action(), MutationAction::Create);
        assert_eq!(payload.record_id(), "d1");
    }

    #[test]
    fn update_from_json_splits_id() {
        let payload = MutationPayload::from_json(
            EntityKind::Card,
            MutationAction::Update,
            json!({"id": "c1", "front": "hola"}),
        )
        .unwrap();

        match payload {
            MutationPayload::Update { id, changes } => {
                assert_eq!(id, "c1");
                assert_eq!(changes.get("front"), Some(&json!("hola")));
                assert!(!changes.contains_key("id"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn delete_from_json_accepts_both_shapes() {
        let a = MutationPayload::from_json(EntityKind::Exam, MutationAction::Delete, json!("e1"))
            .unwrap();
        let b = MutationPayload::from_json(
            EntityKind::Exam,
            MutationAction::Delete,
            json!({"id": "e1"}),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shape_is_validated_at_construction() {
        let cases = [
            (MutationAction::Create, json!({"title": "no id"})),
            (MutationAction::Create, json!(42)),
            (MutationAction::Update, json!({"id": "c1"})),
            (MutationAction::Update, json!(["c1"])),
            (MutationAction::Update, json!({"front": "no id"})),
            (MutationAction::Delete, json!({"id": ""})),
            (MutationAction::Delete, json!(7)),
        ];

        for (action, value) in cases {
            let result = MutationPayload::from_json(EntityKind::Card, action, value.clone());
            assert!(
                matches!(result, Err(ProtocolError::InvalidPayload { .. })),
                "{action} {value} should be rejected"
            );
        }
    }

    #[test]
    fn queued_mutation_retry_counter() {
        let mut mutation = QueuedMutation::new(
            EntityKind::Exam,
            MutationPayload::Delete { id: "e1".into() },
            1_000,
        );
        assert_eq!(mutation.retry_count(), 0);
        assert_eq!(mutation.action(), MutationAction::Delete);
        assert_eq!(mutation.record_failure(), 1);
        assert_eq!(mutation.record_failure(), 2);
        assert_eq!(mutation.retry_count(), 2);
    }

    #[test]
    fn queued_mutation_survives_cbor() {
        let mutation = QueuedMutation::new(
            EntityKind::Deck,
            MutationPayload::Create {
                record: Record::new("d1").with_updated_at(5).with_field("title", "Latin"),
            },
            42,
        );

        let mut bytes = Vec::new();
        ciborium::into_writer(&mutation, &mut bytes).unwrap();
        let decoded: QueuedMutation = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(decoded, mutation);
    }
}
