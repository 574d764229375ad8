//! Remote API abstraction.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tidemark_sync_protocol::{DeltaSet, EntityKind, MutationId, MutationPayload, Record, Timestamp};

/// The server side of synchronization.
///
/// Implementations enforce their own per-call timeouts and report them as
/// [`RemoteError::Timeout`]. Every mutation call carries the queued
/// mutation's id as an idempotency key.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetches everything that changed after `since`. `since = 0` returns a
    /// full snapshot.
    async fn get_changes(&self, since: Timestamp) -> RemoteResult<DeltaSet>;

    /// Creates a record.
    async fn create(
        &self,
        kind: EntityKind,
        record: &Record,
        key: MutationId,
    ) -> RemoteResult<()>;

    /// Applies a partial update to a record.
    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        changes: &Map<String, Value>,
        key: MutationId,
    ) -> RemoteResult<()>;

    /// Deletes a record.
    async fn delete(&self, kind: EntityKind, id: &str, key: MutationId) -> RemoteResult<()>;

    /// Replays one queued mutation.
    async fn replay(
        &self,
        kind: EntityKind,
        payload: &MutationPayload,
        key: MutationId,
    ) -> RemoteResult<()> {
        match payload {
            MutationPayload::Create { record } => self.create(kind, record, key).await,
            MutationPayload::Update { id, changes } => self.update(kind, id, changes, key).await,
            MutationPayload::Delete { id } => self.delete(kind, id, key).await,
        }
    }
}

/// A call observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `get_changes(since)`.
    GetChanges {
        /// Requested watermark.
        since: Timestamp,
    },
    /// `create`.
    Create {
        /// Entity kind.
        kind: EntityKind,
        /// Record id.
        id: String,
        /// Idempotency key.
        key: MutationId,
    },
    /// `update`.
    Update {
        /// Entity kind.
        kind: EntityKind,
        /// Record id.
        id: String,
        /// Idempotency key.
        key: MutationId,
    },
    /// `delete`.
    Delete {
        /// Entity kind.
        kind: EntityKind,
        /// Record id.
        id: String,
        /// Idempotency key.
        key: MutationId,
    },
}

impl RemoteCall {
    /// Returns true for create, update and delete calls.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, RemoteCall::GetChanges { .. })
    }
}

#[derive(Debug, Default)]
struct MockState {
    scripted: VecDeque<RemoteResult<DeltaSet>>,
    default_changes: DeltaSet,
    fetch_delay: Option<Duration>,
    // Remaining failures per record id; u32::MAX means forever
    record_failures: HashMap<String, u32>,
    calls: Vec<RemoteCall>,
}

/// A scriptable in-process remote for tests and demos.
///
/// Fetches return queued results first and fall back to a fixed delta.
/// Mutation calls succeed unless a failure is scripted for the record id.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Creates a remote that returns empty deltas and accepts all
    /// mutations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next unscripted fetch.
    pub fn push_changes(&self, delta: DeltaSet) {
        self.state.lock().scripted.push_back(Ok(delta));
    }

    /// Queues a failing fetch.
    pub fn push_fetch_error(&self, error: RemoteError) {
        self.state.lock().scripted.push_back(Err(error));
    }

    /// Sets the delta returned when nothing is queued.
    pub fn set_changes(&self, delta: DeltaSet) {
        self.state.lock().default_changes = delta;
    }

    /// Delays every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = Some(delay);
    }

    /// Makes the next `times` mutation calls for record `id` fail.
    pub fn fail_record(&self, id: impl Into<String>, times: u32) {
        self.state.lock().record_failures.insert(id.into(), times);
    }

    /// Makes every mutation call for record `id` fail.
    pub fn fail_record_always(&self, id: impl Into<String>) {
        self.fail_record(id, u32::MAX);
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the number of fetches received.
    pub fn fetch_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| !c.is_mutation())
            .count()
    }

    /// Returns the mutation calls received, in order.
    pub fn mutation_calls(&self) -> Vec<RemoteCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    fn record_mutation(&self, call: RemoteCall, id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.record_failures.get_mut(id) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                Err(RemoteError::Rejected {
                    status: 503,
                    message: format!("scripted failure for {id}"),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn get_changes(&self, since: Timestamp) -> RemoteResult<DeltaSet> {
        let (delay, result) = {
            let mut state = self.state.lock();
            state.calls.push(RemoteCall::GetChanges { since });
            let result = match state.scripted.pop_front() {
                Some(result) => result,
                None => Ok(state.default_changes.clone()),
            };
            (state.fetch_delay, result)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn create(
        &self,
        kind: EntityKind,
        record: &Record,
        key: MutationId,
    ) -> RemoteResult<()> {
        let call = RemoteCall::Create {
            kind,
            id: record.id.clone(),
            key,
        };
        self.record_mutation(call, &record.id)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        _changes: &Map<String, Value>,
        key: MutationId,
    ) -> RemoteResult<()> {
        let call = RemoteCall::Update {
            kind,
            id: id.to_string(),
            key,
        };
        self.record_mutation(call, id)
    }

    async fn delete(&self, kind: EntityKind, id: &str, key: MutationId) -> RemoteResult<()> {
        let call = RemoteCall::Delete {
            kind,
            id: id.to_string(),
            key,
        };
        self.record_mutation(call, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_fetches_then_default() {
        let remote = MockRemote::new();
        remote.set_changes(DeltaSet::new().with_records(EntityKind::Deck, vec![Record::new("d1")]));
        remote.push_fetch_error(RemoteError::Timeout);
        remote.push_changes(DeltaSet::new());

        assert_eq!(remote.get_changes(0).await, Err(RemoteError::Timeout));
        assert!(remote.get_changes(0).await.unwrap().is_empty());
        assert_eq!(remote.get_changes(5).await.unwrap().record_count(), 1);

        assert_eq!(remote.fetch_count(), 3);
        assert_eq!(remote.calls()[2], RemoteCall::GetChanges { since: 5 });
    }

    #[tokio::test]
    async fn scripted_record_failures() {
        let remote = MockRemote::new();
        remote.fail_record("e1", 2);
        let key = MutationId::new();

        assert!(remote.delete(EntityKind::Exam, "e1", key).await.is_err());
        assert!(remote.delete(EntityKind::Exam, "e1", key).await.is_err());
        assert!(remote.delete(EntityKind::Exam, "e1", key).await.is_ok());
        assert!(remote.delete(EntityKind::Exam, "e2", key).await.is_ok());
        assert_eq!(remote.mutation_calls().len(), 4);
    }

    #[tokio::test]
    async fn replay_dispatches_on_payload() {
        let remote = MockRemote::new();
        let key = MutationId::new();
        let mut changes = Map::new();
        changes.insert("front".into(), Value::from("hola"));

        remote
            .replay(
                EntityKind::Card,
                &MutationPayload::Update {
                    id: "c1".into(),
                    changes,
                },
                key,
            )
            .await
            .unwrap();

        assert_eq!(
            remote.mutation_calls(),
            vec![RemoteCall::Update {
                kind: EntityKind::Card,
                id: "c1".into(),
                key
            }]
        );
    }
}
