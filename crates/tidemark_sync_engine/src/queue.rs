//! Durable queue of local writes awaiting server acknowledgement.

use crate::clock::Clock;
use crate::error::SyncResult;
use crate::events::{EventBus, SyncEvent};
use crate::persistence::SyncStateStore;
use crate::remote::RemoteApi;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tidemark_sync_protocol::{
    EntityKind, MutationAction, MutationId, MutationPayload, QueuedMutation,
};

/// Outcome of one [`MutationQueue::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Mutations the server acknowledged; removed from the queue.
    pub acknowledged: Vec<MutationId>,
    /// Mutations that failed and stay queued with a higher retry count.
    pub failed: Vec<MutationId>,
    /// Mutations that failed past the retry bound; removed from the queue.
    pub dropped: Vec<MutationId>,
    /// Queue length after the drain.
    pub remaining: usize,
}

impl DrainReport {
    /// Returns the number of mutations replayed.
    pub fn attempted(&self) -> usize {
        self.acknowledged.len() + self.failed.len() + self.dropped.len()
    }
}

enum Failure {
    Retried(u32),
    Dropped(u32),
    Gone,
}

/// FIFO of [`QueuedMutation`]s.
///
/// Every change is written to the [`SyncStateStore`] before it becomes
/// visible in memory, so the in-memory queue never runs ahead of disk.
pub struct MutationQueue {
    entries: Mutex<Vec<QueuedMutation>>,
    state: SyncStateStore,
    clock: Arc<dyn Clock>,
    events: EventBus,
    max_retries: u32,
}

impl MutationQueue {
    /// Loads the persisted queue.
    ///
    /// `max_retries` is the number of failed replays a mutation survives;
    /// the next failure drops it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    pub fn open(
        state: SyncStateStore,
        clock: Arc<dyn Clock>,
        events: EventBus,
        max_retries: u32,
    ) -> SyncResult<Self> {
        let entries = state.load_queue()?;
        if !entries.is_empty() {
            tracing::info!(pending = entries.len(), "restored mutation queue");
        }
        Ok(Self {
            entries: Mutex::new(entries),
            state,
            clock,
            events,
            max_retries,
        })
    }

    /// Validates and queues an untyped mutation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::InvalidMutation`] if `payload` does not
    /// fit `action`, or a storage error if the queue cannot be persisted.
    /// In both cases nothing is queued.
    pub fn enqueue(
        &self,
        kind: EntityKind,
        action: MutationAction,
        payload: Value,
    ) -> SyncResult<MutationId> {
        let payload = MutationPayload::from_json(kind, action, payload)?;
        self.enqueue_payload(kind, payload)
    }

    /// Queues a typed mutation.
    ///
    /// # Errors
    ///
    /// Same as [`MutationQueue::enqueue`].
    pub fn enqueue_payload(
        &self,
        kind: EntityKind,
        payload: MutationPayload,
    ) -> SyncResult<MutationId> {
        payload.validate(kind)?;
        let mutation = QueuedMutation::new(kind, payload, self.clock.now());
        let id = mutation.id();
        let action = mutation.action();

        self.update(|entries| entries.push(mutation))?;
        tracing::debug!(mutation_id = %id, %kind, %action, "mutation queued");
        Ok(id)
    }

    /// Replays every queued mutation in order.
    ///
    /// Entries are independent: a failing entry is retried on the next
    /// drain while later entries still run. Only a failure to persist the
    /// queue aborts the drain.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be persisted.
    pub async fn drain<R: RemoteApi + ?Sized>(&self, remote: &R) -> SyncResult<DrainReport> {
        let snapshot = self.pending();
        let mut report = DrainReport::default();

        for mutation in snapshot {
            let id = mutation.id();
            let kind = mutation.kind();
            let action = mutation.action();

            match remote.replay(kind, mutation.payload(), id).await {
                Ok(()) => {
                    self.update(|entries| entries.retain(|m| m.id() != id))?;
                    tracing::debug!(mutation_id = %id, %kind, %action, "mutation acknowledged");
                    report.acknowledged.push(id);
                }
                Err(e) => {
                    let max = self.max_retries;
                    let failure = self.update(|entries| {
                        let Some(pos) = entries.iter().position(|m| m.id() == id) else {
                            return Failure::Gone;
                        };
                        if entries[pos].retry_count() >= max {
                            Failure::Dropped(entries.remove(pos).retry_count())
                        } else {
                            Failure::Retried(entries[pos].record_failure())
                        }
                    })?;

                    match failure {
                        Failure::Retried(retries) => {
                            tracing::debug!(
                                mutation_id = %id,
                                %kind,
                                %action,
                                retries,
                                error = %e,
                                "mutation replay failed"
                            );
                            report.failed.push(id);
                        }
                        Failure::Dropped(retries) => {
                            tracing::warn!(
                                mutation_id = %id,
                                %kind,
                                %action,
                                retries,
                                error = %e,
                                "mutation dropped after exhausting retries"
                            );
                            self.events.emit(SyncEvent::MutationDropped {
                                id,
                                kind,
                                action,
                                retries,
                            });
                            report.dropped.push(id);
                        }
                        Failure::Gone => {}
                    }
                }
            }
        }

        report.remaining = self.len();
        Ok(report)
    }

    /// Returns the number of queued mutations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Same as [`MutationQueue::len`].
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns a snapshot of the queued mutations, oldest first.
    pub fn pending(&self) -> Vec<QueuedMutation> {
        self.entries.lock().clone()
    }

    fn update<T>(&self, f: impl FnOnce(&mut Vec<QueuedMutation>) -> T) -> SyncResult<T> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        let out = f(&mut next);
        self.state.save_queue(&next)?;
        *entries = next;
        Ok(out)
    }
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationQueue")
            .field("len", &self.len())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SyncError;
    use crate::remote::{MockRemote, RemoteCall};
    use serde_json::json;
    use tidemark_storage::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        events: EventBus,
        queue: MutationQueue,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let events = EventBus::new(16);
        let queue = MutationQueue::open(
            SyncStateStore::new(store.clone()),
            Arc::new(ManualClock::new(1_000)),
            events.clone(),
            3,
        )
        .unwrap();
        Fixture {
            store,
            events,
            queue,
        }
    }

    #[test]
    fn enqueue_persists_immediately() {
        let f = fixture();
        let id = f
            .queue
            .enqueue(
                EntityKind::Deck,
                MutationAction::Create,
                json!({"id": "d1", "title": "Chemistry"}),
            )
            .unwrap();

        assert_eq!(f.queue.size(), 1);
        let pending = f.queue.pending();
        assert_eq!(pending[0].id(), id);
        assert_eq!(pending[0].enqueued_at(), 1_000);
        assert_eq!(pending[0].retry_count(), 0);

        let reopened = MutationQueue::open(
            SyncStateStore::new(f.store.clone()),
            Arc::new(ManualClock::new(0)),
            EventBus::new(1),
            3,
        )
        .unwrap();
        assert_eq!(reopened.pending(), pending);
    }

    #[test]
    fn enqueue_rejects_malformed_payload() {
        let f = fixture();
        let result = f
            .queue
            .enqueue(EntityKind::Card, MutationAction::Update, json!({"id": "c1"}));
        assert!(matches!(result, Err(SyncError::InvalidMutation(_))));
        assert!(f.queue.is_empty());
    }

    #[test]
    fn enqueue_failure_leaves_queue_unchanged() {
        let f = fixture();
        f.store.set_fail_writes(true);
        let result = f.queue.enqueue_payload(
            EntityKind::Exam,
            MutationPayload::Delete { id: "e1".into() },
        );
        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn drain_keeps_failures_in_order() {
        let f = fixture();
        let remote = MockRemote::new();
        remote.fail_record_always("e1");

        let deck = f
            .queue
            .enqueue(EntityKind::Deck, MutationAction::Create, json!({"id": "D1"}))
            .unwrap();
        let exam = f
            .queue
            .enqueue(EntityKind::Exam, MutationAction::Delete, json!("e1"))
            .unwrap();

        let report = f.queue.drain(&remote).await.unwrap();
        assert_eq!(report.acknowledged, vec![deck]);
        assert_eq!(report.failed, vec![exam]);
        assert_eq!(report.remaining, 1);

        let pending = f.queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), exam);
        assert_eq!(pending[0].retry_count(), 1);

        // Replays send the mutation id as idempotency key
        assert_eq!(
            remote.mutation_calls()[0],
            RemoteCall::Create {
                kind: EntityKind::Deck,
                id: "D1".into(),
                key: deck
            }
        );
    }

    #[tokio::test]
    async fn fourth_failure_drops_mutation() {
        let f = fixture();
        let mut events = f.events.subscribe();
        let remote = MockRemote::new();
        remote.fail_record_always("c9");

        let id = f
            .queue
            .enqueue_payload(EntityKind::Card, MutationPayload::Delete { id: "c9".into() })
            .unwrap();

        for expected in 1..=3 {
            let report = f.queue.drain(&remote).await.unwrap();
            assert_eq!(report.failed, vec![id]);
            assert_eq!(f.queue.pending()[0].retry_count(), expected);
        }

        let report = f.queue.drain(&remote).await.unwrap();
        assert_eq!(report.dropped, vec![id]);
        assert!(f.queue.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::MutationDropped {
                id,
                kind: EntityKind::Card,
                action: MutationAction::Delete,
                retries: 3
            }
        );
    }

    #[tokio::test]
    async fn drain_aborts_when_queue_cannot_persist() {
        let f = fixture();
        let remote = MockRemote::new();
        f.queue
            .enqueue(EntityKind::Deck, MutationAction::Delete, json!("d1"))
            .unwrap();

        f.store.set_fail_writes(true);
        assert!(matches!(
            f.queue.drain(&remote).await,
            Err(SyncError::Storage(_))
        ));
        // Still queued; the replay is repeated next time under the same key
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn empty_drain() {
        let f = fixture();
        let report = f.queue.drain(&MockRemote::new()).await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(report.attempted(), 0);
    }
}
