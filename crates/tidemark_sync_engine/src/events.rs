//! Sync lifecycle events.

use std::time::Duration;
use tidemark_sync_protocol::{EntityKind, MutationAction, MutationId, Timestamp};
use tokio::sync::broadcast;

/// Something observers may want to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A cycle finished and the watermark moved to `watermark`.
    SyncCompleted {
        /// New watermark.
        watermark: Timestamp,
        /// Wall time the cycle took.
        duration: Duration,
    },
    /// A cycle failed and no further automatic retry is scheduled.
    SyncFailed {
        /// Description of the last failure.
        error: String,
    },
    /// A cycle failed and will be retried after `delay`.
    RetryScheduled {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Backoff before the retry.
        delay: Duration,
    },
    /// A mutation exhausted its retries and was removed from the queue.
    MutationDropped {
        /// Mutation id.
        id: MutationId,
        /// Entity kind.
        kind: EntityKind,
        /// Action.
        action: MutationAction,
        /// Failed replays before the drop.
        retries: u32,
    },
}

impl SyncEvent {
    /// Returns a stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SyncCompleted { .. } => "sync_completed",
            SyncEvent::SyncFailed { .. } => "sync_failed",
            SyncEvent::RetryScheduled { .. } => "retry_scheduled",
            SyncEvent::MutationDropped { .. } => "mutation_dropped",
        }
    }
}

/// Fan-out of [`SyncEvent`]s to any number of subscribers.
///
/// Emitting never blocks. Subscribers that fall behind by more than the
/// channel capacity observe a lag error and skip ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event.
    pub fn emit(&self, event: SyncEvent) {
        tracing::trace!(event = event.name(), "emitting sync event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Returns a new receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(SyncEvent::SyncFailed {
            error: "offline".into(),
        });

        assert_eq!(first.recv().await.unwrap().name(), "sync_failed");
        assert_eq!(second.recv().await.unwrap().name(), "sync_failed");
    }

    #[test]
    fn emit_without_subscribers() {
        let bus = EventBus::new(1);
        bus.emit(SyncEvent::RetryScheduled {
            attempt: 1,
            delay: Duration::from_secs(2),
        });
    }
}
