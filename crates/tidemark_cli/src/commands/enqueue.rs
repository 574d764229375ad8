//! Enqueue command implementation.

use super::{open_state, CommandResult};
use std::path::Path;
use std::sync::Arc;
use tidemark_sync_engine::{EventBus, MutationQueue, RetryPolicy, SystemClock};
use tidemark_sync_protocol::{EntityKind, MutationAction, MutationId};

/// Runs the enqueue command.
pub fn run(path: &Path, kind: &str, action: &str, payload: &str) -> CommandResult<()> {
    let id = enqueue(path, kind, action, payload)?;
    println!("Queued mutation {id}");
    Ok(())
}

/// Validates and queues one mutation.
pub fn enqueue(
    path: &Path,
    kind: &str,
    action: &str,
    payload: &str,
) -> CommandResult<MutationId> {
    let kind: EntityKind = kind.parse()?;
    let action: MutationAction = action.parse()?;
    let payload: serde_json::Value = serde_json::from_str(payload)?;

    let (_, state) = open_state(path)?;
    let queue = MutationQueue::open(
        state,
        Arc::new(SystemClock),
        EventBus::new(1),
        RetryPolicy::default().max_mutation_retries,
    )?;

    let id = queue.enqueue(kind, action, payload)?;
    tracing::info!("Queued {} {} as {}; {} pending", action, kind, id, queue.len());
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_appends_to_queue() {
        let dir = tempfile::tempdir().unwrap();
        let first = enqueue(dir.path(), "deck", "create", r#"{"id": "d1"}"#).unwrap();
        let second = enqueue(dir.path(), "exams", "delete", r#""e1""#).unwrap();

        let result = crate::commands::inspect::collect(dir.path(), false).unwrap();
        let ids: Vec<_> = result.pending.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn enqueue_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enqueue(dir.path(), "quizzes", "create", r#"{"id": "q1"}"#).is_err());
        assert!(enqueue(dir.path(), "decks", "upsert", r#"{"id": "d1"}"#).is_err());
        assert!(enqueue(dir.path(), "decks", "update", r#"{"id": "d1"}"#).is_err());
        assert!(enqueue(dir.path(), "decks", "create", "{not json").is_err());
    }
}
