//! Inspect command implementation.

use super::{open_state, CommandResult};
use serde::Serialize;
use std::path::Path;
use tidemark_storage::KeyValueStore;
use tidemark_sync_engine::{KvLocalStore, LocalStore, SyncConfig, CORRUPT_QUEUE_KEY};
use tidemark_sync_protocol::{EntityKind, QueuedMutation, Timestamp};

/// Sync state inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// State directory.
    pub path: String,
    /// Persisted configuration.
    pub config: SyncConfig,
    /// Last successful sync, 0 if never synced.
    pub watermark: Timestamp,
    /// Queued mutations, oldest first.
    pub pending: Vec<QueuedMutation>,
    /// Whether an unreadable queue was moved aside at some point.
    pub corrupt_queue: bool,
    /// Record counts per kind (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<KindStats>>,
}

/// Local records held for one kind.
#[derive(Debug, Serialize)]
pub struct KindStats {
    /// Entity kind.
    pub kind: EntityKind,
    /// Number of records.
    pub count: usize,
    /// Newest effective timestamp.
    pub newest: Option<Timestamp>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_records: bool, format: &str) -> CommandResult<()> {
    let result = collect(path, show_records)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Reads the sync state at `path`.
pub fn collect(path: &Path, show_records: bool) -> CommandResult<InspectResult> {
    let (store, state) = open_state(path)?;
    tracing::debug!("Inspecting sync state at {:?}", path);

    let mut result = InspectResult {
        path: path.display().to_string(),
        config: state.load_config(),
        watermark: state.load_watermark(),
        pending: state.load_queue()?,
        corrupt_queue: store.get(CORRUPT_QUEUE_KEY)?.is_some(),
        records: None,
    };

    if show_records {
        result.records = Some(record_stats(&store)?);
    }

    Ok(result)
}

fn record_stats(
    store: &std::sync::Arc<dyn KeyValueStore>,
) -> CommandResult<Vec<KindStats>> {
    let mut stats = Vec::new();
    for kind in EntityKind::ALL {
        let records = KvLocalStore::new(store.clone(), kind).list()?;
        stats.push(KindStats {
            kind,
            count: records.len(),
            newest: records.iter().map(|r| r.effective_timestamp(kind)).max(),
        });
    }
    Ok(stats)
}

fn print_text_output(result: &InspectResult) {
    println!("Sync State: {}", result.path);
    println!();
    println!("Configuration:");
    println!("  Sync enabled:      {}", result.config.globally_enabled);
    println!("  Auto sync:         {}", result.config.auto_sync_enabled);
    println!(
        "  Interval:          {} ms",
        result.config.sync_interval.as_millis()
    );
    println!();

    if result.watermark > 0 {
        println!("Watermark:           {}", result.watermark);
    } else {
        println!("Watermark:           never synced");
    }
    println!();

    println!("Pending mutations:   {}", result.pending.len());
    for mutation in &result.pending {
        println!(
            "  {}  {:<14} {:<6} {:<20} retries={} enqueued_at={}",
            mutation.id(),
            mutation.kind().as_str(),
            mutation.action().as_str(),
            mutation.payload().record_id(),
            mutation.retry_count(),
            mutation.enqueued_at()
        );
    }

    if result.corrupt_queue {
        println!();
        println!("WARNING: an unreadable queue was moved to {CORRUPT_QUEUE_KEY}");
    }

    if let Some(records) = &result.records {
        println!();
        println!("Local records:");
        for stats in records {
            match stats.newest {
                Some(newest) => println!(
                    "  {:<14} {:>6} (newest {})",
                    stats.kind.as_str(),
                    stats.count,
                    newest
                ),
                None => println!("  {:<14} {:>6}", stats.kind.as_str(), stats.count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidemark_storage::FileStore;
    use tidemark_sync_engine::SyncStateStore;
    use tidemark_sync_protocol::{MutationPayload, Record};

    #[test]
    fn inspect_reads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).unwrap());
            let state = SyncStateStore::new(store.clone());
            state.save_watermark(42).unwrap();
            state
                .save_queue(&[QueuedMutation::new(
                    EntityKind::Card,
                    MutationPayload::Delete { id: "c1".into() },
                    7,
                )])
                .unwrap();
            KvLocalStore::new(store, EntityKind::Exam)
                .upsert(Record::new("e1").with_completed_at(900))
                .unwrap();
        }

        let result = collect(dir.path(), true).unwrap();
        assert_eq!(result.watermark, 42);
        assert_eq!(result.pending.len(), 1);
        assert!(!result.corrupt_queue);

        let records = result.records.unwrap();
        let exams = records.iter().find(|s| s.kind == EntityKind::Exam).unwrap();
        assert_eq!(exams.count, 1);
        assert_eq!(exams.newest, Some(900));
    }

    #[test]
    fn inspect_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect(&dir.path().join("missing"), false).is_err());
    }
}
