//! Last-write-wins merge of a server delta into the local replica.

use crate::error::{SyncError, SyncResult};
use crate::store::LocalStores;
use std::collections::HashMap;
use tidemark_sync_protocol::{DeltaSet, EntityKind, RecordId, Timestamp};

/// A record the reconciler could not merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Entity kind.
    pub kind: EntityKind,
    /// Record id.
    pub id: RecordId,
    /// What went wrong.
    pub error: String,
}

/// Outcome of one [`Reconciler::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records that did not exist locally.
    pub inserted: usize,
    /// Local records replaced by a newer server version.
    pub updated: usize,
    /// Server records that were not newer than the local version.
    pub unchanged: usize,
    /// Server records with an empty id.
    pub invalid: usize,
    /// Delta partitions with no registered local store.
    pub skipped_kinds: Vec<EntityKind>,
    /// Records that failed to merge.
    pub failures: Vec<RecordFailure>,
}

impl MergeReport {
    /// Returns the number of records written locally.
    pub fn merged(&self) -> usize {
        self.inserted + self.updated
    }

    /// Returns true if every record merged or was deliberately skipped.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts the report into an error if any record failed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Reconcile`] when `failures` is non-empty.
    pub fn into_result(self) -> SyncResult<MergeReport> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(SyncError::Reconcile {
                failed: self.failures.len(),
                first: format!("{}/{}: {}", first.kind, first.id, first.error),
            }),
        }
    }
}

/// Merges server deltas into local stores.
///
/// For each server record, in delta order:
/// - no local record with that id: insert it
/// - otherwise: replace the local record only if the server's effective
///   timestamp is strictly greater
///
/// Local records absent from the delta are never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Merges `delta` into `stores`.
    ///
    /// Never stops early: a failing record is reported and the merge moves
    /// on. A partition whose local records cannot be listed fails as a
    /// whole.
    pub fn merge(delta: &DeltaSet, stores: &LocalStores) -> MergeReport {
        let mut report = MergeReport::default();

        for (kind, records) in delta.partitions() {
            let Some(store) = stores.get(kind) else {
                tracing::warn!(%kind, records = records.len(), "no local store for kind, skipping");
                report.skipped_kinds.push(kind);
                continue;
            };

            // id -> effective timestamp of the version currently held locally
            let mut local: HashMap<RecordId, Timestamp> = match store.list() {
                Ok(existing) => existing
                    .iter()
                    .map(|r| (r.id.clone(), r.effective_timestamp(kind)))
                    .collect(),
                Err(e) => {
                    tracing::error!(%kind, error = %e, "failed to list local records");
                    report
                        .failures
                        .extend(records.iter().map(|r| RecordFailure {
                            kind,
                            id: r.id.clone(),
                            error: e.to_string(),
                        }));
                    continue;
                }
            };

            for record in records {
                if record.validate().is_err() {
                    tracing::warn!(%kind, "skipping server record with empty id");
                    report.invalid += 1;
                    continue;
                }

                let incoming = record.effective_timestamp(kind);
                let existing = local.get(&record.id).copied();
                if matches!(existing, Some(current) if incoming <= current) {
                    report.unchanged += 1;
                    continue;
                }

                match store.upsert(record.clone()) {
                    Ok(()) => {
                        local.insert(record.id.clone(), incoming);
                        if existing.is_some() {
                            report.updated += 1;
                        } else {
                            report.inserted += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%kind, id = %record.id, error = %e, "failed to merge record");
                        report.failures.push(RecordFailure {
                            kind,
                            id: record.id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failures.len(),
            "merge finished"
        );
        report
    }
}
