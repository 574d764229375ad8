//! Server changes since a watermark.

use crate::kind::EntityKind;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type WireDelta = BTreeMap<String, Vec<Record>>;

/// Records the server changed since a given watermark, partitioned by kind.
///
/// A delta is additive: it lists changed records, never deletions, and
/// records absent from it are unchanged on the server.
///
/// On the wire a delta is a JSON object keyed by kind name:
///
/// ```json
/// { "decks": [ {"id": "d1", "updated_at": 1500} ], "exams": [] }
/// ```
///
/// Partitions for kinds this client does not know are dropped while
/// decoding; their names are kept in [`DeltaSet::ignored_partitions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDelta", into = "WireDelta")]
pub struct DeltaSet {
    partitions: BTreeMap<EntityKind, Vec<Record>>,
    ignored: Vec<String>,
}

impl DeltaSet {
    /// Creates an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the partition for `kind`.
    pub fn push(&mut self, kind: EntityKind, record: Record) {
        self.partitions.entry(kind).or_default().push(record);
    }

    /// Builder form of [`DeltaSet::push`] for a whole partition.
    pub fn with_records(mut self, kind: EntityKind, records: Vec<Record>) -> Self {
        self.partitions.entry(kind).or_default().extend(records);
        self
    }

    /// Returns the records for `kind`, in server order.
    pub fn partition(&self, kind: EntityKind) -> &[Record] {
        self.partitions
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates over non-empty partitions in kind order.
    pub fn partitions(&self) -> impl Iterator<Item = (EntityKind, &[Record])> {
        self.partitions
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(kind, records)| (*kind, records.as_slice()))
    }

    /// Returns the total number of records across partitions.
    pub fn record_count(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    /// Returns true if the delta carries no records.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Returns the names of wire partitions that were not understood.
    pub fn ignored_partitions(&self) -> &[String] {
        &self.ignored
    }
}

impl From<WireDelta> for DeltaSet {
    fn from(wire: WireDelta) -> Self {
        let mut delta = DeltaSet::new();
        for (name, records) in wire {
            match name.parse::<EntityKind>() {
                Ok(kind) => delta.partitions.entry(kind).or_default().extend(records),
                Err(_) => delta.ignored.push(name),
            }
        }
        delta
    }
}

impl From<DeltaSet> for WireDelta {
    fn from(delta: DeltaSet) -> Self {
        delta
            .partitions
            .into_iter()
            .map(|(kind, records)| (kind.as_str().to_string(), records))
            .collect()
    }
}
