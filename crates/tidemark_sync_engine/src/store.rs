//! Local replica adapters.
//!
//! The engine never owns the application's records. It reads and writes
//! them through one [`LocalStore`] per [`EntityKind`], collected in a
//! [`LocalStores`] registry.

use crate::error::{StoreError, StoreResult};
use crate::persistence::{decode, encode};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidemark_storage::KeyValueStore;
use tidemark_sync_protocol::{EntityKind, Record};

/// Access to the local records of one entity kind.
///
/// Calls are synchronous. A successful `upsert` must be durable before it
/// returns.
pub trait LocalStore: Send + Sync {
    /// Returns every local record of this kind.
    fn list(&self) -> StoreResult<Vec<Record>>;

    /// Inserts `record`, or replaces the record with the same id.
    fn upsert(&self, record: Record) -> StoreResult<()>;
}

/// One [`LocalStore`] per entity kind.
#[derive(Clone, Default)]
pub struct LocalStores {
    stores: HashMap<EntityKind, Arc<dyn LocalStore>>,
}

impl LocalStores {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`LocalStores::register`].
    pub fn with(mut self, kind: EntityKind, store: Arc<dyn LocalStore>) -> Self {
        self.register(kind, store);
        self
    }

    /// Registers the store for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: EntityKind, store: Arc<dyn LocalStore>) {
        self.stores.insert(kind, store);
    }

    /// Returns the store for `kind`.
    pub fn get(&self, kind: EntityKind) -> Option<&Arc<dyn LocalStore>> {
        self.stores.get(&kind)
    }

    /// Returns the registered kinds in kind order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<_> = self.stores.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for LocalStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStores")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// In-memory [`LocalStore`] that keeps insertion order.
///
/// Failure injection hooks make it usable for reconcile-failure tests.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    records: RwLock<Vec<Record>>,
    failing_ids: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Makes every upsert of `id` fail until cleared.
    pub fn fail_upserts_for(&self, id: impl Into<String>) {
        self.failing_ids.lock().insert(id.into());
    }

    /// Clears all upsert failures.
    pub fn clear_failures(&self) {
        self.failing_ids.lock().clear();
    }

    /// Makes `list` fail.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Returns the record with `id`.
    pub fn get(&self, id: &str) -> Option<Record> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }

    /// Returns a snapshot of all records.
    pub fn records(&self) -> Vec<Record> {
        self.records.read().clone()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl LocalStore for MemoryLocalStore {
    fn list(&self) -> StoreResult<Vec<Record>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("list failure injected".into()));
        }
        Ok(self.records())
    }

    fn upsert(&self, record: Record) -> StoreResult<()> {
        if self.failing_ids.lock().contains(&record.id) {
            return Err(StoreError::Unavailable(format!(
                "upsert failure injected for {}",
                record.id
            )));
        }

        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }
}

/// [`LocalStore`] that keeps all records of one kind as a single CBOR
/// value under `records/<kind>` in a [`KeyValueStore`].
pub struct KvLocalStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    write_lock: Mutex<()>,
}

impl KvLocalStore {
    /// Creates the adapter for `kind`.
    pub fn new(store: Arc<dyn KeyValueStore>, kind: EntityKind) -> Self {
        Self {
            store,
            key: format!("records/{}", kind.as_str()),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the key the records live under.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn load(&self) -> StoreResult<Vec<Record>> {
        match self.store.get(&self.key)? {
            Some(bytes) => decode(&bytes).map_err(|e| StoreError::Codec(e.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

impl LocalStore for KvLocalStore {
    fn list(&self) -> StoreResult<Vec<Record>> {
        self.load()
    }

    fn upsert(&self, record: Record) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        let bytes = encode(&records).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.store.put(&self.key, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for KvLocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvLocalStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
