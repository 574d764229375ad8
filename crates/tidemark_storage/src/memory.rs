//! In-memory key-value store for testing.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory key-value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral replicas that don't need persistence
///
/// Writes can be made to fail with [`InMemoryStore::set_fail_writes`],
/// which is how tests simulate a full or broken disk.
///
/// # Example
///
/// ```rust
/// use tidemark_storage::{InMemoryStore, KeyValueStore};
///
/// let store = InMemoryStore::new();
/// store.put("sync/config", b"{}").unwrap();
/// assert_eq!(store.keys("sync/").unwrap(), vec!["sync/config".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `put` and `delete` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("sync/config").unwrap(), None);
    }

    #[test]
    fn memory_put_then_get() {
        let store = InMemoryStore::new();
        store.put("sync/watermark", b"100").unwrap();
        assert_eq!(store.get("sync/watermark").unwrap(), Some(b"100".to_vec()));

        store.put("sync/watermark", b"200").unwrap();
        assert_eq!(store.get("sync/watermark").unwrap(), Some(b"200".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_delete() {
        let store = InMemoryStore::new();
        store.put("sync/queue", b"x").unwrap();
        store.delete("sync/queue").unwrap();
        assert_eq!(store.get("sync/queue").unwrap(), None);

        // Deleting a missing key is fine
        store.delete("sync/queue").unwrap();
    }

    #[test]
    fn memory_keys_by_prefix() {
        let store = InMemoryStore::new();
        store.put("records/exams", b"1").unwrap();
        store.put("records/decks", b"2").unwrap();
        store.put("sync/config", b"3").unwrap();

        assert_eq!(
            store.keys("records/").unwrap(),
            vec!["records/decks".to_string(), "records/exams".to_string()]
        );
        assert_eq!(store.keys("").unwrap().len(), 3);
    }

    #[test]
    fn memory_failing_writes_keep_previous_value() {
        let store = InMemoryStore::new();
        store.put("sync/config", b"old").unwrap();

        store.set_fail_writes(true);
        assert!(matches!(
            store.put("sync/config", b"new"),
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.delete("sync/config").is_err());
        assert_eq!(store.get("sync/config").unwrap(), Some(b"old".to_vec()));

        store.set_fail_writes(false);
        store.put("sync/config", b"new").unwrap();
        assert_eq!(store.get("sync/config").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn memory_rejects_invalid_key() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.put("bad key", b"x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
