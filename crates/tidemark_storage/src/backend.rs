//! Key-value store trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable key-value store for sync state.
///
/// Stores are **opaque byte maps**. The sync engine owns all value
/// encoding; a store only has to keep the last value written per key.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put`
/// - `put` and `delete` are durable once they return `Ok`
/// - A failed `put` leaves the previous value intact
/// - Stores must be `Send + Sync` for shared access
///
/// # Keys
///
/// Keys are non-empty and made of ASCII letters, digits, `_`, `-`, `.`
/// and `/`. `/` is a namespace separator (`sync/queue`, `records/decks`).
/// See [`validate_key`].
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `None` if the key has never been written or was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write cannot be made
    /// durable.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lists all keys starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Checks that `key` is a valid store key.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty keys, keys with characters
/// outside `[A-Za-z0-9_.-/]`, and keys with empty or `..` segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/');
    if !key.chars().all(allowed) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    if key.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    Ok(())
}
