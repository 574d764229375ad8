//! File-based key-value store for persistent sync state.
//!
//! Directory layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                  # Advisory lock, one owner per directory
//! ├─ sync~config.kv        # value of key "sync/config"
//! ├─ sync~queue.kv         # value of key "sync/queue"
//! └─ records~decks.kv      # value of key "records/decks"
//! ```

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const VALUE_SUFFIX: &str = ".kv";
const TEMP_SUFFIX: &str = ".kv.tmp";

/// A file-based key-value store.
///
/// Each key is stored in its own file. Values survive process restarts.
///
/// # Durability
///
/// `put` uses the write-then-rename pattern:
/// 1. Write the value to a temporary file
/// 2. `sync_all` the temporary file
/// 3. Rename it over the value file
/// 4. Fsync the directory (Unix)
///
/// A crash at any point leaves either the old or the new value.
///
/// # Locking
///
/// The store holds an exclusive advisory lock on `<root>/LOCK` for its
/// whole lifetime. Opening the same directory twice fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use tidemark_storage::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("replica")).unwrap();
/// store.put("sync/watermark", b"1700000000000").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - `root` exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    pub fn open(root: &Path) -> StorageResult<Self> {
        if !root.exists() {
            fs::create_dir_all(root)?;
        }

        if !root.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("path is not a directory: {}", root.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(root.display().to_string()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn file_name(key: &str) -> String {
        format!("{}{}", key.replace('/', "~"), VALUE_SUFFIX)
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(Self::file_name(key))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{}", key.replace('/', "~"), TEMP_SUFFIX))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.value_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        let temp_path = self.temp_path(key);
        let mut file = File::create(&temp_path)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.value_path(key))?;
        self.sync_directory()
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(VALUE_SUFFIX) {
                let key = stem.replace('~', "/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("replica");

        let store = FileStore::open(&root).unwrap();
        assert!(root.join(LOCK_FILE).exists());
        assert_eq!(store.get("sync/config").unwrap(), None);
        assert!(store.keys("").unwrap().is_empty());
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("sync/watermark", b"1500").unwrap();
        assert_eq!(store.get("sync/watermark").unwrap(), Some(b"1500".to_vec()));
        assert!(dir.path().join("sync~watermark.kv").exists());
        assert!(!dir.path().join("sync~watermark.kv.tmp").exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("sync/queue", b"pending").unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(store.get("sync/queue").unwrap(), Some(b"pending".to_vec()));
        }
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn file_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("records/decks", b"x").unwrap();
        store.delete("records/decks").unwrap();
        assert_eq!(store.get("records/decks").unwrap(), None);
        store.delete("records/decks").unwrap();
    }

    #[test]
    fn file_keys_by_prefix() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("records/exams", b"1").unwrap();
        store.put("records/decks", b"2").unwrap();
        store.put("sync/config", b"3").unwrap();

        assert_eq!(
            store.keys("records/").unwrap(),
            vec!["records/decks".to_string(), "records/exams".to_string()]
        );
    }

    #[test]
    fn file_rejects_invalid_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("../escape", b"x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.path(), dir.path());
    }
}
