//! CLI command implementations.

pub mod config;
pub mod enqueue;
pub mod inspect;

use std::path::Path;
use std::sync::Arc;
use tidemark_storage::{FileStore, KeyValueStore};
use tidemark_sync_engine::SyncStateStore;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens the sync state directory at `path`.
///
/// Fails if the directory does not exist, or if it is locked by a running
/// application.
pub fn open_state(path: &Path) -> CommandResult<(Arc<dyn KeyValueStore>, SyncStateStore)> {
    if !path.is_dir() {
        return Err(format!("No sync state found at {:?}", path).into());
    }
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(path)?);
    let state = SyncStateStore::new(store.clone());
    Ok((store, state))
}
