//! Durable engine state: configuration, watermark and mutation queue.
//!
//! All values are CBOR-encoded under fixed keys in a [`KeyValueStore`].
//! Loading is forgiving: missing or unreadable config and watermark fall
//! back to defaults, and an unreadable queue is moved aside so the engine
//! can still start.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tidemark_storage::KeyValueStore;
use tidemark_sync_protocol::{QueuedMutation, Timestamp};

/// Key of the persisted [`SyncConfig`].
pub const CONFIG_KEY: &str = "sync/config";
/// Key of the persisted watermark.
pub const WATERMARK_KEY: &str = "sync/watermark";
/// Key of the persisted mutation queue.
pub const QUEUE_KEY: &str = "sync/queue";
/// Key an undecodable queue is moved to.
pub const CORRUPT_QUEUE_KEY: &str = "sync/queue.corrupt";

/// Typed access to the engine's persisted state.
#[derive(Clone)]
pub struct SyncStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl SyncStateStore {
    /// Wraps a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Loads the configuration, or the default if none is stored or the
    /// stored value cannot be read.
    pub fn load_config(&self) -> SyncConfig {
        match self.read::<SyncConfig>(CONFIG_KEY) {
            Ok(Some(config)) if config.validate().is_ok() => config,
            Ok(Some(_)) => {
                tracing::warn!("stored sync config is invalid, using defaults");
                SyncConfig::default()
            }
            Ok(None) => SyncConfig::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load sync config, using defaults");
                SyncConfig::default()
            }
        }
    }

    /// Persists the configuration.
    pub fn save_config(&self, config: &SyncConfig) -> SyncResult<()> {
        self.write(CONFIG_KEY, config)
    }

    /// Loads the watermark, or 0 if none is stored or it cannot be read.
    pub fn load_watermark(&self) -> Timestamp {
        match self.read::<Timestamp>(WATERMARK_KEY) {
            Ok(Some(watermark)) => watermark,
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load watermark, starting from 0");
                0
            }
        }
    }

    /// Persists the watermark.
    pub fn save_watermark(&self, watermark: Timestamp) -> SyncResult<()> {
        self.write(WATERMARK_KEY, &watermark)
    }

    /// Loads the mutation queue.
    ///
    /// If the stored queue cannot be decoded, its bytes are moved to
    /// [`CORRUPT_QUEUE_KEY`] and an empty queue is returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying store fails.
    pub fn load_queue(&self) -> SyncResult<Vec<QueuedMutation>> {
        let Some(bytes) = self.store.get(QUEUE_KEY)? else {
            return Ok(Vec::new());
        };

        match decode::<Vec<QueuedMutation>>(&bytes) {
            Ok(queue) => Ok(queue),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bytes = bytes.len(),
                    key = CORRUPT_QUEUE_KEY,
                    "mutation queue is unreadable, moving it aside"
                );
                self.store.put(CORRUPT_QUEUE_KEY, &bytes)?;
                self.store.delete(QUEUE_KEY)?;
                Ok(Vec::new())
            }
        }
    }

    /// Persists the whole mutation queue.
    pub fn save_queue(&self, queue: &[QueuedMutation]) -> SyncResult<()> {
        self.write(QUEUE_KEY, queue)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> SyncResult<Option<T>> {
        match self.store.get(key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SyncResult<()> {
        let bytes = encode(value)?;
        self.store.put(key, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for SyncStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateStore").finish_non_exhaustive()
    }
}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> SyncResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SyncResult<T> {
    ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
}
