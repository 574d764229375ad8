//! # Tidemark Storage
//!
//! Durable key-value storage for Tidemark sync state.
//!
//! This crate provides the lowest-level persistence abstraction used by the
//! sync engine. Stores are **opaque byte maps** - they do not interpret
//! the values they hold.
//!
//! ## Design Principles
//!
//! - Stores are simple byte maps (get, put, delete, keys)
//! - A successful `put` or `delete` is durable before it returns
//! - Must be `Send + Sync` so one store can be shared by the engine
//! - The sync engine owns all value encoding
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral replicas
//! - [`FileStore`] - One file per key, atomic replace, exclusive directory lock
//!
//! ## Example
//!
//! ```rust
//! use tidemark_storage::{InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.put("sync/watermark", b"42").unwrap();
//! assert_eq!(store.get("sync/watermark").unwrap(), Some(b"42".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
