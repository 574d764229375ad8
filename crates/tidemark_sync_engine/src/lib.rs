//! # Tidemark Sync Engine
//!
//! Offline-first sync engine for Tidemark replicas.
//!
//! This crate provides:
//! - Durable mutation queue with per-entry retry bounds
//! - Last-write-wins reconciler for server deltas
//! - Sync coordinator (idle → running → backoff) with timer,
//!   connectivity and visibility triggers
//! - Remote API abstraction with HTTP and mock implementations
//! - Local store adapters backed by memory or a key-value store
//!
//! ## Architecture
//!
//! Each cycle runs **fetch, merge, drain, advance**:
//! 1. Fetch the server delta since the watermark
//! 2. Merge it into the local stores (last write wins)
//! 3. Replay queued local mutations against the server
//! 4. Advance and persist the watermark
//!
//! A failure anywhere leaves the watermark where it was and schedules an
//! exponential backoff retry.
//!
//! ## Key Invariants
//!
//! - At most one cycle runs at a time
//! - The watermark only moves forward, and only after a full cycle
//! - Merging is additive; local records are never deleted by a delta
//! - Every queue change is durable before it is visible
//! - Replays carry the mutation id as an idempotency key

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod coordinator;
mod error;
mod events;
mod http;
mod persistence;
mod queue;
mod reconciler;
mod remote;
mod signals;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineOptions, RetryPolicy, SyncConfig, SyncConfigPatch, MIN_SYNC_INTERVAL};
pub use coordinator::{
    CoordinatorState, CycleResult, SkipReason, SyncCoordinator, SyncCoordinatorBuilder, SyncStats,
    TriggerOutcome, TriggerSource,
};
pub use error::{RemoteError, RemoteResult, StoreError, StoreResult, SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use http::{
    HttpClient, HttpMethod, HttpRemote, HttpRequest, HttpResponse, DEFAULT_TIMEOUT,
    IDEMPOTENCY_HEADER,
};
pub use persistence::{SyncStateStore, CONFIG_KEY, CORRUPT_QUEUE_KEY, QUEUE_KEY, WATERMARK_KEY};
pub use queue::{DrainReport, MutationQueue};
pub use reconciler::{MergeReport, Reconciler, RecordFailure};
pub use remote::{MockRemote, RemoteApi, RemoteCall};
pub use signals::{EnvironmentSignals, SignalController};
pub use store::{KvLocalStore, LocalStore, LocalStores, MemoryLocalStore};
