//! Sync coordinator state machine.
//!
//! The coordinator owns the watermark and decides when a cycle runs. All
//! triggers (timer, connectivity, visibility, explicit calls, backoff
//! retries) funnel through one guarded entry point, and a single atomic
//! state flag makes sure at most one cycle runs at a time.
//!
//! ```text
//!            trigger (gated)
//!   Idle ─────────────────────▶ Running ──success──▶ Idle
//!     ▲                           │
//!     │ retries exhausted         │ failure
//!     └───────────────────────────┤
//!                                 ▼
//!                          BackoffWaiting ──retry timer──▶ Running
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{EngineOptions, RetryPolicy, SyncConfig, SyncConfigPatch};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::persistence::SyncStateStore;
use crate::queue::{DrainReport, MutationQueue};
use crate::reconciler::{MergeReport, Reconciler};
use crate::remote::RemoteApi;
use crate::signals::EnvironmentSignals;
use crate::store::{LocalStore, LocalStores};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tidemark_storage::KeyValueStore;
use tidemark_sync_protocol::{
    EntityKind, MutationAction, MutationId, MutationPayload, QueuedMutation, Timestamp,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorState {
    /// No cycle is running or scheduled.
    Idle = 0,
    /// A cycle is in flight.
    Running = 1,
    /// A cycle failed and a retry is scheduled.
    BackoffWaiting = 2,
}

impl CoordinatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CoordinatorState::Running,
            2 => CoordinatorState::BackoffWaiting,
            _ => CoordinatorState::Idle,
        }
    }
}

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// [`SyncCoordinator::trigger_sync`].
    Explicit,
    /// The recurring sync timer.
    Timer,
    /// Connectivity went from offline to online.
    ConnectivityRestored,
    /// The application came back to the foreground.
    VisibilityRestored,
    /// [`SyncCoordinator::resume`].
    Resume,
    /// A scheduled backoff retry.
    BackoffRetry,
}

impl TriggerSource {
    /// Returns true for triggers that also require `auto_sync_enabled`.
    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            TriggerSource::Timer
                | TriggerSource::ConnectivityRestored
                | TriggerSource::VisibilityRestored
                | TriggerSource::Resume
        )
    }
}

/// Why a trigger did not start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The coordinator is paused.
    Paused,
    /// Sync, or automatic sync for automatic triggers, is switched off.
    Disabled,
    /// The device is offline.
    Offline,
    /// A cycle is running or a retry is pending.
    Busy,
}

/// A successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    /// Clock reading when the cycle started.
    pub started_at: Timestamp,
    /// Watermark after the cycle.
    pub watermark: Timestamp,
    /// Wall time the cycle took.
    pub duration: Duration,
    /// What the reconciler did.
    pub merge: MergeReport,
    /// What the queue drain did.
    pub drain: DrainReport,
}

/// Outcome of one trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A cycle ran and succeeded.
    Completed(CycleResult),
    /// A cycle ran and failed.
    Failed {
        /// The failure.
        error: SyncError,
        /// Backoff before the scheduled retry, or `None` if retries are
        /// exhausted.
        retry_in: Option<Duration>,
    },
    /// No cycle ran.
    Skipped(SkipReason),
}

impl TriggerOutcome {
    /// Returns true if a cycle ran and succeeded.
    pub fn is_completed(&self) -> bool {
        matches!(self, TriggerOutcome::Completed(_))
    }

    /// Returns the skip reason, if no cycle ran.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            TriggerOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Counters about coordinator activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Backoff retries scheduled.
    pub retries_scheduled: u64,
    /// Records written by the reconciler.
    pub records_merged: u64,
    /// Mutations acknowledged by the server.
    pub mutations_pushed: u64,
    /// Mutations dropped after exhausting retries.
    pub mutations_dropped: u64,
    /// Duration of the last successful cycle.
    pub last_duration: Option<Duration>,
    /// Last cycle error message.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Tasks {
    started: bool,
    timer: Option<JoinHandle<()>>,
    listeners: Vec<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

struct Inner<R: ?Sized> {
    remote: Arc<R>,
    stores: LocalStores,
    persisted: SyncStateStore,
    queue: MutationQueue,
    clock: Arc<dyn Clock>,
    signals: EnvironmentSignals,
    events: EventBus,
    retry: RetryPolicy,
    config: RwLock<SyncConfig>,
    state: AtomicU8,
    paused: AtomicBool,
    stopped: AtomicBool,
    watermark: AtomicI64,
    cycle_retries: AtomicU32,
    stats: RwLock<SyncStats>,
    tasks: Mutex<Tasks>,
}

/// Builder for [`SyncCoordinator`].
pub struct SyncCoordinatorBuilder<R: ?Sized> {
    remote: Arc<R>,
    store: Arc<dyn KeyValueStore>,
    stores: LocalStores,
    clock: Arc<dyn Clock>,
    signals: EnvironmentSignals,
    options: EngineOptions,
}

impl<R: RemoteApi + ?Sized + 'static> SyncCoordinatorBuilder<R> {
    /// Registers the local store for `kind`.
    pub fn with_store(mut self, kind: EntityKind, store: Arc<dyn LocalStore>) -> Self {
        self.stores.register(kind, store);
        self
    }

    /// Replaces the local store registry.
    pub fn with_stores(mut self, stores: LocalStores) -> Self {
        self.stores = stores;
        self
    }

    /// Sets the clock used for watermarks and enqueue times.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the connectivity and visibility signals.
    pub fn with_signals(mut self, signals: EnvironmentSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Sets retry and event options.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Loads persisted state and builds the coordinator.
    ///
    /// Background tasks are not started; call [`SyncCoordinator::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted queue cannot be read.
    pub fn build(self) -> SyncResult<SyncCoordinator<R>> {
        let persisted = SyncStateStore::new(self.store);
        let config = persisted.load_config();
        let watermark = persisted.load_watermark();
        let events = EventBus::new(self.options.event_capacity);
        let queue = MutationQueue::open(
            persisted.clone(),
            self.clock.clone(),
            events.clone(),
            self.options.retry.max_mutation_retries,
        )?;

        tracing::info!(
            watermark,
            pending = queue.len(),
            auto_sync = config.auto_sync_enabled,
            interval_ms = config.sync_interval.as_millis() as u64,
            "sync coordinator ready"
        );

        Ok(SyncCoordinator {
            inner: Arc::new(Inner {
                remote: self.remote,
                stores: self.stores,
                persisted,
                queue,
                clock: self.clock,
                signals: self.signals,
                events,
                retry: self.options.retry,
                config: RwLock::new(config),
                state: AtomicU8::new(CoordinatorState::Idle as u8),
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                watermark: AtomicI64::new(watermark),
                cycle_retries: AtomicU32::new(0),
                stats: RwLock::new(SyncStats::default()),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }
}

/// Schedules and runs sync cycles.
///
/// Construct one per replica and share it behind an `Arc`. Dropping the
/// coordinator stops its background tasks; a cycle already in flight
/// runs to completion.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tidemark_storage::InMemoryStore;
/// use tidemark_sync_engine::{MemoryLocalStore, MockRemote, SyncCoordinator};
/// use tidemark_sync_protocol::EntityKind;
///
/// # async fn run() -> tidemark_sync_engine::SyncResult<()> {
/// let coordinator = SyncCoordinator::builder(
///     Arc::new(MockRemote::new()),
///     Arc::new(InMemoryStore::new()),
/// )
/// .with_store(EntityKind::Deck, Arc::new(MemoryLocalStore::new()))
/// .build()?;
///
/// coordinator.start();
/// let outcome = coordinator.trigger_sync().await;
/// assert!(outcome.is_completed());
/// # Ok(())
/// # }
/// ```
pub struct SyncCoordinator<R: RemoteApi + ?Sized + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: RemoteApi + ?Sized + 'static> SyncCoordinator<R> {
    /// Starts building a coordinator around `remote`, persisting its own
    /// state in `store`.
    pub fn builder(remote: Arc<R>, store: Arc<dyn KeyValueStore>) -> SyncCoordinatorBuilder<R> {
        SyncCoordinatorBuilder {
            remote,
            store,
            stores: LocalStores::new(),
            clock: Arc::new(SystemClock),
            signals: EnvironmentSignals::default(),
            options: EngineOptions::default(),
        }
    }

    /// Registers the recurring timer and the connectivity and visibility
    /// listeners. Calling it again is a no-op.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Releases the timer, the listeners and any pending backoff retry.
    /// A cycle already in flight is not interrupted.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Runs a cycle now, unless gated.
    ///
    /// Requires sync to be globally enabled, the coordinator not paused and
    /// the device online. Returns [`SkipReason::Busy`] while a cycle runs or
    /// a retry is pending.
    ///
    /// The cycle runs on its own task: dropping the returned future stops
    /// waiting for it but does not cancel it.
    pub async fn trigger_sync(&self) -> TriggerOutcome {
        self.inner.run_detached(TriggerSource::Explicit).await
    }

    /// Stops the recurring timer and turns every trigger into a no-op.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        self.inner.stop_timer();
        tracing::info!("sync paused");
    }

    /// Restarts the timer and triggers one cycle immediately.
    pub async fn resume(&self) -> TriggerOutcome {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.restart_timer();
        tracing::info!("sync resumed");
        self.inner.run_detached(TriggerSource::Resume).await
    }

    /// Returns true if the coordinator is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Returns true if background tasks are registered.
    pub fn is_started(&self) -> bool {
        self.inner.tasks.lock().started
    }

    /// Returns the current configuration.
    pub fn config(&self) -> SyncConfig {
        self.inner.config.read().clone()
    }

    /// Applies a partial configuration change, persists it and reschedules
    /// the recurring timer. An in-flight cycle is unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the result does not validate,
    /// or a storage error if it cannot be persisted. The configuration is
    /// unchanged in both cases.
    pub fn set_config(&self, patch: SyncConfigPatch) -> SyncResult<SyncConfig> {
        let next = patch.apply(&self.config());
        next.validate()?;
        self.inner.persisted.save_config(&next)?;
        *self.inner.config.write() = next.clone();
        self.inner.restart_timer();

        tracing::info!(
            auto_sync = next.auto_sync_enabled,
            enabled = next.globally_enabled,
            interval_ms = next.sync_interval.as_millis() as u64,
            "sync config updated"
        );
        Ok(next)
    }

    /// Returns the number of queued mutations.
    pub fn queue_size(&self) -> usize {
        self.inner.queue.size()
    }

    /// Returns a snapshot of the queued mutations.
    pub fn pending_mutations(&self) -> Vec<QueuedMutation> {
        self.inner.queue.pending()
    }

    /// Returns true while a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        self.state() == CoordinatorState::Running
    }

    /// Returns the current state.
    pub fn state(&self) -> CoordinatorState {
        self.inner.state()
    }

    /// Returns the time of the last successful sync, or `None` if this
    /// replica never synced.
    pub fn last_sync_time(&self) -> Option<Timestamp> {
        Some(self.watermark()).filter(|w| *w > 0)
    }

    /// Returns the current watermark.
    pub fn watermark(&self) -> Timestamp {
        self.inner.watermark.load(Ordering::SeqCst)
    }

    /// Validates and queues a local write. Never touches the network.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidMutation`] for a malformed payload, or a
    /// storage error if the queue cannot be persisted.
    pub fn enqueue_mutation(
        &self,
        kind: EntityKind,
        action: MutationAction,
        payload: Value,
    ) -> SyncResult<MutationId> {
        self.inner.queue.enqueue(kind, action, payload)
    }

    /// Queues a typed local write.
    ///
    /// # Errors
    ///
    /// Same as [`SyncCoordinator::enqueue_mutation`].
    pub fn enqueue(&self, kind: EntityKind, payload: MutationPayload) -> SyncResult<MutationId> {
        self.inner.queue.enqueue_payload(kind, payload)
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Returns activity counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }
}

impl<R: RemoteApi + ?Sized + 'static> Drop for SyncCoordinator<R> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl<R: RemoteApi + ?Sized + 'static> std::fmt::Debug for SyncCoordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("state", &self.state())
            .field("watermark", &self.watermark())
            .field("queue", &self.queue_size())
            .finish_non_exhaustive()
    }
}

impl<R: RemoteApi + ?Sized + 'static> Inner<R> {
    fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: CoordinatorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: CoordinatorState, to: CoordinatorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn gate(&self, source: TriggerSource) -> Option<SkipReason> {
        if self.paused.load(Ordering::SeqCst) {
            return Some(SkipReason::Paused);
        }
        let config = self.config.read().clone();
        if !config.globally_enabled || (source.is_automatic() && !config.auto_sync_enabled) {
            return Some(SkipReason::Disabled);
        }
        if !self.signals.is_online() {
            return Some(SkipReason::Offline);
        }
        None
    }

    async fn run_detached(self: &Arc<Self>, source: TriggerSource) -> TriggerOutcome {
        let inner = Arc::clone(self);
        match tokio::spawn(async move { inner.run_trigger(source).await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => TriggerOutcome::Skipped(SkipReason::Busy),
        }
    }

    async fn run_trigger(self: &Arc<Self>, source: TriggerSource) -> TriggerOutcome {
        let from = if source == TriggerSource::BackoffRetry {
            CoordinatorState::BackoffWaiting
        } else {
            CoordinatorState::Idle
        };

        if let Some(reason) = self.gate(source) {
            if source == TriggerSource::BackoffRetry
                && self.transition(CoordinatorState::BackoffWaiting, CoordinatorState::Idle)
            {
                self.cycle_retries.store(0, Ordering::SeqCst);
            }
            tracing::debug!(?source, ?reason, "sync trigger skipped");
            return TriggerOutcome::Skipped(reason);
        }

        if !self.transition(from, CoordinatorState::Running) {
            tracing::debug!(?source, state = ?self.state(), "sync trigger skipped, busy");
            return TriggerOutcome::Skipped(SkipReason::Busy);
        }

        tracing::debug!(?source, "sync cycle starting");
        let guard = RunningGuard::new(&self.state);
        let started = Instant::now();
        let started_at = self.clock.now();

        let result = self.run_cycle(started_at).await;
        guard.disarm();

        match result {
            Ok((merge, drain, watermark)) => {
                let result = CycleResult {
                    started_at,
                    watermark,
                    duration: started.elapsed(),
                    merge,
                    drain,
                };
                self.on_success(&result);
                TriggerOutcome::Completed(result)
            }
            Err(error) => {
                let retry_in = self.on_failure(&error, started.elapsed());
                TriggerOutcome::Failed { error, retry_in }
            }
        }
    }

    async fn run_cycle(
        &self,
        started_at: Timestamp,
    ) -> SyncResult<(MergeReport, DrainReport, Timestamp)> {
        let since = self.watermark.load(Ordering::SeqCst);

        let delta = self.remote.get_changes(since).await?;
        if !delta.ignored_partitions().is_empty() {
            tracing::debug!(
                partitions = ?delta.ignored_partitions(),
                "delta contained unknown kinds"
            );
        }

        let merge = Reconciler::merge(&delta, &self.stores).into_result()?;
        let drain = self.queue.drain(self.remote.as_ref()).await?;

        let next = since.max(started_at);
        self.persisted.save_watermark(next)?;
        self.watermark.store(next, Ordering::SeqCst);

        Ok((merge, drain, next))
    }

    fn on_success(&self, result: &CycleResult) {
        self.cycle_retries.store(0, Ordering::SeqCst);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.records_merged += result.merge.merged() as u64;
            stats.mutations_pushed += result.drain.acknowledged.len() as u64;
            stats.mutations_dropped += result.drain.dropped.len() as u64;
            stats.last_duration = Some(result.duration);
            stats.last_error = None;
        }
        self.set_state(CoordinatorState::Idle);

        tracing::info!(
            watermark = result.watermark,
            duration_ms = result.duration.as_millis() as u64,
            merged = result.merge.merged(),
            pushed = result.drain.acknowledged.len(),
            pending = result.drain.remaining,
            "sync cycle completed"
        );
        self.events.emit(SyncEvent::SyncCompleted {
            watermark: result.watermark,
            duration: result.duration,
        });
    }

    fn on_failure(self: &Arc<Self>, error: &SyncError, elapsed: Duration) -> Option<Duration> {
        let attempt = self.cycle_retries.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut stats = self.stats.write();
            stats.cycles_failed += 1;
            stats.last_error = Some(error.to_string());
        }

        if attempt <= self.retry.max_cycle_retries && !self.stopped.load(Ordering::SeqCst) {
            let delay = self.retry.delay_for_attempt(attempt);
            self.stats.write().retries_scheduled += 1;
            self.set_state(CoordinatorState::BackoffWaiting);

            tracing::warn!(
                error = %error,
                attempt,
                delay_ms = delay.as_millis() as u64,
                duration_ms = elapsed.as_millis() as u64,
                "sync cycle failed, retry scheduled"
            );
            self.events.emit(SyncEvent::RetryScheduled { attempt, delay });
            self.schedule_retry(delay);
            Some(delay)
        } else {
            self.cycle_retries.store(0, Ordering::SeqCst);
            self.set_state(CoordinatorState::Idle);

            tracing::error!(
                error = %error,
                attempts = attempt,
                duration_ms = elapsed.as_millis() as u64,
                "sync cycle failed, giving up until next trigger"
            );
            self.events.emit(SyncEvent::SyncFailed {
                error: error.to_string(),
            });
            None
        }
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            spawn_trigger(&weak, TriggerSource::BackoffRetry);
        });
        if let Some(previous) = self.tasks.lock().retry.replace(handle) {
            previous.abort();
        }
    }

    fn start(self: &Arc<Self>) {
        {
            let mut tasks = self.tasks.lock();
            if tasks.started {
                return;
            }
            tasks.started = true;
            self.stopped.store(false, Ordering::SeqCst);
            tasks.listeners = vec![
                self.spawn_listener(
                    self.signals.connectivity(),
                    TriggerSource::ConnectivityRestored,
                ),
                self.spawn_listener(self.signals.visibility(), TriggerSource::VisibilityRestored),
            ];
        }
        self.restart_timer();
        tracing::debug!("sync coordinator started");
    }

    fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        tasks.started = false;
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(timer) = tasks.timer.take() {
            timer.abort();
        }
        for listener in tasks.listeners.drain(..) {
            listener.abort();
        }
        if let Some(retry) = tasks.retry.take() {
            retry.abort();
            if self.transition(CoordinatorState::BackoffWaiting, CoordinatorState::Idle) {
                self.cycle_retries.store(0, Ordering::SeqCst);
            }
        }
        drop(tasks);
        tracing::debug!("sync coordinator shut down");
    }

    fn stop_timer(&self) {
        if let Some(timer) = self.tasks.lock().timer.take() {
            timer.abort();
        }
    }

    fn restart_timer(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if let Some(timer) = tasks.timer.take() {
            timer.abort();
        }

        let config = self.config.read().clone();
        if !tasks.started || self.paused.load(Ordering::SeqCst) || !config.timer_enabled() {
            return;
        }

        let period = config.sync_interval;
        let weak = Arc::downgrade(self);
        tasks.timer = Some(tokio::spawn(async move {
            let first = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !spawn_trigger(&weak, TriggerSource::Timer) {
                    break;
                }
            }
        }));
        tracing::debug!(interval_ms = period.as_millis() as u64, "sync timer scheduled");
    }

    fn spawn_listener(
        self: &Arc<Self>,
        mut signal: watch::Receiver<bool>,
        source: TriggerSource,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut previous = *signal.borrow_and_update();
        tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let current = *signal.borrow_and_update();
                if current && !previous && !spawn_trigger(&weak, source) {
                    break;
                }
                previous = current;
            }
        })
    }
}

/// Puts the state back to Idle if a cycle unwinds before it reports.
struct RunningGuard<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl<'a> RunningGuard<'a> {
    fn new(state: &'a AtomicU8) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.state.compare_exchange(
                CoordinatorState::Running as u8,
                CoordinatorState::Idle as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }
}

/// Runs a trigger as its own task so that aborting the task that noticed
/// the event never cancels the cycle. Returns false once the coordinator
/// is gone.
fn spawn_trigger<R: RemoteApi + ?Sized + 'static>(
    weak: &Weak<Inner<R>>,
    source: TriggerSource,
) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    tokio::spawn(async move {
        inner.run_trigger(source).await;
    });
    true
}
