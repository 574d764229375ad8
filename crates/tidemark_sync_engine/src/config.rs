//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest accepted interval between automatic syncs.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// User-facing sync settings.
///
/// Persisted by the coordinator and read on every scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether timer, connectivity and visibility triggers start cycles.
    pub auto_sync_enabled: bool,
    /// Interval of the recurring sync timer.
    #[serde(rename = "sync_interval_ms", with = "duration_millis")]
    pub sync_interval: Duration,
    /// Master switch; when off, no trigger starts a cycle.
    pub globally_enabled: bool,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            auto_sync_enabled: true,
            sync_interval: Duration::from_secs(5 * 60),
            globally_enabled: true,
        }
    }

    /// Sets the recurring sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Enables or disables automatic triggers.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync_enabled = enabled;
        self
    }

    /// Enables or disables sync entirely.
    pub fn with_globally_enabled(mut self, enabled: bool) -> Self {
        self.globally_enabled = enabled;
        self
    }

    /// Checks that the configuration can be applied.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the interval is shorter than
    /// [`MIN_SYNC_INTERVAL`].
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync_interval < MIN_SYNC_INTERVAL {
            return Err(SyncError::InvalidConfig(format!(
                "sync interval {}ms is below the minimum of {}ms",
                self.sync_interval.as_millis(),
                MIN_SYNC_INTERVAL.as_millis()
            )));
        }
        Ok(())
    }

    /// Returns true if the recurring timer should run.
    pub fn timer_enabled(&self) -> bool {
        self.globally_enabled && self.auto_sync_enabled
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial update of a [`SyncConfig`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfigPatch {
    /// New value for `auto_sync_enabled`.
    pub auto_sync_enabled: Option<bool>,
    /// New value for `sync_interval`.
    pub sync_interval: Option<Duration>,
    /// New value for `globally_enabled`.
    pub globally_enabled: Option<bool>,
}

impl SyncConfigPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `auto_sync_enabled`.
    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync_enabled = Some(enabled);
        self
    }

    /// Sets `sync_interval`.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets `globally_enabled`.
    pub fn globally_enabled(mut self, enabled: bool) -> Self {
        self.globally_enabled = Some(enabled);
        self
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.auto_sync_enabled.is_none()
            && self.sync_interval.is_none()
            && self.globally_enabled.is_none()
    }

    /// Applies the patch on top of `base`.
    pub fn apply(&self, base: &SyncConfig) -> SyncConfig {
        SyncConfig {
            auto_sync_enabled: self.auto_sync_enabled.unwrap_or(base.auto_sync_enabled),
            sync_interval: self.sync_interval.unwrap_or(base.sync_interval),
            globally_enabled: self.globally_enabled.unwrap_or(base.globally_enabled),
        }
    }
}

/// Retry behaviour for cycles and queued mutations.
///
/// The cycle bound and the mutation bound are independent knobs even
/// though both default to 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed cycles retried automatically before giving up.
    pub max_cycle_retries: u32,
    /// Base of the exponential cycle backoff.
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
    /// Failed replays a mutation survives before it is dropped.
    pub max_mutation_retries: u32,
}

impl RetryPolicy {
    /// Creates the default policy: 3 cycle retries at 2s, 4s, 8s and
    /// 3 mutation retries.
    pub fn new() -> Self {
        Self {
            max_cycle_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5 * 60),
            max_mutation_retries: 3,
        }
    }

    /// Sets the cycle retry bound.
    pub fn with_max_cycle_retries(mut self, retries: u32) -> Self {
        self.max_cycle_retries = retries;
        self
    }

    /// Sets the backoff base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum backoff delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the mutation retry bound.
    pub fn with_max_mutation_retries(mut self, retries: u32) -> Self {
        self.max_mutation_retries = retries;
        self
    }

    /// Returns the delay before retry number `attempt` (1-indexed):
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory engine options that are not user settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Retry behaviour.
    pub retry: RetryPolicy,
    /// Buffered events per subscriber before slow subscribers lag.
    pub event_capacity: usize,
}

impl EngineOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
            event_capacity: 64,
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert!(config.auto_sync_enabled);
        assert!(config.globally_enabled);
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert!(config.validate().is_ok());
        assert!(config.timer_enabled());
    }

    #[test]
    fn sync_config_rejects_short_interval() {
        let config = SyncConfig::new().with_sync_interval(Duration::from_millis(250));
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn sync_config_json_shape() {
        let config = SyncConfig::new()
            .with_sync_interval(Duration::from_secs(30))
            .with_auto_sync(false);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "auto_sync_enabled": false,
                "sync_interval_ms": 30000,
                "globally_enabled": true
            })
        );

        // Missing fields take defaults
        let partial: SyncConfig =
            serde_json::from_value(serde_json::json!({"auto_sync_enabled": false})).unwrap();
        assert_eq!(partial.sync_interval, Duration::from_secs(300));
        assert!(!partial.auto_sync_enabled);
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let base = SyncConfig::default();
        let patch = SyncConfigPatch::new().sync_interval(Duration::from_secs(60));
        let patched = patch.apply(&base);

        assert_eq!(patched.sync_interval, Duration::from_secs(60));
        assert_eq!(patched.auto_sync_enabled, base.auto_sync_enabled);
        assert!(SyncConfigPatch::new().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn timer_requires_both_switches() {
        assert!(!SyncConfig::new().with_auto_sync(false).timer_enabled());
        assert!(!SyncConfig::new().with_globally_enabled(false).timer_enabled());
    }

    #[test]
    fn backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_respects_max() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(30));
    }

    #[test]
    fn engine_options_builder() {
        let options = EngineOptions::new()
            .with_retry(RetryPolicy::new().with_max_mutation_retries(5))
            .with_event_capacity(0);
        assert_eq!(options.retry.max_mutation_retries, 5);
        assert_eq!(options.retry.max_cycle_retries, 3);
        assert_eq!(options.event_capacity, 1);
    }
}
