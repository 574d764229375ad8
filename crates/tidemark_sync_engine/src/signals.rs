//! Connectivity and visibility signals from the host environment.

use tokio::sync::watch;

/// Read side of the host signals the coordinator listens to.
///
/// Each signal is a boolean watch channel. The coordinator reacts to
/// `false -> true` transitions and reads the current value when gating
/// a cycle.
#[derive(Debug, Clone)]
pub struct EnvironmentSignals {
    connectivity: watch::Receiver<bool>,
    visibility: watch::Receiver<bool>,
}

/// Write side of [`EnvironmentSignals`], held by the host integration.
#[derive(Debug)]
pub struct SignalController {
    connectivity: watch::Sender<bool>,
    visibility: watch::Sender<bool>,
}

impl EnvironmentSignals {
    /// Wraps existing receivers.
    pub fn new(connectivity: watch::Receiver<bool>, visibility: watch::Receiver<bool>) -> Self {
        Self {
            connectivity,
            visibility,
        }
    }

    /// Creates a linked controller and signal set with the given initial
    /// values.
    pub fn channel(online: bool, visible: bool) -> (SignalController, Self) {
        let (connectivity_tx, connectivity_rx) = watch::channel(online);
        let (visibility_tx, visibility_rx) = watch::channel(visible);
        (
            SignalController {
                connectivity: connectivity_tx,
                visibility: visibility_tx,
            },
            Self::new(connectivity_rx, visibility_rx),
        )
    }

    /// Signals that are permanently online and visible.
    pub fn always_online() -> Self {
        let (controller, signals) = Self::channel(true, true);
        // Receivers keep the last value once the sender is gone
        drop(controller);
        signals
    }

    /// Returns true if the device is online.
    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Returns true if the application is in the foreground.
    pub fn is_visible(&self) -> bool {
        *self.visibility.borrow()
    }

    pub(crate) fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.clone()
    }

    pub(crate) fn visibility(&self) -> watch::Receiver<bool> {
        self.visibility.clone()
    }
}

impl Default for EnvironmentSignals {
    fn default() -> Self {
        Self::always_online()
    }
}

impl SignalController {
    /// Reports a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.connectivity.send_replace(online);
    }

    /// Reports a visibility change.
    pub fn set_visible(&self, visible: bool) {
        self.visibility.send_replace(visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_drives_signals() {
        let (controller, signals) = EnvironmentSignals::channel(false, true);
        assert!(!signals.is_online());
        assert!(signals.is_visible());

        controller.set_online(true);
        controller.set_visible(false);
        assert!(signals.is_online());
        assert!(!signals.is_visible());
    }

    #[test]
    fn always_online_survives_dropped_sender() {
        let signals = EnvironmentSignals::default();
        assert!(signals.is_online());
        assert!(signals.is_visible());
    }
}
