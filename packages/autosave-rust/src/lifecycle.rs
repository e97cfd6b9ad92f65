//! Host lifecycle signals.
//!
//! A host (a browser tab, a desktop window, a CLI process) becomes hidden,
//! visible again, and eventually tears down. [`HostLifecycle`] broadcasts
//! those transitions over a `watch` channel; engines attached with
//! [`AutoSaveEngine::attach_lifecycle`](crate::engine::AutoSaveEngine::attach_lifecycle)
//! flush on them.
//!
//! State machine: Visible <-> Hidden -> TearingDown

use tokio::sync::watch;

/// Visibility state of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// The user can see and edit the grading sheet.
    Visible,
    /// The host was backgrounded or minimized.
    Hidden,
    /// The host is closing. Terminal.
    TearingDown,
}

/// Broadcasts host lifecycle transitions to attached engines.
#[derive(Debug)]
pub struct HostLifecycle {
    state: watch::Sender<HostState>,
}

impl HostLifecycle {
    /// Creates a lifecycle in the `Visible` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HostState::Visible);
        Self { state: tx }
    }

    /// Signals that the host was hidden.
    pub fn set_hidden(&self) {
        self.transition(HostState::Hidden);
    }

    /// Signals that the host is visible again.
    pub fn set_visible(&self) {
        self.transition(HostState::Visible);
    }

    /// Signals that the host is closing. Later transitions are ignored.
    pub fn trigger_teardown(&self) {
        self.transition(HostState::TearingDown);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    /// Returns a receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HostState> {
        self.state.subscribe()
    }

    fn transition(&self, next: HostState) {
        self.state.send_if_modified(|current| {
            if *current == HostState::TearingDown || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

impl Default for HostLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
