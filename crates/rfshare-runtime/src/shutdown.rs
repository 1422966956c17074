//! Shutdown state machine shared by the scheduler and the signal listener.

use std::sync::Arc;

use tokio::sync::watch;

use rfshare_models::SchedulerState;

/// Drives the one-way `Running -> ShuttingDown -> Stopped` lifecycle.
///
/// Cloning is cheap; every clone observes and drives the same state.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    tx: Arc<watch::Sender<SchedulerState>>,
}

impl ShutdownController {
    /// Creates a controller in the `Running` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SchedulerState::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown.
    ///
    /// Returns true only for the call that performed the transition; later
    /// calls are no-ops.
    pub fn request(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == SchedulerState::Running {
                *state = SchedulerState::ShuttingDown;
                true
            } else {
                false
            }
        })
    }

    /// Marks cleanup as finished. Returns true only for the call that
    /// performed the transition.
    pub(crate) fn mark_stopped(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state != SchedulerState::Stopped {
                *state = SchedulerState::Stopped;
                true
            } else {
                false
            }
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.tx.borrow()
    }

    /// Returns true once shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.state().is_shutting_down()
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.tx.subscribe()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        self.wait_until(SchedulerState::is_shutting_down).await;
    }

    /// Resolves once shutdown has completed.
    pub async fn stopped(&self) {
        self.wait_until(|s| *s == SchedulerState::Stopped).await;
    }

    async fn wait_until(&self, done: impl FnMut(&SchedulerState) -> bool) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(done).await;
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
