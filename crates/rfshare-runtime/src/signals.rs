//! OS signal listener.
//!
//! Turns SIGINT and SIGTERM into a shutdown request. The listener never
//! touches the running backend itself; the scheduler notices the request at
//! its next suspension point and performs the cleanup.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Result, SchedulerError};
use crate::shutdown::ShutdownController;

/// Installs SIGINT/SIGTERM handlers and spawns a task that requests shutdown
/// when either arrives.
///
/// Handlers are installed before this returns, so a signal delivered right
/// after the call is not lost. Repeated signals are logged and ignored. The
/// task ends once shutdown has completed.
pub fn spawn_signal_listener(shutdown: ShutdownController) -> Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(SchedulerError::SignalHandler)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(SchedulerError::SignalHandler)?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
                _ = shutdown.stopped() => break,
            };

            if shutdown.request() {
                info!(signal = name, "received signal, shutting down");
            } else {
                warn!(signal = name, "received signal, shutdown already in progress");
            }
        }
    }))
}
