//! Error types for the runtime crate.

use thiserror::Error;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The phase list is empty.
    #[error("no phases configured")]
    NoPhases,

    /// A phase failed validation.
    #[error("invalid phase '{name}': {reason}")]
    InvalidPhase {
        /// Phase name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two phases share a name.
    #[error("duplicate phase name: {0}")]
    DuplicatePhase(String),

    /// Scheduler configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A phase's backend could not be started.
    #[error("failed to launch phase '{phase}': {source}")]
    Spawn {
        /// Phase name.
        phase: String,
        /// Underlying process error.
        source: rfshare_process::ProcessError,
    },

    /// Process control error.
    #[error("process error: {0}")]
    Process(#[from] rfshare_process::ProcessError),

    /// A backend is still holding the receiver.
    #[error("phase '{0}' is still running")]
    AlreadyRunning(String),

    /// Shutdown has been requested; no new phase may start.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// Every phase of a full cycle failed to launch.
    #[error("no phase could be launched during cycle {0}")]
    NoPhaseLaunched(u64),

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handler: {0}")]
    SignalHandler(#[source] std::io::Error),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
