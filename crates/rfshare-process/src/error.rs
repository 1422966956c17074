//! Error types for process operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while controlling a capture backend.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The backend could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The backend's log file could not be opened.
    #[error("failed to open log file {}: {source}", path.display())]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Signal delivery failed for a reason other than "no such process".
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        /// Signal that was sent.
        signal: &'static str,
        /// Target process id.
        pid: u32,
        /// errno from kill(2).
        source: nix::errno::Errno,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for process operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
