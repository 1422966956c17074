//! Scheduler and process state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the scheduler.
///
/// Moves `Running -> ShuttingDown -> Stopped` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Cycling through phases.
    #[default]
    Running,
    /// Shutdown requested, cleanup in progress.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

impl SchedulerState {
    /// Returns true once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        !matches!(self, SchedulerState::Running)
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Running => "running",
            SchedulerState::ShuttingDown => "shutting down",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How a capture process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if the process was killed by a signal.
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// Outcome for a normal exit.
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Outcome for a process terminated by a signal.
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Returns true for exit code zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// Snapshot of the capture process currently holding the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Phase that launched the process.
    pub phase: String,
    /// OS process id, if still known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// When the process was launched.
    pub started_at: DateTime<Utc>,
}
