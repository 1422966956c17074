//! Scheduler events.

use std::fmt;
use std::time::Duration;

use rfshare_models::ExitOutcome;

/// How stopping a phase's backend ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited after the graceful-stop signal.
    Exited(ExitOutcome),
    /// Had already exited on its own; nothing was sent.
    AlreadyExited(ExitOutcome),
    /// Ignored the stop signal and was killed.
    Killed(ExitOutcome),
}

impl Termination {
    /// Returns the backend's exit outcome.
    pub fn outcome(&self) -> ExitOutcome {
        match self {
            Termination::Exited(o) | Termination::AlreadyExited(o) | Termination::Killed(o) => *o,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(o) => write!(f, "exited ({o})"),
            Termination::AlreadyExited(o) => write!(f, "already exited ({o})"),
            Termination::Killed(o) => write!(f, "killed ({o})"),
        }
    }
}

/// Events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A phase's backend was launched.
    PhaseStarted {
        /// Phase name.
        phase: String,
        /// Backend process id.
        pid: Option<u32>,
        /// How long it will run.
        dwell: Duration,
    },
    /// A phase's backend was stopped and its exit observed.
    PhaseStopped {
        /// Phase name.
        phase: String,
        /// Backend process id.
        pid: Option<u32>,
        /// How it ended.
        termination: Termination,
    },
    /// A phase's backend could not be started.
    SpawnFailed {
        /// Phase name.
        phase: String,
        /// Error message.
        error: String,
    },
    /// A backend exited before its dwell elapsed.
    UnexpectedExit {
        /// Phase name.
        phase: String,
        /// Backend process id.
        pid: Option<u32>,
        /// Exit outcome.
        outcome: ExitOutcome,
    },
    /// A backend did not exit within the grace timeout and is being killed.
    TerminationTimeout {
        /// Phase name.
        phase: String,
        /// Backend process id.
        pid: Option<u32>,
        /// Grace period that elapsed.
        grace: Duration,
    },
    /// Every phase has had its turn.
    CycleCompleted {
        /// Zero-based cycle number.
        cycle: u64,
    },
    /// Shutdown finished; no backend is running.
    ShutdownComplete,
}

impl SchedulerEvent {
    /// Returns the phase associated with this event, if any.
    pub fn phase(&self) -> Option<&str> {
        match self {
            SchedulerEvent::PhaseStarted { phase, .. }
            | SchedulerEvent::PhaseStopped { phase, .. }
            | SchedulerEvent::SpawnFailed { phase, .. }
            | SchedulerEvent::UnexpectedExit { phase, .. }
            | SchedulerEvent::TerminationTimeout { phase, .. } => Some(phase),
            SchedulerEvent::CycleCompleted { .. } | SchedulerEvent::ShutdownComplete => None,
        }
    }

    /// Returns true if this event reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SchedulerEvent::SpawnFailed { .. }
                | SchedulerEvent::UnexpectedExit { .. }
                | SchedulerEvent::TerminationTimeout { .. }
        )
    }
}
