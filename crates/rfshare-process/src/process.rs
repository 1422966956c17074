//! Handles for running capture backends.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, trace};

use rfshare_models::ExitOutcome;

use crate::{ProcessError, Result, StopSignal};

/// A running capture backend.
///
/// Every method must tolerate a process that has already exited: stopping
/// or killing a finished process is a no-op, and `wait` on a finished
/// process returns its recorded outcome.
#[async_trait]
pub trait CaptureProcess: Send {
    /// OS process id, or `None` once the exit has been observed.
    fn id(&self) -> Option<u32>;

    /// Returns the exit outcome if the process has finished, without blocking.
    fn try_wait(&mut self) -> Result<Option<ExitOutcome>>;

    /// Sends the graceful-stop signal.
    fn send_stop(&mut self, signal: StopSignal) -> Result<()>;

    /// Sends SIGKILL.
    fn kill(&mut self) -> Result<()>;

    /// Waits for the process to exit. Cancel-safe.
    async fn wait(&mut self) -> Result<ExitOutcome>;
}

/// A backend spawned through [`crate::OsLauncher`].
#[derive(Debug)]
pub struct OsProcess {
    /// The child handle.
    child: Child,
    /// Program name, for logging.
    program: String,
    /// Whether the child leads its own process group.
    group_leader: bool,
}

impl OsProcess {
    pub(crate) fn new(child: Child, program: String, group_leader: bool) -> Self {
        Self {
            child,
            program,
            group_leader,
        }
    }

    /// Program name the process was started from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Delivers `sig` to the child, or to its whole process group when the
    /// child leads one. ESRCH means the process is gone and is not an error.
    fn deliver(&mut self, sig: Signal) -> Result<()> {
        if let Some(outcome) = self.try_wait()? {
            trace!(program = %self.program, outcome = %outcome, "process already exited");
            return Ok(());
        }

        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        let target = Pid::from_raw(pid as i32);
        let sent = if self.group_leader {
            signal::killpg(target, sig)
        } else {
            signal::kill(target, sig)
        };

        match sent {
            Ok(()) => {
                debug!(program = %self.program, pid, signal = sig.as_str(), "signal delivered");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                trace!(program = %self.program, pid, "no such process");
                Ok(())
            }
            Err(source) => Err(ProcessError::Signal {
                signal: sig.as_str(),
                pid,
                source,
            }),
        }
    }
}

#[async_trait]
impl CaptureProcess for OsProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<ExitOutcome>> {
        Ok(self.child.try_wait()?.map(ExitOutcome::from))
    }

    fn send_stop(&mut self, signal: StopSignal) -> Result<()> {
        self.deliver(signal.as_nix())
    }

    fn kill(&mut self) -> Result<()> {
        self.deliver(Signal::SIGKILL)
    }

    async fn wait(&mut self) -> Result<ExitOutcome> {
        let status = self.child.wait().await?;
        Ok(status.into())
    }
}
