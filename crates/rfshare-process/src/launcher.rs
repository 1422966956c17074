//! Spawning capture backends.

use std::fs::OpenOptions;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use rfshare_models::{Phase, StdioMode};

use crate::{CaptureProcess, OsProcess, ProcessError, Result};

/// Starts the backend for a phase.
///
/// The scheduler only talks to backends through this trait, so tests can
/// substitute in-memory processes.
pub trait Launcher: Send + Sync {
    /// Spawns the phase's (already resolved) command.
    fn launch(&self, phase: &Phase) -> Result<Box<dyn CaptureProcess>>;
}

/// Launches backends as real OS processes.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct OsLauncher {
    /// Put each backend in its own process group.
    process_group: bool,
}

impl OsLauncher {
    /// Creates a launcher that gives every backend its own process group.
    pub fn new() -> Self {
        Self {
            process_group: true,
        }
    }

    /// Sets whether backends get their own process group.
    ///
    /// With a dedicated group, a terminal Ctrl+C reaches only the scheduler,
    /// and stop signals reach any helper processes the backend forks.
    pub fn with_process_group(mut self, enabled: bool) -> Self {
        self.process_group = enabled;
        self
    }

    fn build_command(&self, phase: &Phase) -> Result<Command> {
        let spec = &phase.command;
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        if self.process_group {
            cmd.process_group(0);
        }

        match &spec.stdio {
            StdioMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            StdioMode::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            StdioMode::File { path } => {
                let log_err = |source| ProcessError::LogFile {
                    path: path.clone(),
                    source,
                };
                let stdout = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(log_err)?;
                let stderr = stdout.try_clone().map_err(log_err)?;
                cmd.stdout(stdout).stderr(stderr);
            }
        }

        Ok(cmd)
    }
}

impl Default for OsLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for OsLauncher {
    fn launch(&self, phase: &Phase) -> Result<Box<dyn CaptureProcess>> {
        debug!(
            phase = %phase.name,
            cmd = %phase.command.display_line(),
            "spawning backend"
        );

        let mut cmd = self.build_command(phase)?;
        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: phase.command.program.clone(),
            source,
        })?;

        info!(
            phase = %phase.name,
            pid = child.id(),
            program = %phase.command.program,
            "backend spawned"
        );

        Ok(Box::new(OsProcess::new(
            child,
            phase.command.program.clone(),
            self.process_group,
        )))
    }
}
