//! Capture backend process control for rfshare.
//!
//! This crate owns everything the scheduler needs from the operating system
//! to run one capture backend at a time:
//! - Spawn a phase's command detached from the scheduler's stdin
//! - Send a graceful-stop signal (SIGINT or SIGTERM) to the backend
//! - Wait for the backend to exit, or poll whether it already has
//! - Escalate to SIGKILL
//!
//! Every stop operation tolerates a backend that is already gone.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rfshare_models::{Phase, PhaseCommand};
//! use rfshare_process::{Launcher, OsLauncher, StopSignal};
//!
//! # async fn demo() -> rfshare_process::Result<()> {
//! let phase = Phase::new("adsb", PhaseCommand::new("dump1090-fa"), Duration::from_secs(60));
//!
//! let launcher = OsLauncher::new();
//! let mut process = launcher.launch(&phase)?;
//! println!("pid: {:?}", process.id());
//!
//! process.send_stop(StopSignal::Interrupt)?;
//! let outcome = process.wait().await?;
//! println!("backend finished: {}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod launcher;
pub mod process;
pub mod signal;

pub use error::{ProcessError, Result};
pub use launcher::{Launcher, OsLauncher};
pub use process::{CaptureProcess, OsProcess};
pub use signal::StopSignal;
