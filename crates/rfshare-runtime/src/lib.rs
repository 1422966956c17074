//! Phase scheduler runtime for rfshare.
//!
//! This crate time-shares one receiver between capture backends:
//! - `PhaseScheduler` - runs each phase's backend for its dwell, stops it,
//!   waits out the transition delay and moves on, forever
//! - `ShutdownController` - one-way `Running -> ShuttingDown -> Stopped`
//!   lifecycle shared with signal handlers
//! - `spawn_signal_listener` - turns SIGINT/SIGTERM into a shutdown request
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rfshare_models::{Phase, PhaseCommand};
//! use rfshare_process::OsLauncher;
//! use rfshare_runtime::{spawn_signal_listener, PhaseScheduler, SchedulerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let phases = vec![
//!         Phase::new("adsb", PhaseCommand::new("dump1090-fa"), Duration::from_secs(60)),
//!         Phase::new("vdl2", PhaseCommand::new("dumpvdl2"), Duration::from_secs(60)),
//!     ];
//!
//!     let scheduler = PhaseScheduler::new(
//!         phases,
//!         SchedulerConfig::default(),
//!         Arc::new(OsLauncher::new()),
//!     )?;
//!
//!     // Print events
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     spawn_signal_listener(scheduler.shutdown_controller())?;
//!     scheduler.run_forever().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Key Concepts
//!
//! ## Exclusive access
//!
//! The running backend lives in a single mutex-guarded slot. A phase is only
//! launched into an empty slot, and the slot is only emptied after the
//! backend's exit has been observed, so two backends never hold the receiver
//! at the same time.
//!
//! ## Shutdown
//!
//! Signal handlers only flip the shutdown state. The scheduler wakes from
//! whichever sleep it is in, stops the active backend (graceful signal, then
//! SIGKILL after the grace timeout) and marks itself stopped. No phase is
//! launched once shutdown has been requested.

pub mod config;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod shutdown;
pub mod signals;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use event::{SchedulerEvent, Termination};
pub use scheduler::{validate_phases, PhaseScheduler, RunningProcess};
pub use shutdown::ShutdownController;
pub use signals::spawn_signal_listener;
