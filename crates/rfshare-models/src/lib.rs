//! Core data models for rfshare.
//!
//! This crate provides the types shared by the process layer, the scheduler
//! runtime and the command-line front end: the configured [`Phase`] records,
//! the command templates they launch, and the small value types describing
//! scheduler and process state.

pub mod phase;
pub mod state;

// Re-export main types
pub use phase::{duration_secs, Phase, PhaseCommand, StdioMode, TemplateVars};
pub use state::{ExitOutcome, ProcessInfo, SchedulerState};
