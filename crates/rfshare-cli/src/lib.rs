//! rfshare command-line library.
//!
//! Settings loading, built-in presets and the `run`, `check` and `phases`
//! subcommands behind the `rfshare` binary.

pub mod cli;
pub mod commands;
pub mod presets;
pub mod settings;

pub use settings::{Settings, SettingsError, SettingsSource};
