//! Command-line interface definition using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    // Format: "0.1.0 (abc1234, 2026-10-18)"
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// rfshare - share one SDR receiver between capture backends by time slicing
#[derive(Parser, Debug)]
#[command(name = "rfshare")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the schedule until SIGINT or SIGTERM
    Run {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Validate the configuration and look up every backend on PATH
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the resolved schedule
    Phases {
        #[command(flatten)]
        source: SourceArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Where the schedule comes from, plus command-line overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Settings file (YAML or JSON). Defaults to $RFSHARE_CONFIG, then
    /// <config dir>/rfshare/config.yaml
    #[arg(short, long, conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Built-in schedule (adsb-vdl2, adsb-acars)
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Receiver identifier passed to every backend
    #[arg(short, long, env = "RFSHARE_DEVICE")]
    pub device: Option<String>,

    /// Seconds between one backend exiting and the next starting
    #[arg(long, value_name = "SECS", value_parser = parse_secs)]
    pub transition_delay: Option<Duration>,

    /// Seconds a backend may take to exit before it is killed
    #[arg(long, value_name = "SECS", value_parser = parse_secs)]
    pub grace_timeout: Option<Duration>,
}

/// Parses a non-negative, possibly fractional, number of seconds.
fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration '{}': {}", value, e))
}

impl Cli {
    /// Returns the log level based on verbosity.
    ///
    /// The default is `info` so phase progress is visible.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
