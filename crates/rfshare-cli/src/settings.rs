//! Settings file loading.
//!
//! A settings file describes the device, the scheduler timings and the
//! phase list. YAML and JSON are both accepted; the format is picked from the
//! file extension.
//!
//! ```yaml
//! device: "0"
//! transition_delay_secs: 3
//! grace_timeout_secs: 10
//! stop_signal: interrupt
//! phases:
//!   - name: adsb
//!     dwell_secs: 60
//!     output: /tmp/aircraft.json
//!     command:
//!       program: dump1090-fa
//!       args: ["--device-index", "{device}", "--write-json", "{output_dir}", "--quiet"]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use rfshare_models::{duration_secs, Phase, StdioMode};
use rfshare_process::StopSignal;
use rfshare_runtime::{validate_phases, SchedulerConfig, SchedulerError};

use crate::cli::SourceArgs;
use crate::presets;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "RFSHARE_CONFIG";

/// Default device when neither the file nor the command line names one.
pub const DEFAULT_DEVICE: &str = "0";

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// YAML parse error.
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        /// File path.
        path: PathBuf,
        /// Parser error.
        source: serde_yaml::Error,
    },

    /// JSON parse error.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File path.
        path: PathBuf,
        /// Parser error.
        source: serde_json::Error,
    },

    /// The file extension is neither YAML nor JSON.
    #[error("unsupported settings format: {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),

    /// No preset with that name.
    #[error("unknown preset '{name}' (available: {available})")]
    UnknownPreset {
        /// Requested name.
        name: String,
        /// Comma-separated preset names.
        available: String,
    },

    /// The schedule failed validation.
    #[error(transparent)]
    Invalid(#[from] SchedulerError),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// A complete schedule description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Receiver identifier, substituted for `{device}`.
    #[serde(default = "default_device")]
    pub device: String,

    /// Pause between one backend exiting and the next starting.
    #[serde(
        rename = "transition_delay_secs",
        with = "duration_secs",
        default = "default_transition_delay"
    )]
    pub transition_delay: Duration,

    /// Time allowed for a backend to exit after the stop signal.
    #[serde(
        rename = "grace_timeout_secs",
        with = "duration_secs",
        default = "default_grace_timeout"
    )]
    pub grace_timeout: Duration,

    /// Signal asking a backend to stop.
    #[serde(default)]
    pub stop_signal: StopSignal,

    /// How often the running backend is checked for an early exit.
    #[serde(
        rename = "liveness_interval_secs",
        with = "duration_secs",
        default = "default_liveness_interval"
    )]
    pub liveness_interval: Duration,

    /// Phases in schedule order.
    pub phases: Vec<Phase>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_transition_delay() -> Duration {
    SchedulerConfig::default().transition_delay
}

fn default_grace_timeout() -> Duration {
    SchedulerConfig::default().grace_timeout
}

fn default_liveness_interval() -> Duration {
    SchedulerConfig::default().liveness_interval
}

impl Settings {
    /// Creates settings with default timings for the given phases.
    pub fn new(phases: Vec<Phase>) -> Self {
        Self {
            device: default_device(),
            transition_delay: default_transition_delay(),
            grace_timeout: default_grace_timeout(),
            stop_signal: StopSignal::default(),
            liveness_interval: default_liveness_interval(),
            phases,
        }
    }

    /// Loads settings from a YAML or JSON file. A leading `~` is expanded.
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_tilde(path);
        let format = Format::from_path(&path)?;

        let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), ?format, "loading settings");

        match format {
            Format::Yaml => serde_yaml::from_str(&content)
                .map_err(|source| SettingsError::Yaml { path, source }),
            Format::Json => serde_json::from_str(&content)
                .map_err(|source| SettingsError::Json { path, source }),
        }
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, args: &SourceArgs) {
        if let Some(device) = &args.device {
            self.device = device.clone();
        }
        if let Some(delay) = args.transition_delay {
            self.transition_delay = delay;
        }
        if let Some(grace) = args.grace_timeout {
            self.grace_timeout = grace;
        }
    }

    /// Scheduler configuration for these settings.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_transition_delay(self.transition_delay)
            .with_grace_timeout(self.grace_timeout)
            .with_stop_signal(self.stop_signal)
            .with_liveness_interval(self.liveness_interval)
    }

    /// Phases with every placeholder and `~` expanded, ready to launch.
    pub fn resolved_phases(&self) -> Vec<Phase> {
        self.phases
            .iter()
            .map(|phase| {
                // Output first, so `{output}` expands to the full path.
                let mut phase = phase.clone();
                phase.output = phase.output.as_deref().map(expand_tilde);
                let mut resolved = phase.resolve(&self.device);

                let command = &mut resolved.command;
                command.working_dir = command.working_dir.as_deref().map(expand_tilde);
                if let StdioMode::File { path } = &mut command.stdio {
                    *path = expand_tilde(path);
                }
                resolved
            })
            .collect()
    }

    /// Returns a copy with phases resolved, for display.
    pub fn resolved(&self) -> Self {
        Self {
            phases: self.resolved_phases(),
            ..self.clone()
        }
    }

    /// Checks phases and timings.
    pub fn validate(&self) -> Result<()> {
        validate_phases(&self.phases)?;
        self.scheduler_config().validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            Some("json") => Ok(Format::Json),
            _ => Err(SettingsError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

// ==================== Source Selection ====================

/// Where the active settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// A settings file.
    File(PathBuf),
    /// A built-in preset.
    Preset(String),
}

impl fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsSource::File(path) => write!(f, "file {}", path.display()),
            SettingsSource::Preset(name) => write!(f, "preset {}", name),
        }
    }
}

/// Default settings file location: `<config dir>/rfshare/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rfshare").join("config.yaml"))
}

/// Picks the settings source.
///
/// Precedence: `--config`, `--preset`, `$RFSHARE_CONFIG`, the default file
/// if it exists, then the default preset.
pub fn select_source(
    args: &SourceArgs,
    env_path: Option<PathBuf>,
    default_path: Option<PathBuf>,
) -> SettingsSource {
    if let Some(path) = &args.config {
        return SettingsSource::File(path.clone());
    }
    if let Some(name) = &args.preset {
        return SettingsSource::Preset(name.clone());
    }
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return SettingsSource::File(path);
    }
    if let Some(path) = default_path.filter(|p| p.is_file()) {
        return SettingsSource::File(path);
    }
    SettingsSource::Preset(presets::DEFAULT_PRESET.to_string())
}

/// Loads settings from a source without overrides or validation.
pub fn load_source(source: &SettingsSource) -> Result<Settings> {
    match source {
        SettingsSource::File(path) => Settings::load(path),
        SettingsSource::Preset(name) => {
            presets::preset(name).ok_or_else(|| SettingsError::UnknownPreset {
                name: name.clone(),
                available: presets::NAMES.join(", "),
            })
        }
    }
}

/// Selects, loads, overrides and validates settings for a command.
pub fn resolve(args: &SourceArgs) -> Result<(Settings, SettingsSource)> {
    let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let source = select_source(args, env_path, default_config_path());

    let mut settings = load_source(&source)?;
    settings.apply_overrides(args);
    settings.validate()?;

    debug!(source = %source, phases = settings.phases.len(), "settings ready");
    Ok((settings, source))
}
