//! Phase types for rfshare.
//!
//! A phase is one capture mode in the round-robin schedule: the backend
//! command that claims the receiver and how long it may hold it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a backend's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StdioMode {
    /// Share the scheduler's own stdout/stderr.
    #[default]
    Inherit,
    /// Discard all output.
    Null,
    /// Append stdout and stderr to a log file.
    File {
        /// Path of the log file.
        path: PathBuf,
    },
}

/// The command a phase launches.
///
/// Arguments are opaque to the scheduler apart from placeholder expansion,
/// see [`TemplateVars`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCommand {
    /// Executable name or path.
    pub program: String,

    /// Argument list, passed verbatim after expansion.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the backend.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Working directory for the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Output handling.
    #[serde(default)]
    pub stdio: StdioMode,
}

impl PhaseCommand {
    /// Creates a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            stdio: StdioMode::Inherit,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the output handling.
    pub fn with_stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }

    /// Returns the command as a single display line.
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Expands placeholders in the program, arguments, environment values
    /// and paths.
    pub fn render(&self, vars: &TemplateVars) -> Self {
        let stdio = match &self.stdio {
            StdioMode::File { path } => StdioMode::File {
                path: vars.expand_path(path),
            },
            other => other.clone(),
        };

        Self {
            program: vars.expand(&self.program),
            args: self.args.iter().map(|a| vars.expand(a)).collect(),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), vars.expand(v)))
                .collect(),
            working_dir: self.working_dir.as_deref().map(|d| vars.expand_path(d)),
            stdio,
        }
    }
}

/// A configured capture phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Unique phase identifier, e.g. "adsb".
    pub name: String,

    /// How long the backend may hold the receiver.
    #[serde(rename = "dwell_secs", with = "duration_secs")]
    pub dwell: Duration,

    /// Artifact the backend writes. Only used for expansion and display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Backend command.
    pub command: PhaseCommand,
}

impl Phase {
    /// Creates a new phase.
    pub fn new(name: impl Into<String>, command: PhaseCommand, dwell: Duration) -> Self {
        Self {
            name: name.into(),
            dwell,
            output: None,
            command,
        }
    }

    /// Sets the artifact path.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Returns a copy with every placeholder expanded for `device`.
    pub fn resolve(&self, device: &str) -> Self {
        let vars = TemplateVars::new(device, &self.name).with_output(self.output.clone());
        Self {
            name: self.name.clone(),
            dwell: self.dwell,
            output: self.output.clone(),
            command: self.command.render(&vars),
        }
    }
}

/// Values substituted into phase command templates.
///
/// Recognised placeholders: `{device}`, `{phase}`, `{output}` and
/// `{output_dir}`. Unknown placeholders are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    /// Receiver identifier.
    pub device: String,
    /// Phase name.
    pub phase: String,
    /// Phase artifact path.
    pub output: Option<PathBuf>,
}

impl TemplateVars {
    /// Creates template variables without an output path.
    pub fn new(device: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            phase: phase.into(),
            output: None,
        }
    }

    /// Sets the output path.
    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    /// Expands placeholders in a string.
    pub fn expand(&self, template: &str) -> String {
        let mut out = template
            .replace("{device}", &self.device)
            .replace("{phase}", &self.phase);

        if let Some(output) = &self.output {
            let dir = output
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            out = out
                .replace("{output_dir}", &dir.to_string_lossy())
                .replace("{output}", &output.to_string_lossy());
        }

        out
    }

    /// Expands placeholders in a path.
    pub fn expand_path(&self, path: &Path) -> PathBuf {
        PathBuf::from(self.expand(&path.to_string_lossy()))
    }
}

/// Serde helper storing a [`Duration`] as (possibly fractional) seconds.
pub mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| de::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
