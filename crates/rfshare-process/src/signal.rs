//! Graceful-stop signals.

use std::fmt;
use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

/// Signal asking a backend to release the receiver and exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    /// SIGINT, what an operator's Ctrl+C would send.
    #[default]
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl StopSignal {
    /// Returns the conventional signal name.
    pub fn name(&self) -> &'static str {
        self.as_nix().as_str()
    }

    pub(crate) fn as_nix(&self) -> Signal {
        match self {
            StopSignal::Interrupt => Signal::SIGINT,
            StopSignal::Terminate => Signal::SIGTERM,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StopSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interrupt" | "int" | "sigint" => Ok(StopSignal::Interrupt),
            "terminate" | "term" | "sigterm" => Ok(StopSignal::Terminate),
            other => Err(format!(
                "unknown stop signal '{}' (expected interrupt or terminate)",
                other
            )),
        }
    }
}
