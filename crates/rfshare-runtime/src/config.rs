//! Scheduler configuration.

use std::time::Duration;

use rfshare_process::StopSignal;

use crate::error::{Result, SchedulerError};

/// Configuration for the phase scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause between one backend exiting and the next starting, so the
    /// receiver driver can release and re-claim the device.
    pub transition_delay: Duration,
    /// How long a backend may take to exit after the stop signal before it
    /// is killed.
    pub grace_timeout: Duration,
    /// Signal used to ask a backend to stop.
    pub stop_signal: StopSignal,
    /// How often the running backend is checked for an early exit.
    pub liveness_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            transition_delay: Duration::from_secs(3),
            grace_timeout: Duration::from_secs(10),
            stop_signal: StopSignal::Interrupt,
            liveness_interval: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transition delay.
    pub fn with_transition_delay(mut self, delay: Duration) -> Self {
        self.transition_delay = delay;
        self
    }

    /// Sets the grace timeout.
    pub fn with_grace_timeout(mut self, timeout: Duration) -> Self {
        self.grace_timeout = timeout;
        self
    }

    /// Sets the stop signal.
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = signal;
        self
    }

    /// Sets the liveness check interval.
    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// Checks that every duration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.grace_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "grace timeout must be positive".to_string(),
            ));
        }
        if self.liveness_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "liveness interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
