//! Round-robin phase scheduler.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use rfshare_models::{ExitOutcome, Phase, ProcessInfo, SchedulerState};
use rfshare_process::{CaptureProcess, Launcher};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::event::{SchedulerEvent, Termination};
use crate::shutdown::ShutdownController;

/// Stand-in deadline for durations too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The capture backend currently holding the receiver.
pub struct RunningProcess {
    /// Phase that launched the backend.
    pub phase: String,
    /// Backend process id at launch.
    pub pid: Option<u32>,
    /// Wall-clock launch time.
    pub started_at: DateTime<Utc>,
    /// Monotonic launch time.
    pub launched: Instant,
    /// Exit observed by a liveness check.
    exited: Option<ExitOutcome>,
    /// OS handle.
    process: Box<dyn CaptureProcess>,
}

impl fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningProcess")
            .field("phase", &self.phase)
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .field("exited", &self.exited)
            .finish()
    }
}

impl RunningProcess {
    fn new(phase: String, process: Box<dyn CaptureProcess>) -> Self {
        Self {
            phase,
            pid: process.id(),
            started_at: Utc::now(),
            launched: Instant::now(),
            exited: None,
            process,
        }
    }

    /// Returns a snapshot for observers.
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            phase: self.phase.clone(),
            pid: self.pid,
            started_at: self.started_at,
        }
    }

    /// Time since launch.
    pub fn elapsed(&self) -> Duration {
        self.launched.elapsed()
    }
}

/// Mutable scheduling state. The running slot is the only state shared with
/// the shutdown path.
#[derive(Debug, Default)]
struct ScheduleState {
    current_index: AtomicUsize,
    cycle: AtomicU64,
    running: Mutex<Option<RunningProcess>>,
}

/// Why a suspension point returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Shutdown,
}

/// Shares one receiver between capture backends by running them in turn.
///
/// At most one backend runs at any time: the previous backend's exit is
/// always observed before the next one is launched.
pub struct PhaseScheduler {
    /// Phases in schedule order.
    phases: Vec<Phase>,
    /// Configuration.
    config: SchedulerConfig,
    /// Backend launcher.
    launcher: Arc<dyn Launcher>,
    /// Index, cycle counter and running slot.
    state: ScheduleState,
    /// Lifecycle.
    shutdown: ShutdownController,
    /// Event broadcast channel.
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl PhaseScheduler {
    /// Creates a scheduler over `phases`, which must already be resolved
    /// (placeholders expanded).
    ///
    /// # Errors
    ///
    /// Fails if there are no phases, a phase name is empty or repeated, a
    /// dwell is zero, a program is empty, or the config is invalid.
    pub fn new(
        phases: Vec<Phase>,
        config: SchedulerConfig,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self> {
        validate_phases(&phases)?;
        config.validate()?;

        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            phases,
            config,
            launcher,
            state: ScheduleState::default(),
            shutdown: ShutdownController::new(),
            event_tx,
        })
    }

    /// Uses an existing shutdown controller, e.g. one already wired to the
    /// signal listener.
    pub fn with_shutdown(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the phases in schedule order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Returns a handle that can request shutdown from anywhere.
    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.shutdown.state()
    }

    /// Index of the phase currently being served.
    pub fn current_index(&self) -> usize {
        self.state.current_index.load(Ordering::SeqCst)
    }

    /// Number of completed cycles.
    pub fn cycle(&self) -> u64 {
        self.state.cycle.load(Ordering::SeqCst)
    }

    /// Subscribe to scheduler events.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the running backend, if any.
    pub async fn current(&self) -> Option<ProcessInfo> {
        self.state.running.lock().await.as_ref().map(RunningProcess::info)
    }

    fn emit_event(&self, event: SchedulerEvent) {
        // Ignore send errors (no receivers)
        let _ = self.event_tx.send(event);
    }

    // ==================== Cycle ====================

    /// Runs the schedule until shutdown.
    ///
    /// Returns `Ok(())` once shutdown has completed. On any error the
    /// running backend is still stopped before the error is returned.
    pub async fn run_forever(&self) -> Result<()> {
        info!(
            phases = self.phases.len(),
            transition_delay_secs = self.config.transition_delay.as_secs_f64(),
            grace_timeout_secs = self.config.grace_timeout.as_secs_f64(),
            stop_signal = self.config.stop_signal.name(),
            "scheduler starting"
        );

        let result = self.cycle_loop().await;
        if let Err(e) = &result {
            error!(error = %e, "scheduler stopping after error");
        }
        self.shutdown().await;
        result
    }

    async fn cycle_loop(&self) -> Result<()> {
        let mut index = 0;
        let mut launched_this_cycle = 0usize;

        loop {
            if self.shutdown.is_requested() {
                return Ok(());
            }

            let phase = &self.phases[index];
            self.state.current_index.store(index, Ordering::SeqCst);

            match self.launch_phase(phase).await {
                Ok(_) => {
                    launched_this_cycle += 1;
                    if self.dwell(phase).await == Wake::Shutdown {
                        return Ok(());
                    }
                    self.terminate_phase().await?;
                }
                Err(SchedulerError::Spawn { .. }) => {
                    // Already logged; the phase forfeits its turn.
                }
                Err(SchedulerError::ShuttingDown) => return Ok(()),
                Err(e) => return Err(e),
            }

            index = (index + 1) % self.phases.len();
            if index == 0 {
                let cycle = self.state.cycle.fetch_add(1, Ordering::SeqCst);
                if launched_this_cycle == 0 {
                    return Err(SchedulerError::NoPhaseLaunched(cycle));
                }
                debug!(cycle, launched = launched_this_cycle, "cycle completed");
                self.emit_event(SchedulerEvent::CycleCompleted { cycle });
                launched_this_cycle = 0;
            }

            if self.pause(self.config.transition_delay).await == Wake::Shutdown {
                return Ok(());
            }
        }
    }

    /// Blocks for the phase's dwell, checking the backend for an early exit.
    async fn dwell(&self, phase: &Phase) -> Wake {
        let deadline = deadline_after(phase.dwell);
        let period = self.config.liveness_interval;
        let mut ticker = interval_at(deadline_after(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut exited = false;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return Wake::Elapsed,
                _ = self.shutdown.requested() => return Wake::Shutdown,
                _ = ticker.tick(), if !exited => {
                    exited = self.check_liveness().await;
                }
            }
        }
    }

    /// Blocks for the transition delay.
    async fn pause(&self, delay: Duration) -> Wake {
        if delay.is_zero() {
            return if self.shutdown.is_requested() {
                Wake::Shutdown
            } else {
                Wake::Elapsed
            };
        }

        debug!(delay_secs = delay.as_secs_f64(), "waiting for device to settle");
        tokio::select! {
            _ = sleep(delay) => Wake::Elapsed,
            _ = self.shutdown.requested() => Wake::Shutdown,
        }
    }

    // ==================== Phase Lifecycle ====================

    /// Launches a phase's backend and makes it the running process.
    ///
    /// # Errors
    ///
    /// - `ShuttingDown` once shutdown has been requested
    /// - `AlreadyRunning` if another backend still holds the receiver
    /// - `Spawn` if the backend cannot be started (logged and reported as a
    ///   `SpawnFailed` event)
    pub async fn launch_phase(&self, phase: &Phase) -> Result<ProcessInfo> {
        let mut slot = self.state.running.lock().await;

        // Checked under the lock: a shutdown that has already taken the lock
        // will never see a process launched after it.
        if self.shutdown.is_requested() {
            return Err(SchedulerError::ShuttingDown);
        }
        if let Some(running) = slot.as_ref() {
            return Err(SchedulerError::AlreadyRunning(running.phase.clone()));
        }

        let process = match self.launcher.launch(phase) {
            Ok(p) => p,
            Err(source) => {
                error!(
                    phase = %phase.name,
                    cmd = %phase.command.display_line(),
                    error = %source,
                    "failed to launch phase, skipping its turn"
                );
                self.emit_event(SchedulerEvent::SpawnFailed {
                    phase: phase.name.clone(),
                    error: source.to_string(),
                });
                return Err(SchedulerError::Spawn {
                    phase: phase.name.clone(),
                    source,
                });
            }
        };

        let running = RunningProcess::new(phase.name.clone(), process);
        let info = running.info();
        *slot = Some(running);
        drop(slot);

        info!(
            phase = %phase.name,
            pid = ?info.pid,
            dwell_secs = phase.dwell.as_secs_f64(),
            "phase started"
        );
        self.emit_event(SchedulerEvent::PhaseStarted {
            phase: phase.name.clone(),
            pid: info.pid,
            dwell: phase.dwell,
        });

        Ok(info)
    }

    /// Stops the running backend and waits for it to exit.
    ///
    /// The slot is cleared once the exit has been observed. If stopping
    /// fails the backend is sent SIGKILL, its exit awaited for up to the
    /// grace timeout, and the error returned. Returns `None` when nothing
    /// was running.
    pub async fn terminate_phase(&self) -> Result<Option<Termination>> {
        let mut slot = self.state.running.lock().await;
        let Some(running) = slot.as_mut() else {
            return Ok(None);
        };

        let result = self.stop_process(running).await;
        let (phase, pid, ran_for) = (running.phase.clone(), running.pid, running.elapsed());
        if let Err(e) = &result {
            error!(phase = %phase, pid = ?pid, error = %e, "failed to stop backend, killing it");
            self.force_kill(running).await;
        }
        *slot = None;
        drop(slot);

        let termination = result?;
        info!(
            phase = %phase,
            pid = ?pid,
            ran_secs = ran_for.as_secs_f64(),
            result = %termination,
            "phase stopped"
        );
        self.emit_event(SchedulerEvent::PhaseStopped {
            phase,
            pid,
            termination,
        });

        Ok(Some(termination))
    }

    /// Graceful stop with bounded wait and SIGKILL escalation.
    async fn stop_process(&self, running: &mut RunningProcess) -> Result<Termination> {
        let observed = match running.exited {
            Some(outcome) => Some(outcome),
            None => running.process.try_wait()?,
        };
        if let Some(outcome) = observed {
            if running.exited.is_none() {
                self.report_unexpected_exit(running, outcome);
            }
            return Ok(Termination::AlreadyExited(outcome));
        }

        let signal = self.config.stop_signal;
        debug!(phase = %running.phase, pid = ?running.pid, signal = signal.name(), "sending stop signal");

        if let Err(e) = running.process.send_stop(signal) {
            warn!(
                phase = %running.phase,
                pid = ?running.pid,
                error = %e,
                "graceful stop failed, killing backend"
            );
            return self.kill_process(running).await;
        }

        let grace = self.config.grace_timeout;
        match timeout(grace, running.process.wait()).await {
            Ok(outcome) => Ok(Termination::Exited(outcome?)),
            Err(_) => {
                warn!(
                    phase = %running.phase,
                    pid = ?running.pid,
                    grace_secs = grace.as_secs_f64(),
                    "backend ignored {}, killing it",
                    signal
                );
                self.emit_event(SchedulerEvent::TerminationTimeout {
                    phase: running.phase.clone(),
                    pid: running.pid,
                    grace,
                });
                self.kill_process(running).await
            }
        }
    }

    async fn kill_process(&self, running: &mut RunningProcess) -> Result<Termination> {
        running.process.kill()?;
        let outcome = running.process.wait().await?;
        Ok(Termination::Killed(outcome))
    }

    /// SIGKILL after process control failed. Returns true once the exit has
    /// been observed, waiting at most the grace timeout.
    async fn force_kill(&self, running: &mut RunningProcess) -> bool {
        if let Err(e) = running.process.kill() {
            error!(phase = %running.phase, pid = ?running.pid, error = %e, "failed to kill backend");
            return false;
        }

        let grace = self.config.grace_timeout;
        match timeout(grace, running.process.wait()).await {
            Ok(Ok(outcome)) => {
                info!(phase = %running.phase, pid = ?running.pid, outcome = %outcome, "backend killed");
                true
            }
            Ok(Err(e)) => {
                error!(phase = %running.phase, pid = ?running.pid, error = %e, "failed to wait for killed backend");
                false
            }
            Err(_) => {
                error!(
                    phase = %running.phase,
                    pid = ?running.pid,
                    grace_secs = grace.as_secs_f64(),
                    "backend still running after SIGKILL"
                );
                false
            }
        }
    }

    /// Polls the running backend. Returns true if it has exited.
    async fn check_liveness(&self) -> bool {
        let mut slot = self.state.running.lock().await;
        let Some(running) = slot.as_mut() else {
            return false;
        };
        if running.exited.is_some() {
            return true;
        }

        match running.process.try_wait() {
            Ok(Some(outcome)) => {
                self.report_unexpected_exit(running, outcome);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(phase = %running.phase, error = %e, "liveness check failed");
                false
            }
        }
    }

    fn report_unexpected_exit(&self, running: &mut RunningProcess, outcome: ExitOutcome) {
        running.exited = Some(outcome);
        warn!(
            phase = %running.phase,
            pid = ?running.pid,
            ran_secs = running.elapsed().as_secs_f64(),
            outcome = %outcome,
            "backend exited before its dwell elapsed"
        );
        self.emit_event(SchedulerEvent::UnexpectedExit {
            phase: running.phase.clone(),
            pid: running.pid,
            outcome,
        });
    }

    // ==================== Shutdown ====================

    /// Requests shutdown, stops the running backend (if any) and marks the
    /// scheduler stopped.
    ///
    /// Safe to call concurrently with the cycle and with itself: callers
    /// serialize on the running slot, and later ones find it empty.
    pub async fn shutdown(&self) {
        if self.shutdown.request() {
            info!("shutdown requested");
        }

        let mut slot = self.state.running.lock().await;
        let mut released = true;
        if let Some(running) = slot.as_mut() {
            info!(phase = %running.phase, pid = ?running.pid, "stopping active phase");
            match self.stop_process(running).await {
                Ok(termination) => {
                    info!(phase = %running.phase, result = %termination, "phase stopped");
                    self.emit_event(SchedulerEvent::PhaseStopped {
                        phase: running.phase.clone(),
                        pid: running.pid,
                        termination,
                    });
                }
                Err(e) => {
                    error!(phase = %running.phase, error = %e, "failed to stop backend cleanly");
                    released = self.force_kill(running).await;
                }
            }
        }
        *slot = None;
        drop(slot);

        if self.shutdown.mark_stopped() {
            if released {
                info!("shutdown complete, no capture process running");
            } else {
                warn!("shutdown complete, but the last backend's exit was not observed");
            }
            self.emit_event(SchedulerEvent::ShutdownComplete);
        }
    }
}

/// `Instant::now() + duration`, or far in the future if that overflows.
fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Checks a phase list: at least one phase, unique non-empty names, positive
/// dwell and a program for every phase.
pub fn validate_phases(phases: &[Phase]) -> Result<()> {
    if phases.is_empty() {
        return Err(SchedulerError::NoPhases);
    }

    let mut seen = HashSet::new();
    for phase in phases {
        let invalid = |reason: &str| SchedulerError::InvalidPhase {
            name: phase.name.clone(),
            reason: reason.to_string(),
        };

        if phase.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if phase.dwell.is_zero() {
            return Err(invalid("dwell must be positive"));
        }
        if phase.command.program.trim().is_empty() {
            return Err(invalid("program must not be empty"));
        }
        if !seen.insert(phase.name.as_str()) {
            return Err(SchedulerError::DuplicatePhase(phase.name.clone()));
        }
    }

    Ok(())
}
