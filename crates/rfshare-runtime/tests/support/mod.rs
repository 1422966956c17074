//! In-memory capture backends for scheduler tests.
//!
//! Everything is driven by tokio's clock, so tests run with
//! `start_paused = true` and timings are exact.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use rfshare_models::{ExitOutcome, Phase, PhaseCommand};
use rfshare_process::{CaptureProcess, Launcher, ProcessError, StopSignal};

/// How a fake backend reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Exits as soon as it is asked to stop.
    Cooperative,
    /// Exits this long after being asked to stop.
    SlowStop(Duration),
    /// Ignores the stop signal; only SIGKILL ends it.
    IgnoreStop,
    /// Exits with code 1 this long after launch.
    CrashAfter(Duration),
    /// Cannot be spawned.
    FailSpawn,
    /// Status queries fail, and SIGKILL takes this long to land.
    BrokenStatus(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Launched,
    StopRequested,
    Killed,
    Exited,
}

/// One thing that happened to a backend, with its time since the launcher
/// was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub phase: String,
    pub action: Action,
    pub at: Duration,
}

#[derive(Debug)]
struct Shared {
    epoch: Instant,
    log: Mutex<Vec<Record>>,
    alive: AtomicUsize,
    max_alive: AtomicUsize,
    next_pid: AtomicU32,
}

impl Shared {
    fn record(&self, phase: &str, action: Action) {
        let record = Record {
            phase: phase.to_string(),
            action,
            at: self.epoch.elapsed(),
        };
        self.log.lock().unwrap().push(record);
    }
}

/// Launcher producing [`FakeProcess`]es.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    shared: Arc<Shared>,
    behaviors: HashMap<String, Behavior>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                epoch: Instant::now(),
                log: Mutex::new(Vec::new()),
                alive: AtomicUsize::new(0),
                max_alive: AtomicUsize::new(0),
                next_pid: AtomicU32::new(1000),
            }),
            behaviors: HashMap::new(),
        }
    }

    /// Sets the behavior of one phase. Unlisted phases are cooperative.
    pub fn with_behavior(mut self, phase: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(phase.to_string(), behavior);
        self
    }

    pub fn records(&self) -> Vec<Record> {
        self.shared.log.lock().unwrap().clone()
    }

    /// Times at which `action` happened to `phase`.
    pub fn times(&self, phase: &str, action: Action) -> Vec<Duration> {
        self.records()
            .into_iter()
            .filter(|r| r.phase == phase && r.action == action)
            .map(|r| r.at)
            .collect()
    }

    /// Launch order as phase names.
    pub fn launches(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.action == Action::Launched)
            .map(|r| r.phase)
            .collect()
    }

    pub fn alive(&self) -> usize {
        self.shared.alive.load(Ordering::SeqCst)
    }

    pub fn max_alive(&self) -> usize {
        self.shared.max_alive.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, phase: &Phase) -> rfshare_process::Result<Box<dyn CaptureProcess>> {
        let behavior = self
            .behaviors
            .get(&phase.name)
            .copied()
            .unwrap_or(Behavior::Cooperative);

        if behavior == Behavior::FailSpawn {
            return Err(ProcessError::Spawn {
                program: phase.command.program.clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }

        let alive = self.shared.alive.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_alive.fetch_max(alive, Ordering::SeqCst);
        self.shared.record(&phase.name, Action::Launched);

        let (tx, _) = watch::channel(None);
        let process = FakeProcess {
            phase: phase.name.clone(),
            pid: self.shared.next_pid.fetch_add(1, Ordering::SeqCst),
            behavior,
            exit: Arc::new(tx),
            shared: self.shared.clone(),
        };

        if let Behavior::CrashAfter(after) = behavior {
            let exit = process.clone_exit();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                exit.finish(ExitOutcome::exited(1));
            });
        }

        Ok(Box::new(process))
    }
}

/// Sets the exit outcome exactly once.
struct ExitHandle {
    phase: String,
    tx: Arc<watch::Sender<Option<ExitOutcome>>>,
    shared: Arc<Shared>,
}

impl ExitHandle {
    fn finish(&self, outcome: ExitOutcome) {
        let finished = self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        });
        if finished {
            self.shared.alive.fetch_sub(1, Ordering::SeqCst);
            self.shared.record(&self.phase, Action::Exited);
        }
    }
}

pub struct FakeProcess {
    phase: String,
    pid: u32,
    behavior: Behavior,
    exit: Arc<watch::Sender<Option<ExitOutcome>>>,
    shared: Arc<Shared>,
}

impl FakeProcess {
    fn clone_exit(&self) -> ExitHandle {
        ExitHandle {
            phase: self.phase.clone(),
            tx: self.exit.clone(),
            shared: self.shared.clone(),
        }
    }

    fn outcome(&self) -> Option<ExitOutcome> {
        *self.exit.borrow()
    }
}

#[async_trait]
impl CaptureProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        match self.outcome() {
            Some(_) => None,
            None => Some(self.pid),
        }
    }

    fn try_wait(&mut self) -> rfshare_process::Result<Option<ExitOutcome>> {
        if let Behavior::BrokenStatus(_) = self.behavior {
            return Err(ProcessError::Io(io::Error::other("status unavailable")));
        }
        Ok(self.outcome())
    }

    fn send_stop(&mut self, signal: StopSignal) -> rfshare_process::Result<()> {
        if self.outcome().is_some() {
            return Ok(());
        }
        self.shared.record(&self.phase, Action::StopRequested);

        let signo = match signal {
            StopSignal::Interrupt => 2,
            StopSignal::Terminate => 15,
        };
        match self.behavior {
            Behavior::Cooperative => self.clone_exit().finish(ExitOutcome::signaled(signo)),
            Behavior::SlowStop(after) => {
                let exit = self.clone_exit();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    exit.finish(ExitOutcome::signaled(signo));
                });
            }
            Behavior::IgnoreStop
            | Behavior::CrashAfter(_)
            | Behavior::FailSpawn
            | Behavior::BrokenStatus(_) => {}
        }
        Ok(())
    }

    fn kill(&mut self) -> rfshare_process::Result<()> {
        if self.outcome().is_some() {
            return Ok(());
        }
        self.shared.record(&self.phase, Action::Killed);
        let exit = self.clone_exit();
        match self.behavior {
            Behavior::BrokenStatus(after) => {
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    exit.finish(ExitOutcome::signaled(9));
                });
            }
            _ => exit.finish(ExitOutcome::signaled(9)),
        }
        Ok(())
    }

    async fn wait(&mut self) -> rfshare_process::Result<ExitOutcome> {
        let mut rx = self.exit.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ProcessError::Io(io::Error::other("exit channel closed")))?;
        Ok((*outcome).unwrap_or(ExitOutcome::signaled(9)))
    }
}

pub fn phase(name: &str, dwell_secs: u64) -> Phase {
    Phase::new(
        name,
        PhaseCommand::new(format!("{name}-backend")),
        Duration::from_secs(dwell_secs),
    )
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
