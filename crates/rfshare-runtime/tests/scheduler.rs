//! Scheduler behavior against in-memory backends on a paused clock.

mod support;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use rfshare_models::{ExitOutcome, Phase, SchedulerState};
use rfshare_process::StopSignal;
use rfshare_runtime::{
    PhaseScheduler, Result, SchedulerConfig, SchedulerError, SchedulerEvent, Termination,
};

use support::{millis, phase, secs, Action, Behavior, FakeLauncher};

fn start(
    phases: Vec<Phase>,
    config: SchedulerConfig,
    launcher: &FakeLauncher,
) -> (Arc<PhaseScheduler>, JoinHandle<Result<()>>) {
    let scheduler = Arc::new(
        PhaseScheduler::new(phases, config, Arc::new(launcher.clone()))
            .expect("valid scheduler"),
    );
    let runner = scheduler.clone();
    let handle = tokio::spawn(async move { runner.run_forever().await });
    (scheduler, handle)
}

fn drain(rx: &mut broadcast::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn delay(secs_: u64) -> SchedulerConfig {
    SchedulerConfig::new().with_transition_delay(secs(secs_))
}

#[tokio::test(start_paused = true)]
async fn test_two_phase_timeline() {
    let launcher = FakeLauncher::new();
    let (scheduler, handle) = start(vec![phase("A", 2), phase("B", 5)], delay(1), &launcher);

    tokio::time::sleep(millis(9500)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.times("A", Action::Launched), vec![secs(0), secs(9)]);
    assert_eq!(launcher.times("A", Action::StopRequested), vec![secs(2), millis(9500)]);
    assert_eq!(launcher.times("B", Action::Launched), vec![secs(3)]);
    assert_eq!(launcher.times("B", Action::StopRequested), vec![secs(8)]);
    assert_eq!(launcher.times("B", Action::Exited), vec![secs(8)]);

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(scheduler.cycle(), 1);
    assert_eq!(launcher.alive(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_sequence() {
    let launcher = FakeLauncher::new();
    let (scheduler, handle) = start(vec![phase("A", 2), phase("B", 5)], delay(1), &launcher);
    let mut rx = scheduler.subscribe();

    tokio::time::sleep(millis(9500)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    let events = drain(&mut rx);
    let phases: Vec<_> = events.iter().map(|e| e.phase().unwrap_or("-")).collect();
    assert_eq!(phases, vec!["A", "A", "B", "B", "-", "A", "A", "-"]);

    assert!(matches!(
        &events[0],
        SchedulerEvent::PhaseStarted { dwell, .. } if *dwell == secs(2)
    ));
    assert!(matches!(
        &events[1],
        SchedulerEvent::PhaseStopped {
            termination: Termination::Exited(outcome),
            ..
        } if *outcome == ExitOutcome::signaled(2)
    ));
    assert_eq!(events[4], SchedulerEvent::CycleCompleted { cycle: 0 });
    assert_eq!(events[7], SchedulerEvent::ShutdownComplete);
    assert!(events.iter().all(|e| !e.is_error()));
}

#[tokio::test(start_paused = true)]
async fn test_never_two_backends_at_once() {
    let launcher = FakeLauncher::new()
        .with_behavior("adsb", Behavior::SlowStop(secs(2)))
        .with_behavior("vdl2", Behavior::SlowStop(millis(700)));
    let config = SchedulerConfig::new().with_transition_delay(std::time::Duration::ZERO);
    let (scheduler, handle) = start(
        vec![phase("adsb", 3), phase("vdl2", 3), phase("acars", 1)],
        config,
        &launcher,
    );

    tokio::time::sleep(secs(40)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.max_alive(), 1);
    assert_eq!(launcher.alive(), 0);

    // Every launch comes after the previous backend's exit.
    let records = launcher.records();
    let mut last_exit = None;
    for record in &records {
        match record.action {
            Action::Launched => {
                if let Some(exit) = last_exit {
                    assert!(record.at >= exit, "{record:?} launched before {exit:?}");
                }
            }
            Action::Exited => last_exit = Some(record.at),
            _ => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_robin_order() {
    let launcher = FakeLauncher::new();
    let (scheduler, handle) = start(vec![phase("A", 1), phase("B", 1)], delay(1), &launcher);

    // Six launches at 0, 2, 4, 6, 8, 10.
    tokio::time::sleep(millis(10500)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.launches(), vec!["A", "B", "A", "B", "A", "B"]);
    assert_eq!(scheduler.cycle(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transition_delay_follows_exit() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::SlowStop(secs(2)));
    let (scheduler, handle) = start(vec![phase("A", 5), phase("B", 5)], delay(3), &launcher);

    tokio::time::sleep(secs(12)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    // Stop at 5, exit at 7, delay until 10.
    assert_eq!(launcher.times("A", Action::Exited), vec![secs(7)]);
    assert_eq!(launcher.times("B", Action::Launched), vec![secs(10)]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_dwell() {
    let launcher = FakeLauncher::new();
    let (scheduler, handle) = start(vec![phase("A", 60), phase("B", 60)], delay(3), &launcher);

    tokio::time::sleep(secs(10)).await;
    assert_eq!(scheduler.current().await.map(|p| p.phase), Some("A".to_string()));

    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.times("A", Action::StopRequested), vec![secs(10)]);
    assert_eq!(launcher.times("A", Action::Exited), vec![secs(10)]);
    assert_eq!(launcher.launches(), vec!["A"]);
    assert!(scheduler.current().await.is_none());
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_transition_delay() {
    let launcher = FakeLauncher::new();
    let (scheduler, handle) = start(vec![phase("A", 2), phase("B", 2)], delay(5), &launcher);

    tokio::time::sleep(secs(4)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    // A was already stopped at 2; nothing else starts.
    assert_eq!(launcher.launches(), vec!["A"]);
    assert_eq!(launcher.times("A", Action::StopRequested), vec![secs(2)]);
    assert_eq!(launcher.alive(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_promptly_after_request() {
    let launcher = FakeLauncher::new();
    let (scheduler, handle) = start(vec![phase("A", 3600)], delay(3), &launcher);

    tokio::time::sleep(secs(1)).await;
    let requested_at = tokio::time::Instant::now();
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(requested_at.elapsed(), std::time::Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent_and_concurrent() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::IgnoreStop);
    let config = delay(1).with_grace_timeout(secs(2));
    let (scheduler, handle) = start(vec![phase("A", 60)], config, &launcher);
    let mut rx = scheduler.subscribe();

    tokio::time::sleep(secs(1)).await;

    let first = scheduler.clone();
    let second = scheduler.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.shutdown().await }),
        tokio::spawn(async move { second.shutdown().await }),
    );
    a.unwrap();
    b.unwrap();
    handle.await.unwrap().unwrap();
    scheduler.shutdown().await;

    assert_eq!(launcher.times("A", Action::StopRequested), vec![secs(1)]);
    assert_eq!(launcher.times("A", Action::Killed), vec![secs(3)]);

    let completions = drain(&mut rx)
        .into_iter()
        .filter(|e| *e == SchedulerEvent::ShutdownComplete)
        .count();
    assert_eq!(completions, 1);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_launch_refused_after_shutdown() {
    let launcher = FakeLauncher::new();
    let scheduler =
        PhaseScheduler::new(vec![phase("A", 1)], delay(1), Arc::new(launcher.clone())).unwrap();

    scheduler.shutdown().await;

    let result = scheduler.launch_phase(&scheduler.phases()[0].clone()).await;
    assert!(matches!(result, Err(SchedulerError::ShuttingDown)));
    assert!(launcher.launches().is_empty());

    // Running again after shutdown does nothing.
    scheduler.run_forever().await.unwrap();
    assert!(launcher.launches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_launch_refused_while_running() {
    let launcher = FakeLauncher::new();
    let scheduler = PhaseScheduler::new(
        vec![phase("A", 1), phase("B", 1)],
        delay(1),
        Arc::new(launcher.clone()),
    )
    .unwrap();
    let phases = scheduler.phases().to_vec();

    scheduler.launch_phase(&phases[0]).await.unwrap();
    let result = scheduler.launch_phase(&phases[1]).await;
    assert!(matches!(result, Err(SchedulerError::AlreadyRunning(name)) if name == "A"));

    let termination = scheduler.terminate_phase().await.unwrap();
    assert_eq!(termination, Some(Termination::Exited(ExitOutcome::signaled(2))));
    scheduler.launch_phase(&phases[1]).await.unwrap();
    assert_eq!(launcher.launches(), vec!["A", "B"]);

    scheduler.shutdown().await;
    assert_eq!(launcher.alive(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_signal_is_configurable() {
    let launcher = FakeLauncher::new();
    let config = delay(1).with_stop_signal(StopSignal::Terminate);
    let scheduler =
        PhaseScheduler::new(vec![phase("A", 1)], config, Arc::new(launcher.clone())).unwrap();

    scheduler.launch_phase(&scheduler.phases()[0].clone()).await.unwrap();
    let termination = scheduler.terminate_phase().await.unwrap();
    assert_eq!(termination, Some(Termination::Exited(ExitOutcome::signaled(15))));
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_skips_phase() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::FailSpawn);
    let (scheduler, handle) = start(vec![phase("A", 5), phase("B", 2)], delay(1), &launcher);
    let mut rx = scheduler.subscribe();

    tokio::time::sleep(millis(5500)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    // A fails at 0 and 4 without dwelling; B runs 1..3 and 5..
    assert_eq!(launcher.times("B", Action::Launched), vec![secs(1), secs(5)]);
    assert!(launcher.times("A", Action::Launched).is_empty());

    let failures = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SchedulerEvent::SpawnFailed { phase, .. } if phase == "A"))
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_all_phases_failing_is_an_error() {
    let launcher = FakeLauncher::new()
        .with_behavior("A", Behavior::FailSpawn)
        .with_behavior("B", Behavior::FailSpawn);
    let (scheduler, handle) = start(vec![phase("A", 5), phase("B", 5)], delay(1), &launcher);

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(SchedulerError::NoPhaseLaunched(0))));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stubborn_backend_is_killed() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::IgnoreStop);
    let config = delay(1).with_grace_timeout(secs(2));
    let (scheduler, handle) = start(vec![phase("A", 5), phase("B", 5)], config, &launcher);
    let mut rx = scheduler.subscribe();

    tokio::time::sleep(secs(9)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.times("A", Action::StopRequested), vec![secs(5)]);
    assert_eq!(launcher.times("A", Action::Killed), vec![secs(7)]);
    assert_eq!(launcher.times("B", Action::Launched), vec![secs(8)]);
    assert_eq!(launcher.max_alive(), 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::TerminationTimeout { phase, grace, .. } if phase == "A" && *grace == secs(2)
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::PhaseStopped {
            phase,
            termination: Termination::Killed(outcome),
            ..
        } if phase == "A" && *outcome == ExitOutcome::signaled(9)
    )));
}

#[tokio::test(start_paused = true)]
async fn test_crashed_backend_keeps_its_slot() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::CrashAfter(millis(1500)));
    let (scheduler, handle) = start(vec![phase("A", 5), phase("B", 5)], delay(1), &launcher);
    let mut rx = scheduler.subscribe();

    tokio::time::sleep(secs(7)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.times("A", Action::Exited), vec![millis(1500)]);
    assert!(launcher.times("A", Action::StopRequested).is_empty());
    assert_eq!(launcher.times("B", Action::Launched), vec![secs(6)]);

    let events = drain(&mut rx);
    let unexpected: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::UnexpectedExit { .. }))
        .collect();
    assert_eq!(unexpected.len(), 1);
    assert!(matches!(
        unexpected[0],
        SchedulerEvent::UnexpectedExit { phase, outcome, .. }
            if phase == "A" && *outcome == ExitOutcome::exited(1)
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::PhaseStopped {
            termination: Termination::AlreadyExited(_),
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_huge_durations_do_not_overflow() {
    let launcher = FakeLauncher::new();
    let forever = std::time::Duration::from_secs(u64::MAX / 2);
    let config = delay(1).with_liveness_interval(forever);
    let adsb = Phase::new("adsb", rfshare_models::PhaseCommand::new("dump1090-fa"), forever);
    let (scheduler, handle) = start(vec![adsb], config, &launcher);
    let mut rx = scheduler.subscribe();

    tokio::time::sleep(secs(1)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.times("adsb", Action::Launched), vec![secs(0)]);
    assert_eq!(launcher.times("adsb", Action::StopRequested), vec![secs(1)]);
    assert_eq!(launcher.alive(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(drain(&mut rx).contains(&SchedulerEvent::ShutdownComplete));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_forced_kill() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::BrokenStatus(millis(500)));
    let (scheduler, handle) = start(vec![phase("A", 5)], delay(1), &launcher);

    tokio::time::sleep(secs(1)).await;
    scheduler.shutdown_controller().request();
    handle.await.unwrap().unwrap();

    assert_eq!(launcher.times("A", Action::Killed), vec![secs(1)]);
    assert_eq!(launcher.times("A", Action::Exited), vec![millis(1500)]);
    assert_eq!(launcher.alive(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_waits_for_forced_kill() {
    let launcher = FakeLauncher::new().with_behavior("A", Behavior::BrokenStatus(millis(500)));
    let scheduler = PhaseScheduler::new(
        vec![phase("A", 5)],
        SchedulerConfig::default(),
        Arc::new(launcher.clone()),
    )
    .unwrap();

    let a = scheduler.phases()[0].clone();
    scheduler.launch_phase(&a).await.unwrap();
    let result = scheduler.terminate_phase().await;

    assert!(matches!(result, Err(SchedulerError::Process(_))));
    assert_eq!(launcher.times("A", Action::Exited), vec![millis(500)]);
    assert_eq!(launcher.alive(), 0);
    assert!(scheduler.current().await.is_none());
}
