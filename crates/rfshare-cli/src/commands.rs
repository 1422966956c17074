//! Command handlers for CLI subcommands.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use rfshare_models::Phase;
use rfshare_process::OsLauncher;
use rfshare_runtime::{spawn_signal_listener, PhaseScheduler};

use crate::cli::{Commands, SourceArgs};
use crate::settings::{self, Settings, SettingsSource};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command.
pub async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Run { source } => cmd_run(&source).await,
        Commands::Check { source } => cmd_check(&source),
        Commands::Phases { source, json } => cmd_phases(&source, json),
    }
}

async fn cmd_run(args: &SourceArgs) -> Result<()> {
    let (settings, source) = settings::resolve(args)?;
    let phases = settings.resolved_phases();

    info!(
        source = %source,
        device = %settings.device,
        phases = %phase_names(&phases),
        "loaded schedule"
    );
    for phase in &phases {
        if which::which(&phase.command.program).is_err() {
            warn!(
                phase = %phase.name,
                program = %phase.command.program,
                "backend not found on PATH, this phase will fail to launch"
            );
        }
    }

    let scheduler = PhaseScheduler::new(
        phases,
        settings.scheduler_config(),
        Arc::new(OsLauncher::new()),
    )?;
    let listener = spawn_signal_listener(scheduler.shutdown_controller())?;

    let result = scheduler.run_forever().await;
    listener.abort();
    result?;

    info!("rfshare stopped");
    Ok(())
}

fn cmd_check(args: &SourceArgs) -> Result<()> {
    let (settings, source) = settings::resolve(args)?;
    let phases = settings.resolved_phases();

    println!("Settings: {}", source);
    println!("  Device: {}", settings.device);
    println!(
        "  Transition delay: {}s, grace timeout: {}s, stop signal: {}",
        settings.transition_delay.as_secs_f64(),
        settings.grace_timeout.as_secs_f64(),
        settings.stop_signal
    );
    println!();

    let mut missing = 0;
    for phase in &phases {
        match which::which(&phase.command.program) {
            Ok(path) => println!("  [ok]      {:<12} {}", phase.name, path.display()),
            Err(_) => {
                missing += 1;
                println!(
                    "  [missing] {:<12} {} not found on PATH",
                    phase.name, phase.command.program
                );
            }
        }
    }

    if missing > 0 {
        return Err(format!("{} backend program(s) not found", missing).into());
    }

    println!("\nConfiguration OK ({} phases)", phases.len());
    Ok(())
}

fn cmd_phases(args: &SourceArgs, json: bool) -> Result<()> {
    let (settings, source) = settings::resolve(args)?;

    if json {
        let report = PhasesReport {
            source: source_label(&source),
            settings: settings.resolved(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let phases = settings.resolved_phases();
    println!("Schedule from {} (device {})", source, settings.device);
    println!("{:<4} {:<12} {:>8}  {}", "#", "PHASE", "DWELL", "COMMAND");
    for (i, phase) in phases.iter().enumerate() {
        println!(
            "{:<4} {:<12} {:>7}s  {}",
            i + 1,
            phase.name,
            phase.dwell.as_secs_f64(),
            phase.command.display_line()
        );
    }

    let cycle: f64 = phases.iter().map(|p| p.dwell.as_secs_f64()).sum::<f64>()
        + settings.transition_delay.as_secs_f64() * phases.len() as f64;
    println!(
        "\nTransition delay {}s, full cycle about {}s",
        settings.transition_delay.as_secs_f64(),
        cycle
    );
    Ok(())
}

#[derive(Serialize)]
struct PhasesReport {
    source: String,
    #[serde(flatten)]
    settings: Settings,
}

fn source_label(source: &SettingsSource) -> String {
    match source {
        SettingsSource::File(path) => path.display().to_string(),
        SettingsSource::Preset(name) => format!("preset:{}", name),
    }
}

fn phase_names(phases: &[Phase]) -> String {
    phases
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
