//! Built-in schedules.

use std::time::Duration;

use rfshare_models::{Phase, PhaseCommand};

use crate::settings::Settings;

/// Preset used when no settings file is found.
pub const DEFAULT_PRESET: &str = "adsb-vdl2";

/// All preset names.
pub const NAMES: &[&str] = &["adsb-vdl2", "adsb-acars"];

/// VDL2 ground-station frequencies in Hz.
const VDL2_FREQUENCIES: &[&str] = &["136925000", "136975000", "131525000", "131725000"];

/// ACARS frequencies in MHz.
const ACARS_FREQUENCIES: &[&str] = &["131.525", "131.725", "131.825"];

/// Returns a preset by name.
pub fn preset(name: &str) -> Option<Settings> {
    match name {
        "adsb-vdl2" => Some(Settings::new(vec![adsb(), vdl2()])),
        "adsb-acars" => Some(Settings::new(vec![adsb(), acars()])),
        _ => None,
    }
}

fn adsb() -> Phase {
    Phase::new(
        "adsb",
        PhaseCommand::new("dump1090-fa").args([
            "--device-index",
            "{device}",
            "--write-json",
            "{output_dir}",
            "--quiet",
        ]),
        Duration::from_secs(60),
    )
    .with_output("/tmp/aircraft.json")
}

fn vdl2() -> Phase {
    let command = PhaseCommand::new("dumpvdl2")
        .args(["--rtlsdr", "{device}", "--output", "decoded:json:file:path={output}"])
        .args(VDL2_FREQUENCIES.iter().copied());

    Phase::new("vdl2", command, Duration::from_secs(60)).with_output("/tmp/vdl2.json")
}

fn acars() -> Phase {
    let command = PhaseCommand::new("acarsdec")
        .args(["-o", "4", "-l", "{output}", "-r", "{device}"])
        .args(ACARS_FREQUENCIES.iter().copied());

    Phase::new("acars", command, Duration::from_secs(60)).with_output("/tmp/acars.json")
}
