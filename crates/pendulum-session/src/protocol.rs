// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Wire Protocol
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Control-plane literals and command encoders.
//!
//! The link is ASCII, newline-terminated, line-oriented. Control-plane
//! messages from the cart firmware are matched exactly; anything that
//! matches nothing is either telemetry or noise for the caller to sort
//! out.

use pendulum_types::error::{PendulumError, PendulumResult};
use pendulum_types::target::ResonanceTarget;

/// Handshake sent right after opening the port.
pub const CONNECTION: &str = "connection\n";
/// Hard-stop command for the active mode.
pub const TERMINATE: &str = "Terminate\n";

pub const KILL_SWITCH: &str = "Kill switch hit.";
pub const INVALID_INPUT: &str = "Invalid input, please try again.";
pub const BEGIN_CENTERING: &str = "Begin centering.";
pub const BEGIN_PID: &str = "Begin the PID control.";
pub const BEGIN_MEASURE: &str = "Begin the natural frequency and quality factor measuring.";
pub const BEGIN_NR: &str = "Begin the normalised resonance.";
pub const BEGIN_SET_SPEED: &str = "Begin the speed and acceleration setting.";
pub const BEGIN_FREQ_SCAN: &str = "Begin the frequency scan.";
pub const START_INVERSION: &str = "Start inversion control.";
pub const START_WITH_AMPLITUDE: &str = "Start with amplitude: ";
pub const CONTINUE_WITH_SWING_UP: &str = "Continue with swing up strategy.";
pub const CONTINUE_WITHOUT_SWING_UP: &str = "Continue without swing up strategy.";

/// Reset-class literals: any of these re-opens the command prompt.
pub const RESET_CLASS: [&str; 4] = [
    "Resetting...",
    "No command detected.",
    "Unidentified command. Please try again.",
    "More than one command detected. Resetting the values.",
];

/// A recognized control-plane message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPlane {
    BeginCentering,
    BeginPid,
    BeginMeasure,
    BeginNormalizedResonance,
    BeginSpeedSetting,
    BeginFrequencyScan,
    KillSwitch,
    InvalidInput,
    ResetClass,
    StartInversionControl,
    /// Mode ack carrying the amplitude the firmware settled on.
    StartWithAmplitude(Option<f64>),
    ContinueWithSwingUp,
    ContinueWithoutSwingUp,
}

/// Exact-match classification of one incoming line. Returns `None` for
/// telemetry and unrecognized text.
pub fn classify(line: &str) -> Option<ControlPlane> {
    let line = line.trim_end();
    if RESET_CLASS.contains(&line) {
        return Some(ControlPlane::ResetClass);
    }
    if let Some(rest) = line.strip_prefix(START_WITH_AMPLITUDE) {
        return Some(ControlPlane::StartWithAmplitude(rest.trim().parse().ok()));
    }
    match line {
        BEGIN_CENTERING => Some(ControlPlane::BeginCentering),
        BEGIN_PID => Some(ControlPlane::BeginPid),
        BEGIN_MEASURE => Some(ControlPlane::BeginMeasure),
        BEGIN_NR => Some(ControlPlane::BeginNormalizedResonance),
        BEGIN_SET_SPEED => Some(ControlPlane::BeginSpeedSetting),
        BEGIN_FREQ_SCAN => Some(ControlPlane::BeginFrequencyScan),
        KILL_SWITCH => Some(ControlPlane::KillSwitch),
        INVALID_INPUT => Some(ControlPlane::InvalidInput),
        START_INVERSION => Some(ControlPlane::StartInversionControl),
        CONTINUE_WITH_SWING_UP => Some(ControlPlane::ContinueWithSwingUp),
        CONTINUE_WITHOUT_SWING_UP => Some(ControlPlane::ContinueWithoutSwingUp),
        _ => None,
    }
}

/// Mode-select keywords the host sends from the command prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Reboot,
    Center,
    Pid,
    Measure,
    NormalizedResonance,
    SetSpeed,
    FrequencyScan,
}

impl HostCommand {
    pub fn keyword(&self) -> &'static str {
        match self {
            HostCommand::Reboot => "reboot",
            HostCommand::Center => "center",
            HostCommand::Pid => "pid",
            HostCommand::Measure => "measure",
            HostCommand::NormalizedResonance => "NR",
            HostCommand::SetSpeed => "setSpeed",
            HostCommand::FrequencyScan => "freq_scan",
        }
    }

    pub fn wire(&self) -> String {
        format!("{}\n", self.keyword())
    }
}

pub fn encode_amplitude(amplitude: f64) -> String {
    format!("{amplitude}\n")
}

/// NR feedback pair: `"<amplitude>,<phase>\n"`, phase in radians.
pub fn encode_feedback(amplitude: f64, phase: f64) -> String {
    format!("{amplitude},{phase}\n")
}

/// Single frequency or comma-joined list, three decimals each, matching
/// what the firmware parser expects.
pub fn encode_target(target: &ResonanceTarget) -> String {
    let joined: Vec<String> = target
        .frequencies()
        .iter()
        .map(|w| format!("{w:.3}"))
        .collect();
    format!("{}\n", joined.join(","))
}

/// Centering reports `"count,distance"`.
pub fn parse_centering_result(line: &str) -> PendulumResult<(u64, i64)> {
    let line = line.trim_end();
    let (count, distance) = line.split_once(',').ok_or_else(|| {
        PendulumError::Protocol(format!("centering result missing comma: {line:?}"))
    })?;
    let count = count
        .trim()
        .parse()
        .map_err(|_| PendulumError::Protocol(format!("bad centering count: {count:?}")))?;
    let distance = distance
        .trim()
        .parse()
        .map_err(|_| PendulumError::Protocol(format!("bad centering distance: {distance:?}")))?;
    Ok((count, distance))
}
