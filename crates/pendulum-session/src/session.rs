// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Session State Machine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! The serial command protocol's supervising state machine.
//!
//! Lives with the orchestrator and is fed every control-plane line the
//! reader task surfaces. Mode entry is acknowledged by the firmware's
//! exact-text banners; anything unrecognized leaves the machine waiting
//! at the command prompt. The resonance modes run a local
//! sub-negotiation (frequencies, then an initial amplitude) before
//! steady telemetry exchange.

use crate::protocol::{classify, parse_centering_result, ControlPlane};
use pendulum_types::error::{PendulumError, PendulumResult};
use pendulum_types::target::ResonanceTarget;

/// Sub-protocol position inside the resonance modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    AwaitFrequency,
    AwaitAmplitude,
    Running,
}

/// Sub-protocol position inside inversion control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidPhase {
    SwingRequest,
    GainEntry,
    Running,
}

/// Protocol stage. Every operating stage exits through `Resetting` back
/// to `AwaitingCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingCommand,
    Centering,
    Pid(PidPhase),
    Measure,
    NormalizedResonance(NegotiationPhase),
    FrequencyScan(NegotiationPhase),
    SetSpeed,
    Resetting,
}

/// What the orchestrator should do after feeding a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Nothing to do; command not yet acknowledged, or telemetry.
    None,
    /// The stage changed; inspect `stage()`.
    Transition,
    /// The firmware rejected the last negotiation input; ask again.
    Reprompt,
    /// A reset-class banner arrived; clear state and reconnect the
    /// prompt loop.
    ResetRequested,
    /// Kill switch: stop workers, export, reconnect.
    Fault,
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    stage: Stage,
    fault: bool,
    target: Option<ResonanceTarget>,
    initial_amplitude: Option<f64>,
    amplitude_submitted: bool,
    centering_result: Option<(u64, i64)>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            stage: Stage::AwaitingCommand,
            fault: false,
            target: None,
            initial_amplitude: None,
            amplitude_submitted: false,
            centering_result: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn fault(&self) -> bool {
        self.fault
    }

    pub fn target(&self) -> Option<&ResonanceTarget> {
        self.target.as_ref()
    }

    pub fn initial_amplitude(&self) -> Option<f64> {
        self.initial_amplitude
    }

    pub fn centering_result(&self) -> Option<(u64, i64)> {
        self.centering_result
    }

    /// Feed one incoming line.
    pub fn on_line(&mut self, line: &str) -> SessionAction {
        let message = classify(line);

        // A kill switch aborts whatever is active.
        if message == Some(ControlPlane::KillSwitch) {
            self.fault = true;
            return SessionAction::Fault;
        }

        match self.stage {
            Stage::AwaitingCommand => match message {
                Some(ControlPlane::BeginCentering) => self.enter(Stage::Centering),
                Some(ControlPlane::BeginPid) => self.enter(Stage::Pid(PidPhase::SwingRequest)),
                Some(ControlPlane::BeginMeasure) => self.enter(Stage::Measure),
                Some(ControlPlane::BeginNormalizedResonance) => self.enter(
                    Stage::NormalizedResonance(NegotiationPhase::AwaitFrequency),
                ),
                Some(ControlPlane::BeginFrequencyScan) => {
                    self.enter(Stage::FrequencyScan(NegotiationPhase::AwaitFrequency))
                }
                Some(ControlPlane::BeginSpeedSetting) => self.enter(Stage::SetSpeed),
                Some(ControlPlane::ResetClass) => self.request_reset(),
                // Not yet acknowledged: stay at the prompt.
                _ => SessionAction::None,
            },

            Stage::Centering => {
                if message == Some(ControlPlane::ResetClass) {
                    return self.request_reset();
                }
                match parse_centering_result(line) {
                    Ok(result) => {
                        self.centering_result = Some(result);
                        self.stage = Stage::Resetting;
                        SessionAction::Transition
                    }
                    Err(_) => SessionAction::None,
                }
            }

            Stage::Pid(phase) => match (phase, message) {
                (_, Some(ControlPlane::ResetClass)) => self.request_reset(),
                (
                    PidPhase::SwingRequest,
                    Some(ControlPlane::ContinueWithSwingUp)
                    | Some(ControlPlane::ContinueWithoutSwingUp),
                ) => self.enter(Stage::Pid(PidPhase::GainEntry)),
                (PidPhase::GainEntry, Some(ControlPlane::StartInversionControl)) => {
                    self.enter(Stage::Pid(PidPhase::Running))
                }
                (PidPhase::GainEntry, Some(ControlPlane::InvalidInput)) => SessionAction::Reprompt,
                _ => SessionAction::None,
            },

            Stage::Measure | Stage::SetSpeed => match message {
                Some(ControlPlane::ResetClass) => self.request_reset(),
                _ => SessionAction::None,
            },

            Stage::NormalizedResonance(phase) => {
                let action = self.negotiate(phase, message);
                if let Some(next) = self.next_negotiation(phase, action) {
                    self.stage = Stage::NormalizedResonance(next);
                }
                action
            }

            Stage::FrequencyScan(phase) => {
                let action = self.negotiate(phase, message);
                if let Some(next) = self.next_negotiation(phase, action) {
                    self.stage = Stage::FrequencyScan(next);
                }
                action
            }

            Stage::Resetting => match message {
                Some(ControlPlane::ResetClass) => SessionAction::ResetRequested,
                _ => SessionAction::None,
            },
        }
    }

    /// Shared negotiation logic for the two resonance modes.
    fn negotiate(
        &mut self,
        phase: NegotiationPhase,
        message: Option<ControlPlane>,
    ) -> SessionAction {
        if message == Some(ControlPlane::ResetClass) {
            return self.request_reset();
        }
        match (phase, message) {
            (NegotiationPhase::AwaitAmplitude, Some(ControlPlane::InvalidInput)) => {
                if self.amplitude_submitted {
                    // The amplitude was the bad input; frequencies stand.
                    self.amplitude_submitted = false;
                } else {
                    // The frequency list was rejected server-side.
                    self.target = None;
                }
                SessionAction::Reprompt
            }
            (NegotiationPhase::AwaitAmplitude, Some(ControlPlane::StartWithAmplitude(echoed))) => {
                if let Some(amp) = echoed {
                    self.initial_amplitude = Some(amp);
                }
                SessionAction::Transition
            }
            (NegotiationPhase::Running, Some(ControlPlane::InvalidInput)) => SessionAction::Reprompt,
            _ => SessionAction::None,
        }
    }

    /// Phase stepping derived from the action `negotiate` chose.
    fn next_negotiation(
        &self,
        phase: NegotiationPhase,
        action: SessionAction,
    ) -> Option<NegotiationPhase> {
        match (phase, action) {
            (NegotiationPhase::AwaitAmplitude, SessionAction::Transition) => {
                Some(NegotiationPhase::Running)
            }
            (NegotiationPhase::AwaitAmplitude, SessionAction::Reprompt) => {
                if self.target.is_none() {
                    Some(NegotiationPhase::AwaitFrequency)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Record the validated frequency target and produce its wire
    /// message. Only legal while the mode is waiting for frequencies.
    pub fn submit_target(&mut self, target: ResonanceTarget) -> PendulumResult<String> {
        match self.stage {
            Stage::NormalizedResonance(NegotiationPhase::AwaitFrequency) => {
                self.stage = Stage::NormalizedResonance(NegotiationPhase::AwaitAmplitude);
            }
            Stage::FrequencyScan(NegotiationPhase::AwaitFrequency) => {
                self.stage = Stage::FrequencyScan(NegotiationPhase::AwaitAmplitude);
            }
            other => {
                return Err(PendulumError::Protocol(format!(
                    "frequency submission outside negotiation: {other:?}"
                )))
            }
        }
        let message = crate::protocol::encode_target(&target);
        self.target = Some(target);
        self.amplitude_submitted = false;
        Ok(message)
    }

    /// Record the initial drive amplitude and produce its wire message.
    pub fn submit_amplitude(&mut self, amplitude: f64) -> PendulumResult<String> {
        let legal = matches!(
            self.stage,
            Stage::NormalizedResonance(NegotiationPhase::AwaitAmplitude)
                | Stage::FrequencyScan(NegotiationPhase::AwaitAmplitude)
        );
        if !legal {
            return Err(PendulumError::Protocol(format!(
                "amplitude submission outside negotiation: {:?}",
                self.stage
            )));
        }
        if !(amplitude.is_finite() && amplitude >= 0.0) {
            return Err(PendulumError::Protocol(format!(
                "initial amplitude {amplitude} must be finite and non-negative"
            )));
        }
        self.initial_amplitude = Some(amplitude);
        self.amplitude_submitted = true;
        Ok(crate::protocol::encode_amplitude(amplitude))
    }

    /// Encode a speed/acceleration pair for the speed-setting mode.
    pub fn submit_speed_setting(&mut self, speed: f64, acceleration: f64) -> PendulumResult<String> {
        if self.stage != Stage::SetSpeed {
            return Err(PendulumError::Protocol(format!(
                "speed submission outside the speed-setting mode: {:?}",
                self.stage
            )));
        }
        if !(speed.is_finite() && speed > 0.0 && acceleration.is_finite() && acceleration > 0.0) {
            return Err(PendulumError::Protocol(format!(
                "speed {speed} and acceleration {acceleration} must be finite and positive"
            )));
        }
        Ok(format!("{speed},{acceleration}\n"))
    }

    fn enter(&mut self, stage: Stage) -> SessionAction {
        self.stage = stage;
        SessionAction::Transition
    }

    fn request_reset(&mut self) -> SessionAction {
        self.stage = Stage::Resetting;
        SessionAction::ResetRequested
    }

    /// Complete a reset or reconnect cycle: negotiation state, fault
    /// flag and results are dropped and the prompt loop resumes.
    pub fn clear(&mut self) {
        *self = SessionStateMachine::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    #[test]
    fn test_nr_banner_enters_frequency_negotiation() {
        let mut sm = SessionStateMachine::new();
        let action = sm.on_line("Begin the normalised resonance.");
        assert_eq!(action, SessionAction::Transition);
        assert_eq!(
            sm.stage(),
            Stage::NormalizedResonance(NegotiationPhase::AwaitFrequency)
        );
    }

    #[test]
    fn test_unrecognized_line_stays_at_prompt() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(sm.on_line("hello there"), SessionAction::None);
        assert_eq!(sm.on_line("Begin the PID control"), SessionAction::None);
        assert_eq!(sm.stage(), Stage::AwaitingCommand);
    }

    #[test]
    fn test_full_nr_negotiation() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_NR);
        let msg = sm.submit_target(ResonanceTarget::Single(1.2)).unwrap();
        assert_eq!(msg, "1.200\n");
        assert_eq!(
            sm.stage(),
            Stage::NormalizedResonance(NegotiationPhase::AwaitAmplitude)
        );
        let msg = sm.submit_amplitude(150.0).unwrap();
        assert_eq!(msg, "150\n");
        assert_eq!(
            sm.on_line("Start with amplitude: 150"),
            SessionAction::Transition
        );
        assert_eq!(
            sm.stage(),
            Stage::NormalizedResonance(NegotiationPhase::Running)
        );
        assert_eq!(sm.initial_amplitude(), Some(150.0));
    }

    #[test]
    fn test_invalid_frequency_reprompts() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_FREQ_SCAN);
        sm.submit_target(ResonanceTarget::multi(vec![0.8, 1.0]).unwrap())
            .unwrap();
        // Firmware rejects the list before any amplitude was offered.
        assert_eq!(sm.on_line(protocol::INVALID_INPUT), SessionAction::Reprompt);
        assert_eq!(
            sm.stage(),
            Stage::FrequencyScan(NegotiationPhase::AwaitFrequency)
        );
        assert!(sm.target().is_none());
    }

    #[test]
    fn test_invalid_amplitude_keeps_frequencies() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_NR);
        sm.submit_target(ResonanceTarget::Single(1.0)).unwrap();
        sm.submit_amplitude(120.0).unwrap();
        assert_eq!(sm.on_line(protocol::INVALID_INPUT), SessionAction::Reprompt);
        assert_eq!(
            sm.stage(),
            Stage::NormalizedResonance(NegotiationPhase::AwaitAmplitude)
        );
        assert!(sm.target().is_some(), "frequency survives an amplitude retry");
    }

    #[test]
    fn test_submission_outside_negotiation_rejected() {
        let mut sm = SessionStateMachine::new();
        assert!(sm.submit_target(ResonanceTarget::Single(1.0)).is_err());
        assert!(sm.submit_amplitude(10.0).is_err());
    }

    #[test]
    fn test_kill_switch_faults_any_stage() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_NR);
        sm.submit_target(ResonanceTarget::Single(1.0)).unwrap();
        assert_eq!(sm.on_line(protocol::KILL_SWITCH), SessionAction::Fault);
        assert!(sm.fault());
    }

    #[test]
    fn test_reset_class_returns_to_prompt_after_clear() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_MEASURE);
        assert_eq!(sm.stage(), Stage::Measure);
        assert_eq!(sm.on_line("Resetting..."), SessionAction::ResetRequested);
        assert_eq!(sm.stage(), Stage::Resetting);
        sm.clear();
        assert_eq!(sm.stage(), Stage::AwaitingCommand);
        assert!(!sm.fault());
    }

    #[test]
    fn test_pid_sub_protocol() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_PID);
        assert_eq!(sm.stage(), Stage::Pid(PidPhase::SwingRequest));
        sm.on_line(protocol::CONTINUE_WITHOUT_SWING_UP);
        assert_eq!(sm.stage(), Stage::Pid(PidPhase::GainEntry));
        assert_eq!(sm.on_line(protocol::INVALID_INPUT), SessionAction::Reprompt);
        assert_eq!(sm.stage(), Stage::Pid(PidPhase::GainEntry));
        sm.on_line(protocol::START_INVERSION);
        assert_eq!(sm.stage(), Stage::Pid(PidPhase::Running));
    }

    #[test]
    fn test_speed_setting_submission() {
        let mut sm = SessionStateMachine::new();
        assert!(sm.submit_speed_setting(4000.0, 2000.0).is_err());
        sm.on_line(protocol::BEGIN_SET_SPEED);
        assert_eq!(sm.stage(), Stage::SetSpeed);
        let msg = sm.submit_speed_setting(4000.0, 2000.0).unwrap();
        assert_eq!(msg, "4000,2000\n");
        assert!(sm.submit_speed_setting(-1.0, 2000.0).is_err());
    }

    #[test]
    fn test_centering_result_recorded() {
        let mut sm = SessionStateMachine::new();
        sm.on_line(protocol::BEGIN_CENTERING);
        assert_eq!(sm.stage(), Stage::Centering);
        assert_eq!(sm.on_line("18,5120"), SessionAction::Transition);
        assert_eq!(sm.centering_result(), Some((18, 5120)));
        assert_eq!(sm.stage(), Stage::Resetting);
    }
}
