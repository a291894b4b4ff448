// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Resonance Controller
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Amplitude servo for the normalized-resonance search.
//!
//! The proportional term steers the rectified phase toward -π/2; the
//! derivative term damps phase-rate oscillation. Updates are
//! multiplicative, so the amplitude scales with the operating point and
//! stays non-negative for bounded gains.
//!
//! The automatic path implements the update law as specified but has
//! not been validated against hardware; treat its sign conventions as
//! provisional until a tuned run confirms them.

use std::f64::consts::PI;

use crate::estimator::PhaseEstimate;
use pendulum_types::config::{NrGains, RigConfig};
use pendulum_types::history::{AmplitudeSample, PhaseSample, RollingHistory};
use pendulum_types::target::ResonanceTarget;

/// Operating mode of the amplitude loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Operator drives the amplitude; the controller only logs.
    Manual,
    /// Closed-loop phase servo.
    Automatic,
    /// Estimation only; nothing is transmitted.
    Scan,
}

/// Mutable servo state.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub amplitude: f64,
    pub gains: NrGains,
    pub wait_to_stable: u32,
    pub cycles_since_update: u32,
}

/// What the harness should transmit after a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    None,
    /// NR feedback pair, encoded as `"<amplitude>,<phase>\n"`.
    AmplitudePhase { amplitude: f64, phase: f64 },
}

#[derive(Debug, Clone)]
pub struct ResonanceController {
    pub mode: ControlMode,
    pub state: ControllerState,
    target: ResonanceTarget,
    /// Phase rings, one per target frequency (units of π).
    phase_history: Vec<RollingHistory<PhaseSample>>,
    amplitude_history: RollingHistory<AmplitudeSample>,
}

impl ResonanceController {
    pub fn new(cfg: &RigConfig, mode: ControlMode, target: ResonanceTarget) -> Self {
        let rings = target.len();
        Self {
            mode,
            state: ControllerState {
                amplitude: cfg.initial_amplitude,
                gains: cfg.gains,
                wait_to_stable: cfg.wait_to_stable,
                cycles_since_update: 0,
            },
            target,
            phase_history: (0..rings)
                .map(|_| RollingHistory::new(cfg.history_length))
                .collect(),
            amplitude_history: RollingHistory::new(cfg.history_length),
        }
    }

    pub fn target(&self) -> &ResonanceTarget {
        &self.target
    }

    /// Phase ring for the primary target.
    pub fn phase_history(&self) -> &RollingHistory<PhaseSample> {
        &self.phase_history[self.phase_history.len() - 1]
    }

    pub fn phase_history_at(&self, index: usize) -> &RollingHistory<PhaseSample> {
        &self.phase_history[index]
    }

    pub fn amplitude_history(&self) -> &RollingHistory<AmplitudeSample> {
        &self.amplitude_history
    }

    /// Manual passthrough: the operator picked a new amplitude.
    pub fn set_amplitude(&mut self, amplitude: f64, now: f64) {
        self.state.amplitude = amplitude.abs();
        self.amplitude_history.push(AmplitudeSample {
            time: now,
            amplitude: self.state.amplitude,
        });
    }

    /// One control cycle with per-target phase estimates (same order as
    /// the target list). Histories are recorded every cycle; in
    /// automatic mode a new amplitude is computed only once
    /// `cycles_since_update` reaches `wait_to_stable`.
    pub fn step(&mut self, estimates: &[PhaseEstimate], now: f64) -> ControlCommand {
        debug_assert_eq!(estimates.len(), self.phase_history.len());
        for (ring, est) in self.phase_history.iter_mut().zip(estimates.iter()) {
            ring.push(PhaseSample {
                time: now,
                phase_over_pi: est.phase / PI,
            });
        }
        self.amplitude_history.push(AmplitudeSample {
            time: now,
            amplitude: self.state.amplitude,
        });

        match self.mode {
            ControlMode::Scan | ControlMode::Manual => ControlCommand::None,
            ControlMode::Automatic => {
                if self.state.cycles_since_update < self.state.wait_to_stable {
                    self.state.cycles_since_update += 1;
                    return ControlCommand::None;
                }
                self.state.cycles_since_update = 0;

                let primary = self.phase_history();
                let phase = match primary.latest() {
                    Some(p) => p.phase_over_pi * PI,
                    None => return ControlCommand::None,
                };

                let delta_p = self.state.gains.kp * (phase + PI / 2.0) / (2.0 * PI);
                // Guarded against a single-sample history and repeated
                // timestamps.
                let delta_d = match (primary.latest(), primary.previous()) {
                    (Some(last), Some(prev)) if last.time > prev.time => {
                        self.state.gains.kd * (last.phase_over_pi - prev.phase_over_pi)
                            / (last.time - prev.time)
                    }
                    _ => 0.0,
                };
                // gains.ki is reserved; the integral path is not wired up.

                let updated =
                    self.state.amplitude * (1.0 - delta_p) * (1.0 - delta_d);
                self.state.amplitude = updated.max(0.0);

                ControlCommand::AmplitudePhase {
                    amplitude: self.state.amplitude,
                    phase,
                }
            }
        }
    }

    /// Drop all history and return the servo to its initial cadence.
    pub fn reset(&mut self, initial_amplitude: f64) {
        self.state.amplitude = initial_amplitude;
        self.state.cycles_since_update = 0;
        for ring in &mut self.phase_history {
            ring.clear();
        }
        self.amplitude_history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::PhaseEstimate;

    fn config() -> RigConfig {
        RigConfig::default()
    }

    fn estimate(phase: f64) -> PhaseEstimate {
        PhaseEstimate {
            phase,
            phase_const: phase,
        }
    }

    fn automatic(cfg: &RigConfig) -> ResonanceController {
        let mut ctrl =
            ResonanceController::new(cfg, ControlMode::Automatic, ResonanceTarget::Single(1.0));
        // Immediate updates unless a test wants throttling.
        ctrl.state.wait_to_stable = 0;
        ctrl
    }

    #[test]
    fn test_on_resonance_with_kp_only_holds_amplitude() {
        let mut cfg = config();
        cfg.gains.kd = 0.0;
        let mut ctrl = automatic(&cfg);
        let before = ctrl.state.amplitude;
        let cmd = ctrl.step(&[estimate(-PI / 2.0)], 1.0);
        assert_eq!(ctrl.state.amplitude, before, "phase at -π/2 is a fixed point");
        match cmd {
            ControlCommand::AmplitudePhase { amplitude, .. } => {
                assert_eq!(amplitude, before)
            }
            ControlCommand::None => panic!("automatic mode must emit a command"),
        }
    }

    #[test]
    fn test_phase_above_resonance_shrinks_amplitude() {
        let mut cfg = config();
        cfg.gains.kd = 0.0;
        let mut ctrl = automatic(&cfg);
        let before = ctrl.state.amplitude;
        ctrl.step(&[estimate(0.0)], 1.0);
        assert!(
            ctrl.state.amplitude < before,
            "lagging less than -π/2 must reduce drive"
        );
    }

    #[test]
    fn test_amplitude_never_negative() {
        let mut cfg = config();
        cfg.gains.kp = 5.0; // absurd gain, still bounded behavior
        cfg.gains.kd = 3.0;
        let mut ctrl = automatic(&cfg);
        let phases = [0.4 * PI, -1.4 * PI, 0.1 * PI, -0.9 * PI];
        for (i, &p) in phases.iter().cycle().take(200).enumerate() {
            ctrl.step(&[estimate(p)], i as f64 * 0.1);
            assert!(
                ctrl.state.amplitude >= 0.0,
                "amplitude went negative at cycle {i}"
            );
        }
    }

    #[test]
    fn test_derivative_term_damps() {
        let mut cfg = config();
        cfg.gains.kp = 0.0;
        cfg.gains.kd = 0.1;
        let mut ctrl = automatic(&cfg);
        // Rising phase: positive derivative, amplitude must shrink.
        ctrl.step(&[estimate(-PI / 2.0)], 0.0);
        let before = ctrl.state.amplitude;
        ctrl.step(&[estimate(-PI / 2.0 + 0.3)], 1.0);
        assert!(ctrl.state.amplitude < before);
    }

    #[test]
    fn test_derivative_guard_on_first_cycle() {
        let mut cfg = config();
        cfg.gains.kp = 0.0;
        cfg.gains.kd = 10.0;
        let mut ctrl = automatic(&cfg);
        let before = ctrl.state.amplitude;
        // Single-sample history: derivative must be treated as zero.
        ctrl.step(&[estimate(0.3)], 0.0);
        assert_eq!(ctrl.state.amplitude, before);
    }

    #[test]
    fn test_throttle_waits_for_stability() {
        let cfg = config();
        let mut ctrl =
            ResonanceController::new(&cfg, ControlMode::Automatic, ResonanceTarget::Single(1.0));
        ctrl.state.wait_to_stable = 3;
        let mut commands = 0;
        for i in 0..8 {
            if let ControlCommand::AmplitudePhase { .. } = ctrl.step(&[estimate(0.0)], i as f64) {
                commands += 1;
            }
        }
        // Cycles 0..2 warm up, cycle 3 fires, 4..6 warm up, 7 fires.
        assert_eq!(commands, 2);
        // History still recorded on every cycle.
        assert_eq!(ctrl.phase_history().len(), 8);
        assert_eq!(ctrl.amplitude_history().len(), 8);
    }

    #[test]
    fn test_scan_mode_never_commands() {
        let cfg = config();
        let target = ResonanceTarget::multi(vec![0.8, 1.0, 1.2]).unwrap();
        let mut ctrl = ResonanceController::new(&cfg, ControlMode::Scan, target);
        for i in 0..10 {
            let ests = [estimate(0.1), estimate(-0.2), estimate(-1.0)];
            assert_eq!(ctrl.step(&ests, i as f64), ControlCommand::None);
        }
        assert_eq!(ctrl.phase_history_at(0).len(), 10);
        assert_eq!(ctrl.phase_history_at(2).len(), 10);
    }

    #[test]
    fn test_manual_mode_logs_operator_amplitude() {
        let cfg = config();
        let mut ctrl =
            ResonanceController::new(&cfg, ControlMode::Manual, ResonanceTarget::Single(1.0));
        assert_eq!(ctrl.step(&[estimate(0.0)], 0.0), ControlCommand::None);
        ctrl.set_amplitude(-350.0, 1.0);
        assert_eq!(ctrl.state.amplitude, 350.0, "manual amplitude is rectified");
        let latest = ctrl.amplitude_history().latest().unwrap();
        assert_eq!(latest.amplitude, 350.0);
    }

    #[test]
    fn test_reset_clears_history_and_amplitude() {
        let cfg = config();
        let mut ctrl = automatic(&cfg);
        ctrl.step(&[estimate(0.2)], 0.0);
        ctrl.reset(cfg.initial_amplitude);
        assert!(ctrl.phase_history().is_empty());
        assert!(ctrl.amplitude_history().is_empty());
        assert_eq!(ctrl.state.amplitude, cfg.initial_amplitude);
    }
}
