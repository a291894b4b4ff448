// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Spectral Phase Estimator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Phase and amplitude extraction from buffered telemetry.
//!
//! Each control cycle resamples the snapshot onto a near-uniform grid,
//! transforms the angle and position channels plus a synthetic trace of
//! the commanded base oscillation, and reads the rectified phase lag at
//! the drive frequency. The lag against the measured position is the
//! servo input; the lag against the synthetic drive is kept alongside
//! for cross-validation.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

use pendulum_math::dft::{dft, dft_freq, positive_half};
use pendulum_math::phase::phase_at;
use pendulum_math::sinefit::delay_fit;
use pendulum_math::window::{gather, select_window};
use pendulum_types::buffer::Snapshot;
use pendulum_types::config::RigConfig;
use pendulum_types::error::{PendulumError, PendulumResult};

/// The estimator's slice of the rig configuration.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    pub fft_length: usize,
    pub sampling_div: f64,
    pub amp_0: f64,
}

impl From<&RigConfig> for EstimatorConfig {
    fn from(cfg: &RigConfig) -> Self {
        EstimatorConfig {
            fft_length: cfg.fft_length,
            sampling_div: cfg.sampling_div,
            amp_0: cfg.amp_0,
        }
    }
}

/// Positive-frequency spectra of one windowed snapshot.
#[derive(Debug, Clone)]
pub struct ChannelSpectra {
    pub freq: Array1<f64>,
    pub angle: Array1<Complex64>,
    pub position: Array1<Complex64>,
    /// Spectrum of the synthetic base drive `amp0·sin(2πω(t + t0))`.
    pub drive: Array1<Complex64>,
    pub avg_spacing: f64,
    /// Device-relative time of the newest sample in the window.
    pub latest_time: f64,
    /// Number of samples behind the transform.
    pub window_len: usize,
}

impl ChannelSpectra {
    /// Spectral resolution of the underlying grid.
    pub fn resolution(&self) -> f64 {
        1.0 / (self.window_len as f64 * self.avg_spacing)
    }

    /// Nyquist frequency of the underlying grid.
    pub fn nyquist(&self) -> f64 {
        1.0 / (2.0 * self.avg_spacing)
    }
}

/// One phase reading, radians, rectified into `(-1.5π, 0.5π]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseEstimate {
    /// Lag of the angle behind the measured position trace. Feeds the
    /// servo and the histories.
    pub phase: f64,
    /// Lag of the angle behind the synthetic constant drive.
    pub phase_const: f64,
}

#[derive(Debug, Clone)]
pub struct SpectralPhaseEstimator {
    cfg: EstimatorConfig,
}

impl SpectralPhaseEstimator {
    pub fn new(cfg: EstimatorConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.cfg
    }

    /// Transform the snapshot's channels at drive frequency `omega`.
    ///
    /// Returns `None` while fewer than `5 × sampling_div` seconds of
    /// history exist: the cycle is not ready, which is not an error.
    pub fn spectrum(&self, snap: &Snapshot, omega: f64) -> Option<ChannelSpectra> {
        let window = snap.full_window()?;
        let latest_time = *window.time.last()?;
        if latest_time <= 5.0 * self.cfg.sampling_div {
            return None;
        }

        let sel = select_window(window.time, self.cfg.fft_length, self.cfg.sampling_div)?;
        let t = gather(window.time, &sel.indices);
        let angle = gather(window.angle, &sel.indices);
        let position = gather(window.position, &sel.indices);
        let start_time = snap.start_time();
        let drive: Vec<f64> = t
            .iter()
            .map(|&ti| self.cfg.amp_0 * (2.0 * PI * omega * (ti + start_time)).sin())
            .collect();

        let freq_full = dft_freq(t.len(), sel.avg_spacing);
        Some(ChannelSpectra {
            freq: positive_half(&freq_full),
            angle: positive_half(&dft(&angle)),
            position: positive_half(&dft(&position)),
            drive: positive_half(&dft(&drive)),
            avg_spacing: sel.avg_spacing,
            latest_time,
            window_len: t.len(),
        })
    }

    /// Rectified phase lag at `target_omega` against both references.
    pub fn estimate_phase(
        &self,
        spectra: &ChannelSpectra,
        target_omega: f64,
        interpolate: bool,
    ) -> PhaseEstimate {
        PhaseEstimate {
            phase: phase_at(
                &spectra.freq,
                &spectra.angle,
                &spectra.position,
                target_omega,
                interpolate,
            ),
            phase_const: phase_at(
                &spectra.freq,
                &spectra.angle,
                &spectra.drive,
                target_omega,
                interpolate,
            ),
        }
    }

    /// One estimate per target frequency, all against the same spectra.
    pub fn estimate_multi(
        &self,
        spectra: &ChannelSpectra,
        omegas: &[f64],
        interpolate: bool,
    ) -> Vec<PhaseEstimate> {
        omegas
            .iter()
            .map(|&w| self.estimate_phase(spectra, w, interpolate))
            .collect()
    }

    /// Natural-frequency pick: the peak bin of the angle spectrum, with
    /// the grid's spectral resolution as its uncertainty.
    pub fn natural_frequency(&self, spectra: &ChannelSpectra) -> Option<(f64, f64)> {
        let mut best = None;
        let mut best_mag = 0.0;
        for (i, c) in spectra.angle.iter().enumerate() {
            let mag = c.norm();
            if mag > best_mag {
                best_mag = mag;
                best = Some(i);
            }
        }
        best.map(|i| (spectra.freq[i], spectra.resolution()))
    }

    /// Scan-mode diagnostic: delay of the observed position trace behind
    /// the commanded base oscillation. Fit failure is the caller's cue
    /// to drop this cycle's diagnostic.
    pub fn delay_diagnostic(&self, snap: &Snapshot, omega: f64) -> PendulumResult<(f64, f64)> {
        let window = snap.full_window().ok_or_else(|| PendulumError::FitDiverged {
            iterations: 0,
            message: "empty buffer".to_string(),
        })?;
        let sel = select_window(window.time, self.cfg.fft_length, self.cfg.sampling_div)
            .ok_or_else(|| PendulumError::FitDiverged {
                iterations: 0,
                message: "insufficient history for delay fit".to_string(),
            })?;
        let t = gather(window.time, &sel.indices);
        let position = gather(window.position, &sel.indices);
        delay_fit(&t, &position, self.cfg.amp_0, omega, snap.start_time())
    }
}
