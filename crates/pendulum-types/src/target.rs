// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Resonance Target
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Drive-frequency targets for the resonance modes.

use serde::{Deserialize, Serialize};

use crate::error::{PendulumError, PendulumResult};

/// Most frequencies the hardware will track simultaneously.
pub const MAX_SIMULTANEOUS: usize = 10;

/// One drive frequency, or an ordered sweep of up to ten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResonanceTarget {
    Single(f64),
    Multi(Vec<f64>),
}

impl ResonanceTarget {
    /// Validate a frequency list: 2..=10 entries, strictly increasing,
    /// all positive and finite.
    pub fn multi(omegas: Vec<f64>) -> PendulumResult<Self> {
        if omegas.len() < 2 || omegas.len() > MAX_SIMULTANEOUS {
            return Err(PendulumError::FrequencyList(format!(
                "need between 2 and {MAX_SIMULTANEOUS} frequencies, got {}",
                omegas.len()
            )));
        }
        for &w in &omegas {
            if !w.is_finite() || w <= 0.0 {
                return Err(PendulumError::FrequencyList(format!(
                    "frequency {w} is not positive and finite"
                )));
            }
        }
        for pair in omegas.windows(2) {
            if pair[1] <= pair[0] {
                return Err(PendulumError::FrequencyList(format!(
                    "frequencies must be strictly increasing: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(ResonanceTarget::Multi(omegas))
    }

    /// Evenly spaced sweep from `start` to `end` inclusive.
    pub fn sweep(start: f64, end: f64, count: usize) -> PendulumResult<Self> {
        if count == 1 {
            if !start.is_finite() || start <= 0.0 {
                return Err(PendulumError::FrequencyList(format!(
                    "frequency {start} is not positive and finite"
                )));
            }
            return Ok(ResonanceTarget::Single(start));
        }
        if end <= start {
            return Err(PendulumError::FrequencyList(format!(
                "end frequency {end} must exceed start {start}"
            )));
        }
        let step = (end - start) / (count - 1) as f64;
        Self::multi((0..count).map(|i| start + step * i as f64).collect())
    }

    pub fn frequencies(&self) -> &[f64] {
        match self {
            ResonanceTarget::Single(w) => std::slice::from_ref(w),
            ResonanceTarget::Multi(ws) => ws,
        }
    }

    pub fn len(&self) -> usize {
        self.frequencies().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The frequency steady control tracks: the single target, or the
    /// largest entry of a sweep.
    pub fn primary(&self) -> f64 {
        match self {
            ResonanceTarget::Single(w) => *w,
            ResonanceTarget::Multi(ws) => ws[ws.len() - 1],
        }
    }

    /// Smallest gap between adjacent sweep entries. The spectral
    /// resolution `1 / (fft_length * sampling_div)` should stay below
    /// this for the per-frequency phases to separate.
    pub fn min_spacing(&self) -> Option<f64> {
        match self {
            ResonanceTarget::Single(_) => None,
            ResonanceTarget::Multi(ws) => ws
                .windows(2)
                .map(|p| p[1] - p[0])
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)),
        }
    }
}
