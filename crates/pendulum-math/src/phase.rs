//! Phase rectification and bin-interpolated phase extraction.
//!
//! Phase differences are folded into `(-1.5π, 0.5π]`, symmetric about
//! the on-resonance value of `-π/2`, so the quantity the servo tracks
//! never sits next to a wrap discontinuity.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Reduce a phase modulo 2π into `(-1.5π, 0.5π]`.
pub fn phase_rectify(phase: f64) -> f64 {
    let mut p = phase.rem_euclid(2.0 * PI);
    if p > 0.5 * PI {
        p -= 2.0 * PI;
    }
    p
}

/// Index of the spectral bin closest to `omega`.
pub fn nearest_bin(freq: &Array1<f64>, omega: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &f) in freq.iter().enumerate() {
        let dist = (f - omega).abs();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Rectified phase lag of `angle` behind `reference` at one bin. The +π
/// offset accounts for the drive acting through the cart's step
/// response, and puts the expected resonance reading at -π/2.
fn lag_at_bin(angle: &Array1<Complex64>, reference: &Array1<Complex64>, bin: usize) -> f64 {
    phase_rectify(angle[bin].arg() - reference[bin].arg() + PI)
}

/// Phase lag at `omega`, read off the nearest bin.
///
/// With `interpolate` set and `omega` off-bin, the rectified phase is
/// blended linearly with the neighbor on the side of `omega`, weighted
/// by fractional bin distance. Falls back to the nearest bin alone when
/// that neighbor does not exist.
pub fn phase_at(
    freq: &Array1<f64>,
    angle: &Array1<Complex64>,
    reference: &Array1<Complex64>,
    omega: f64,
    interpolate: bool,
) -> f64 {
    let close = nearest_bin(freq, omega);
    let phase_0 = lag_at_bin(angle, reference, close);
    if !interpolate || freq[close] == omega {
        return phase_0;
    }

    let neighbor = if freq[close] < omega {
        if close + 1 >= freq.len() {
            return phase_0;
        }
        close + 1
    } else {
        if close == 0 {
            return phase_0;
        }
        close - 1
    };

    let phase_1 = lag_at_bin(angle, reference, neighbor);
    phase_0 + (omega - freq[close]) / (freq[neighbor] - freq[close]) * (phase_1 - phase_0)
}
