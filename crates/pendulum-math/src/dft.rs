//! 1D DFT wrappers around rustfft.
//!
//! Convention matches numpy: forward transform unnormalized, frequency
//! axis in `fftfreq` order (DC, positive half, negative half).

use ndarray::Array1;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Forward DFT of a real channel. Matches `numpy.fft.fft()`: no
/// normalization on the forward transform.
pub fn dft(input: &[f64]) -> Array1<Complex64> {
    let mut data: Vec<Complex64> = input.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(data.len());
    fft.process(&mut data);
    Array1::from_vec(data)
}

/// Frequency axis for an `n`-point transform at sample spacing `d`.
/// Matches `numpy.fft.fftfreq(n, d)`.
pub fn dft_freq(n: usize, d: f64) -> Array1<f64> {
    let scale = 1.0 / (n as f64 * d);
    let half = (n - 1) / 2 + 1; // number of non-negative entries
    Array1::from_shape_fn(n, |i| {
        if i < half {
            i as f64 * scale
        } else {
            (i as isize - n as isize) as f64 * scale
        }
    })
}

/// Strictly-positive half of a spectrum or frequency axis: drops the DC
/// bin and everything from the Nyquist bin up (the negative half).
pub fn positive_half<T: Clone>(full: &Array1<T>) -> Array1<T> {
    let n = full.len();
    full.slice(ndarray::s![1..n / 2]).to_owned()
}
