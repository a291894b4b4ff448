//! Criterion bench for the window-selection + DFT path the control loop
//! runs every cycle.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pendulum_math::dft::{dft, dft_freq, positive_half};
use pendulum_math::window::{gather, select_window};
use std::f64::consts::PI;

fn spectral_cycle(c: &mut Criterion) {
    // 8192 samples at ~20 Hz with deterministic jitter, 1024-point window.
    let n = 8192;
    let time: Vec<f64> = (0..n)
        .map(|i| i as f64 * 0.05 + 0.004 * (((i * 13) % 7) as f64 - 3.0))
        .collect();
    let angle: Vec<f64> = time.iter().map(|&t| (2.0 * PI * 1.1 * t).sin()).collect();

    c.bench_function("select_window_1024", |b| {
        b.iter(|| select_window(black_box(&time), 1024, 0.1))
    });

    let sel = select_window(&time, 1024, 0.1).expect("bench window");
    let windowed = gather(&angle, &sel.indices);
    c.bench_function("dft_1024", |b| {
        b.iter(|| {
            let spec = dft(black_box(&windowed));
            let freq = dft_freq(windowed.len(), sel.avg_spacing);
            (positive_half(&spec), positive_half(&freq))
        })
    });
}

criterion_group!(benches, spectral_cycle);
criterion_main!(benches);
