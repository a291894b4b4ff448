//! Nonlinear least-squares sine fits (Levenberg–Marquardt).
//!
//! Two diagnostics ride on this: the drive-delay fit used in scan mode,
//! and the damped-sine fit behind the natural-frequency measurement.
//! Parameter counts are tiny (1 and 5), so the normal equations are
//! solved directly with Gaussian elimination.

use pendulum_types::error::{PendulumError, PendulumResult};
use std::f64::consts::PI;

/// Result of a least-squares fit: best parameters and their standard
/// errors from the residual covariance.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: Vec<f64>,
    pub stderr: Vec<f64>,
    pub residual: f64,
    pub iterations: usize,
}

const MAX_ITER: usize = 200;
const STEP_TOL: f64 = 1e-12;
const FD_EPS: f64 = 1e-7;

/// Levenberg–Marquardt over an arbitrary scalar model `f(t, params)`.
///
/// Numeric forward-difference Jacobian; damping grows on a rejected
/// step and shrinks on an accepted one.
pub fn least_squares<F>(model: F, t: &[f64], y: &[f64], p0: &[f64]) -> PendulumResult<FitOutcome>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let m = t.len();
    let n = p0.len();
    if m <= n {
        return Err(PendulumError::FitDiverged {
            iterations: 0,
            message: format!("{m} points cannot constrain {n} parameters"),
        });
    }

    let sum_sq = |params: &[f64]| -> f64 {
        t.iter()
            .zip(y.iter())
            .map(|(&ti, &yi)| {
                let r = yi - model(ti, params);
                r * r
            })
            .sum()
    };

    let mut params = p0.to_vec();
    let mut cost = sum_sq(&params);
    let mut lambda = 1e-3;
    let mut iterations = 0;

    while iterations < MAX_ITER {
        iterations += 1;

        // Jacobian of residuals and J^T r, J^T J.
        let mut jtj = vec![vec![0.0; n]; n];
        let mut jtr = vec![0.0; n];
        for (&ti, &yi) in t.iter().zip(y.iter()) {
            let f0 = model(ti, &params);
            let mut row = vec![0.0; n];
            for j in 0..n {
                let h = FD_EPS * params[j].abs().max(1.0);
                let mut bumped = params.clone();
                bumped[j] += h;
                row[j] = (model(ti, &bumped) - f0) / h;
            }
            let r = yi - f0;
            for j in 0..n {
                jtr[j] += row[j] * r;
                for k in 0..n {
                    jtj[j][k] += row[j] * row[k];
                }
            }
        }

        // Damped normal equations: (J^T J + λ diag(J^T J)) δ = J^T r.
        let mut system = jtj.clone();
        for j in 0..n {
            system[j][j] += lambda * jtj[j][j].max(1e-12);
        }
        let delta = match solve(&mut system, &jtr) {
            Some(d) => d,
            None => {
                return Err(PendulumError::FitDiverged {
                    iterations,
                    message: "singular normal equations".to_string(),
                })
            }
        };

        let trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
        let trial_cost = sum_sq(&trial);
        if trial_cost < cost {
            let step: f64 = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
            params = trial;
            cost = trial_cost;
            lambda = (lambda * 0.3).max(1e-12);
            if step < STEP_TOL {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    let stderr = standard_errors(&model, t, &params, cost)?;
    Ok(FitOutcome {
        params,
        stderr,
        residual: cost,
        iterations,
    })
}

/// σ²(JᵀJ)⁻¹ diagonal, σ² = SSR / (m − n).
fn standard_errors<F>(model: &F, t: &[f64], params: &[f64], cost: f64) -> PendulumResult<Vec<f64>>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let m = t.len();
    let n = params.len();
    let mut jtj = vec![vec![0.0; n]; n];
    for &ti in t {
        let f0 = model(ti, params);
        let mut row = vec![0.0; n];
        for j in 0..n {
            let h = FD_EPS * params[j].abs().max(1.0);
            let mut bumped = params.to_vec();
            bumped[j] += h;
            row[j] = (model(ti, &bumped) - f0) / h;
        }
        for j in 0..n {
            for k in 0..n {
                jtj[j][k] += row[j] * row[k];
            }
        }
    }
    let cov_scale = cost / (m - n) as f64;
    let inv = invert(&jtj).ok_or_else(|| PendulumError::FitDiverged {
        iterations: 0,
        message: "singular covariance".to_string(),
    })?;
    Ok((0..n).map(|j| (inv[j][j] * cov_scale).abs().sqrt()).collect())
}

/// Gaussian elimination with partial pivoting; `a` is consumed.
fn solve(a: &mut [Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut x = b.to_vec();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        x.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            x[row] -= factor * x[col];
        }
    }
    for col in (0..n).rev() {
        let mut sum = x[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}

/// Inverse of a small symmetric positive matrix via column-by-column
/// elimination.
fn invert(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut out = vec![vec![0.0; n]; n];
    for col in 0..n {
        let mut rhs = vec![0.0; n];
        rhs[col] = 1.0;
        let mut work: Vec<Vec<f64>> = a.to_vec();
        let x = solve(&mut work, &rhs)?;
        for row in 0..n {
            out[row][col] = x[row];
        }
    }
    Some(out)
}

/// Fit `amp0 · sin(2π·omega·(t + start_time + delay))` to a position
/// trace. Returns `(delay, delay_stderr)` in seconds.
pub fn delay_fit(
    time: &[f64],
    position: &[f64],
    amp_0: f64,
    omega: f64,
    start_time: f64,
) -> PendulumResult<(f64, f64)> {
    let model = move |t: f64, p: &[f64]| amp_0 * (2.0 * PI * omega * (t + start_time + p[0])).sin();
    let fit = least_squares(model, time, position, &[0.0])?;
    Ok((fit.params[0], fit.stderr[0]))
}

/// Damped sinusoid parameters from the natural-frequency measurement.
#[derive(Debug, Clone, Copy)]
pub struct DampedSine {
    pub gamma: f64,
    pub omega: f64,
    pub phi: f64,
    pub amp: f64,
    pub offset: f64,
}

impl DampedSine {
    pub fn eval(&self, t: f64) -> f64 {
        self.amp * (-0.5 * self.gamma * t).exp() * (2.0 * PI * self.omega * t + self.phi).sin()
            + self.offset
    }

    /// Quality factor `π·f₀/γ` of the fitted decay.
    pub fn quality_factor(&self) -> f64 {
        PI * self.omega / self.gamma
    }
}

/// Fit `amp·exp(-γt/2)·sin(2πft + φ) + offset` to an angle trace.
/// Returns the parameters and their standard errors.
pub fn damped_sine_fit(
    time: &[f64],
    angle: &[f64],
    guess: DampedSine,
) -> PendulumResult<(DampedSine, [f64; 5])> {
    let model = |t: f64, p: &[f64]| {
        p[3] * (-0.5 * p[0] * t).exp() * (2.0 * PI * p[1] * t + p[2]).sin() + p[4]
    };
    let p0 = [guess.gamma, guess.omega, guess.phi, guess.amp, guess.offset];
    let fit = least_squares(model, time, angle, &p0)?;
    let out = DampedSine {
        gamma: fit.params[0],
        omega: fit.params[1],
        phi: fit.params[2],
        amp: fit.params[3],
        offset: fit.params[4],
    };
    let mut err = [0.0; 5];
    err.copy_from_slice(&fit.stderr);
    Ok((out, err))
}
