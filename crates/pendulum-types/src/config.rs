// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Rig configuration, loadable from JSON.
//!
//! Defaults reproduce the bench values the console has always run with;
//! a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};

use crate::error::{PendulumError, PendulumResult};

/// Proportional/derivative gains for the normalized-resonance servo.
/// `ki` is reserved; the integral path is not wired up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NrGains {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
}

fn default_kp() -> f64 {
    0.02
}
fn default_kd() -> f64 {
    0.1
}
fn default_ki() -> f64 {
    0.002
}

impl Default for NrGains {
    fn default() -> Self {
        NrGains {
            kp: default_kp(),
            kd: default_kd(),
            ki: default_ki(),
        }
    }
}

/// Top-level rig configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// Serial device path; `None` means probe for one.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Driver-level read timeout in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    /// Points gathered per spectral window.
    #[serde(default = "default_fft_length")]
    pub fft_length: usize,
    /// Minimum spacing between accepted samples, seconds. The cart
    /// firmware will not report faster than 50 ms.
    #[serde(default = "default_sampling_div")]
    pub sampling_div: f64,
    /// Control cycles to let transients settle between amplitude updates.
    #[serde(default = "default_wait_to_stable")]
    pub wait_to_stable: u32,
    #[serde(default = "default_buffer_length")]
    pub buffer_length: usize,
    /// Length of the rolling phase/amplitude histories.
    #[serde(default = "default_history_length")]
    pub history_length: usize,
    /// Amplitude of the constant base oscillation, steps.
    #[serde(default = "default_amp_0")]
    pub amp_0: f64,
    /// Starting drive amplitude, steps.
    #[serde(default = "default_initial_amplitude")]
    pub initial_amplitude: f64,
    /// Starting drive frequency, Hz.
    #[serde(default = "default_initial_omega")]
    pub initial_omega: f64,
    #[serde(default)]
    pub gains: NrGains,
    /// Hardware safety ceiling on `omega * |amplitude|`.
    #[serde(default = "default_safety_ceiling")]
    pub safety_ceiling: f64,
    /// Buffer appends between control-loop snapshots.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
    /// Root directory for exported runs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_baud_rate() -> u32 {
    230_400
}
fn default_timeout_s() -> f64 {
    10.0
}
fn default_fft_length() -> usize {
    1024
}
fn default_sampling_div() -> f64 {
    0.1
}
fn default_wait_to_stable() -> u32 {
    5
}
fn default_buffer_length() -> usize {
    8192
}
fn default_history_length() -> usize {
    512
}
fn default_amp_0() -> f64 {
    200.0
}
fn default_initial_amplitude() -> f64 {
    100.0
}
fn default_initial_omega() -> f64 {
    2.0
}
fn default_safety_ceiling() -> f64 {
    2000.0
}
fn default_snapshot_every() -> u64 {
    5
}
fn default_data_dir() -> String {
    "cart_pendulum_data".to_string()
}

impl Default for RigConfig {
    fn default() -> Self {
        // serde_json::from_str never fails on an empty object with all
        // fields defaulted
        serde_json::from_str("{}").expect("default config")
    }
}

impl RigConfig {
    pub fn from_file(path: &str) -> PendulumResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PendulumResult<()> {
        if self.fft_length < 8 {
            return Err(PendulumError::ConfigError(
                "fft_length must be at least 8".to_string(),
            ));
        }
        if !(self.sampling_div.is_finite() && self.sampling_div > 0.0) {
            return Err(PendulumError::ConfigError(
                "sampling_div must be finite and > 0".to_string(),
            ));
        }
        if self.buffer_length < self.fft_length {
            return Err(PendulumError::ConfigError(format!(
                "buffer_length ({}) must not be smaller than fft_length ({})",
                self.buffer_length, self.fft_length
            )));
        }
        if self.history_length == 0 {
            return Err(PendulumError::ConfigError(
                "history_length must be positive".to_string(),
            ));
        }
        if !(self.safety_ceiling.is_finite() && self.safety_ceiling > 0.0) {
            return Err(PendulumError::ConfigError(
                "safety_ceiling must be finite and > 0".to_string(),
            ));
        }
        if self.snapshot_every == 0 {
            return Err(PendulumError::ConfigError(
                "snapshot_every must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bench_values() {
        let cfg = RigConfig::default();
        assert_eq!(cfg.baud_rate, 230_400);
        assert_eq!(cfg.fft_length, 1024);
        assert!((cfg.sampling_div - 0.1).abs() < 1e-12);
        assert_eq!(cfg.wait_to_stable, 5);
        assert_eq!(cfg.buffer_length, 8192);
        assert!((cfg.amp_0 - 200.0).abs() < 1e-12);
        assert!((cfg.gains.kp - 0.02).abs() < 1e-12);
        assert!((cfg.gains.kd - 0.1).abs() < 1e-12);
        assert!((cfg.safety_ceiling - 2000.0).abs() < 1e-12);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let cfg: RigConfig =
            serde_json::from_str(r#"{"port": "/dev/ttyACM0", "sampling_div": 0.04}"#).unwrap();
        assert_eq!(cfg.port.as_deref(), Some("/dev/ttyACM0"));
        assert!((cfg.sampling_div - 0.04).abs() < 1e-12);
        assert_eq!(cfg.fft_length, 1024, "unnamed fields keep defaults");
    }

    #[test]
    fn test_validate_rejects_undersized_buffer() {
        let cfg: RigConfig =
            serde_json::from_str(r#"{"buffer_length": 256, "fft_length": 1024}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let cfg = RigConfig::default();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2: RigConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.fft_length, cfg2.fft_length);
        assert_eq!(cfg.baud_rate, cfg2.baud_rate);
        assert!((cfg.gains.ki - cfg2.gains.ki).abs() < 1e-15);
    }
}
