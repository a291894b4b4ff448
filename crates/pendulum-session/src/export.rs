// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Run Export
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Session-close export of buffered telemetry and run metadata.
//!
//! One CSV per run with the header rows the offline analysis tools
//! key on, plus a JSON record of the same metadata for anything that
//! prefers structure over prefix-matching.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use pendulum_control::controller::ResonanceController;
use pendulum_types::buffer::Snapshot;
use pendulum_types::error::PendulumResult;
use pendulum_types::target::ResonanceTarget;

/// Metadata describing one finished (or aborted) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub module: String,
    pub special_info: String,
    pub start_time: f64,
    pub omegas: Vec<f64>,
    pub final_amplitude: Option<f64>,
    /// Final phase per target frequency, units of π.
    pub final_phase_over_pi: Vec<f64>,
}

impl RunRecord {
    pub fn from_run(
        module: &str,
        special_info: &str,
        snap: &Snapshot,
        target: Option<&ResonanceTarget>,
        controller: Option<&ResonanceController>,
    ) -> Self {
        let omegas = target
            .map(|t| t.frequencies().to_vec())
            .or_else(|| controller.map(|c| c.target().frequencies().to_vec()))
            .unwrap_or_default();
        let final_amplitude = controller
            .and_then(|c| c.amplitude_history().latest())
            .map(|s| s.amplitude);
        let final_phase_over_pi = controller
            .map(|c| {
                (0..c.target().len())
                    .filter_map(|i| c.phase_history_at(i).latest())
                    .map(|s| s.phase_over_pi)
                    .collect()
            })
            .unwrap_or_default();
        RunRecord {
            module: module.to_string(),
            special_info: special_info.to_string(),
            start_time: snap.start_time(),
            omegas,
            final_amplitude,
            final_phase_over_pi,
        }
    }
}

/// Session-close sink for a run's history.
pub trait Exporter: Send {
    fn export(&mut self, record: &RunRecord, snap: &Snapshot) -> PendulumResult<()>;
}

/// Writes `<module>-<epoch-ms>.csv` and a JSON twin under a root
/// directory, creating it as needed.
pub struct CsvExporter {
    root: PathBuf,
}

impl CsvExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_stem(&self, module: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{module}-{millis}")
    }
}

impl Exporter for CsvExporter {
    fn export(&mut self, record: &RunRecord, snap: &Snapshot) -> PendulumResult<()> {
        fs::create_dir_all(&self.root)?;
        let stem = self.file_stem(&record.module);

        let csv_path = self.root.join(format!("{stem}.csv"));
        let mut out = BufWriter::new(fs::File::create(&csv_path)?);
        writeln!(out, "special_info: {}", record.special_info)?;
        writeln!(out, "start_time: {}", record.start_time)?;
        match record.omegas.len() {
            0 => {}
            1 => writeln!(out, "omega: {}", record.omegas[0])?,
            _ => {
                let joined: Vec<String> =
                    record.omegas.iter().map(|w| w.to_string()).collect();
                writeln!(out, "multiple_omega: {}", joined.join(", "))?;
            }
        }
        if let Some(amp) = record.final_amplitude {
            writeln!(out, "amplitude: {amp}")?;
        }
        match record.final_phase_over_pi.len() {
            0 => {}
            1 => writeln!(out, "phase/pi: {}", record.final_phase_over_pi[0])?,
            _ => {
                let joined: Vec<String> = record
                    .final_phase_over_pi
                    .iter()
                    .map(|p| p.to_string())
                    .collect();
                writeln!(out, "multiple phase/pi: {}", joined.join(", "))?;
            }
        }
        writeln!(out, "time,angle,position,angular_velocity,cart_velocity")?;
        if let Some(w) = snap.full_window() {
            for i in 0..w.time.len() {
                writeln!(
                    out,
                    "{},{},{},{},{}",
                    w.time[i],
                    w.angle[i],
                    w.position[i],
                    w.angular_velocity[i],
                    w.position_velocity[i]
                )?;
            }
        }
        out.flush()?;

        let json_path = self.root.join(format!("{stem}.json"));
        let json = fs::File::create(&json_path)?;
        serde_json::to_writer_pretty(BufWriter::new(json), record)?;
        Ok(())
    }
}
