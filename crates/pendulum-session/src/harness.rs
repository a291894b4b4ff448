// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Concurrency Harness
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reader, writer and control-loop tasks around one serial session.
//!
//! OS threads: the reader blocks on the line while the control loop
//! polls the buffer count and runs the spectral pipeline on snapshots.
//! The buffer itself is lock-free for its single writer; the mutex
//! here guards only the snapshot boundary. Cancellation is a shared
//! atomic flag every loop polls; all exits are cooperative.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::export::{Exporter, RunRecord};
use crate::link::{self, LineReader, LineWriter, SerialReader, SerialWriter};
use crate::protocol::{self, ControlPlane};
use crate::session::SessionStateMachine;
use pendulum_control::controller::{ControlCommand, ResonanceController};
use pendulum_control::estimator::SpectralPhaseEstimator;
use pendulum_types::buffer::{SampleBuffer, Snapshot};
use pendulum_types::config::RigConfig;
use pendulum_types::error::{PendulumError, PendulumResult};
use pendulum_types::frame::{FieldMask, SampleFrame};

/// Shared cooperative stop signal.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poisoned locks mean a worker died mid-write; treat as session fault.
fn lock<T>(mutex: &Mutex<T>) -> PendulumResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PendulumError::SessionFault("poisoned lock".to_string()))
}

/// Spawn the reader task: blocking line reads, telemetry appends,
/// control-plane forwarding.
///
/// A malformed telemetry line is discarded and the input flushed to
/// resynchronize. A kill switch (or a dead link) raises the stop flag;
/// the task then exits without touching the buffer again.
pub fn spawn_reader(
    mut link: Box<dyn LineReader>,
    buffer: Arc<Mutex<SampleBuffer>>,
    mask: FieldMask,
    stop: StopFlag,
    control_lines: Sender<String>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut frame = SampleFrame::default();
        while !stop.is_set() {
            let line = match link.read_line() {
                Ok(line) => line,
                Err(_) => {
                    // Timeout or dead port: connectivity fault, let the
                    // orchestrator run the reconnect path.
                    stop.trigger();
                    break;
                }
            };
            match protocol::classify(&line) {
                Some(ControlPlane::KillSwitch) => {
                    stop.trigger();
                    let _ = control_lines.send(line);
                    break;
                }
                Some(_) => {
                    // Mid-stream control traffic is the orchestrator's.
                    let _ = control_lines.send(line);
                }
                None => {
                    if frame.update_from_line(&line, mask).is_ok() {
                        match lock(&buffer) {
                            Ok(mut buf) => buf.append(&frame, mask),
                            Err(_) => break,
                        }
                    } else {
                        let _ = link.flush_input();
                    }
                }
            }
        }
    })
}

/// Outcome of one operator amplitude request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriterEvent {
    Sent { amplitude: f64, phase: f64 },
    /// `omega·|amplitude|` exceeded the hardware safety ceiling.
    Rejected { amplitude: f64 },
}

/// Spawn the writer task for the manual feedback modes.
///
/// Amplitude requests arrive on a channel at the operator's cadence,
/// independent of the reader. Each is rectified, checked against the
/// safety ceiling and sent as an NR feedback pair carrying the latest
/// estimated phase.
pub fn spawn_writer(
    writer: Arc<Mutex<Box<dyn LineWriter>>>,
    requests: Receiver<f64>,
    shared_phase: Arc<Mutex<f64>>,
    omega: f64,
    safety_ceiling: f64,
    stop: StopFlag,
    events: Sender<WriterEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.is_set() {
            let amplitude = match requests.recv_timeout(Duration::from_millis(100)) {
                Ok(a) => a.abs(),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if omega * amplitude > safety_ceiling {
                let _ = events.send(WriterEvent::Rejected { amplitude });
                continue;
            }
            let phase = match lock(&shared_phase) {
                Ok(p) => *p,
                Err(_) => break,
            };
            let message = protocol::encode_feedback(amplitude, phase);
            match lock(&writer).and_then(|mut w| w.write_line(&message)) {
                Ok(()) => {
                    let _ = events.send(WriterEvent::Sent { amplitude, phase });
                }
                Err(_) => {
                    stop.trigger();
                    break;
                }
            }
        }
    })
}

/// Cadence and estimation options for the control loop.
#[derive(Debug, Clone, Copy)]
pub struct ControlLoopConfig {
    /// Buffer appends between snapshots.
    pub snapshot_every: u64,
    pub poll_interval: Duration,
    pub interpolate: bool,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 5,
            poll_interval: Duration::from_millis(5),
            interpolate: true,
        }
    }
}

/// The orchestrating task: snapshot → window → spectra → controller →
/// at most one outgoing command per cycle.
pub struct ControlLoop {
    buffer: Arc<Mutex<SampleBuffer>>,
    estimator: SpectralPhaseEstimator,
    pub controller: ResonanceController,
    writer: Arc<Mutex<Box<dyn LineWriter>>>,
    /// Latest primary-target phase, shared with the writer task.
    shared_phase: Arc<Mutex<f64>>,
    stop: StopFlag,
    cfg: ControlLoopConfig,
    last_count: u64,
}

impl ControlLoop {
    pub fn new(
        buffer: Arc<Mutex<SampleBuffer>>,
        estimator: SpectralPhaseEstimator,
        controller: ResonanceController,
        writer: Arc<Mutex<Box<dyn LineWriter>>>,
        stop: StopFlag,
        cfg: ControlLoopConfig,
    ) -> Self {
        Self {
            buffer,
            estimator,
            controller,
            writer,
            shared_phase: Arc::new(Mutex::new(0.0)),
            stop,
            cfg,
            last_count: 0,
        }
    }

    /// Handle for the writer task's phase lookups.
    pub fn shared_phase(&self) -> Arc<Mutex<f64>> {
        Arc::clone(&self.shared_phase)
    }

    /// Poll until the stop flag rises. Never blocks on hardware I/O
    /// beyond the single command write at the end of a cycle.
    pub fn run(&mut self) -> PendulumResult<()> {
        while !self.stop.is_set() {
            let count = lock(&self.buffer)?.count();
            if count.saturating_sub(self.last_count) >= self.cfg.snapshot_every {
                self.last_count = count;
                let snap = lock(&self.buffer)?.snapshot();
                self.cycle(&snap)?;
            } else {
                thread::sleep(self.cfg.poll_interval);
            }
        }
        Ok(())
    }

    /// One pipeline pass over a snapshot. "Not ready" (young buffer) is
    /// a skipped cycle, not an error.
    pub fn cycle(&mut self, snap: &Snapshot) -> PendulumResult<ControlCommand> {
        let targets: Vec<f64> = self.controller.target().frequencies().to_vec();
        let omega = self.controller.target().primary();
        let spectra = match self.estimator.spectrum(snap, omega) {
            Some(s) => s,
            None => return Ok(ControlCommand::None),
        };
        let estimates = self
            .estimator
            .estimate_multi(&spectra, &targets, self.cfg.interpolate);
        if let Some(primary) = estimates.last() {
            *lock(&self.shared_phase)? = primary.phase;
        }
        let command = self.controller.step(&estimates, spectra.latest_time);
        if let ControlCommand::AmplitudePhase { amplitude, phase } = command {
            lock(&self.writer)?.write_line(&protocol::encode_feedback(amplitude, phase))?;
        }
        Ok(command)
    }
}

/// How the orchestrator behaves when a session must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Block on operator confirmation before reopening the port.
    Interactive,
    /// Batch runs reopen immediately.
    Scripted,
}

/// Operator-confirmation seam for interactive reconnects. The CLI
/// collaborator implements this; scripted runs never consult it.
pub trait ReconnectPrompt: Send {
    fn confirm_reconnect(&mut self) -> PendulumResult<()>;
}

/// Ask the hardware to stop the active mode before tearing down.
pub fn send_terminate(writer: &Arc<Mutex<Box<dyn LineWriter>>>) -> PendulumResult<()> {
    lock(writer)?.write_line(protocol::TERMINATE)
}

/// Reopen the port after a fault, per policy, and re-run the handshake.
pub fn reconnect(
    policy: ReconnectPolicy,
    prompt: &mut dyn ReconnectPrompt,
    cfg: &RigConfig,
) -> PendulumResult<(SerialReader, SerialWriter)> {
    if policy == ReconnectPolicy::Interactive {
        prompt.confirm_reconnect()?;
    }
    let (mut reader, mut writer) = link::open(cfg)?;
    link::handshake(&mut reader, &mut writer)?;
    Ok((reader, writer))
}

/// Tear a session down after a kill switch, operator interrupt or
/// scripted end: stop the workers, export the run, clear every piece of
/// state, and leave the machine at the command prompt.
#[allow(clippy::too_many_arguments)]
pub fn finish_session(
    module: &str,
    special_info: &str,
    stop: &StopFlag,
    workers: Vec<JoinHandle<()>>,
    buffer: &Arc<Mutex<SampleBuffer>>,
    controller: &mut ResonanceController,
    session: &mut SessionStateMachine,
    exporter: &mut dyn Exporter,
    initial_amplitude: f64,
) -> PendulumResult<()> {
    stop.trigger();
    for worker in workers {
        let _ = worker.join();
    }
    let snap = lock(buffer)?.snapshot();
    let record =
        RunRecord::from_run(module, special_info, &snap, session.target(), Some(&*controller));
    exporter.export(&record, &snap)?;
    lock(buffer)?.reset();
    controller.reset(initial_amplitude);
    session.clear();
    Ok(())
}
