// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Sample Buffer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Mirrored circular store for high-rate telemetry.
//!
//! Each channel is stored twice at an offset of `capacity`, so any
//! trailing window of up to `capacity` samples is one contiguous slice
//! regardless of where the write cursor sits. Read paths never need
//! modulo arithmetic.
//!
//! The buffer carries no internal lock. It has exactly one writer (the
//! reader task); every other task must take a [`Snapshot`] through the
//! harness's mutex before looking at the arrays.

use std::time::SystemTime;

use crate::frame::{FieldMask, SampleFrame};

/// One mirrored channel of length `2 * capacity`.
#[derive(Debug, Clone)]
struct MirroredChannel {
    data: Vec<f64>,
    capacity: usize,
}

impl MirroredChannel {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; 2 * capacity],
            capacity,
        }
    }

    fn write(&mut self, slot: usize, value: f64) {
        self.data[slot] = value;
        self.data[slot + self.capacity] = value;
    }

    fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Trailing window of `n` samples ending at `last` (a slot index),
    /// oldest first. Contiguous thanks to the mirror.
    fn window(&self, last: usize, n: usize) -> &[f64] {
        let hi = last + self.capacity + 1;
        &self.data[hi - n..hi]
    }
}

/// Fixed-capacity telemetry store, single writer.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    capacity: usize,
    time: MirroredChannel,
    angle: MirroredChannel,
    position: MirroredChannel,
    angular_velocity: MirroredChannel,
    position_velocity: MirroredChannel,
    /// Next slot to write, in `0..capacity`.
    cursor: usize,
    /// Total appends since the last reset. Never decreases.
    count: u64,
    /// Device-clock time of the first sample; stored times are relative
    /// to this baseline.
    start_time: f64,
    /// Wall-clock moment of the first sample, for run diagnostics.
    started_at: Option<SystemTime>,
}

/// Borrowed view of the most recent `n` samples, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct SampleWindow<'a> {
    pub time: &'a [f64],
    pub angle: &'a [f64],
    pub position: &'a [f64],
    pub angular_velocity: &'a [f64],
    pub position_velocity: &'a [f64],
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be positive");
        Self {
            capacity,
            time: MirroredChannel::new(capacity),
            angle: MirroredChannel::new(capacity),
            position: MirroredChannel::new(capacity),
            angular_velocity: MirroredChannel::new(capacity),
            position_velocity: MirroredChannel::new(capacity),
            cursor: 0,
            count: 0,
            start_time: 0.0,
            started_at: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of samples currently available for windowing.
    pub fn len(&self) -> usize {
        self.count.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    /// Append one frame. The first append fixes the device-time baseline.
    pub fn append(&mut self, frame: &SampleFrame, mask: FieldMask) {
        if self.count == 0 {
            self.start_time = frame.time;
            self.started_at = Some(SystemTime::now());
        }
        let slot = self.cursor;
        self.time.write(slot, frame.time - self.start_time);
        self.angle.write(slot, frame.angle);
        if mask.position {
            self.position.write(slot, frame.position);
        }
        if mask.velocity {
            self.angular_velocity.write(slot, frame.angular_velocity);
            self.position_velocity.write(slot, frame.position_velocity);
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        self.count += 1;
    }

    /// The most recent `n` samples in time order, or `None` when fewer
    /// than `n` have been appended. `n` must not exceed the capacity.
    pub fn window(&self, n: usize) -> Option<SampleWindow<'_>> {
        if n == 0 || n > self.len() {
            return None;
        }
        let last = (self.cursor + self.capacity - 1) % self.capacity;
        Some(SampleWindow {
            time: self.time.window(last, n),
            angle: self.angle.window(last, n),
            position: self.position.window(last, n),
            angular_velocity: self.angular_velocity.window(last, n),
            position_velocity: self.position_velocity.window(last, n),
        })
    }

    /// Everything currently held, oldest first.
    pub fn full_window(&self) -> Option<SampleWindow<'_>> {
        self.window(self.len())
    }

    /// Full copy for cross-task hand-off.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            buffer: self.clone(),
        }
    }

    /// Zero all channels and baselines. The logical count restarts, which
    /// is the one place it is allowed to decrease.
    pub fn reset(&mut self) {
        self.time.clear();
        self.angle.clear();
        self.position.clear();
        self.angular_velocity.clear();
        self.position_velocity.clear();
        self.cursor = 0;
        self.count = 0;
        self.start_time = 0.0;
        self.started_at = None;
    }
}

/// An owned copy of the buffer taken at one instant. The only form in
/// which a task other than the writer may read samples.
#[derive(Debug, Clone)]
pub struct Snapshot {
    buffer: SampleBuffer,
}

impl Snapshot {
    pub fn count(&self) -> u64 {
        self.buffer.count
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn start_time(&self) -> f64 {
        self.buffer.start_time
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.buffer.started_at
    }

    pub fn window(&self, n: usize) -> Option<SampleWindow<'_>> {
        self.buffer.window(n)
    }

    pub fn full_window(&self) -> Option<SampleWindow<'_>> {
        self.buffer.full_window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(t: f64, angle: f64, pos: f64) -> SampleFrame {
        SampleFrame {
            time: t,
            angle,
            position: pos,
            ..SampleFrame::default()
        }
    }

    #[test]
    fn test_window_returns_most_recent_in_order() {
        let mut buf = SampleBuffer::new(8);
        for i in 0..20 {
            buf.append(&frame(10.0 + i as f64 * 0.1, i as f64, 0.0), FieldMask::POSITION);
        }
        for k in 1..=8 {
            let w = buf.window(k).unwrap();
            assert_eq!(w.angle.len(), k);
            // Last append had angle 19; window must end there.
            assert_eq!(w.angle[k - 1], 19.0);
            for i in 1..k {
                assert!(
                    w.time[i] > w.time[i - 1],
                    "window times must increase: {} <= {}",
                    w.time[i],
                    w.time[i - 1]
                );
            }
        }
    }

    #[test]
    fn test_times_are_relative_to_first_sample() {
        let mut buf = SampleBuffer::new(4);
        buf.append(&frame(100.0, 0.0, 0.0), FieldMask::ANGLE);
        buf.append(&frame(100.5, 0.0, 0.0), FieldMask::ANGLE);
        let w = buf.window(2).unwrap();
        assert_eq!(w.time, &[0.0, 0.5]);
        assert_eq!(buf.start_time(), 100.0);
    }

    #[test]
    fn test_window_spans_wraparound_contiguously() {
        let cap = 5;
        let mut buf = SampleBuffer::new(cap);
        for i in 0..(cap + 3) {
            buf.append(&frame(i as f64, i as f64, -(i as f64)), FieldMask::POSITION);
        }
        let w = buf.window(cap).unwrap();
        let expect: Vec<f64> = (3..8).map(|i| i as f64).collect();
        assert_eq!(w.angle, expect.as_slice());
        let expect_pos: Vec<f64> = (3..8).map(|i| -(i as f64)).collect();
        assert_eq!(w.position, expect_pos.as_slice());
    }

    #[test]
    fn test_window_too_large_is_none() {
        let mut buf = SampleBuffer::new(4);
        buf.append(&frame(0.0, 0.0, 0.0), FieldMask::ANGLE);
        assert!(buf.window(2).is_none());
        assert!(buf.window(5).is_none());
    }

    #[test]
    fn test_masked_fields_hold_previous_slot_values() {
        let mut buf = SampleBuffer::new(4);
        buf.append(&frame(0.0, 1.0, 50.0), FieldMask::POSITION);
        // Angle-only mode: position channel slot keeps its zero.
        buf.append(&frame(0.1, 2.0, 999.0), FieldMask::ANGLE);
        let w = buf.window(2).unwrap();
        assert_eq!(w.position[0], 50.0);
        assert_eq!(w.position[1], 0.0, "masked channel slot is not written");
    }

    #[test]
    fn test_reset_restores_empty_state() {
        let mut buf = SampleBuffer::new(4);
        for i in 0..6 {
            buf.append(&frame(i as f64, 1.0, 1.0), FieldMask::POSITION);
        }
        buf.reset();
        assert_eq!(buf.count(), 0);
        assert!(buf.window(1).is_none());
        assert_eq!(buf.start_time(), 0.0);
        assert!(buf.started_at().is_none());
        // Next append re-baselines.
        buf.append(&frame(42.0, 0.0, 0.0), FieldMask::ANGLE);
        assert_eq!(buf.start_time(), 42.0);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut buf = SampleBuffer::new(4);
        buf.append(&frame(0.0, 1.0, 0.0), FieldMask::ANGLE);
        let snap = buf.snapshot();
        buf.append(&frame(0.1, 2.0, 0.0), FieldMask::ANGLE);
        assert_eq!(snap.count(), 1);
        assert_eq!(buf.count(), 2);
        assert_eq!(snap.window(1).unwrap().angle, &[1.0]);
    }
}
