// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Sample Frame
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! One telemetry frame as reported by the cart controller.
//!
//! The wire format is a comma-separated ASCII line; the field count
//! depends on the active operating mode.

use crate::error::{PendulumError, PendulumResult};

/// Which optional telemetry fields the active mode reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMask {
    pub position: bool,
    pub velocity: bool,
}

impl FieldMask {
    /// Angle-only stream (natural frequency measuring).
    pub const ANGLE: FieldMask = FieldMask {
        position: false,
        velocity: false,
    };

    /// Angle + cart position (resonance modes).
    pub const POSITION: FieldMask = FieldMask {
        position: true,
        velocity: false,
    };

    /// All five channels (inversion control).
    pub const FULL: FieldMask = FieldMask {
        position: true,
        velocity: true,
    };

    /// Number of comma-separated fields the mask expects on the wire.
    pub fn field_count(&self) -> usize {
        match (self.position, self.velocity) {
            (false, _) => 2,
            (true, false) => 3,
            (true, true) => 5,
        }
    }
}

/// A single telemetry sample. Times are device-clock seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleFrame {
    pub time: f64,
    pub angle: f64,
    pub position: f64,
    pub angular_velocity: f64,
    pub position_velocity: f64,
}

impl SampleFrame {
    /// Update this frame in place from a telemetry line.
    ///
    /// Fields outside the mask keep their previous values, so a mode that
    /// stops reporting position leaves the last reported position in
    /// place. A malformed line leaves the frame untouched and returns the
    /// parse error for the caller to swallow.
    pub fn update_from_line(&mut self, line: &str, mask: FieldMask) -> PendulumResult<()> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        if fields.len() < mask.field_count() {
            return Err(PendulumError::Protocol(format!(
                "telemetry line has {} fields, expected {}",
                fields.len(),
                mask.field_count()
            )));
        }

        let parse = |s: &str| -> PendulumResult<f64> {
            s.trim()
                .parse::<f64>()
                .map_err(|_| PendulumError::Protocol(format!("bad telemetry field: {s:?}")))
        };

        // Parse everything before committing anything.
        let time = parse(fields[0])?;
        let angle = parse(fields[1])?;
        let position = if mask.position {
            Some(parse(fields[2])?)
        } else {
            None
        };
        let velocities = if mask.velocity {
            Some((parse(fields[3])?, parse(fields[4])?))
        } else {
            None
        };

        self.time = time;
        self.angle = angle;
        if let Some(p) = position {
            self.position = p;
        }
        if let Some((av, pv)) = velocities {
            self.angular_velocity = av;
            self.position_velocity = pv;
        }
        Ok(())
    }
}
