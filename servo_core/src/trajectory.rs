//! Desired-position generators.
//!
//! Plain actuators follow a fixed-increment [`LinearRamp`] advanced once per
//! tick. Feedback actuators follow [`eased_position`], a time-based curve that
//! the PID loop chases.

use std::f32::consts::FRAC_PI_2;

use crate::config::EaseCfg;

/// Fixed-increment ramp from start to target over a whole number of ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRamp {
    steps_left: u32,
    next: f32,
    increment: f32,
}

impl LinearRamp {
    pub fn new(start: u8, target: u8, steps: u32) -> Self {
        let increment = if steps == 0 {
            0.0
        } else {
            (f32::from(target) - f32::from(start)) / steps as f32
        };
        Self {
            steps_left: steps,
            next: f32::from(start),
            increment,
        }
    }

    pub const fn steps_left(&self) -> u32 {
        self.steps_left
    }

    pub const fn increment(&self) -> f32 {
        self.increment
    }

    /// Advance one tick. Returns the next intermediate position, or `None`
    /// once the ramp is spent and the caller should snap to the target.
    ///
    /// A ramp of `n` steps yields `n - 1` intermediate positions and ends on
    /// the `n`-th call; a ramp of zero steps ends on the first call.
    pub fn advance(&mut self) -> Option<f32> {
        if self.steps_left <= 1 {
            self.steps_left = 0;
            return None;
        }
        self.steps_left -= 1;
        self.next += self.increment;
        Some(self.next)
    }
}

/// Desired position `elapsed_ms` into an eased move.
///
/// `start + range * f * lag + sign(range) * A * sin((4f - 2) * pi/2)` with
/// `f = elapsed / duration`; exactly `target` once `elapsed >= duration`.
/// The result is not clamped: the lead factor may briefly overshoot.
pub fn eased_position(start: u8, target: u8, elapsed_ms: u64, duration_ms: u64, ease: &EaseCfg) -> f32 {
    if elapsed_ms >= duration_ms {
        return f32::from(target);
    }
    let f = elapsed_ms as f32 / duration_ms as f32;
    let range = f32::from(target) - f32::from(start);
    let offset = if range == 0.0 {
        0.0
    } else {
        range.signum() * ease.amplitude * (4.0f32.mul_add(f, -2.0) * FRAC_PI_2).sin()
    };
    (range * f).mul_add(ease.lag_factor, f32::from(start)) + offset
}
