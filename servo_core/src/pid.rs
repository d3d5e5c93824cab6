//! Trajectory-error correction for feedback actuators.

use crate::config::PidGains;
use crate::util::POSITION_MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    gains: PidGains,
    integral: f32,
    prev_error: f32,
}

impl Pid {
    pub const fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    pub const fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    /// Corrected write value for one control step, clamped to `[0, 180]`.
    ///
    /// `elapsed_ticks` is the time since the previous step in control ticks
    /// (at least 1); the integral is scaled by it and the derivative divided
    /// by it so a late tick does not distort either term.
    pub fn correct(&mut self, desired: f32, measured: f32, elapsed_ticks: f32) -> f32 {
        let dt = elapsed_ticks.max(1.0);
        let error = desired - measured;
        self.integral += error * dt;
        let derivative = (error - self.prev_error) / dt;
        self.prev_error = error;
        let out = desired
            + self.gains.kp * error
            + self.gains.ki * self.integral
            + self.gains.kd * derivative;
        clamp_output(out)
    }
}

/// Lead command used until the joint breaks away: twice the move range
/// beyond the desired position, toward the target.
pub fn stiction_lead(desired: f32, start: u8, target: u8) -> f32 {
    clamp_output(2.0f32.mul_add(-(f32::from(start) - f32::from(target)), desired))
}

fn clamp_output(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, f32::from(POSITION_MAX))
    } else {
        0.0
    }
}
