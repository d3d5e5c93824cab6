//! Absolute position from a single-turn magnet sensor.
//!
//! The sensor only reports `0..360`; a move may take the magnet through the
//! 0/360 seam several times. [`AngleUnwrapper`] accumulates whole turns so the
//! travelled angle stays continuous, and [`PositionEstimator`] turns that into
//! servo position units.

use std::time::Duration;

use servo_traits::AngleSensor;

use crate::hw_error::map_hw_error;
use crate::util::clamp_position;

/// Which way the magnet angle runs while the move progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    /// Angle decreases toward the target.
    Clockwise,
    /// Angle increases toward the target.
    CounterClockwise,
}

impl Travel {
    /// Direction for a move; by default the magnet angle shrinks while the
    /// servo position grows.
    pub const fn for_move(start: u8, target: u8, inverted: bool) -> Self {
        if (target > start) != inverted {
            Self::Clockwise
        } else {
            Self::CounterClockwise
        }
    }
}

/// Multi-turn unwrapping relative to the angle sampled at move start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleUnwrapper {
    start: f32,
    previous: f32,
    offset: f32,
    travel: Travel,
}

impl AngleUnwrapper {
    pub fn new(start_angle: u16, travel: Travel) -> Self {
        let a = f32::from(start_angle % 360);
        Self {
            start: a,
            previous: a,
            offset: 0.0,
            travel,
        }
    }

    pub const fn offset(&self) -> f32 {
        self.offset
    }

    /// Feed the next raw sample; returns degrees travelled toward the target
    /// since move start (negative when the joint went the wrong way).
    pub fn push(&mut self, sample: u16) -> f32 {
        let current = f32::from(sample % 360);
        if (current - self.previous).abs() > 180.0 {
            // Seam crossed. A low sample means the angle ran up through 360,
            // a high one that it ran down through 0.
            let crossed_up = current < 180.0;
            self.offset += match (crossed_up, self.travel) {
                (true, Travel::Clockwise) => -360.0,
                (true, Travel::CounterClockwise) => 360.0,
                (false, Travel::Clockwise) => 360.0,
                (false, Travel::CounterClockwise) => -360.0,
            };
        }
        self.previous = current;
        self.travelled_from(current)
    }

    fn travelled_from(&self, current: f32) -> f32 {
        let raw = match self.travel {
            Travel::Clockwise => self.start - current,
            Travel::CounterClockwise => current - self.start,
        };
        raw + self.offset
    }
}

/// Sensor sampling with last-good fallback, plus the move-relative unwrapper.
#[derive(Debug, Clone)]
pub struct PositionEstimator {
    sensor_channel: u8,
    deg_per_unit: f32,
    inverted: bool,
    last_good: Option<u16>,
    unwrap: Option<AngleUnwrapper>,
}

impl PositionEstimator {
    pub fn new(sensor_channel: u8, deg_per_unit: f32, inverted: bool) -> Self {
        Self {
            sensor_channel,
            deg_per_unit,
            inverted,
            last_good: None,
            unwrap: None,
        }
    }

    pub const fn sensor_channel(&self) -> u8 {
        self.sensor_channel
    }

    pub const fn last_good(&self) -> Option<u16> {
        self.last_good
    }

    /// One bounded read. On failure the last good sample is reused (0 before
    /// any success) so the control loop never stalls on the bus.
    pub fn sample(&mut self, sensor: &mut dyn AngleSensor, timeout: Duration) -> u16 {
        match sensor.read_angle(self.sensor_channel, timeout) {
            Ok(a) => {
                let a = a % 360;
                self.last_good = Some(a);
                a
            }
            Err(e) => {
                let mapped = map_hw_error(e.as_ref());
                let fallback = self.last_good.unwrap_or(0);
                tracing::warn!(
                    sensor = self.sensor_channel,
                    error = %mapped,
                    fallback,
                    "angle read failed, using last good sample"
                );
                fallback
            }
        }
    }

    /// Anchor a new move at `start_angle`.
    pub fn begin(&mut self, start_angle: u16, start: u8, target: u8) -> Travel {
        let travel = Travel::for_move(start, target, self.inverted);
        self.unwrap = Some(AngleUnwrapper::new(start_angle, travel));
        travel
    }

    /// Fold `sample` into the unwrapper and return the estimated position,
    /// clamped into `[min, max]`. Without an active move the start position
    /// is returned unchanged.
    pub fn estimate(&mut self, sample: u16, start: u8, target: u8, min: u8, max: u8) -> u8 {
        let Some(unwrap) = self.unwrap.as_mut() else {
            return start;
        };
        let travelled_units = unwrap.push(sample) / self.deg_per_unit;
        let pos = if target >= start {
            f32::from(start) + travelled_units
        } else {
            f32::from(start) - travelled_units
        };
        clamp_position(pos, min, max)
    }

    pub fn end(&mut self) {
        self.unwrap = None;
    }
}
