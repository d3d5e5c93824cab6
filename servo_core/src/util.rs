//! Tick and position helpers shared by the controllers.

/// Full mechanical range of a hobby servo, in position units.
pub const POSITION_MAX: u8 = 180;

/// Number of linear ramp steps for a move: `duration_ms / tick_ms`, truncated.
/// A zero tick is treated as 1 ms.
#[inline]
pub fn ramp_steps(duration_ms: u64, tick_ms: u64) -> u32 {
    u32::try_from(duration_ms / tick_ms.max(1)).unwrap_or(u32::MAX)
}

/// Elapsed time expressed in control ticks; never below one tick so the
/// derivative term cannot divide by zero.
#[inline]
pub fn elapsed_ticks(elapsed_ms: u64, tick_ms: u64) -> f32 {
    let ticks = elapsed_ms as f32 / tick_ms.max(1) as f32;
    ticks.max(1.0)
}

/// Round a fractional position and clamp it into `[min, max]`.
#[inline]
pub fn clamp_position(pos: f32, min: u8, max: u8) -> u8 {
    if !pos.is_finite() {
        return min;
    }
    pos.round().clamp(f32::from(min), f32::from(max)) as u8
}

/// Raw command for a servo mounted mirrored.
#[inline]
pub const fn servo_write_value(position: u8, inverted: bool) -> u8 {
    let p = if position > POSITION_MAX {
        POSITION_MAX
    } else {
        position
    };
    if inverted { POSITION_MAX - p } else { p }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_steps_truncates() {
        assert_eq!(ramp_steps(190, 20), 9);
        assert_eq!(ramp_steps(10, 20), 0);
        assert_eq!(ramp_steps(1000, 0), 1000);
    }

    #[test]
    fn elapsed_ticks_floor_is_one() {
        assert!((elapsed_ticks(0, 20) - 1.0).abs() < f32::EPSILON);
        assert!((elapsed_ticks(60, 20) - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn clamp_position_rounds_then_clamps() {
        assert_eq!(clamp_position(41.5, 10, 170), 42);
        assert_eq!(clamp_position(-3.0, 10, 170), 10);
        assert_eq!(clamp_position(500.0, 10, 170), 170);
        assert_eq!(clamp_position(f32::NAN, 10, 170), 10);
    }

    #[test]
    fn inverted_write_mirrors() {
        assert_eq!(servo_write_value(30, true), 150);
        assert_eq!(servo_write_value(30, false), 30);
        assert_eq!(servo_write_value(200, true), 0);
    }
}
