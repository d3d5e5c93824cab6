//! Runtime configuration for the servo bank.
//!
//! These are the structs the engine consumes. They are separate from the
//! TOML-deserialized config in `servo_config`; see `conversions`.

/// Control loop cadence and status pacing.
#[derive(Debug, Clone, Copy)]
pub struct LoopCfg {
    /// Period of `ServoBank::tick` (ms). Also the linear ramp step length.
    pub tick_ms: u64,
    /// Minimum spacing of position-change statuses per actuator (ms).
    pub status_interval_ms: u64,
    /// Registry capacity.
    pub max_actuators: usize,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            status_interval_ms: 90,
            max_actuators: 20,
        }
    }
}

/// Rail gating parameters.
#[derive(Debug, Clone)]
pub struct PowerCfg {
    /// Wait after energizing a rail before re-driving its members.
    pub settle_ms: u64,
    /// `(pin, name)` for every rail.
    pub groups: Vec<(u8, String)>,
}

impl Default for PowerCfg {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 4.0,
            ki: 0.0,
            kd: 0.0,
        }
    }
}

/// Shape of the eased trajectory used by feedback actuators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EaseCfg {
    pub amplitude: f32,
    pub lag_factor: f32,
}

impl Default for EaseCfg {
    fn default() -> Self {
        Self {
            amplitude: 8.0,
            lag_factor: 1.05,
        }
    }
}

/// Closed-loop behaviour shared by all feedback actuators.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackCfg {
    pub gains: PidGains,
    pub ease: EaseCfg,
    /// |estimate - target| at or below this counts as arrived.
    pub arrive_tolerance: u8,
    /// Below this much movement since the move began, command the stiction lead.
    pub stiction_threshold: u8,
}

impl Default for FeedbackCfg {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            ease: EaseCfg::default(),
            arrive_tolerance: 2,
            stiction_threshold: 2,
        }
    }
}

/// Per-joint sensor wiring for a feedback actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackProfile {
    pub channel: u8,
    pub sensor_channel: u8,
    pub deg_per_unit: f32,
    /// Magnet angle grows (instead of shrinks) as the servo position grows.
    pub inverted: bool,
    pub gains: PidGains,
}

/// Timeouts.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Max sensor wait per read (ms).
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 10 }
    }
}
