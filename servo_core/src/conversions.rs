//! `From` implementations bridging `servo_config` types to `servo_core` types.

use crate::config::{EaseCfg, FeedbackCfg, FeedbackProfile, LoopCfg, PidGains, PowerCfg, Timeouts};

// ── LoopCfg ──────────────────────────────────────────────────────────────────

impl From<&servo_config::ControlCfg> for LoopCfg {
    fn from(c: &servo_config::ControlCfg) -> Self {
        Self {
            tick_ms: c.tick_ms,
            status_interval_ms: c.status_interval_ms,
            max_actuators: c.max_actuators,
        }
    }
}

// ── PowerCfg ─────────────────────────────────────────────────────────────────

impl From<&servo_config::PowerCfg> for PowerCfg {
    fn from(c: &servo_config::PowerCfg) -> Self {
        Self {
            settle_ms: c.settle_ms,
            groups: c.groups.iter().map(|g| (g.pin, g.name.clone())).collect(),
        }
    }
}

// ── FeedbackCfg ──────────────────────────────────────────────────────────────

impl From<&servo_config::FeedbackCfg> for FeedbackCfg {
    fn from(c: &servo_config::FeedbackCfg) -> Self {
        Self {
            gains: PidGains {
                kp: c.kp,
                ki: c.ki,
                kd: c.kd,
            },
            ease: EaseCfg {
                amplitude: c.ease_amplitude,
                lag_factor: c.lag_factor,
            },
            arrive_tolerance: c.arrive_tolerance,
            stiction_threshold: c.stiction_threshold,
        }
    }
}

impl FeedbackProfile {
    /// Per-joint profile; unset gains fall back to the bank-wide defaults.
    pub fn from_config(s: &servo_config::FeedbackServoCfg, defaults: PidGains) -> Self {
        Self {
            channel: s.channel,
            sensor_channel: s.sensor_channel,
            deg_per_unit: s.deg_per_unit,
            inverted: s.inverted,
            gains: PidGains {
                kp: s.kp.unwrap_or(defaults.kp),
                ki: s.ki.unwrap_or(defaults.ki),
                kd: s.kd.unwrap_or(defaults.kd),
            },
        }
    }
}

/// All feedback profiles declared in a config file.
pub fn feedback_profiles(c: &servo_config::FeedbackCfg) -> Vec<FeedbackProfile> {
    let defaults = FeedbackCfg::from(c).gains;
    c.servos
        .iter()
        .map(|s| FeedbackProfile::from_config(s, defaults))
        .collect()
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&servo_config::Timeouts> for Timeouts {
    fn from(c: &servo_config::Timeouts) -> Self {
        Self {
            sensor_ms: c.sensor_ms,
        }
    }
}
