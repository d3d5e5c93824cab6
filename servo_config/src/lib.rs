#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the servo bank controller.
//!
//! - `Config` and its sections are deserialized from TOML; every section has
//!   defaults so a bench can start from an empty file.
//! - `Config::validate` rejects values the control loop cannot honour.
use std::collections::BTreeSet;
use std::path::Path;

use eyre::WrapErr;
use serde::Deserialize;
use serde::de::Deserializer;

/// Highest output channel the status frame can address (`0xC0 | channel`).
pub const MAX_CHANNEL: u8 = 63;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    /// Control loop period (ms). Actuator updates must run at least this often.
    pub tick_ms: u64,
    /// Minimum spacing between position-change status frames per actuator.
    pub status_interval_ms: u64,
    /// Registry capacity.
    pub max_actuators: usize,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            status_interval_ms: 90,
            max_actuators: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timeouts {
    /// Upper bound on one magnet sensor read (ms).
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PowerGroupCfg {
    /// Rail relay output pin; also the rail id actuators refer to.
    pub pin: u8,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PowerCfg {
    /// Wait after switching a rail on before re-driving its servos (ms).
    pub settle_ms: u64,
    /// Most relay boards switch on a low level.
    pub active_low: bool,
    pub groups: Vec<PowerGroupCfg>,
}

impl Default for PowerCfg {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            active_low: true,
            groups: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackServoCfg {
    pub channel: u8,
    /// Multiplexer channel of the magnet sensor on this joint.
    pub sensor_channel: u8,
    /// Sensor degrees per servo position unit.
    pub deg_per_unit: f32,
    /// Magnet turns the other way from the default mounting.
    #[serde(default)]
    pub inverted: bool,
    pub kp: Option<f32>,
    pub ki: Option<f32>,
    pub kd: Option<f32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedbackCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Amplitude of the sinusoidal ease term (position units).
    pub ease_amplitude: f32,
    /// Trajectory lead factor applied to the linear part.
    pub lag_factor: f32,
    /// Arrival window around the target (position units).
    pub arrive_tolerance: u8,
    /// Movement below which the stiction lead is commanded (position units).
    pub stiction_threshold: u8,
    #[serde(rename = "servo")]
    pub servos: Vec<FeedbackServoCfg>,
}

impl Default for FeedbackCfg {
    fn default() -> Self {
        Self {
            kp: 4.0,
            ki: 0.0,
            kd: 0.0,
            ease_amplitude: 8.0,
            lag_factor: 1.05,
            arrive_tolerance: 2,
            stiction_threshold: 2,
            servos: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hardware {
    pub i2c_bus: u8,
    pub mux_address: u16,
    pub sensor_address: u16,
    pub pulse_min_us: u32,
    pub pulse_max_us: u32,
    /// Servo channel to BCM GPIO. Accepts either:
    /// - array of tables: [{ channel = 0, gpio = 17 }, ...]
    /// - array of tuples: [[0, 17], [1, 27], ...]
    #[serde(deserialize_with = "de_servo_pins")]
    pub servo_pins: Vec<(u8, u8)>,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            mux_address: 0x70,
            sensor_address: 0x36,
            pulse_min_us: 500,
            pulse_max_us: 2500,
            servo_pins: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub control: ControlCfg,
    pub timeouts: Timeouts,
    pub power: PowerCfg,
    pub feedback: FeedbackCfg,
    pub hardware: Hardware,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServoPinToml {
    Tuple((u8, u8)),
    Table { channel: u8, gpio: u8 },
}

fn de_servo_pins<'de, D>(deserializer: D) -> Result<Vec<(u8, u8)>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<ServoPinToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for p in items {
            match p {
                ServoPinToml::Tuple((channel, gpio)) => out.push((channel, gpio)),
                ServoPinToml::Table { channel, gpio } => out.push((channel, gpio)),
            }
        }
    }
    Ok(out)
}

fn finite_non_negative(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.tick_ms == 0 || self.control.tick_ms > 20 {
            eyre::bail!("control.tick_ms must be in [1, 20]");
        }
        if self.control.status_interval_ms == 0 {
            eyre::bail!("control.status_interval_ms must be >= 1");
        }
        if self.control.max_actuators == 0 || self.control.max_actuators > 64 {
            eyre::bail!("control.max_actuators must be in [1, 64]");
        }

        // Timeouts
        if self.timeouts.sensor_ms == 0 {
            eyre::bail!("timeouts.sensor_ms must be >= 1");
        }
        if self.timeouts.sensor_ms > self.control.tick_ms {
            eyre::bail!(
                "timeouts.sensor_ms ({}) must not exceed control.tick_ms ({})",
                self.timeouts.sensor_ms,
                self.control.tick_ms
            );
        }

        // Power
        if self.power.settle_ms > 1000 {
            eyre::bail!("power.settle_ms is unreasonably large (>1s)");
        }
        let mut rail_pins = BTreeSet::new();
        for g in &self.power.groups {
            if !rail_pins.insert(g.pin) {
                eyre::bail!("power.groups: duplicate rail pin {}", g.pin);
            }
        }

        // Feedback
        let f = &self.feedback;
        if !(finite_non_negative(f.kp) && finite_non_negative(f.ki) && finite_non_negative(f.kd)) {
            eyre::bail!("feedback gains must be finite and >= 0");
        }
        if !finite_non_negative(f.ease_amplitude) {
            eyre::bail!("feedback.ease_amplitude must be finite and >= 0");
        }
        if !(f.lag_factor.is_finite() && f.lag_factor > 0.0) {
            eyre::bail!("feedback.lag_factor must be > 0");
        }
        let mut fb_channels = BTreeSet::new();
        let mut sensor_channels = BTreeSet::new();
        for s in &f.servos {
            if s.channel > MAX_CHANNEL {
                eyre::bail!("feedback.servo channel {} exceeds {MAX_CHANNEL}", s.channel);
            }
            if !fb_channels.insert(s.channel) {
                eyre::bail!("feedback.servo: duplicate channel {}", s.channel);
            }
            if s.sensor_channel > 7 {
                eyre::bail!(
                    "feedback.servo {}: sensor_channel must be in [0, 7]",
                    s.channel
                );
            }
            if !sensor_channels.insert(s.sensor_channel) {
                eyre::bail!(
                    "feedback.servo: sensor_channel {} used twice",
                    s.sensor_channel
                );
            }
            if !(s.deg_per_unit.is_finite() && s.deg_per_unit > 0.0) {
                eyre::bail!("feedback.servo {}: deg_per_unit must be > 0", s.channel);
            }
            for gain in [s.kp, s.ki, s.kd].into_iter().flatten() {
                if !finite_non_negative(gain) {
                    eyre::bail!(
                        "feedback.servo {}: gains must be finite and >= 0",
                        s.channel
                    );
                }
            }
        }

        // Hardware
        if self.hardware.pulse_min_us >= self.hardware.pulse_max_us {
            eyre::bail!("hardware.pulse_min_us must be < hardware.pulse_max_us");
        }
        let mut pin_channels = BTreeSet::new();
        for &(channel, gpio) in &self.hardware.servo_pins {
            if channel > MAX_CHANNEL {
                eyre::bail!("hardware.servo_pins: channel {channel} exceeds {MAX_CHANNEL}");
            }
            if !pin_channels.insert(channel) {
                eyre::bail!("hardware.servo_pins: duplicate channel {channel}");
            }
            if rail_pins.contains(&gpio) {
                eyre::bail!("hardware.servo_pins: gpio {gpio} is a power rail pin");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
