//! Type-state builder for `ServoBank`.
//!
//! `build()` only exists once the servo driver, angle sensor and pin driver
//! are provided; `try_build()` is always available for dynamic checks.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use servo_traits::clock::{Clock, MonotonicClock};
use servo_traits::{AngleSensor, PinDriver, ServoDriver};

use crate::bank::{MAX_CHANNEL, ServoBank};
use crate::config::{FeedbackCfg, FeedbackProfile, LoopCfg, PidGains, PowerCfg, Timeouts};
use crate::error::{BuildError, Result};
use crate::power::{PowerGroup, PowerScheduler};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

#[derive(Default)]
struct Parts {
    servos: Option<Box<dyn ServoDriver>>,
    sensor: Option<Box<dyn AngleSensor>>,
    pins: Option<Box<dyn PinDriver>>,
    timing: Option<LoopCfg>,
    power: Option<PowerCfg>,
    feedback: Option<FeedbackCfg>,
    profiles: Vec<FeedbackProfile>,
    timeouts: Option<Timeouts>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

/// Builder for `ServoBank`. Everything is validated on `build()`.
pub struct ServoBankBuilder<S, A, P> {
    parts: Parts,
    _s: PhantomData<S>,
    _a: PhantomData<A>,
    _p: PhantomData<P>,
}

impl Default for ServoBankBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            parts: Parts::default(),
            _s: PhantomData,
            _a: PhantomData,
            _p: PhantomData,
        }
    }
}

impl ServoBank {
    /// Start building a bank.
    pub fn builder() -> ServoBankBuilder<Missing, Missing, Missing> {
        ServoBankBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn gains_ok(g: PidGains) -> bool {
    [g.kp, g.ki, g.kd].iter().all(|v| v.is_finite() && *v >= 0.0)
}

fn validate(
    timing: &LoopCfg,
    power: &PowerCfg,
    feedback: &FeedbackCfg,
    profiles: &[FeedbackProfile],
    timeouts: &Timeouts,
) -> Result<()> {
    if timing.tick_ms == 0 {
        return Err(invalid("tick_ms must be >= 1"));
    }
    if timing.max_actuators == 0 || timing.max_actuators > usize::from(MAX_CHANNEL) + 1 {
        return Err(invalid("max_actuators must be in [1, 64]"));
    }
    if timeouts.sensor_ms == 0 {
        return Err(invalid("sensor_ms must be >= 1"));
    }
    let mut rails = BTreeSet::new();
    if !power.groups.iter().all(|(pin, _)| rails.insert(*pin)) {
        return Err(invalid("duplicate power rail pin"));
    }
    if !gains_ok(feedback.gains) {
        return Err(invalid("feedback gains must be finite and >= 0"));
    }
    if !(feedback.ease.amplitude.is_finite() && feedback.ease.lag_factor.is_finite()) {
        return Err(invalid("ease parameters must be finite"));
    }
    if profiles.len() > timing.max_actuators {
        return Err(invalid("more feedback servos than max_actuators"));
    }
    let mut channels = BTreeSet::new();
    for p in profiles {
        if p.channel > MAX_CHANNEL {
            return Err(invalid("feedback channel exceeds 63"));
        }
        if !channels.insert(p.channel) {
            return Err(invalid("duplicate feedback channel"));
        }
        if !(p.deg_per_unit.is_finite() && p.deg_per_unit > 0.0) {
            return Err(invalid("deg_per_unit must be > 0"));
        }
        if !gains_ok(p.gains) {
            return Err(invalid("feedback gains must be finite and >= 0"));
        }
    }
    Ok(())
}

impl<S, A, P> ServoBankBuilder<S, A, P> {
    /// Fallible build available in any type-state; returns a typed error for missing pieces.
    pub fn try_build(self) -> Result<ServoBank> {
        let p = self.parts;
        let servos = p
            .servos
            .ok_or_else(|| eyre::Report::new(BuildError::MissingServos))?;
        let sensor = p
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let mut pins = p
            .pins
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPins))?;

        let timing = p.timing.unwrap_or_default();
        let power = p.power.unwrap_or_default();
        let feedback = p.feedback.unwrap_or_default();
        let timeouts = p.timeouts.unwrap_or_default();
        validate(&timing, &power, &feedback, &p.profiles, &timeouts)?;

        let clock: Arc<dyn Clock + Send + Sync> = match p.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        let mut scheduler = PowerScheduler::new(
            power
                .groups
                .iter()
                .map(|(pin, name)| PowerGroup::new(*pin, name.clone()))
                .collect(),
            Duration::from_millis(power.settle_ms),
        );
        scheduler.all_off(pins.as_mut());

        let mut bank = ServoBank {
            servos,
            sensor,
            pins,
            clock,
            epoch,
            timing,
            feedback,
            timeouts,
            actuators: Vec::with_capacity(timing.max_actuators),
            power: scheduler,
            outbox: Vec::new(),
        };
        for profile in p.profiles {
            bank.register_feedback(profile);
        }
        tracing::info!(
            tick_ms = timing.tick_ms,
            capacity = timing.max_actuators,
            rails = bank.power.groups().len(),
            feedback_servos = bank.actuators.len(),
            "servo bank ready"
        );
        Ok(bank)
    }
}

/// Chainable setters that do not affect type-state.
impl<S, A, P> ServoBankBuilder<S, A, P> {
    pub fn with_loop(mut self, timing: LoopCfg) -> Self {
        self.parts.timing = Some(timing);
        self
    }
    pub fn with_power(mut self, power: PowerCfg) -> Self {
        self.parts.power = Some(power);
        self
    }
    pub fn with_feedback(mut self, feedback: FeedbackCfg) -> Self {
        self.parts.feedback = Some(feedback);
        self
    }
    /// Declare a closed-loop joint; its channel becomes a feedback actuator
    /// once assigned.
    pub fn with_feedback_servo(mut self, profile: FeedbackProfile) -> Self {
        self.parts.profiles.push(profile);
        self
    }
    pub fn with_feedback_servos(mut self, profiles: impl IntoIterator<Item = FeedbackProfile>) -> Self {
        self.parts.profiles.extend(profiles);
        self
    }
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.parts.timeouts = Some(timeouts);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.parts.clock = Some(clock);
        self
    }

    fn retype<S2, A2, P2>(self) -> ServoBankBuilder<S2, A2, P2> {
        ServoBankBuilder {
            parts: self.parts,
            _s: PhantomData,
            _a: PhantomData,
            _p: PhantomData,
        }
    }
}

// Setters that advance type-state
impl<A, P> ServoBankBuilder<Missing, A, P> {
    pub fn with_servos(mut self, servos: impl ServoDriver + 'static) -> ServoBankBuilder<Set, A, P> {
        self.parts.servos = Some(Box::new(servos));
        self.retype()
    }
}

impl<S, P> ServoBankBuilder<S, Missing, P> {
    pub fn with_sensor(mut self, sensor: impl AngleSensor + 'static) -> ServoBankBuilder<S, Set, P> {
        self.parts.sensor = Some(Box::new(sensor));
        self.retype()
    }
}

impl<S, A> ServoBankBuilder<S, A, Missing> {
    pub fn with_pins(mut self, pins: impl PinDriver + 'static) -> ServoBankBuilder<S, A, Set> {
        self.parts.pins = Some(Box::new(pins));
        self.retype()
    }
}

impl ServoBankBuilder<Set, Set, Set> {
    /// Validate and build. Only available once all three drivers are set.
    pub fn build(self) -> Result<ServoBank> {
        self.try_build()
    }
}
