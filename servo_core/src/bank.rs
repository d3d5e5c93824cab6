//! The servo registry and its command surface.
//!
//! `ServoBank` owns every actuator, the power rails and the hardware handles.
//! It is driven from a single thread: commands are applied between ticks and
//! status reports are queued for the caller to drain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use servo_traits::{AngleSensor, Clock, PinDriver, ServoDriver};

use crate::actuator::{Actuator, AssignSpec, Drive};
use crate::config::{FeedbackCfg, FeedbackProfile, LoopCfg, Timeouts};
use crate::error::ServoError;
use crate::hw_error::map_hw_error;
use crate::power::{Energize, PowerScheduler};
use crate::status::StatusReport;

/// Highest channel a status frame can carry.
pub const MAX_CHANNEL: u8 = 63;

/// Typed command set accepted by the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Assign(AssignSpec),
    MoveTo {
        channel: u8,
        position: u8,
        duration_ms: u64,
    },
    Stop {
        channel: u8,
    },
    StopAll,
    Report {
        channel: u8,
    },
    SetAutoRelease {
        channel: u8,
        ms: u64,
    },
    SetPosition {
        channel: u8,
        position: u8,
    },
    SetVerbose {
        channel: u8,
        verbose: bool,
    },
    PinHigh(Vec<u8>),
    PinLow(Vec<u8>),
}

pub struct ServoBank {
    pub(crate) servos: Box<dyn ServoDriver>,
    pub(crate) sensor: Box<dyn AngleSensor>,
    pub(crate) pins: Box<dyn PinDriver>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) timing: LoopCfg,
    pub(crate) feedback: FeedbackCfg,
    pub(crate) timeouts: Timeouts,
    pub(crate) actuators: Vec<Actuator>,
    pub(crate) power: PowerScheduler,
    pub(crate) outbox: Vec<StatusReport>,
}

impl core::fmt::Debug for ServoBank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServoBank")
            .field("actuators", &self.actuators.len())
            .field("capacity", &self.timing.max_actuators)
            .field("rails", &self.power.groups().len())
            .field("pending_status", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

/// Split borrow: hardware handles for an actuator operation.
macro_rules! drive {
    ($bank:expr) => {
        Drive {
            servos: $bank.servos.as_mut(),
            sensor: $bank.sensor.as_mut(),
            sensor_timeout: Duration::from_millis($bank.timeouts.sensor_ms),
        }
    };
}

impl ServoBank {
    // ── Introspection ────────────────────────────────────────────────────────

    /// Milliseconds since the bank was built.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub const fn timing(&self) -> &LoopCfg {
        &self.timing
    }

    pub fn actuator(&self, channel: u8) -> Option<&Actuator> {
        self.actuators.iter().find(|a| a.channel() == channel)
    }

    pub fn actuators(&self) -> &[Actuator] {
        &self.actuators
    }

    pub const fn power(&self) -> &PowerScheduler {
        &self.power
    }

    pub fn rail_energized(&self, pin: u8) -> Option<bool> {
        self.power.group(pin).map(crate::power::PowerGroup::is_energized)
    }

    pub fn in_flight_count(&self) -> usize {
        self.actuators.iter().filter(|a| a.in_flight()).count()
    }

    /// No actuator in flight and no rail left energized.
    pub fn is_quiescent(&self) -> bool {
        self.in_flight_count() == 0 && self.power.groups().iter().all(|g| !g.is_energized())
    }

    /// Take every queued status report, oldest first.
    pub fn drain_status(&mut self) -> Vec<StatusReport> {
        std::mem::take(&mut self.outbox)
    }

    fn index_of(&self, channel: u8) -> Result<usize, ServoError> {
        self.actuators
            .iter()
            .position(|a| a.channel() == channel)
            .ok_or(ServoError::UnknownChannel(channel))
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Apply one command. Errors are logged and returned; the bank is left
    /// unchanged by a failed command.
    pub fn apply(&mut self, cmd: Command) -> Result<(), ServoError> {
        let res = match cmd {
            Command::Assign(spec) => self.assign(&spec),
            Command::MoveTo {
                channel,
                position,
                duration_ms,
            } => self.move_to(channel, position, duration_ms),
            Command::Stop { channel } => self.stop(channel),
            Command::StopAll => {
                self.stop_all();
                Ok(())
            }
            Command::Report { channel } => self.report(channel),
            Command::SetAutoRelease { channel, ms } => self.set_auto_release(channel, ms),
            Command::SetPosition { channel, position } => self.set_position(channel, position),
            Command::SetVerbose { channel, verbose } => self.set_verbose(channel, verbose),
            Command::PinHigh(pins) => self.set_pins(&pins, true),
            Command::PinLow(pins) => self.set_pins(&pins, false),
        };
        if let Err(e) = &res {
            tracing::warn!(error = %e, "command rejected");
        }
        res
    }

    /// Register a servo, or update it in place when the channel is known.
    pub fn assign(&mut self, spec: &AssignSpec) -> Result<(), ServoError> {
        if spec.channel > MAX_CHANNEL {
            return Err(ServoError::InvalidChannel(spec.channel));
        }
        let now = self.now_ms();
        let idx = if let Ok(i) = self.index_of(spec.channel) {
            i
        } else {
            if self.actuators.len() >= self.timing.max_actuators {
                return Err(ServoError::CapacityExceeded(self.timing.max_actuators));
            }
            self.actuators.push(Actuator::plain(spec.channel, self.timing));
            self.actuators.len() - 1
        };
        let mut drive = drive!(self);
        let res = self.actuators[idx].assign(spec, &mut drive, now, &mut self.outbox);
        if res.is_err() && !self.actuators[idx].is_assigned() && !self.actuators[idx].is_feedback() {
            // drop the slot we just opened
            self.actuators.remove(idx);
        }
        res
    }

    /// Energize the servo's rail (settling and re-driving its group if it was
    /// off), then start the move.
    pub fn move_to(&mut self, channel: u8, position: u8, duration_ms: u64) -> Result<(), ServoError> {
        let idx = self.index_of(channel)?;
        if !self.actuators[idx].is_assigned() {
            return Err(ServoError::NotAssigned(channel));
        }
        let rail = self.actuators[idx].rail();
        if self.power.ensure_energized(rail, self.pins.as_mut(), self.clock.as_ref()) == Energize::SwitchedOn {
            let mut drive = drive!(self);
            for a in self.actuators.iter_mut().filter(|a| a.rail() == rail) {
                a.power_up(&mut drive);
            }
        }
        let now = self.now_ms();
        let mut drive = drive!(self);
        self.actuators[idx].move_to(position, duration_ms, &mut drive, now, &mut self.outbox)
    }

    pub fn stop(&mut self, channel: u8) -> Result<(), ServoError> {
        let idx = self.index_of(channel)?;
        let now = self.now_ms();
        self.actuators[idx].stop(now, &mut self.outbox)
    }

    pub fn stop_all(&mut self) {
        let now = self.now_ms();
        for a in self.actuators.iter_mut().filter(|a| a.is_assigned()) {
            // assigned actuators always accept stop
            let _ = a.stop(now, &mut self.outbox);
        }
    }

    pub fn report(&mut self, channel: u8) -> Result<(), ServoError> {
        let idx = self.index_of(channel)?;
        let now = self.now_ms();
        self.actuators[idx].report(now, &mut self.outbox);
        Ok(())
    }

    pub fn set_auto_release(&mut self, channel: u8, ms: u64) -> Result<(), ServoError> {
        let idx = self.index_of(channel)?;
        self.actuators[idx].set_auto_release(ms)
    }

    pub fn set_position(&mut self, channel: u8, position: u8) -> Result<(), ServoError> {
        let idx = self.index_of(channel)?;
        self.actuators[idx].set_position(position)
    }

    pub fn set_verbose(&mut self, channel: u8, verbose: bool) -> Result<(), ServoError> {
        let idx = self.index_of(channel)?;
        self.actuators[idx].set_verbose(verbose)
    }

    /// Drive free digital outputs. Rail pins are refused; the rest are still set.
    pub fn set_pins(&mut self, pins: &[u8], high: bool) -> Result<(), ServoError> {
        let mut refused = None;
        for &pin in pins {
            if self.power.is_rail_pin(pin) {
                refused.get_or_insert(pin);
                continue;
            }
            if let Err(e) = self.pins.set_level(pin, high) {
                let err = map_hw_error(e.as_ref());
                tracing::warn!(pin, high, error = %err, "pin write failed");
                return Err(err);
            }
            tracing::debug!(pin, high, "pin set");
        }
        refused.map_or(Ok(()), |pin| Err(ServoError::RailPin(pin)))
    }

    // ── Loop ─────────────────────────────────────────────────────────────────

    /// One control tick: update every actuator in registration order, then
    /// switch off rails with nothing in flight and release their members.
    pub fn tick(&mut self) {
        let now = self.now_ms();
        let mut drive = drive!(self);
        for a in &mut self.actuators {
            a.update(&mut drive, now, &mut self.outbox);
        }

        let actuators = &self.actuators;
        let off = self.power.tick(self.pins.as_mut(), |pin| {
            actuators.iter().any(|a| a.rail() == pin && a.in_flight())
        });
        if off.is_empty() {
            return;
        }
        let mut drive = drive!(self);
        for a in self.actuators.iter_mut().filter(|a| off.contains(&a.rail())) {
            a.force_release(&mut drive, now, &mut self.outbox);
        }
    }

    /// Stop everything and drop every rail.
    pub fn shutdown(&mut self) {
        self.stop_all();
        let now = self.now_ms();
        self.power.all_off(self.pins.as_mut());
        let mut drive = drive!(self);
        for a in &mut self.actuators {
            a.force_release(&mut drive, now, &mut self.outbox);
        }
        tracing::info!(actuators = self.actuators.len(), "servo bank shut down");
    }

    pub(crate) fn register_feedback(&mut self, profile: FeedbackProfile) {
        self.actuators
            .push(Actuator::feedback(profile, self.feedback, self.timing));
    }
}
