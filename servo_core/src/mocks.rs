//! Test and helper mocks for servo_core.
//!
//! Each mock hands out a cloneable handle so a test can keep inspecting what
//! the bank did after the mock itself was moved into the builder.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use servo_traits::{AngleSensor, HwResult, PinDriver, ServoDriver};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A sensor that always errors; for banks without feedback joints.
pub struct NoopSensor;

impl AngleSensor for NoopSensor {
    fn read_angle(&mut self, _channel: u8, _timeout: Duration) -> HwResult<u16> {
        Err(Box::new(std::io::Error::other("noop sensor")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoOp {
    Write(u8, u8),
    Attach(u8),
    Detach(u8),
}

/// Records every servo call.
#[derive(Debug, Clone, Default)]
pub struct RecordingServos {
    ops: Arc<Mutex<Vec<ServoOp>>>,
}

impl RecordingServos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<ServoOp> {
        lock(&self.ops).clone()
    }

    pub fn clear(&self) {
        lock(&self.ops).clear();
    }

    /// Raw values written to `channel`, in order.
    pub fn writes(&self, channel: u8) -> Vec<u8> {
        lock(&self.ops)
            .iter()
            .filter_map(|op| match *op {
                ServoOp::Write(c, v) if c == channel => Some(v),
                _ => None,
            })
            .collect()
    }
}

impl ServoDriver for RecordingServos {
    fn write(&mut self, channel: u8, position: u8) -> HwResult<()> {
        lock(&self.ops).push(ServoOp::Write(channel, position));
        Ok(())
    }
    fn attach(&mut self, channel: u8) -> HwResult<()> {
        lock(&self.ops).push(ServoOp::Attach(channel));
        Ok(())
    }
    fn detach(&mut self, channel: u8) -> HwResult<()> {
        lock(&self.ops).push(ServoOp::Detach(channel));
        Ok(())
    }
}

/// Records rail and pin levels.
#[derive(Debug, Clone, Default)]
pub struct RecordingPins {
    rails: Arc<Mutex<Vec<(u8, bool)>>>,
    levels: Arc<Mutex<BTreeMap<u8, bool>>>,
}

impl RecordingPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every rail switch, in order.
    pub fn rail_switches(&self) -> Vec<(u8, bool)> {
        lock(&self.rails).clone()
    }

    pub fn level(&self, pin: u8) -> Option<bool> {
        lock(&self.levels).get(&pin).copied()
    }
}

impl PinDriver for RecordingPins {
    fn set_rail_power(&mut self, pin: u8, on: bool) -> HwResult<()> {
        lock(&self.rails).push((pin, on));
        Ok(())
    }
    fn set_level(&mut self, pin: u8, high: bool) -> HwResult<()> {
        lock(&self.levels).insert(pin, high);
        Ok(())
    }
}

/// Replays queued angles per sensor channel. An empty queue reads as a
/// timeout; `hold` keeps returning the last queued angle instead.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    queues: Arc<Mutex<BTreeMap<u8, VecDeque<u16>>>>,
    held: Arc<Mutex<BTreeMap<u8, u16>>>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, channel: u8, angles: impl IntoIterator<Item = u16>) {
        lock(&self.queues)
            .entry(channel)
            .or_default()
            .extend(angles);
    }

    /// Answer every read on `channel` with `angle` once the queue is empty.
    pub fn hold(&self, channel: u8, angle: u16) {
        lock(&self.held).insert(channel, angle);
    }

    pub fn release(&self, channel: u8) {
        lock(&self.held).remove(&channel);
    }
}

impl AngleSensor for ScriptedSensor {
    fn read_angle(&mut self, channel: u8, _timeout: Duration) -> HwResult<u16> {
        if let Some(a) = lock(&self.queues).get_mut(&channel).and_then(VecDeque::pop_front) {
            return Ok(a);
        }
        match lock(&self.held).get(&channel) {
            Some(&a) => Ok(a),
            None => Err(Box::new(std::io::Error::other("scripted sensor timeout"))),
        }
    }
}
