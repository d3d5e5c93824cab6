//! Simulated servo bench.
//!
//! One [`SimRig`] owns the shared bench state; the handles it hands out
//! implement the hardware traits and all observe the same joints, rails and
//! pins. Linked joints slew toward the commanded position on every sensor
//! read, which is enough to close a feedback loop in tests and in `--sim` runs.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

use servo_traits::{AngleSensor, HwResult, PinDriver, ServoDriver};

use crate::error::HwError;

/// Something the bench observed, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigEvent {
    Write { channel: u8, position: u8 },
    Attach(u8),
    Detach(u8),
    Rail { pin: u8, on: bool },
    Level { pin: u8, high: bool },
}

#[derive(Debug, Clone, Copy)]
struct Joint {
    commanded: Option<u8>,
    attached: bool,
    actual: f32,
}

impl Default for Joint {
    fn default() -> Self {
        Self {
            commanded: None,
            attached: false,
            actual: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SensorLink {
    servo_channel: u8,
    deg_per_unit: f32,
    zero_angle: f32,
}

#[derive(Debug)]
struct RigState {
    joints: BTreeMap<u8, Joint>,
    sensors: BTreeMap<u8, SensorLink>,
    failing_sensors: BTreeSet<u8>,
    rails: BTreeMap<u8, bool>,
    levels: BTreeMap<u8, bool>,
    slew_per_read: f32,
    events: Vec<RigEvent>,
}

impl RigState {
    fn joint(&mut self, channel: u8) -> &mut Joint {
        self.joints.entry(channel).or_default()
    }
}

#[derive(Debug, Clone)]
pub struct SimRig {
    state: Rc<RefCell<RigState>>,
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRig {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RigState {
                joints: BTreeMap::new(),
                sensors: BTreeMap::new(),
                failing_sensors: BTreeSet::new(),
                rails: BTreeMap::new(),
                levels: BTreeMap::new(),
                slew_per_read: 3.0,
                events: Vec::new(),
            })),
        }
    }

    /// Put a magnet on `servo_channel`'s shaft and read it through `sensor_channel`.
    ///
    /// The reported angle decreases as the raw servo position increases:
    /// `angle = zero_angle - position * deg_per_unit (mod 360)`.
    pub fn link_sensor(&self, sensor_channel: u8, servo_channel: u8, deg_per_unit: f32, zero_angle: f32) {
        let mut st = self.state.borrow_mut();
        st.sensors.insert(
            sensor_channel,
            SensorLink {
                servo_channel,
                deg_per_unit,
                zero_angle,
            },
        );
        st.joint(servo_channel);
    }

    /// Place a joint without commanding it (e.g. where the last run left it).
    pub fn place_joint(&self, servo_channel: u8, position: f32) {
        self.state.borrow_mut().joint(servo_channel).actual = position;
    }

    /// Make reads from `sensor_channel` time out until cleared.
    pub fn fail_sensor(&self, sensor_channel: u8, failing: bool) {
        let mut st = self.state.borrow_mut();
        if failing {
            st.failing_sensors.insert(sensor_channel);
        } else {
            st.failing_sensors.remove(&sensor_channel);
        }
    }

    pub fn joint_position(&self, servo_channel: u8) -> Option<f32> {
        self.state.borrow().joints.get(&servo_channel).map(|j| j.actual)
    }

    pub fn commanded(&self, servo_channel: u8) -> Option<u8> {
        self.state
            .borrow()
            .joints
            .get(&servo_channel)
            .and_then(|j| j.commanded)
    }

    pub fn is_attached(&self, servo_channel: u8) -> bool {
        self.state
            .borrow()
            .joints
            .get(&servo_channel)
            .is_some_and(|j| j.attached)
    }

    pub fn rail_on(&self, pin: u8) -> bool {
        self.state.borrow().rails.get(&pin).copied().unwrap_or(false)
    }

    pub fn level(&self, pin: u8) -> Option<bool> {
        self.state.borrow().levels.get(&pin).copied()
    }

    pub fn events(&self) -> Vec<RigEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn servo_bus(&self) -> SimServoBus {
        SimServoBus { rig: self.clone() }
    }

    pub fn sensor(&self) -> SimAngleSensor {
        SimAngleSensor { rig: self.clone() }
    }

    pub fn pins(&self) -> SimPins {
        SimPins { rig: self.clone() }
    }
}

/// Simulated servo outputs.
pub struct SimServoBus {
    rig: SimRig,
}

impl ServoDriver for SimServoBus {
    fn write(&mut self, channel: u8, position: u8) -> HwResult<()> {
        let mut st = self.rig.state.borrow_mut();
        st.joint(channel).commanded = Some(position);
        st.events.push(RigEvent::Write { channel, position });
        tracing::trace!(channel, position, "sim servo write");
        Ok(())
    }

    fn attach(&mut self, channel: u8) -> HwResult<()> {
        let mut st = self.rig.state.borrow_mut();
        st.joint(channel).attached = true;
        st.events.push(RigEvent::Attach(channel));
        Ok(())
    }

    fn detach(&mut self, channel: u8) -> HwResult<()> {
        let mut st = self.rig.state.borrow_mut();
        st.joint(channel).attached = false;
        st.events.push(RigEvent::Detach(channel));
        Ok(())
    }
}

/// Simulated magnet sensors behind the multiplexer.
pub struct SimAngleSensor {
    rig: SimRig,
}

impl AngleSensor for SimAngleSensor {
    fn read_angle(&mut self, channel: u8, _timeout: Duration) -> HwResult<u16> {
        let mut st = self.rig.state.borrow_mut();
        if st.failing_sensors.contains(&channel) {
            return Err(Box::new(HwError::Timeout));
        }
        let link = *st
            .sensors
            .get(&channel)
            .ok_or(HwError::UnknownChannel(channel))?;
        let slew = st.slew_per_read;
        let joint = st.joint(link.servo_channel);
        if let (true, Some(target)) = (joint.attached, joint.commanded) {
            let delta = f32::from(target) - joint.actual;
            joint.actual += delta.clamp(-slew, slew);
        }
        let angle = (link.zero_angle - joint.actual * link.deg_per_unit).rem_euclid(360.0);
        // rounding 359.6 gives 360, which the sensor never reports
        Ok((angle.round() as u16) % 360)
    }
}

/// Simulated rail relays and free digital outputs.
pub struct SimPins {
    rig: SimRig,
}

impl PinDriver for SimPins {
    fn set_rail_power(&mut self, pin: u8, on: bool) -> HwResult<()> {
        let mut st = self.rig.state.borrow_mut();
        st.rails.insert(pin, on);
        st.events.push(RigEvent::Rail { pin, on });
        tracing::debug!(pin, on, "sim rail");
        Ok(())
    }

    fn set_level(&mut self, pin: u8, high: bool) -> HwResult<()> {
        let mut st = self.rig.state.borrow_mut();
        st.levels.insert(pin, high);
        st.events.push(RigEvent::Level { pin, high });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_joint_slews_toward_command_only_when_attached() {
        let rig = SimRig::new();
        rig.link_sensor(0, 3, 1.0, 200.0);
        let mut bus = rig.servo_bus();
        let mut sensor = rig.sensor();

        bus.write(3, 100).unwrap();
        let a0 = sensor.read_angle(0, Duration::from_millis(5)).unwrap();
        assert_eq!(a0, 110); // 200 - 90, detached so no motion

        bus.attach(3).unwrap();
        let a1 = sensor.read_angle(0, Duration::from_millis(5)).unwrap();
        assert_eq!(a1, 107);
        assert_eq!(rig.joint_position(3), Some(93.0));
    }

    #[test]
    fn angle_wraps_below_zero() {
        let rig = SimRig::new();
        rig.link_sensor(1, 0, 2.0, 10.0);
        let mut sensor = rig.sensor();
        // 10 - 90*2 = -170 -> 190
        assert_eq!(sensor.read_angle(1, Duration::ZERO).unwrap(), 190);
    }

    #[test]
    fn failing_sensor_reports_timeout() {
        let rig = SimRig::new();
        rig.link_sensor(0, 0, 1.0, 0.0);
        rig.fail_sensor(0, true);
        let err = rig.sensor().read_angle(0, Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }
}
