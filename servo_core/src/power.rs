//! Shared power rails.
//!
//! Each rail feeds a group of servos. A rail is switched on when one of its
//! servos is asked to move and switched off on the first tick that finds none
//! of them in flight. Membership is not stored: a servo belongs to the rail
//! whose pin matches its `rail` id.

use std::time::Duration;

use servo_traits::{Clock, PinDriver};

use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerGroup {
    pub pin: u8,
    pub name: String,
    energized: bool,
}

impl PowerGroup {
    pub fn new(pin: u8, name: impl Into<String>) -> Self {
        Self {
            pin,
            name: name.into(),
            energized: false,
        }
    }

    pub const fn is_energized(&self) -> bool {
        self.energized
    }
}

/// Outcome of [`PowerScheduler::ensure_energized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Energize {
    AlreadyOn,
    /// Rail switched on and settled; members must be re-driven.
    SwitchedOn,
    /// No rail with that pin is configured.
    Ungated,
}

#[derive(Debug, Clone)]
pub struct PowerScheduler {
    groups: Vec<PowerGroup>,
    settle: Duration,
}

impl PowerScheduler {
    pub fn new(groups: Vec<PowerGroup>, settle: Duration) -> Self {
        Self { groups, settle }
    }

    pub fn groups(&self) -> &[PowerGroup] {
        &self.groups
    }

    pub fn group(&self, pin: u8) -> Option<&PowerGroup> {
        self.groups.iter().find(|g| g.pin == pin)
    }

    pub fn is_rail_pin(&self, pin: u8) -> bool {
        self.group(pin).is_some()
    }

    /// Drive every rail off, e.g. at start-up or shutdown.
    pub fn all_off(&mut self, pins: &mut dyn PinDriver) {
        for g in &mut self.groups {
            switch(pins, g, false);
        }
    }

    /// Make sure the rail feeding a servo about to move is on.
    pub fn ensure_energized(&mut self, rail: u8, pins: &mut dyn PinDriver, clock: &dyn Clock) -> Energize {
        let Some(group) = self.groups.iter_mut().find(|g| g.pin == rail) else {
            tracing::warn!(rail, "no power group for rail, moving ungated");
            return Energize::Ungated;
        };
        if group.energized {
            return Energize::AlreadyOn;
        }
        switch(pins, group, true);
        clock.sleep(self.settle);
        Energize::SwitchedOn
    }

    /// Switch off every energized rail for which `in_flight(pin)` is false.
    /// Returns the pins switched off so the caller can release their members.
    pub fn tick(&mut self, pins: &mut dyn PinDriver, in_flight: impl Fn(u8) -> bool) -> Vec<u8> {
        let mut off = Vec::new();
        for g in &mut self.groups {
            if g.energized && !in_flight(g.pin) {
                switch(pins, g, false);
                off.push(g.pin);
            }
        }
        off
    }
}

fn switch(pins: &mut dyn PinDriver, group: &mut PowerGroup, on: bool) {
    if let Err(e) = pins.set_rail_power(group.pin, on) {
        tracing::warn!(rail = group.pin, name = %group.name, on, error = %map_hw_error(e.as_ref()), "rail switch failed");
    }
    if group.energized != on {
        tracing::info!(rail = group.pin, name = %group.name, on, "power rail");
    }
    group.energized = on;
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_hardware::{RigEvent, SimRig};
    use servo_traits::clock::test_clock::TestClock;

    fn scheduler() -> PowerScheduler {
        PowerScheduler::new(
            vec![PowerGroup::new(40, "IN1-leftArm"), PowerGroup::new(41, "IN2-rightArm")],
            Duration::from_millis(50),
        )
    }

    #[test]
    fn energize_switches_once_and_waits_settle() {
        let rig = SimRig::new();
        let mut pins = rig.pins();
        let clock = TestClock::new();
        let mut s = scheduler();

        assert_eq!(s.ensure_energized(40, &mut pins, &clock), Energize::SwitchedOn);
        assert_eq!(clock.elapsed_ms(), 50);
        assert_eq!(s.ensure_energized(40, &mut pins, &clock), Energize::AlreadyOn);
        assert_eq!(clock.elapsed_ms(), 50);
        assert_eq!(rig.events(), vec![RigEvent::Rail { pin: 40, on: true }]);
    }

    #[test]
    fn unknown_rail_is_ungated() {
        let rig = SimRig::new();
        let mut s = scheduler();
        assert_eq!(
            s.ensure_energized(9, &mut rig.pins(), &TestClock::new()),
            Energize::Ungated
        );
        assert!(rig.events().is_empty());
    }

    #[test]
    fn tick_switches_off_only_idle_rails() {
        let rig = SimRig::new();
        let mut pins = rig.pins();
        let clock = TestClock::new();
        let mut s = scheduler();
        s.ensure_energized(40, &mut pins, &clock);
        s.ensure_energized(41, &mut pins, &clock);
        rig.clear_events();

        let off = s.tick(&mut pins, |pin| pin == 41);
        assert_eq!(off, vec![40]);
        assert!(!s.group(40).unwrap().is_energized());
        assert!(s.group(41).unwrap().is_energized());

        // level-triggered: nothing more to do for a rail already off
        assert!(s.tick(&mut pins, |pin| pin == 41).is_empty());
        assert_eq!(rig.events(), vec![RigEvent::Rail { pin: 40, on: false }]);
    }
}
