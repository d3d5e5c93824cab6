//! Status reports emitted by actuators.

/// Flag bits of the status byte. The byte always carries `0x80`, so it can
/// never collide with the frame terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub assigned: bool,
    /// Only set while a move is underway and the target is not yet reached.
    pub moving: bool,
    pub attached: bool,
    pub auto_release: bool,
    pub verbose: bool,
    pub reached: bool,
}

impl StatusFlags {
    pub const BASE: u8 = 0x80;
    pub const ASSIGNED: u8 = 0x01;
    pub const MOVING: u8 = 0x02;
    pub const ATTACHED: u8 = 0x04;
    pub const AUTO_RELEASE: u8 = 0x08;
    pub const VERBOSE: u8 = 0x10;
    pub const REACHED: u8 = 0x20;
    const ALL: u8 = 0x3f;

    pub const fn encode(self) -> u8 {
        let mut b = Self::BASE;
        if self.assigned {
            b |= Self::ASSIGNED;
        }
        if self.moving {
            b |= Self::MOVING;
        }
        if self.attached {
            b |= Self::ATTACHED;
        }
        if self.auto_release {
            b |= Self::AUTO_RELEASE;
        }
        if self.verbose {
            b |= Self::VERBOSE;
        }
        if self.reached {
            b |= Self::REACHED;
        }
        b
    }

    /// Inverse of [`encode`](Self::encode); `None` for bytes it never produces.
    pub const fn decode(b: u8) -> Option<Self> {
        if b & !Self::ALL != Self::BASE {
            return None;
        }
        Some(Self {
            assigned: b & Self::ASSIGNED != 0,
            moving: b & Self::MOVING != 0,
            attached: b & Self::ATTACHED != 0,
            auto_release: b & Self::AUTO_RELEASE != 0,
            verbose: b & Self::VERBOSE != 0,
            reached: b & Self::REACHED != 0,
        })
    }
}

/// Closed-loop extras carried by feedback actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    /// Milliseconds since the current (or last) move began.
    pub elapsed_ms: u64,
    /// Last raw value written to the servo.
    pub write: u8,
    /// Trajectory position the loop is chasing.
    pub desired: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub channel: u8,
    pub flags: StatusFlags,
    pub position: u8,
    pub telemetry: Option<Telemetry>,
}
