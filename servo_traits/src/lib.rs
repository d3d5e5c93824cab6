//! Hardware seams shared by the servo bank engine and its drivers.
//!
//! Every fallible call returns a boxed error so concrete drivers can surface
//! their own error types; the core maps them back with a downcast.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Magnetic rotary sensor bank addressed by sensor channel.
pub trait AngleSensor {
    /// Read the absolute magnet angle in whole degrees (`0..360`).
    ///
    /// Implementations must give up after `timeout` and report an error
    /// rather than block the control loop.
    fn read_angle(&mut self, channel: u8, timeout: std::time::Duration) -> HwResult<u16>;
}

/// Position-commanded servo outputs addressed by output channel.
pub trait ServoDriver {
    /// Command a raw position (`0..=180`); the value is already inverted if needed.
    fn write(&mut self, channel: u8, position: u8) -> HwResult<()>;
    fn attach(&mut self, channel: u8) -> HwResult<()>;
    fn detach(&mut self, channel: u8) -> HwResult<()>;
}

/// Digital outputs: power rails and free pins.
pub trait PinDriver {
    /// Switch a power rail. Polarity (active-low relays) is the driver's concern.
    fn set_rail_power(&mut self, pin: u8, on: bool) -> HwResult<()>;
    fn set_level(&mut self, pin: u8, high: bool) -> HwResult<()>;
}
