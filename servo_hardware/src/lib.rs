//! Drivers for the servo bank: a simulated bench by default, Raspberry Pi
//! peripherals behind the `hardware` feature.

pub mod error;
pub mod sim;
pub mod util;

pub use sim::{RigEvent, SimAngleSensor, SimPins, SimRig, SimServoBus};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod as5600;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hardware {
    //! GPIO and I²C backed implementations of the hardware traits.

    use std::collections::BTreeMap;
    use std::time::Duration;

    use rppal::gpio::{Gpio, OutputPin};
    use servo_traits::{AngleSensor, HwResult, PinDriver, ServoDriver};

    pub use crate::as5600::MuxedAs5600;
    use crate::error::{HwError, Result};

    /// Standard hobby servo frame.
    const SERVO_PERIOD: Duration = Duration::from_millis(20);

    fn gpio_err(e: rppal::gpio::Error) -> HwError {
        HwError::Gpio(e.to_string())
    }

    /// Software-PWM servo outputs, one GPIO per channel.
    pub struct GpioServoBus {
        pins: BTreeMap<u8, OutputPin>,
        last: BTreeMap<u8, u8>,
        attached: BTreeMap<u8, bool>,
        pulse_min_us: u32,
        pulse_max_us: u32,
    }

    impl GpioServoBus {
        /// `channel_pins` maps servo channel to BCM GPIO number.
        pub fn try_new(
            channel_pins: &BTreeMap<u8, u8>,
            pulse_min_us: u32,
            pulse_max_us: u32,
        ) -> Result<Self> {
            let gpio = Gpio::new().map_err(gpio_err)?;
            let mut pins = BTreeMap::new();
            for (&channel, &bcm) in channel_pins {
                let mut pin = gpio.get(bcm).map_err(gpio_err)?.into_output();
                pin.set_low();
                pins.insert(channel, pin);
            }
            Ok(Self {
                pins,
                last: BTreeMap::new(),
                attached: BTreeMap::new(),
                pulse_min_us,
                pulse_max_us,
            })
        }

        fn pulse_for(&self, position: u8) -> Duration {
            let span = self.pulse_max_us.saturating_sub(self.pulse_min_us);
            let us = self.pulse_min_us + span * u32::from(position.min(180)) / 180;
            Duration::from_micros(u64::from(us))
        }

        fn drive(&mut self, channel: u8) -> Result<()> {
            let Some(&position) = self.last.get(&channel) else {
                return Ok(());
            };
            let pulse = self.pulse_for(position);
            let pin = self
                .pins
                .get_mut(&channel)
                .ok_or(HwError::UnknownChannel(channel))?;
            pin.set_pwm(SERVO_PERIOD, pulse).map_err(gpio_err)
        }
    }

    impl ServoDriver for GpioServoBus {
        fn write(&mut self, channel: u8, position: u8) -> HwResult<()> {
            self.last.insert(channel, position);
            if self.attached.get(&channel).copied().unwrap_or(false) {
                self.drive(channel)?;
            }
            Ok(())
        }

        fn attach(&mut self, channel: u8) -> HwResult<()> {
            self.attached.insert(channel, true);
            self.drive(channel)?;
            Ok(())
        }

        fn detach(&mut self, channel: u8) -> HwResult<()> {
            self.attached.insert(channel, false);
            let pin = self
                .pins
                .get_mut(&channel)
                .ok_or(HwError::UnknownChannel(channel))?;
            pin.clear_pwm().map_err(gpio_err)?;
            pin.set_low();
            Ok(())
        }
    }

    /// Rail relays and free digital outputs, claimed lazily.
    pub struct GpioPins {
        gpio: Gpio,
        outputs: BTreeMap<u8, OutputPin>,
        rails_active_low: bool,
    }

    impl GpioPins {
        pub fn try_new(rails_active_low: bool) -> Result<Self> {
            Ok(Self {
                gpio: Gpio::new().map_err(gpio_err)?,
                outputs: BTreeMap::new(),
                rails_active_low,
            })
        }

        fn output(&mut self, pin: u8) -> Result<&mut OutputPin> {
            if !self.outputs.contains_key(&pin) {
                let out = self.gpio.get(pin).map_err(gpio_err)?.into_output();
                self.outputs.insert(pin, out);
            }
            self.outputs.get_mut(&pin).ok_or(HwError::UnknownChannel(pin))
        }
    }

    impl PinDriver for GpioPins {
        fn set_rail_power(&mut self, pin: u8, on: bool) -> HwResult<()> {
            let high = on != self.rails_active_low;
            self.output(pin)?.write(high.into());
            tracing::debug!(pin, on, high, "rail relay");
            Ok(())
        }

        fn set_level(&mut self, pin: u8, high: bool) -> HwResult<()> {
            self.output(pin)?.write(high.into());
            Ok(())
        }
    }

    impl AngleSensor for MuxedAs5600 {
        fn read_angle(&mut self, channel: u8, timeout: Duration) -> HwResult<u16> {
            Ok(self.read_degrees(channel, timeout)?)
        }
    }
}
