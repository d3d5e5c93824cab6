use std::time::Duration;

use rppal::i2c::I2c;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::retry_until_deadline;

const REG_STATUS: u8 = 0x0b;
const REG_RAW_ANGLE_HI: u8 = 0x0c;
const REG_RAW_ANGLE_LO: u8 = 0x0d;
const STATUS_MAGNET_DETECTED: u8 = 0x20;
const COUNTS_PER_TURN: u32 = 4096;

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

/// AS5600 magnetic encoders, all on the same address, fanned out through a
/// TCA9548 style multiplexer (one sensor per mux channel).
pub struct MuxedAs5600 {
    bus: I2c,
    mux_address: u16,
    sensor_address: u16,
    selected: Option<u8>,
}

impl MuxedAs5600 {
    pub fn try_new(bus: u8, mux_address: u16, sensor_address: u16) -> Result<Self> {
        let bus = I2c::with_bus(bus).map_err(i2c_err)?;
        Ok(Self {
            bus,
            mux_address,
            sensor_address,
            selected: None,
        })
    }

    fn select(&mut self, channel: u8) -> Result<()> {
        if channel > 7 {
            return Err(HwError::UnknownChannel(channel));
        }
        if self.selected == Some(channel) {
            return Ok(());
        }
        self.bus
            .set_slave_address(self.mux_address)
            .map_err(i2c_err)?;
        self.bus.write(&[1u8 << channel]).map_err(i2c_err)?;
        self.selected = Some(channel);
        Ok(())
    }

    fn read_register(&mut self, reg: u8) -> Result<u8> {
        self.bus
            .set_slave_address(self.sensor_address)
            .map_err(i2c_err)?;
        let mut buf = [0u8; 1];
        self.bus.write_read(&[reg], &mut buf).map_err(i2c_err)?;
        Ok(buf[0])
    }

    /// Raw 12-bit angle count.
    pub fn read_raw(&mut self, channel: u8) -> Result<u16> {
        self.select(channel)?;
        let status = self.read_register(REG_STATUS)?;
        if status & STATUS_MAGNET_DETECTED == 0 {
            return Err(HwError::MagnetMissing(channel));
        }
        let hi = self.read_register(REG_RAW_ANGLE_HI)?;
        let lo = self.read_register(REG_RAW_ANGLE_LO)?;
        Ok((u16::from(hi & 0x0f) << 8) | u16::from(lo))
    }

    /// Whole degrees in `0..360`, retrying bus errors until `timeout`.
    pub fn read_degrees(&mut self, channel: u8, timeout: Duration) -> Result<u16> {
        let raw = retry_until_deadline(
            || match self.read_raw(channel) {
                Err(HwError::I2c(e)) => {
                    // a failed transaction may leave the mux in an unknown state
                    self.selected = None;
                    Err(HwError::I2c(e))
                }
                other => other,
            },
            timeout,
            Duration::from_micros(250),
        )
        .map_err(|e| match e {
            HwError::I2c(_) => HwError::Timeout,
            other => other,
        })?;
        let degrees = raw_to_degrees(raw);
        trace!(channel, raw, degrees, "as5600 sample");
        Ok(degrees)
    }
}

/// `raw / 4096 * 360`, truncated to whole degrees.
pub fn raw_to_degrees(raw: u16) -> u16 {
    ((u32::from(raw) % COUNTS_PER_TURN) * 360 / COUNTS_PER_TURN) as u16
}
