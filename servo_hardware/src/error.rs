use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("sensor timeout")]
    Timeout,
    #[error("no magnet detected on sensor channel {0}")]
    MagnetMissing(u8),
    #[error("channel {0} is not wired")]
    UnknownChannel(u8),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
