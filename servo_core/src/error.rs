use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServoError {
    #[error("no action, servo {0} not assigned yet")]
    NotAssigned(u8),
    #[error("no servo registered on channel {0}")]
    UnknownChannel(u8),
    #[error("servo bank full ({0} actuators)")]
    CapacityExceeded(usize),
    #[error("invalid range on channel {channel}: min {min} > max {max}")]
    InvalidRange { channel: u8, min: u8, max: u8 },
    #[error("channel {0} out of range (max 63)")]
    InvalidChannel(u8),
    #[error("pin {0} is a power rail; switch rails through a move")]
    RailPin(u8),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing servo driver")]
    MissingServos,
    #[error("missing angle sensor")]
    MissingSensor,
    #[error("missing pin driver")]
    MissingPins,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
