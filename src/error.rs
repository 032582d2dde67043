use std::io;

use crate::channel::Direction;

/// Errors reported by the driver
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("channel is not initialized")]
    NotInitialized,
    #[error("channel is busy")]
    Busy,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{0} is not present in hardware")]
    FeatureDisabled(&'static str),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("{0} channel not found")]
    DeviceNotFound(Direction),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn invalid<S: Into<String>>(msg: S) -> Error {
    Error::InvalidParameter(msg.into())
}
