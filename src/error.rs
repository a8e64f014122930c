//! Error type shared by the driver, the controller and the FFI layer.

use std::path::PathBuf;

use embedded_hal::{digital, spi};
use thiserror::Error;

/// Errors produced while talking to the DAC or managing the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("channel {channel} out of range (0..{})", crate::device::CHANNEL_COUNT)]
    InvalidChannel { channel: u8 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("spi transfer failed: {0:?}")]
    Spi(spi::ErrorKind),

    #[error("gpio access failed: {0:?}")]
    Pin(digital::ErrorKind),

    #[error("BUSY still asserted after {polls} polls")]
    BusyTimeout { polls: u32 },

    #[error("waveform command queue is full")]
    QueueFull,

    #[error("device lock poisoned")]
    LockPoisoned,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backend `{0}` is not available in this build")]
    BackendUnavailable(&'static str),

    #[error("failed to open backend: {0}")]
    Backend(String),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for DriverError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DriverError::LockPoisoned
    }
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;
