//! C-compatible status codes.

use crate::error::DriverError;

/// Result status codes returned by every `u32` function.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanoStatus {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer was passed.
    NullPointer = 1,
    /// Invalid argument.
    InvalidArgument = 2,
    /// Channel id out of range.
    InvalidChannel = 3,
    /// SPI or GPIO failure.
    BusError = 4,
    /// Waveform command queue full.
    QueueFull = 5,
    /// Device lock poisoned by an earlier panic.
    LockPoisoned = 6,
    /// Driver could not be initialized.
    InitFailed = 7,
}

impl From<NanoStatus> for u32 {
    fn from(status: NanoStatus) -> Self {
        status as u32
    }
}

impl From<&DriverError> for NanoStatus {
    fn from(err: &DriverError) -> Self {
        match err {
            DriverError::InvalidChannel { .. } => NanoStatus::InvalidChannel,
            DriverError::InvalidArgument(_) => NanoStatus::InvalidArgument,
            DriverError::Spi(_) | DriverError::Pin(_) | DriverError::BusyTimeout { .. } => {
                NanoStatus::BusError
            }
            DriverError::QueueFull => NanoStatus::QueueFull,
            DriverError::LockPoisoned => NanoStatus::LockPoisoned,
            DriverError::Config(_)
            | DriverError::ConfigParse(_)
            | DriverError::ConfigIo { .. }
            | DriverError::BackendUnavailable(_)
            | DriverError::Backend(_)
            | DriverError::Runtime(_) => NanoStatus::InitFailed,
        }
    }
}
