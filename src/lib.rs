//! nanodriver - control library for the AD5370 40-channel DAC.
//!
//! This crate drives an AD5370 over SPI and exposes it through a flat C
//! interface with:
//!
//! - Typed 24-bit frame encoding for every write mode and special function
//! - A register model implementing the device transfer function
//! - A background sine generator per channel on a tokio runtime
//! - Simulated and Raspberry Pi (`raspberry` feature) backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     FFI Layer (nanodriver.h)        │
//! │  extern "C" functions, status codes │
//! └─────────────────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────┐
//! │            Controller               │
//! │  ┌───────────┐  ┌───────────────┐  │
//! │  │ Waveform  │  │    Tokio      │  │
//! │  │  Table    │  │    Worker     │  │
//! │  └───────────┘  └───────────────┘  │
//! └─────────────────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────┐
//! │   Ad5370 driver (embedded-hal 1.0)  │
//! │  Frame  │  Register  │  Transport   │
//! └─────────────────────────────────────┘
//! ```
//!
//! # FFI Usage
//!
//! ```c
//! // Fixed level on channel 3, 50 Hz sine on channel 4
//! set_voltage(3, 0x6554);
//! set_freq(3, 0);
//! set_data(4, 50.0, 0x8000);
//!
//! start();
//! // ...
//! stop();
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod runtime;
pub mod transport;

// Re-export commonly used items
pub use config::{Backend, DriverConfig};
pub use device::{Ad5370, Channel, ChannelAddress, DacDevice, Frame, Register};
pub use error::{DriverError, Result};
pub use runtime::{Controller, WaveformTable};
pub use transport::SimulatedAd5370;

// Re-export FFI items for cbindgen
pub use ffi::api::*;
pub use ffi::types::*;
