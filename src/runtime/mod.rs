//! Runtime: controller and waveform worker.

pub mod controller;
pub mod waveform;

use std::sync::{Arc, Mutex};

use crate::device::DacDevice;

pub use controller::Controller;
pub use waveform::{sample, WaveformCommand, WaveformTable, WaveformWorker};

/// Device handle shared between the controller and the worker.
pub type SharedDevice = Arc<Mutex<Box<dyn DacDevice>>>;
