//! Exported control functions.
//!
//! Every function returning `u32` reports a [`NanoStatus`] value. The first
//! call initializes the global controller from `NANODRIVER_CONFIG`.

use super::global::{status, with_controller};
use super::types::NanoStatus;
use crate::error::Result;
use crate::runtime::Controller;

/// Link check: returns `code * 2`, wrapping on overflow.
#[no_mangle]
pub extern "C" fn add(code: u16) -> u16 {
    code.wrapping_mul(2)
}

/// Write `code` to every channel and load the outputs.
#[no_mangle]
pub extern "C" fn set_code_to_all(code: u16) -> u32 {
    status("set_code_to_all", |c| c.set_code_to_all(code))
}

/// Start the waveform worker.
#[no_mangle]
pub extern "C" fn start() -> u32 {
    status("start", |c| c.start())
}

/// Stop the waveform worker and wait for it to exit.
#[no_mangle]
pub extern "C" fn stop() -> u32 {
    status("stop", |c| c.stop())
}

/// Write `code` to one channel; it becomes the channel's waveform amplitude.
#[no_mangle]
pub extern "C" fn set_voltage(channel: u8, code: u16) -> u32 {
    status("set_voltage", |c| c.set_voltage(channel, code))
}

/// Set the waveform frequency of one channel in Hz. 0 holds a DC level.
#[no_mangle]
pub extern "C" fn set_freq(channel: u8, freq: u64) -> u32 {
    status("set_freq", |c| c.set_freq(channel, freq))
}

/// Set frequency and amplitude of one channel. `freq` is rounded to whole Hz.
#[no_mangle]
pub extern "C" fn set_data(channel: u8, freq: f64, code: u16) -> u32 {
    status("set_data", |c| c.set_data(channel, freq, code))
}

/// Drive one channel to `volts` using its gain and offset trims.
#[no_mangle]
pub extern "C" fn set_output_volts(channel: u8, volts: f64) -> u32 {
    status("set_output_volts", |c| c.set_output_volts(channel, volts).map(|_| ()))
}

/// Write the gain trim (M) of every channel.
#[no_mangle]
pub extern "C" fn set_gain_all(value: u16) -> u32 {
    status("set_gain_all", |c| c.set_gain_all(value))
}

/// Write the offset trim (C) of every channel.
#[no_mangle]
pub extern "C" fn set_offset_all(value: u16) -> u32 {
    status("set_offset_all", |c| c.set_offset_all(value))
}

/// Pulse RESET and reprogram the offset DACs.
#[no_mangle]
pub extern "C" fn reset_device() -> u32 {
    status("reset_device", |c| c.reset_device())
}

/// Switch every output to signal ground until the next load.
#[no_mangle]
pub extern "C" fn clear_outputs() -> u32 {
    status("clear_outputs", |c| c.clear_outputs())
}

/// Store a read result through `out`.
///
/// # Safety
/// `out` must be null or valid for a `u16` write.
unsafe fn read_into(
    op: &'static str,
    out: *mut u16,
    f: impl FnOnce(&mut Controller) -> Result<u16>,
) -> u32 {
    if out.is_null() {
        return NanoStatus::NullPointer.into();
    }
    match with_controller(op, f) {
        Ok(value) => {
            *out = value;
            NanoStatus::Ok.into()
        }
        Err(status) => status.into(),
    }
}

/// Read back the input code feeding one channel.
///
/// # Safety
/// `out` must be null or valid for a `u16` write.
#[no_mangle]
pub unsafe extern "C" fn read_code(channel: u8, out: *mut u16) -> u32 {
    read_into("read_code", out, |c| c.read_code(channel))
}

/// Read back the gain trim (M) of one channel.
///
/// # Safety
/// `out` must be null or valid for a `u16` write.
#[no_mangle]
pub unsafe extern "C" fn read_gain(channel: u8, out: *mut u16) -> u32 {
    read_into("read_gain", out, |c| c.read_gain(channel))
}

/// Read back the offset trim (C) of one channel.
///
/// # Safety
/// `out` must be null or valid for a `u16` write.
#[no_mangle]
pub unsafe extern "C" fn read_offset(channel: u8, out: *mut u16) -> u32 {
    read_into("read_offset", out, |c| c.read_offset(channel))
}
