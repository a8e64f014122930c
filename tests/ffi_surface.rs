//! Exercises the exported C functions through the global controller.

use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::Duration;

use nanodriver::*;

// The controller is process-wide; tests touching it run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn read(channel: u8) -> (u32, u16) {
    let mut code = 0u16;
    let status = unsafe { read_code(channel, &mut code) };
    (status, code)
}

fn trims(channel: u8) -> (u16, u16) {
    let (mut gain, mut offset) = (0u16, 0u16);
    assert_eq!(unsafe { read_gain(channel, &mut gain) }, 0);
    assert_eq!(unsafe { read_offset(channel, &mut offset) }, 0);
    (gain, offset)
}

#[test]
fn test_add() {
    assert_eq!(add(0), 0);
    assert_eq!(add(1000), 2000);
    assert_eq!(add(0xFFFF), 0xFFFE);
}

#[test]
fn test_set_voltage_and_read_back() {
    let _guard = serial();
    assert_eq!(stop(), 0);

    assert_eq!(set_voltage(7, 0x1234), 0);
    assert_eq!(read(7), (0, 0x1234));

    assert_eq!(set_code_to_all(0x4000), 0);
    assert_eq!(read(0), (0, 0x4000));
    assert_eq!(read(39), (0, 0x4000));
}

#[test]
fn test_invalid_channel() {
    let _guard = serial();
    let invalid = NanoStatus::InvalidChannel as u32;
    assert_eq!(set_voltage(40, 1), invalid);
    assert_eq!(set_voltage(u8::MAX, 1), invalid);
    assert_eq!(set_output_volts(200, 1.0), invalid);
    assert_eq!(read(40).0, invalid);
}

#[test]
fn test_set_freq_full_range() {
    let _guard = serial();
    for channel in 0..=u8::MAX {
        let expected = if channel < 40 { 0 } else { NanoStatus::InvalidChannel as u32 };
        assert_eq!(set_freq(channel, 1000), expected, "channel {channel}");
    }
    assert_eq!(set_freq(0, 0), 0);
    assert_eq!(set_freq(1, u64::MAX), 0);
}

#[test]
fn test_start_stop() {
    let _guard = serial();
    assert_eq!(start(), 0);
    assert_eq!(start(), 0);
    sleep(Duration::from_millis(20));
    assert_eq!(stop(), 0);
    assert_eq!(stop(), 0);
}

#[test]
fn test_dc_level_survives_worker() {
    let _guard = serial();
    assert_eq!(set_freq(5, 0), 0);
    assert_eq!(start(), 0);
    assert_eq!(set_voltage(5, 0x2345), 0);
    sleep(Duration::from_millis(50));
    assert_eq!(stop(), 0);
    assert_eq!(read(5), (0, 0x2345));
}

#[test]
fn test_null_out_pointer() {
    let status = unsafe { read_code(0, std::ptr::null_mut()) };
    assert_eq!(status, NanoStatus::NullPointer as u32);
}

#[test]
fn test_set_data_rejects_bad_frequency() {
    let _guard = serial();
    let invalid = NanoStatus::InvalidArgument as u32;
    assert_eq!(set_data(3, -1.0, 0x1000), invalid);
    assert_eq!(set_data(3, f64::NAN, 0x1000), invalid);
    assert_eq!(set_data(3, 49.6, 0x1000), 0);
}

#[test]
fn test_output_volts() {
    let _guard = serial();
    assert_eq!(stop(), 0);
    assert_eq!(reset_device(), 0);
    assert_eq!(set_output_volts(2, 1.0), 0);
    assert_eq!(read(2), (0, 0x6554));

    // Clearing grounds the outputs but keeps the input registers.
    assert_eq!(clear_outputs(), 0);
    assert_eq!(read(2), (0, 0x6554));
}

#[test]
fn test_trim_writes() {
    let _guard = serial();
    assert_eq!(stop(), 0);

    assert_eq!(set_gain_all(0xF000), 0);
    assert_eq!(set_offset_all(0x8100), 0);
    assert_eq!(trims(0), (0xF000, 0x8100));
    assert_eq!(trims(39), (0xF000, 0x8100));

    assert_eq!(reset_device(), 0);
    assert_eq!(trims(17), (0xFFFF, 0x8000));

    let mut value = 0u16;
    assert_eq!(
        unsafe { read_gain(40, &mut value) },
        NanoStatus::InvalidChannel as u32
    );
}
