//! In-process AD5370 model.
//!
//! [`SimulatedAd5370`] hands out an SPI device and control pins that all act
//! on one shared register file, so the driver can be exercised without
//! hardware. Clones share state; keep one around to inspect the outputs.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, Operation, SpiDevice};
use tracing::trace;

use crate::device::{
    Ad5370, Channel, Frame, Instruction, Pins, ReadBackAddr, Register, SpecialFunction,
    CHANNEL_COUNT,
};

/// Driver type bound to the simulator.
pub type SimulatedDriver = Ad5370<SimSpi, SimBusy, SimPin>;

struct SimState {
    reg: Register,
    dac: [u16; CHANNEL_COUNT],
    ldac_low: bool,
    clr_low: bool,
    reset_low: bool,
    busy: bool,
    ldac_pulses: usize,
    /// Value clocked out during the next frame.
    shift_out: u32,
    frame_in: [u8; 3],
    frame_out: [u8; 3],
    byte_pos: usize,
    frames: Vec<Frame>,
}

impl SimState {
    fn new() -> Self {
        let mut state = Self {
            reg: Register::default(),
            dac: [0; CHANNEL_COUNT],
            ldac_low: false,
            clr_low: false,
            reset_low: false,
            busy: false,
            ldac_pulses: 0,
            shift_out: 0,
            frame_in: [0; 3],
            frame_out: [0; 3],
            byte_pos: 0,
            frames: Vec::new(),
        };
        state.latch();
        state
    }

    fn latch(&mut self) {
        for ch in Channel::all() {
            self.dac[ch.as_usize()] = self.reg.dac_code(ch);
        }
    }

    /// Shift one byte in and return the byte shifted out.
    fn shift(&mut self, byte: u8) -> u8 {
        if self.byte_pos == 0 {
            self.frame_out = [
                (self.shift_out >> 16) as u8,
                (self.shift_out >> 8) as u8,
                self.shift_out as u8,
            ];
            self.shift_out = 0;
        }
        let out = self.frame_out[self.byte_pos];
        self.frame_in[self.byte_pos] = byte;
        self.byte_pos += 1;
        if self.byte_pos == 3 {
            self.byte_pos = 0;
            self.execute(Frame::from_bytes(self.frame_in));
        }
        out
    }

    /// SYNC went high: a partial frame is discarded.
    fn end_frame(&mut self) {
        self.byte_pos = 0;
    }

    fn execute(&mut self, frame: Frame) {
        trace!(frame = frame.raw(), "sim frame");
        self.frames.push(frame);
        match frame.decode() {
            Some(Instruction::Write {
                mode,
                address,
                data,
            }) => {
                self.reg.apply_write(mode, address, data);
                if self.ldac_low {
                    self.latch();
                }
            }
            Some(Instruction::Special {
                function: SpecialFunction::ReadBack,
                data,
            }) => {
                if let Some(addr) = ReadBackAddr::decode(data) {
                    self.shift_out = self.reg.read(addr) as u32;
                }
            }
            Some(Instruction::Special { function, data }) => {
                self.reg.apply_special(function, data);
                if self.ldac_low {
                    self.latch();
                }
            }
            None => {}
        }
    }
}

/// Shared handle to a simulated device.
#[derive(Clone)]
pub struct SimulatedAd5370 {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedAd5370 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAd5370 {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi {
            state: self.state.clone(),
        }
    }

    pub fn pins(&self) -> Pins<SimBusy, SimPin> {
        let pin = |role| SimPin {
            state: self.state.clone(),
            role,
        };
        Pins {
            busy: SimBusy {
                state: self.state.clone(),
            },
            ldac: pin(PinRole::Ldac),
            reset: pin(PinRole::Reset),
            clr: pin(PinRole::Clear),
        }
    }

    /// Build a driver wired to this simulator.
    pub fn into_driver(self, vref: f64, busy_poll_limit: u32) -> SimulatedDriver {
        Ad5370::new(self.spi(), self.pins(), vref).with_busy_poll_limit(busy_poll_limit)
    }

    /// Hold BUSY asserted (low) or release it.
    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    pub fn register(&self) -> Register {
        self.lock().reg
    }

    /// Code currently driving the channel's DAC.
    pub fn dac_code(&self, ch: Channel) -> u16 {
        self.lock().dac[ch.as_usize()]
    }

    /// `VOUT = 4·VREF·(DAC − 4·OFS)/2^16`, or 0 V while CLR is asserted.
    pub fn output_voltage(&self, ch: Channel, vref: f64) -> f64 {
        let state = self.lock();
        if state.clr_low {
            return 0.0;
        }
        let dac = state.dac[ch.as_usize()] as f64;
        let ofs = state.reg.ofs_for(ch.group()) as f64;
        4.0 * vref * (dac - 4.0 * ofs) / 65536.0
    }

    pub fn is_cleared(&self) -> bool {
        self.lock().clr_low
    }

    pub fn ldac_pulses(&self) -> usize {
        self.lock().ldac_pulses
    }

    /// Every complete frame received so far.
    pub fn frames(&self) -> Vec<Frame> {
        self.lock().frames.clone()
    }
}

/// SPI side of the simulator.
pub struct SimSpi {
    state: Arc<Mutex<SimState>>,
}

impl spi::ErrorType for SimSpi {
    type Error = Infallible;
}

impl SpiDevice for SimSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for op in operations.iter_mut() {
            match op {
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = state.shift(0);
                    }
                }
                Operation::Write(buf) => {
                    for &b in buf.iter() {
                        state.shift(b);
                    }
                }
                Operation::Transfer(read, write) => {
                    let len = read.len().max(write.len());
                    for i in 0..len {
                        let out = state.shift(write.get(i).copied().unwrap_or(0));
                        if let Some(slot) = read.get_mut(i) {
                            *slot = out;
                        }
                    }
                }
                Operation::TransferInPlace(buf) => {
                    for b in buf.iter_mut() {
                        *b = state.shift(*b);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        state.end_frame();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinRole {
    Ldac,
    Reset,
    Clear,
}

/// LDAC, RESET or CLR line of the simulator.
pub struct SimPin {
    state: Arc<Mutex<SimState>>,
    role: PinRole,
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.role {
            PinRole::Ldac => {
                if !state.ldac_low {
                    state.ldac_low = true;
                    state.ldac_pulses += 1;
                    state.latch();
                }
            }
            PinRole::Reset => state.reset_low = true,
            PinRole::Clear => state.clr_low = true,
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.role {
            PinRole::Ldac => state.ldac_low = false,
            PinRole::Reset => {
                if state.reset_low {
                    state.reg = Register::default();
                    state.latch();
                }
                state.reset_low = false;
            }
            PinRole::Clear => state.clr_low = false,
        }
        Ok(())
    }
}

/// BUSY line of the simulator.
pub struct SimBusy {
    state: Arc<Mutex<SimState>>,
}

impl digital::ErrorType for SimBusy {
    type Error = Infallible;
}

impl InputPin for SimBusy {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.state.lock().unwrap_or_else(PoisonError::into_inner).busy)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner).busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ChannelAddress, WriteMode};

    #[test]
    fn test_frames_recorded() {
        let sim = SimulatedAd5370::new();
        let mut spi = sim.spi();
        let frame = Frame::write(WriteMode::Data, ChannelAddress::AllChannels, 0x4242);
        spi.write(&frame.to_bytes()).unwrap();
        spi.write(&[0xFF]).unwrap(); // partial frame, dropped

        assert_eq!(sim.frames(), vec![frame]);
        assert_eq!(sim.register().x1_a, [0x4242; CHANNEL_COUNT]);
    }

    #[test]
    fn test_readback_on_next_frame() {
        let sim = SimulatedAd5370::new();
        let mut spi = sim.spi();

        spi.write(&Frame::read_back(ReadBackAddr::Ofs1).to_bytes())
            .unwrap();
        let mut buf = Frame::nop().to_bytes();
        spi.transfer_in_place(&mut buf).unwrap();
        assert_eq!(Frame::from_bytes(buf).data(), 0x1555);

        // Only one frame carries the response.
        let mut buf = Frame::nop().to_bytes();
        spi.transfer_in_place(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0]);
    }

    #[test]
    fn test_ldac_held_low_updates_immediately() {
        let sim = SimulatedAd5370::new();
        let mut spi = sim.spi();
        let mut pins = sim.pins();
        let ch = Channel::new(0).unwrap();

        pins.ldac.set_low().unwrap();
        spi.write(&Frame::write(WriteMode::Data, ch.into(), 0x0100).to_bytes())
            .unwrap();
        assert_eq!(sim.dac_code(ch), 0x0100);

        pins.ldac.set_high().unwrap();
        spi.write(&Frame::write(WriteMode::Data, ch.into(), 0x0200).to_bytes())
            .unwrap();
        assert_eq!(sim.dac_code(ch), 0x0100);
    }

    #[test]
    fn test_busy_pin() {
        let sim = SimulatedAd5370::new();
        let mut busy = sim.pins().busy;
        assert!(busy.is_high().unwrap());
        sim.set_busy(true);
        assert!(busy.is_low().unwrap());
    }
}
