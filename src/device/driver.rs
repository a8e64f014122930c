//! AD5370 driver over embedded-hal 1.0 traits.

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, SpiDevice};
use tracing::{debug, trace};

use super::frame::Frame;
use super::reg::{
    Channel, ChannelAddress, Group, ReadBackAddr, Register, SpecialFunction, WriteMode, OFS_MAX,
};
use crate::error::{DriverError, Result};

/// Control pins of the AD5370.
pub struct Pins<BUSY, OUT> {
    /// BUSY (active low, open drain).
    pub busy: BUSY,
    /// LDAC: a low pulse copies the input registers to the DACs.
    pub ldac: OUT,
    /// RESET: the rising edge restores power-on register values.
    pub reset: OUT,
    /// CLR (active low): outputs switch to signal ground while held.
    pub clr: OUT,
}

/// AD5370 attached to an SPI device and four control lines.
pub struct Ad5370<SPI, BUSY, OUT> {
    vref: f64,
    reg: Register,
    busy_poll_limit: u32,
    spi: SPI,
    pins: Pins<BUSY, OUT>,
}

/// Object-safe view of a DAC, stored by the controller as `Box<dyn DacDevice>`.
pub trait DacDevice: Send {
    /// Release all control lines and program the offset DACs.
    fn init(&mut self, ofs0: u16, ofs1: u16) -> Result<()>;

    /// Pulse RESET. Registers return to their power-on values.
    fn reset(&mut self) -> Result<()>;

    /// Assert CLR. The next [`DacDevice::load`] releases it.
    fn clear(&mut self) -> Result<()>;

    /// Wait for BUSY, then pulse LDAC to update the outputs.
    fn load(&mut self) -> Result<()>;

    fn set_code(&mut self, code: u16, target: ChannelAddress) -> Result<()>;

    fn set_gain(&mut self, value: u16, target: ChannelAddress) -> Result<()>;

    fn set_offset(&mut self, value: u16, target: ChannelAddress) -> Result<()>;

    fn set_ofs0(&mut self, value: u16) -> Result<()>;

    fn set_ofs1(&mut self, value: u16) -> Result<()>;

    fn set_control(&mut self, bits: u8) -> Result<()>;

    fn set_select(&mut self, group: u8, bits: u8) -> Result<()>;

    /// Read one register through the readback path.
    fn read_register(&mut self, addr: ReadBackAddr) -> Result<u16>;

    /// Shadow copy of the register file as last written or read.
    fn register(&self) -> &Register;

    fn vref(&self) -> f64;

    /// Write the input code that produces `volts` on `channel` and return it.
    fn set_voltage(&mut self, volts: f64, channel: Channel) -> Result<u16> {
        if !volts.is_finite() {
            return Err(DriverError::InvalidArgument(format!(
                "voltage must be finite, got {volts}"
            )));
        }
        let code = voltage_to_code(self.register(), self.vref(), volts, channel);
        debug!(channel = channel.id(), volts, code, "set voltage");
        self.set_code(code, ChannelAddress::Single(channel))?;
        Ok(code)
    }

    /// Refresh the shadow register file from the device.
    fn read_all(&mut self) -> Result<Register>;
}

/// Input code for `volts` on `channel` given the channel's trims.
///
/// `X = (V·2^16/(4·VREF) + 4·OFS + 2^15 − C) · 2^16/(M+1)`, clamped to 16 bits.
pub fn voltage_to_code(reg: &Register, vref: f64, volts: f64, channel: Channel) -> u16 {
    let k16 = (1u32 << 16) as f64;
    let k15 = (1u32 << 15) as f64;
    let i = channel.as_usize();
    let ofs = reg.ofs_for(channel.group()) as f64;
    let c = reg.offset[i] as f64;
    let m = reg.gain[i] as f64;

    let dac_code = volts * k16 / (4.0 * vref) + 4.0 * ofs;
    let input = (dac_code + k15 - c) * k16 / (m + 1.0);
    input.round().clamp(0.0, u16::MAX as f64) as u16
}

fn spi_error<E: spi::Error>(err: E) -> DriverError {
    DriverError::Spi(err.kind())
}

fn pin_error<E: digital::Error>(err: E) -> DriverError {
    DriverError::Pin(err.kind())
}

impl<SPI, BUSY, OUT> Ad5370<SPI, BUSY, OUT>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    OUT: OutputPin,
{
    pub fn new(spi: SPI, pins: Pins<BUSY, OUT>, vref: f64) -> Self {
        Self {
            vref,
            reg: Register::default(),
            busy_poll_limit: 1000,
            spi,
            pins,
        }
    }

    /// Number of BUSY polls before [`DacDevice::load`] gives up. 0 disables the check.
    pub fn with_busy_poll_limit(mut self, polls: u32) -> Self {
        self.busy_poll_limit = polls;
        self
    }

    fn send(&mut self, frame: Frame) -> Result<()> {
        trace!(frame = frame.raw(), "spi write");
        self.spi.write(&frame.to_bytes()).map_err(spi_error)
    }

    fn write(&mut self, mode: WriteMode, target: ChannelAddress, data: u16) -> Result<()> {
        self.send(Frame::write(mode, target, data))?;
        self.reg.apply_write(mode, target, data);
        Ok(())
    }

    fn special(&mut self, function: SpecialFunction, data: u16) -> Result<()> {
        self.send(Frame::special(function, data))?;
        self.reg.apply_special(function, data);
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<()> {
        if self.busy_poll_limit == 0 {
            return Ok(());
        }
        for _ in 0..self.busy_poll_limit {
            if self.pins.busy.is_high().map_err(pin_error)? {
                return Ok(());
            }
        }
        Err(DriverError::BusyTimeout {
            polls: self.busy_poll_limit,
        })
    }
}

impl<SPI, BUSY, OUT> DacDevice for Ad5370<SPI, BUSY, OUT>
where
    SPI: SpiDevice + Send,
    BUSY: InputPin + Send,
    OUT: OutputPin + Send,
{
    fn init(&mut self, ofs0: u16, ofs1: u16) -> Result<()> {
        self.pins.clr.set_high().map_err(pin_error)?;
        self.pins.ldac.set_high().map_err(pin_error)?;
        self.pins.reset.set_high().map_err(pin_error)?;
        self.set_ofs0(ofs0)?;
        self.set_ofs1(ofs1)?;
        debug!(ofs0, ofs1, "device initialized");
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pins.reset.set_low().map_err(pin_error)?;
        self.pins.reset.set_high().map_err(pin_error)?;
        self.reg = Register::default();
        debug!("device reset");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.pins.clr.set_low().map_err(pin_error)?;
        debug!("outputs cleared");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        self.pins.clr.set_high().map_err(pin_error)?;
        self.wait_ready()?;
        self.pins.ldac.set_low().map_err(pin_error)?;
        self.pins.ldac.set_high().map_err(pin_error)?;
        Ok(())
    }

    fn set_code(&mut self, code: u16, target: ChannelAddress) -> Result<()> {
        self.write(WriteMode::Data, target, code)
    }

    fn set_gain(&mut self, value: u16, target: ChannelAddress) -> Result<()> {
        self.write(WriteMode::Gain, target, value)
    }

    fn set_offset(&mut self, value: u16, target: ChannelAddress) -> Result<()> {
        self.write(WriteMode::Offset, target, value)
    }

    fn set_ofs0(&mut self, value: u16) -> Result<()> {
        if value > OFS_MAX {
            return Err(DriverError::InvalidArgument(format!(
                "OFS0 {value:#06X} exceeds 14 bits"
            )));
        }
        self.special(SpecialFunction::WriteOfs0, value)
    }

    fn set_ofs1(&mut self, value: u16) -> Result<()> {
        if value > OFS_MAX {
            return Err(DriverError::InvalidArgument(format!(
                "OFS1 {value:#06X} exceeds 14 bits"
            )));
        }
        self.special(SpecialFunction::WriteOfs1, value)
    }

    fn set_control(&mut self, bits: u8) -> Result<()> {
        self.special(SpecialFunction::WriteControl, (bits & 0b111) as u16)
    }

    fn set_select(&mut self, group: u8, bits: u8) -> Result<()> {
        let group = Group::new(group)?;
        self.special(SpecialFunction::WriteSelect { group }, bits as u16)
    }

    fn read_register(&mut self, addr: ReadBackAddr) -> Result<u16> {
        self.send(Frame::read_back(addr))?;
        let mut response = Frame::nop().to_bytes();
        self.spi
            .transfer_in_place(&mut response)
            .map_err(spi_error)?;
        let value = Frame::from_bytes(response).data();
        trace!(?addr, value, "read back");
        Ok(value)
    }

    fn register(&self) -> &Register {
        &self.reg
    }

    fn vref(&self) -> f64 {
        self.vref
    }

    fn read_all(&mut self) -> Result<Register> {
        let mut reg = Register::default();
        for ch in Channel::all() {
            let i = ch.as_usize();
            reg.x1_a[i] = self.read_register(ReadBackAddr::X1A(ch))?;
            reg.x1_b[i] = self.read_register(ReadBackAddr::X1B(ch))?;
            reg.offset[i] = self.read_register(ReadBackAddr::Offset(ch))?;
            reg.gain[i] = self.read_register(ReadBackAddr::Gain(ch))?;
        }
        reg.ofs0 = self.read_register(ReadBackAddr::Ofs0)? & OFS_MAX;
        reg.ofs1 = self.read_register(ReadBackAddr::Ofs1)? & OFS_MAX;
        reg.control = (self.read_register(ReadBackAddr::Control)? & 0b111) as u8;
        for group in Group::all() {
            reg.select[group.as_usize()] = self.read_register(ReadBackAddr::Select { group })? as u8;
        }
        self.reg = reg;
        debug!("register file refreshed");
        Ok(reg)
    }
}
