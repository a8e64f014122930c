//! 24-bit SPI frames.
//!
//! ```text
//!  23 22 | 21 ........ 16 | 15 ............ 0
//!  mode  |    address     |       data
//! ```
//!
//! Mode 00 selects the special functions, in which case the address field
//! holds a [`SpecialFunction`] code.

use super::reg::{ChannelAddress, ReadBackAddr, SpecialFunction, WriteMode};

/// One SPI word as clocked into the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame(u32);

/// A decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Write {
        mode: WriteMode,
        address: ChannelAddress,
        data: u16,
    },
    Special {
        function: SpecialFunction,
        data: u16,
    },
}

impl Frame {
    pub fn write(mode: WriteMode, address: ChannelAddress, data: u16) -> Self {
        Self(((mode as u32) << 22) | ((address.code() as u32 & 0x3F) << 16) | data as u32)
    }

    pub fn special(function: SpecialFunction, data: u16) -> Self {
        Self(((function.code() as u32 & 0x3F) << 16) | data as u32)
    }

    /// Select a register; its value is clocked out during the next frame.
    pub fn read_back(addr: ReadBackAddr) -> Self {
        Self::special(SpecialFunction::ReadBack, addr.into())
    }

    pub fn nop() -> Self {
        Self(0)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Payload bits 15:0. For a readback response this is the register value.
    #[inline]
    pub fn data(self) -> u16 {
        self.0 as u16
    }

    /// `None` for reserved addresses, which the device ignores.
    pub fn decode(self) -> Option<Instruction> {
        let mode = ((self.0 >> 22) & 0b11) as u8;
        let address = ((self.0 >> 16) & 0x3F) as u8;
        let data = self.data();
        match WriteMode::from_bits(mode) {
            Some(mode) => ChannelAddress::decode(address)
                .map(|address| Instruction::Write { mode, address, data }),
            None => SpecialFunction::decode(address)
                .map(|function| Instruction::Special { function, data }),
        }
    }
}

impl From<Frame> for [u8; 3] {
    fn from(frame: Frame) -> Self {
        frame.to_bytes()
    }
}

#[allow(clippy::unusual_byte_groupings)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::reg::{Channel, Group};

    #[test]
    fn test_write_frames() {
        let data = Frame::write(
            WriteMode::Data,
            ChannelAddress::IndexInAllGroups { index: 5 },
            0xA5A5,
        )
        .to_bytes();
        assert_eq!([0b11_110101, 0xA5, 0xA5], data);

        let ch = Channel::from_parts(3, 7).unwrap();
        let data = Frame::write(WriteMode::Offset, ChannelAddress::Single(ch), 0xA5A5).to_bytes();
        assert_eq!([0b10_100111, 0xA5, 0xA5], data);
    }

    #[test]
    fn test_read_back_frames() {
        let ch = Channel::from_parts(4, 7).unwrap();
        let data = Frame::read_back(ReadBackAddr::Gain(ch)).to_bytes();
        assert_eq!([0b00_000101, 0b011_10111, 0b1000_0000], data);

        let group = Group::new(3).unwrap();
        let data = Frame::read_back(ReadBackAddr::Select { group }).to_bytes();
        assert_eq!([0b00_000101, 0b100_00100, 0b1000_0000], data);

        let data = Frame::read_back(ReadBackAddr::Ofs0).to_bytes();
        assert_eq!([0b00_000101, 0b100_00001, 0b0000_0000], data);

        let ch = Channel::from_parts(2, 2).unwrap();
        let data = Frame::read_back(ReadBackAddr::X1A(ch)).to_bytes();
        assert_eq!([0b00_000101, 0b000_01101, 0b0000_0000], data);
    }

    #[test]
    fn test_decode() {
        let frame = Frame::from_bytes([0b11_000000, 0x12, 0x34]);
        assert_eq!(
            frame.decode(),
            Some(Instruction::Write {
                mode: WriteMode::Data,
                address: ChannelAddress::AllChannels,
                data: 0x1234,
            })
        );

        assert_eq!(
            Frame::nop().decode(),
            Some(Instruction::Special {
                function: SpecialFunction::Nop,
                data: 0,
            })
        );

        // Special function 4 is reserved.
        assert_eq!(Frame::from_bytes([0x04, 0x00, 0x00]).decode(), None);
    }
}
