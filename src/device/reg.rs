//! Register map and address encodings of the AD5370.

use super::{CHANNELS_PER_GROUP, CHANNEL_COUNT, GROUP_COUNT};
use crate::error::{DriverError, Result};

/// Per-channel register bank.
pub type ChannelRegisters = [u16; CHANNEL_COUNT];

/// Control register bit 2: Data writes go to X1B instead of X1A.
pub const CONTROL_AB_SELECT: u8 = 0b100;
/// Control register bit 1: thermal shutdown enabled.
pub const CONTROL_THERMAL_SHUTDOWN: u8 = 0b010;
/// Control register bit 0: soft power-down.
pub const CONTROL_POWER_DOWN: u8 = 0b001;

/// The offset DACs are 14 bits wide.
pub const OFS_MAX: u16 = 0x3FFF;

/// One of the 40 DAC outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Channel by flat id (0..40).
    pub fn new(id: u8) -> Result<Self> {
        if (id as usize) < CHANNEL_COUNT {
            Ok(Self(id))
        } else {
            Err(DriverError::InvalidChannel { channel: id })
        }
    }

    /// Channel by group (0..5) and index inside the group (0..8).
    pub fn from_parts(group: u8, index: u8) -> Result<Self> {
        if group < GROUP_COUNT && index < CHANNELS_PER_GROUP {
            Ok(Self(group * CHANNELS_PER_GROUP + index))
        } else {
            Err(DriverError::InvalidChannel {
                channel: group
                    .saturating_mul(CHANNELS_PER_GROUP)
                    .saturating_add(index),
            })
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn group(self) -> u8 {
        self.0 / CHANNELS_PER_GROUP
    }

    #[inline]
    pub fn index(self) -> u8 {
        self.0 % CHANNELS_PER_GROUP
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every channel in id order.
    pub fn all() -> impl Iterator<Item = Channel> {
        (0..CHANNEL_COUNT as u8).map(Channel)
    }

    /// Six-bit sequence number used by write and readback addressing.
    pub(crate) fn sequence(self) -> u8 {
        ((self.group() + 1) << 3) | self.index()
    }
}

/// One of the five channel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Group(u8);

impl Group {
    pub fn new(id: u8) -> Result<Self> {
        if id < GROUP_COUNT {
            Ok(Self(id))
        } else {
            Err(DriverError::InvalidArgument(format!(
                "group {id} out of range (0..{GROUP_COUNT})"
            )))
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Group> {
        (0..GROUP_COUNT).map(Group)
    }
}

/// Target of a Data/Offset/Gain write (bits 21:16 of the frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAddress {
    /// Every channel.
    AllChannels,
    /// Every channel of one group.
    Group { group: Group },
    /// A single channel.
    Single(Channel),
    /// Channel `index` in every group.
    IndexInAllGroups { index: u8 },
    /// Channel `index` in groups 1 to 4.
    IndexExceptGroup0 { index: u8 },
}

impl ChannelAddress {
    pub fn code(self) -> u8 {
        match self {
            ChannelAddress::AllChannels => 0,
            ChannelAddress::Group { group } => group.id() + 1,
            ChannelAddress::Single(ch) => ch.sequence(),
            ChannelAddress::IndexInAllGroups { index } => (6 << 3) | (index & 0b111),
            ChannelAddress::IndexExceptGroup0 { index } => (7 << 3) | (index & 0b111),
        }
    }

    /// Inverse of [`ChannelAddress::code`]; `None` for reserved addresses.
    pub fn decode(code: u8) -> Option<Self> {
        let code = code & 0x3F;
        match code {
            0 => Some(ChannelAddress::AllChannels),
            1..=5 => Some(ChannelAddress::Group {
                group: Group(code - 1),
            }),
            8..=47 => Channel::from_parts((code >> 3) - 1, code & 0b111)
                .ok()
                .map(ChannelAddress::Single),
            48..=55 => Some(ChannelAddress::IndexInAllGroups { index: code & 0b111 }),
            56..=63 => Some(ChannelAddress::IndexExceptGroup0 { index: code & 0b111 }),
            _ => None,
        }
    }

    /// Channels affected by a write to this address.
    pub fn channels(self) -> Vec<Channel> {
        match self {
            ChannelAddress::AllChannels => Channel::all().collect(),
            ChannelAddress::Group { group } => (0..CHANNELS_PER_GROUP)
                .filter_map(|index| Channel::from_parts(group.id(), index).ok())
                .collect(),
            ChannelAddress::Single(ch) => vec![ch],
            // Only the low three bits of the index reach the device.
            ChannelAddress::IndexInAllGroups { index } => (0..GROUP_COUNT)
                .filter_map(|group| Channel::from_parts(group, index & 0b111).ok())
                .collect(),
            ChannelAddress::IndexExceptGroup0 { index } => (1..GROUP_COUNT)
                .filter_map(|group| Channel::from_parts(group, index & 0b111).ok())
                .collect(),
        }
    }
}

impl From<Channel> for ChannelAddress {
    fn from(ch: Channel) -> Self {
        ChannelAddress::Single(ch)
    }
}

/// Special function addresses (mode bits 00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialFunction {
    Nop,
    WriteControl,
    WriteOfs0,
    WriteOfs1,
    ReadBack,
    /// Write F7:F0 to A/B select register of `group`.
    WriteSelect { group: Group },
    /// F7:F0 = 0 selects X2A for every channel, anything else X2B.
    WriteSelectAll,
}

impl SpecialFunction {
    pub fn code(self) -> u8 {
        match self {
            SpecialFunction::Nop => 0,
            SpecialFunction::WriteControl => 1,
            SpecialFunction::WriteOfs0 => 2,
            SpecialFunction::WriteOfs1 => 3,
            SpecialFunction::ReadBack => 5,
            SpecialFunction::WriteSelect { group } => 6 + group.id(),
            SpecialFunction::WriteSelectAll => 11,
        }
    }

    pub fn decode(code: u8) -> Option<Self> {
        match code & 0x3F {
            0 => Some(SpecialFunction::Nop),
            1 => Some(SpecialFunction::WriteControl),
            2 => Some(SpecialFunction::WriteOfs0),
            3 => Some(SpecialFunction::WriteOfs1),
            5 => Some(SpecialFunction::ReadBack),
            c @ 6..=10 => Some(SpecialFunction::WriteSelect {
                group: Group(c - 6),
            }),
            11 => Some(SpecialFunction::WriteSelectAll),
            _ => None,
        }
    }
}

/// Register selected by mode bits 23:22.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteMode {
    /// Gain trim (M).
    Gain = 1,
    /// Offset trim (C).
    Offset = 2,
    /// Input data (X1A or X1B, depending on the control register).
    Data = 3,
}

impl WriteMode {
    /// `None` for mode 00, which selects the special functions.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            1 => Some(WriteMode::Gain),
            2 => Some(WriteMode::Offset),
            3 => Some(WriteMode::Data),
            _ => None,
        }
    }
}

/// Register selected for readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBackAddr {
    X1A(Channel),
    X1B(Channel),
    Offset(Channel),
    Gain(Channel),
    Control,
    Ofs0,
    Ofs1,
    Select { group: Group },
}

impl ReadBackAddr {
    pub fn decode(word: u16) -> Option<Self> {
        let kind = word >> 13;
        let seq = ((word >> 7) & 0x3F) as u8;
        let channel = || {
            if seq < 8 {
                return None;
            }
            Channel::from_parts((seq >> 3) - 1, seq & 0b111).ok()
        };
        match kind {
            0 => channel().map(ReadBackAddr::X1A),
            1 => channel().map(ReadBackAddr::X1B),
            2 => channel().map(ReadBackAddr::Offset),
            3 => channel().map(ReadBackAddr::Gain),
            4 => match seq {
                1 => Some(ReadBackAddr::Control),
                2 => Some(ReadBackAddr::Ofs0),
                3 => Some(ReadBackAddr::Ofs1),
                6..=10 => Some(ReadBackAddr::Select {
                    group: Group(seq - 6),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<ReadBackAddr> for u16 {
    fn from(addr: ReadBackAddr) -> Self {
        let seq = |ch: Channel| (ch.sequence() as u16) << 7;
        match addr {
            ReadBackAddr::X1A(ch) => seq(ch),
            ReadBackAddr::X1B(ch) => (1 << 13) | seq(ch),
            ReadBackAddr::Offset(ch) => (2 << 13) | seq(ch),
            ReadBackAddr::Gain(ch) => (3 << 13) | seq(ch),
            ReadBackAddr::Control => (4 << 13) | (1 << 7),
            ReadBackAddr::Ofs0 => (4 << 13) | (2 << 7),
            ReadBackAddr::Ofs1 => (4 << 13) | (3 << 7),
            ReadBackAddr::Select { group } => (4 << 13) | ((group.id() as u16 + 6) << 7),
        }
    }
}

/// Register file of the AD5370.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Input data register A, one per channel.
    pub x1_a: ChannelRegisters,
    /// Input data register B, one per channel.
    pub x1_b: ChannelRegisters,
    /// Gain trim (M), one per channel.
    pub gain: ChannelRegisters,
    /// Offset trim (C), one per channel.
    pub offset: ChannelRegisters,
    /// Offset DAC for group 0.
    pub ofs0: u16,
    /// Offset DAC for groups 1 to 4.
    pub ofs1: u16,
    /// See the `CONTROL_*` bits.
    pub control: u8,
    /// One bit per channel: 0 feeds the DAC from X2A, 1 from X2B.
    pub select: [u8; GROUP_COUNT as usize],
}

impl Default for Register {
    fn default() -> Self {
        Self {
            x1_a: [0x5555; CHANNEL_COUNT],
            x1_b: [0x5555; CHANNEL_COUNT],
            gain: [0xFFFF; CHANNEL_COUNT],
            offset: [0x8000; CHANNEL_COUNT],
            ofs0: 0x1555,
            ofs1: 0x1555,
            control: 0x00,
            select: [0; GROUP_COUNT as usize],
        }
    }
}

impl Register {
    /// Apply a Data/Offset/Gain write.
    pub fn apply_write(&mut self, mode: WriteMode, address: ChannelAddress, data: u16) {
        let bank = match mode {
            WriteMode::Data if self.control & CONTROL_AB_SELECT != 0 => &mut self.x1_b,
            WriteMode::Data => &mut self.x1_a,
            WriteMode::Offset => &mut self.offset,
            WriteMode::Gain => &mut self.gain,
        };
        for ch in address.channels() {
            bank[ch.as_usize()] = data;
        }
    }

    /// Apply a special function write. Readback and NOP leave the file untouched.
    pub fn apply_special(&mut self, function: SpecialFunction, data: u16) {
        match function {
            SpecialFunction::WriteControl => self.control = (data & 0b111) as u8,
            SpecialFunction::WriteOfs0 => self.ofs0 = data & OFS_MAX,
            SpecialFunction::WriteOfs1 => self.ofs1 = data & OFS_MAX,
            SpecialFunction::WriteSelect { group } => self.select[group.as_usize()] = data as u8,
            SpecialFunction::WriteSelectAll => {
                let fill = if data & 0xFF == 0 { 0x00 } else { 0xFF };
                self.select = [fill; GROUP_COUNT as usize];
            }
            SpecialFunction::Nop | SpecialFunction::ReadBack => {}
        }
    }

    pub fn read(&self, addr: ReadBackAddr) -> u16 {
        match addr {
            ReadBackAddr::X1A(ch) => self.x1_a[ch.as_usize()],
            ReadBackAddr::X1B(ch) => self.x1_b[ch.as_usize()],
            ReadBackAddr::Offset(ch) => self.offset[ch.as_usize()],
            ReadBackAddr::Gain(ch) => self.gain[ch.as_usize()],
            ReadBackAddr::Control => self.control as u16,
            ReadBackAddr::Ofs0 => self.ofs0,
            ReadBackAddr::Ofs1 => self.ofs1,
            ReadBackAddr::Select { group } => self.select[group.as_usize()] as u16,
        }
    }

    /// Offset DAC value applying to `group`.
    #[inline]
    pub fn ofs_for(&self, group: u8) -> u16 {
        if group == 0 {
            self.ofs0
        } else {
            self.ofs1
        }
    }

    /// Whether the channel takes its data from X2B.
    pub fn uses_b(&self, ch: Channel) -> bool {
        (self.select[ch.group() as usize] >> ch.index()) & 1 == 1
    }

    /// Input register feeding the channel's DAC.
    pub fn active_input(&self, ch: Channel) -> u16 {
        if self.uses_b(ch) {
            self.x1_b[ch.as_usize()]
        } else {
            self.x1_a[ch.as_usize()]
        }
    }

    /// Readback address of the register [`Register::active_input`] reads.
    pub fn active_input_addr(&self, ch: Channel) -> ReadBackAddr {
        if self.uses_b(ch) {
            ReadBackAddr::X1B(ch)
        } else {
            ReadBackAddr::X1A(ch)
        }
    }

    /// DAC code after gain and offset trim: `X·(M+1)/2^16 + C − 2^15`.
    pub fn dac_code(&self, ch: Channel) -> u16 {
        let i = ch.as_usize();
        let x = self.active_input(ch) as i64;
        let m = self.gain[i] as i64;
        let c = self.offset[i] as i64;
        let code = ((x * (m + 1)) >> 16) + c - (1 << 15);
        code.clamp(0, u16::MAX as i64) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(id: u8) -> Group {
        Group::new(id).unwrap()
    }

    #[test]
    fn test_channel_parts() {
        let ch = Channel::new(27).unwrap();
        assert_eq!(ch.group(), 3);
        assert_eq!(ch.index(), 3);
        assert_eq!(Channel::from_parts(3, 3).unwrap(), ch);

        assert!(matches!(
            Channel::new(40),
            Err(DriverError::InvalidChannel { channel: 40 })
        ));
        assert!(Channel::from_parts(5, 0).is_err());
        assert!(Channel::from_parts(0, 8).is_err());
    }

    #[test]
    fn test_address_codes() {
        assert_eq!(ChannelAddress::AllChannels.code(), 0);
        assert_eq!(ChannelAddress::Group { group: g(4) }.code(), 5);
        let ch = Channel::from_parts(3, 7).unwrap();
        assert_eq!(ChannelAddress::Single(ch).code(), 0b100_111);
        assert_eq!(ChannelAddress::IndexInAllGroups { index: 5 }.code(), 0b110_101);
        assert_eq!(ChannelAddress::IndexExceptGroup0 { index: 2 }.code(), 0b111_010);

        for code in 0..64u8 {
            if let Some(addr) = ChannelAddress::decode(code) {
                assert_eq!(addr.code(), code);
            }
        }
        assert_eq!(ChannelAddress::decode(6), None);
    }

    #[test]
    fn test_address_channels() {
        assert_eq!(ChannelAddress::AllChannels.channels().len(), CHANNEL_COUNT);

        let group = ChannelAddress::Group { group: g(2) }.channels();
        assert_eq!(group.len(), 8);
        assert!(group.iter().all(|ch| ch.group() == 2));

        let column = ChannelAddress::IndexExceptGroup0 { index: 1 }.channels();
        let ids: Vec<u8> = column.iter().map(|ch| ch.id()).collect();
        assert_eq!(ids, vec![9, 17, 25, 33]);
    }

    #[test]
    fn test_data_write_follows_ab_select() {
        let mut reg = Register::default();
        let ch = Channel::new(10).unwrap();

        reg.apply_write(WriteMode::Data, ch.into(), 0x1234);
        assert_eq!(reg.x1_a[10], 0x1234);
        assert_eq!(reg.x1_b[10], 0x5555);

        reg.apply_special(SpecialFunction::WriteControl, CONTROL_AB_SELECT as u16);
        reg.apply_write(WriteMode::Data, ch.into(), 0x4321);
        assert_eq!(reg.x1_a[10], 0x1234);
        assert_eq!(reg.x1_b[10], 0x4321);

        // DAC still fed from X2A until the select bit is set.
        assert_eq!(reg.active_input(ch), 0x1234);
        reg.apply_special(SpecialFunction::WriteSelect { group: g(1) }, 0b0000_0100);
        assert_eq!(reg.active_input(ch), 0x4321);
        assert_eq!(reg.active_input_addr(ch), ReadBackAddr::X1B(ch));
    }

    #[test]
    fn test_ofs_is_fourteen_bits() {
        let mut reg = Register::default();
        reg.apply_special(SpecialFunction::WriteOfs1, 0xFFFF);
        assert_eq!(reg.ofs1, OFS_MAX);
        assert_eq!(reg.ofs_for(0), 0x1555);
        assert_eq!(reg.ofs_for(3), OFS_MAX);
    }

    #[test]
    fn test_dac_code_at_defaults() {
        let reg = Register::default();
        let ch = Channel::new(0).unwrap();
        // M = 0xFFFF, C = 0x8000 leave the input code unchanged.
        assert_eq!(reg.dac_code(ch), 0x5555);

        let mut reg = reg;
        reg.offset[0] = 0;
        reg.x1_a[0] = 0;
        assert_eq!(reg.dac_code(ch), 0);
    }

    #[test]
    fn test_readback_decode() {
        let ch = Channel::from_parts(4, 7).unwrap();
        for addr in [
            ReadBackAddr::X1A(ch),
            ReadBackAddr::X1B(ch),
            ReadBackAddr::Offset(ch),
            ReadBackAddr::Gain(ch),
            ReadBackAddr::Control,
            ReadBackAddr::Ofs0,
            ReadBackAddr::Ofs1,
            ReadBackAddr::Select { group: g(3) },
        ] {
            assert_eq!(ReadBackAddr::decode(addr.into()), Some(addr));
        }
        assert_eq!(ReadBackAddr::decode(5 << 13), None);
    }

    #[test]
    fn test_group_range() {
        assert_eq!(Group::all().count(), GROUP_COUNT as usize);
        assert!(matches!(Group::new(5), Err(DriverError::InvalidArgument(_))));
        assert!(Group::new(255).is_err());

        // Every encodable group address covers exactly the channels it decodes to.
        for group in Group::all() {
            let addr = ChannelAddress::Group { group };
            assert_eq!(ChannelAddress::decode(addr.code()), Some(addr));
            assert_eq!(addr.channels().len(), CHANNELS_PER_GROUP as usize);
        }
    }

    #[test]
    fn test_index_address_masks_like_device() {
        let wide = ChannelAddress::IndexInAllGroups { index: 9 };
        let decoded = ChannelAddress::decode(wide.code()).unwrap();
        assert_eq!(decoded, ChannelAddress::IndexInAllGroups { index: 1 });
        assert_eq!(wide.channels(), decoded.channels());
    }

    #[test]
    fn test_select_codes() {
        assert_eq!(SpecialFunction::WriteSelect { group: g(0) }.code(), 6);
        assert_eq!(SpecialFunction::WriteSelect { group: g(4) }.code(), 10);
        assert_eq!(SpecialFunction::decode(11), Some(SpecialFunction::WriteSelectAll));

        let mut reg = Register::default();
        reg.apply_special(SpecialFunction::WriteSelect { group: g(4) }, 0xA5);
        assert_eq!(reg.read(ReadBackAddr::Select { group: g(4) }), 0xA5);
    }
}
