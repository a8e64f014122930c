//! AD5370 device model and driver.

pub mod driver;
pub mod frame;
pub mod reg;

pub use driver::{voltage_to_code, Ad5370, DacDevice, Pins};
pub use frame::{Frame, Instruction};
pub use reg::{Channel, ChannelAddress, Group, ReadBackAddr, Register, SpecialFunction, WriteMode};

/// Number of DAC outputs.
pub const CHANNEL_COUNT: usize = 40;
/// Outputs are arranged in groups sharing an offset DAC and select register.
pub const GROUP_COUNT: u8 = 5;
pub const CHANNELS_PER_GROUP: u8 = 8;
