mod mbc0;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;

use alloc::boxed::Box;

pub use mbc0::*;
pub use mbc1::*;
pub use mbc2::*;
pub use mbc3::*;
pub use mbc5::*;

use crate::save_state::Snapshot;

/// What the 0xa000-0xbfff window shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamAccess {
    Disabled,
    Bank(usize),
    Nibbles,
    Rtc,
}

// The controller only tracks bank numbers. The cartridge turns them into offsets
// because it knows how large the ROM and the RAM really are.
pub trait Mbc: CloneMbc + Snapshot {
    /// Write to 0x0000-0x7fff. Returns true if the visible banks changed.
    fn write_register(&mut self, address: u16, value: u8) -> bool;

    /// Bank visible at 0x0000-0x3fff.
    fn rom_bank_low(&self) -> usize {
        0
    }

    /// Bank visible at 0x4000-0x7fff.
    fn rom_bank_high(&self) -> usize;

    fn ram_access(&self) -> RamAccess;

    fn read_rtc(&self) -> u8 {
        0xff
    }

    fn write_rtc(&mut self, _value: u8) {}

    /// Called once per emulated frame.
    fn tick_frame(&mut self) {}

    fn rtc(&self) -> Option<RtcRegisters> {
        None
    }

    /// Returns false if there is no clock.
    fn set_rtc(&mut self, _registers: RtcRegisters) -> bool {
        false
    }

    fn rumble(&self) -> bool {
        false
    }
}

pub trait CloneMbc {
    fn clone_boxed(&self) -> Box<dyn Mbc>;
}

impl<T: Mbc + Clone + 'static> CloneMbc for T {
    fn clone_boxed(&self) -> Box<dyn Mbc> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Mbc> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

pub(crate) fn ram_enable(value: u8) -> bool {
    value & 0x0f == 0x0a
}
