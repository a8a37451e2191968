use crate::{
    error::StateError,
    mbc::{Mbc, RamAccess, ram_enable},
    save_state::{Snapshot, StateReader, StateWriter},
};

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Mbc2 {
    ram_enabled: bool,
    rom_bank: u8,
}

impl Default for Mbc2 {
    fn default() -> Self {
        Self {
            ram_enabled: false,
            rom_bank: 1,
        }
    }
}

impl Mbc for Mbc2 {
    fn write_register(&mut self, address: u16, value: u8) -> bool {
        if address >= 0x4000 {
            return false;
        }
        let before = *self;
        // address bit 8 picks the register
        if address & 0x100 == 0 {
            self.ram_enabled = ram_enable(value);
        } else {
            self.rom_bank = (value & 0x0f).max(1);
        }
        *self != before
    }

    fn rom_bank_high(&self) -> usize {
        usize::from(self.rom_bank)
    }

    fn ram_access(&self) -> RamAccess {
        if self.ram_enabled {
            RamAccess::Nibbles
        } else {
            RamAccess::Disabled
        }
    }
}

impl Snapshot for Mbc2 {
    fn save(&self, writer: &mut StateWriter) {
        writer.bool(self.ram_enabled);
        writer.u8(self.rom_bank);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enabled = reader.bool()?;
        self.rom_bank = reader.u8()?;
        if !(1..=0x0f).contains(&self.rom_bank) {
            return Err(StateError::InvalidValue("mbc2 rom bank"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_selected_by_address_bit_8() {
        let mut mbc = Mbc2::default();
        mbc.write_register(0x0100, 0x0a);
        assert_eq!(RamAccess::Disabled, mbc.ram_access());
        assert_eq!(10, mbc.rom_bank_high());

        mbc.write_register(0x0000, 0x0a);
        assert_eq!(RamAccess::Nibbles, mbc.ram_access());

        mbc.write_register(0x2100, 0x00);
        assert_eq!(1, mbc.rom_bank_high());
        assert!(!mbc.write_register(0x4000, 0x03));
    }
}
