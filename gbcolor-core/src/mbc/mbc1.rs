use crate::{
    error::StateError,
    mbc::{Mbc, RamAccess, ram_enable},
    save_state::{Snapshot, StateReader, StateWriter},
};

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Mbc1 {
    ram_enabled: bool,
    // 5 bits, 0 reads as 1
    bank_low: u8,
    // 2 bits shared by the upper ROM bits and the RAM bank
    bank_high: u8,
    advanced_banking: bool,
}

impl Default for Mbc1 {
    fn default() -> Self {
        Self {
            ram_enabled: false,
            bank_low: 1,
            bank_high: 0,
            advanced_banking: false,
        }
    }
}

impl Mbc1 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mbc for Mbc1 {
    fn write_register(&mut self, address: u16, value: u8) -> bool {
        let before = *self;
        match address {
            0x0000..=0x1fff => self.ram_enabled = ram_enable(value),
            0x2000..=0x3fff => self.bank_low = (value & 0x1f).max(1),
            0x4000..=0x5fff => self.bank_high = value & 0x03,
            0x6000..=0x7fff => self.advanced_banking = value & 1 != 0,
            _ => {}
        }
        *self != before
    }

    // Small ROMs wrap the upper bits away when the cartridge resolves the bank.
    fn rom_bank_low(&self) -> usize {
        if self.advanced_banking {
            usize::from(self.bank_high) << 5
        } else {
            0
        }
    }

    fn rom_bank_high(&self) -> usize {
        usize::from(self.bank_high) << 5 | usize::from(self.bank_low)
    }

    fn ram_access(&self) -> RamAccess {
        match (self.ram_enabled, self.advanced_banking) {
            (false, _) => RamAccess::Disabled,
            (true, false) => RamAccess::Bank(0),
            (true, true) => RamAccess::Bank(usize::from(self.bank_high)),
        }
    }
}

impl Snapshot for Mbc1 {
    fn save(&self, writer: &mut StateWriter) {
        writer.bool(self.ram_enabled);
        writer.u8(self.bank_low);
        writer.u8(self.bank_high);
        writer.bool(self.advanced_banking);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enabled = reader.bool()?;
        self.bank_low = reader.u8()? & 0x1f;
        if self.bank_low == 0 {
            return Err(StateError::InvalidValue("mbc1 rom bank"));
        }
        self.bank_high = reader.u8()? & 0x03;
        self.advanced_banking = reader.bool()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_zero_maps_one() {
        let mut mbc = Mbc1::new();
        assert_eq!(1, mbc.rom_bank_high());
        mbc.write_register(0x2000, 0);
        assert_eq!(1, mbc.rom_bank_high());
        mbc.write_register(0x2000, 0x20);
        assert_eq!(1, mbc.rom_bank_high());
        mbc.write_register(0x2000, 0x05);
        assert_eq!(5, mbc.rom_bank_high());
    }

    #[test]
    fn upper_bits() {
        let mut mbc = Mbc1::new();
        assert!(mbc.write_register(0x4000, 0x02));
        mbc.write_register(0x2000, 0x03);
        assert_eq!(0x43, mbc.rom_bank_high());
        assert_eq!(0, mbc.rom_bank_low());
        mbc.write_register(0x6000, 1);
        assert_eq!(0x40, mbc.rom_bank_low());
    }

    #[test]
    fn ram_banking_needs_mode_1() {
        let mut mbc = Mbc1::new();
        assert_eq!(RamAccess::Disabled, mbc.ram_access());
        assert!(mbc.write_register(0x0000, 0x0a));
        mbc.write_register(0x4000, 0x03);
        assert_eq!(RamAccess::Bank(0), mbc.ram_access());
        mbc.write_register(0x6000, 1);
        assert_eq!(RamAccess::Bank(3), mbc.ram_access());
        assert!(!mbc.write_register(0x6000, 1));
    }
}
