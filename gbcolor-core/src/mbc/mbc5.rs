use crate::{
    error::StateError,
    mbc::{Mbc, RamAccess, ram_enable},
    save_state::{Snapshot, StateReader, StateWriter},
};

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Mbc5 {
    ram_enabled: bool,
    // 9 bits, bank 0 is valid here
    rom_bank: u16,
    // $00-$0F
    ram_bank: u8,
    has_rumble: bool,
    rumble: bool,
}

impl Mbc5 {
    pub fn new(has_rumble: bool) -> Self {
        Self {
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
            has_rumble,
            rumble: false,
        }
    }
}

impl Mbc for Mbc5 {
    fn write_register(&mut self, address: u16, value: u8) -> bool {
        let before = *self;
        match address {
            0x0000..=0x1fff => self.ram_enabled = ram_enable(value),
            0x2000..=0x2fff => self.rom_bank = (self.rom_bank & 0x100) | u16::from(value),
            0x3000..=0x3fff => self.rom_bank = (self.rom_bank & 0xff) | u16::from(value & 1) << 8,
            0x4000..=0x5fff if self.has_rumble => {
                // bit 3 drives the motor instead of selecting a bank
                self.rumble = value & 0x08 != 0;
                self.ram_bank = value & 0x07;
            }
            0x4000..=0x5fff => self.ram_bank = value & 0x0f,
            _ => {}
        }
        Self {
            rumble: before.rumble,
            ..*self
        } != before
    }

    fn rom_bank_high(&self) -> usize {
        usize::from(self.rom_bank)
    }

    fn ram_access(&self) -> RamAccess {
        if self.ram_enabled {
            RamAccess::Bank(usize::from(self.ram_bank))
        } else {
            RamAccess::Disabled
        }
    }

    fn rumble(&self) -> bool {
        self.rumble
    }
}

impl Snapshot for Mbc5 {
    fn save(&self, writer: &mut StateWriter) {
        writer.bool(self.ram_enabled);
        writer.u16(self.rom_bank);
        writer.u8(self.ram_bank);
        writer.bool(self.rumble);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enabled = reader.bool()?;
        self.rom_bank = reader.u16()?;
        self.ram_bank = reader.u8()?;
        self.rumble = reader.bool()?;
        if self.rom_bank > 0x1ff || self.ram_bank > 0x0f {
            return Err(StateError::InvalidValue("mbc5 bank"));
        }
        Ok(())
    }
}
