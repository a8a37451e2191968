use crate::{
    error::StateError,
    mbc::{Mbc, RamAccess},
    save_state::{Snapshot, StateReader, StateWriter},
};

/// No controller: 32 KiB of ROM and optionally 8 KiB of RAM always mapped.
#[derive(Clone, Copy, Default)]
pub struct Mbc0;

impl Mbc for Mbc0 {
    fn write_register(&mut self, _: u16, _: u8) -> bool {
        false
    }

    fn rom_bank_high(&self) -> usize {
        1
    }

    fn ram_access(&self) -> RamAccess {
        RamAccess::Bank(0)
    }
}

impl Snapshot for Mbc0 {
    fn save(&self, _: &mut StateWriter) {}

    fn load(&mut self, _: &mut StateReader<'_>) -> Result<(), StateError> {
        Ok(())
    }
}
