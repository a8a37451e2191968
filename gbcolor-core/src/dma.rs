use core::ops::Range;

use crate::{
    error::StateError,
    memory::OAM_SIZE,
    save_state::{Snapshot, StateReader, StateWriter},
};

// about conflicts
// https://github.com/Gekkio/mooneye-gb/issues/39#issuecomment-265953981

const CYCLES_PER_BYTE: u32 = 4;

/// OAM DMA: 160 bytes from `register << 8` copied one byte per M-cycle.
#[derive(Clone)]
pub struct Dma {
    register: u8,
    // offsets in OAM still to copy
    range: Range<u8>,
    cycles: u32,
}

impl Default for Dma {
    fn default() -> Self {
        Self {
            register: 0xff,
            range: 0..0,
            cycles: 0,
        }
    }
}

impl Dma {
    pub fn is_active(&self) -> bool {
        !self.range.is_empty()
    }

    pub fn register(&self) -> u8 {
        self.register
    }

    pub fn start(&mut self, register: u8) {
        self.register = register;
        self.range = 0..OAM_SIZE as u8;
        self.cycles = 0;
    }

    /// Source address of an OAM offset. Sources past 0xdfff read the echo RAM mirror.
    pub fn source(&self, offset: u8) -> u16 {
        let source = u16::from_be_bytes([self.register, offset]);
        if source >= 0xe000 {
            source - 0x2000
        } else {
            source
        }
    }

    /// Offsets to copy after `cycles` more cycles.
    pub fn advance(&mut self, cycles: u32) -> Range<u8> {
        if !self.is_active() {
            return 0..0;
        }
        self.cycles += cycles;
        let left = u32::from(self.range.end - self.range.start);
        let count = (self.cycles / CYCLES_PER_BYTE).min(left) as u8;
        self.cycles %= CYCLES_PER_BYTE;
        let start = self.range.start;
        self.range.start += count;
        start..self.range.start
    }
}

impl Snapshot for Dma {
    fn save(&self, writer: &mut StateWriter) {
        writer.u8(self.register);
        writer.u8(self.range.start);
        writer.u8(self.range.end);
        writer.u32(self.cycles);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.register = reader.u8()?;
        let start = reader.u8()?;
        let end = reader.u8()?;
        if start > end || usize::from(end) > OAM_SIZE {
            return Err(StateError::InvalidValue("oam dma range"));
        }
        self.range = start..end;
        self.cycles = reader.u32()? % CYCLES_PER_BYTE;
        Ok(())
    }
}
