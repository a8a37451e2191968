use crate::{
    error::StateError,
    registers::{HDMA1, HDMA2, HDMA3, HDMA4, HDMA5},
    save_state::{StateReader, StateWriter},
};

pub const BLOCK_SIZE: u16 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdmaRequest {
    /// Copy `blocks` blocks right now.
    General { blocks: u8 },
    /// Wait for the next HBlank.
    HorizontalBlank,
}

/// CGB VRAM DMA registers.
#[derive(Clone)]
pub struct Hdma {
    source: u16,
    destination: u16,
    // blocks left in the HBlank transfer
    remaining: u8,
    active: bool,
    status: u8,
}

impl Default for Hdma {
    fn default() -> Self {
        Self {
            source: 0,
            destination: 0x8000,
            remaining: 0,
            active: false,
            status: 0xff,
        }
    }
}

impl Hdma {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn source(&self) -> u16 {
        self.source
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            HDMA5 => self.status,
            _ => 0xff,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) -> Option<HdmaRequest> {
        match address {
            HDMA1 => self.source = (self.source & 0x00ff) | u16::from(value) << 8,
            HDMA2 => self.source = (self.source & 0xff00) | u16::from(value & 0xf0),
            HDMA3 => {
                self.destination =
                    0x8000 | (self.destination & 0x00ff) | u16::from(value & 0x1f) << 8
            }
            HDMA4 => self.destination = (self.destination & 0xff00) | u16::from(value & 0xf0),
            HDMA5 => {
                let blocks = (value & 0x7f) + 1;
                if self.active && value & 0x80 == 0 {
                    self.active = false;
                    self.status = 0x80 | (self.remaining - 1);
                    log::debug!("hblank dma cancelled, {} blocks left", self.remaining);
                    return None;
                }
                if value & 0x80 == 0 {
                    return Some(HdmaRequest::General { blocks });
                }
                self.active = true;
                self.remaining = blocks;
                self.status = blocks - 1;
                return Some(HdmaRequest::HorizontalBlank);
            }
            _ => {}
        }
        None
    }

    /// Source and destination of the next block, advancing the registers.
    pub fn next_block(&mut self) -> (u16, u16) {
        let block = (self.source, self.destination);
        self.source = self.source.wrapping_add(BLOCK_SIZE);
        self.destination = 0x8000 | (self.destination.wrapping_add(BLOCK_SIZE) & 0x1ff0);
        block
    }

    /// Bookkeeping after an HBlank block was copied.
    pub fn finish_hblank_block(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.active = false;
            self.status = 0xff;
        } else {
            self.status = self.remaining - 1;
        }
    }

    pub fn finish_general(&mut self) {
        self.status = 0xff;
    }

    pub fn save(&self, writer: &mut StateWriter) {
        writer.u16(self.source);
        writer.u16(self.destination);
        writer.u8(self.remaining);
        writer.bool(self.active);
        writer.u8(self.status);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.source = reader.u16()? & 0xfff0;
        self.destination = 0x8000 | (reader.u16()? & 0x1ff0);
        self.remaining = reader.u8()?;
        self.active = reader.bool()?;
        self.status = reader.u8()?;
        if self.active && !(1..=0x80).contains(&self.remaining) {
            return Err(StateError::InvalidValue("hdma length"));
        }
        Ok(())
    }
}
