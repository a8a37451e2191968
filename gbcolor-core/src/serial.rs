use crate::{
    error::StateError,
    registers::{SB, SC, SerialControl},
    save_state::{Snapshot, StateReader, StateWriter},
};

// 8192 Hz internal clock, 8 bits
const TRANSFER_CYCLES: u32 = 4096;
// CGB fast clock, 262144 Hz
const FAST_TRANSFER_CYCLES: u32 = 128;

#[derive(Clone, Default)]
pub struct Serial {
    sb: u8,
    sc: SerialControl,
    remaining: u32,
    cgb: bool,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            cgb,
            ..Default::default()
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            SB => self.sb,
            SC if self.cgb => self.sc.bits() | 0b0111_1100,
            SC => self.sc.bits() | 0b0111_1110,
            _ => 0xff,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            SB => self.sb = value,
            SC => {
                self.sc = SerialControl::from_bits_truncate(value);
                if !self.cgb {
                    self.sc.remove(SerialControl::CLOCK_SPEED);
                }
                let internal = SerialControl::TRANSFER_ENABLE | SerialControl::CLOCK_SELECT;
                self.remaining = if self.sc.contains(internal) {
                    if self.sc.contains(SerialControl::CLOCK_SPEED) {
                        FAST_TRANSFER_CYCLES
                    } else {
                        TRANSFER_CYCLES
                    }
                } else {
                    // an external clock never comes without a partner
                    0
                };
            }
            _ => {}
        }
    }

    /// Advances the transfer. The link hook trades the outgoing byte for the incoming one.
    /// Returns true when the serial interrupt must be raised.
    pub fn tick(&mut self, cycles: u32, link: &mut dyn FnMut(u8) -> u8) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(cycles);
        if self.remaining != 0 {
            return false;
        }
        self.sb = link(self.sb);
        self.sc.remove(SerialControl::TRANSFER_ENABLE);
        true
    }
}

impl Snapshot for Serial {
    fn save(&self, writer: &mut StateWriter) {
        writer.u8(self.sb);
        writer.u8(self.sc.bits());
        writer.u32(self.remaining);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.sb = reader.u8()?;
        self.sc = SerialControl::from_bits_truncate(reader.u8()?);
        self.remaining = reader.u32()?;
        Ok(())
    }
}
