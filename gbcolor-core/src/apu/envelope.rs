use crate::{
    error::StateError,
    save_state::{StateReader, StateWriter},
};

/// NRx2 and the volume it drives.
#[derive(Clone, Default)]
pub struct VolumeAndEnvelope {
    register: u8,
    volume: u8, // 4 bits
    is_increasing: bool,
    pace: u8, // 3 bits
    timer: u8,
}

impl VolumeAndEnvelope {
    pub fn is_dac_on(&self) -> bool {
        // https://gbdev.io/pandocs/Audio_details.html#dacs
        self.register & 0xf8 != 0
    }

    pub fn get_volume(&self) -> u8 {
        self.volume
    }

    pub fn get_register(&self) -> u8 {
        self.register
    }

    pub fn write_register(&mut self, value: u8) {
        self.register = value;
    }

    pub fn trigger(&mut self) {
        self.volume = self.register >> 4;
        self.is_increasing = self.register & 0x08 != 0;
        self.pace = self.register & 0x07;
        self.timer = if self.pace == 0 { 8 } else { self.pace };
    }

    pub fn tick(&mut self) {
        // https://gbdev.io/pandocs/Audio_Registers.html#ff12--nr12-channel-1-volume--envelope
        // A setting of 0 disables the envelope.
        if self.pace == 0 {
            return;
        }
        self.timer = self.timer.saturating_sub(1);
        if self.timer > 0 {
            return;
        }
        self.timer = self.pace;
        match (self.is_increasing, self.volume) {
            (true, 0x0f) | (false, 0) => {}
            (true, _) => self.volume += 1,
            (false, _) => self.volume -= 1,
        }
    }

    pub fn save(&self, writer: &mut StateWriter) {
        writer.bytes(&[self.register, self.volume, self.pace, self.timer]);
        writer.bool(self.is_increasing);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut fields = [0; 4];
        reader.bytes_into(&mut fields)?;
        let [register, volume, pace, timer] = fields;
        self.register = register;
        self.volume = volume & 0x0f;
        self.pace = pace & 0x07;
        self.timer = timer;
        self.is_increasing = reader.bool()?;
        Ok(())
    }
}
