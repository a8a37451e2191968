use crate::{
    apu::{envelope::VolumeAndEnvelope, length::Length},
    error::StateError,
    save_state::{StateReader, StateWriter},
};

// https://gbdev.io/pandocs/Audio_Registers.html#ff22--nr43-channel-4-frequency--randomness
// Citation: Note that divider = 0 is treated as divider = 0.5 instead.
const DIVISORS: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

#[derive(Default, Clone)]
pub struct NoiseChannel {
    length: Length<64>,
    volume_and_envelope: VolumeAndEnvelope,
    nr43: u8,
    is_enabled: bool,
    lfsr: u16, // 15 bits
    timer: u32,
}

impl NoiseChannel {
    pub fn tick_envelope(&mut self) {
        if self.is_on() {
            self.volume_and_envelope.tick();
        }
    }

    pub fn tick_length(&mut self) {
        self.is_enabled &= !self.length.tick();
    }

    pub fn write_nr41(&mut self, value: u8) {
        self.length.set_initial_timer_length(value);
    }

    pub fn read_nr41(&self) -> u8 {
        0xff
    }

    pub fn write_nr42(&mut self, value: u8) {
        self.volume_and_envelope.write_register(value);
        self.is_enabled &= self.volume_and_envelope.is_dac_on();
    }

    pub fn read_nr42(&self) -> u8 {
        self.volume_and_envelope.get_register()
    }

    pub fn write_nr43(&mut self, value: u8) {
        self.nr43 = value;
    }

    pub fn read_nr43(&self) -> u8 {
        self.nr43
    }

    pub fn write_nr44(&mut self, value: u8, clocks_length_next: bool) {
        self.is_enabled &= !self
            .length
            .set_is_enabled(value & 0x40 != 0, clocks_length_next);
        if value & 0x80 != 0 {
            self.trigger(clocks_length_next);
        }
    }

    pub fn read_nr44(&self) -> u8 {
        (u8::from(self.length.is_enabled()) << 6) | 0b1011_1111
    }

    fn trigger(&mut self, clocks_length_next: bool) {
        // according to blargg "Disabled DAC shouldn't stop other trigger effects"
        self.length.trigger(clocks_length_next);
        self.lfsr = 0x7fff;
        self.timer = self.frequency_timer();

        // according to blargg "Disabled DAC should prevent enable at trigger"
        if !self.volume_and_envelope.is_dac_on() {
            return;
        }
        self.is_enabled = true;
        self.volume_and_envelope.trigger();
    }

    pub fn is_on(&self) -> bool {
        self.is_enabled
    }

    pub fn is_dac_on(&self) -> bool {
        self.volume_and_envelope.is_dac_on()
    }

    fn get_divider(&self) -> u8 {
        self.nr43 & 0x7
    }

    fn get_shift(&self) -> u8 {
        (self.nr43 >> 4) & 0xf
    }

    fn is_short_mode(&self) -> bool {
        self.nr43 & 0x8 != 0
    }

    fn frequency_timer(&self) -> u32 {
        DIVISORS[usize::from(self.get_divider())] << self.get_shift()
    }

    fn step_lfsr(&mut self) {
        let bit = (self.lfsr ^ (self.lfsr >> 1)) & 1;
        self.lfsr = (self.lfsr >> 1) | (bit << 14);
        if self.is_short_mode() {
            self.lfsr = (self.lfsr & !(1 << 6)) | (bit << 6);
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        // shifts 14 and 15 stop the LFSR
        if !self.is_enabled || self.get_shift() >= 14 {
            return;
        }
        let mut cycles = cycles;
        while cycles > 0 {
            let step = cycles.min(self.timer);
            self.timer -= step;
            cycles -= step;
            if self.timer == 0 {
                self.timer = self.frequency_timer();
                self.step_lfsr();
            }
        }
    }

    /// Digital output, 0 to 15.
    pub fn output(&self) -> u8 {
        if !self.is_on() || self.lfsr & 1 != 0 {
            return 0;
        }
        self.volume_and_envelope.get_volume()
    }

    #[must_use]
    pub fn reset(&self, keep_length: bool) -> Self {
        Self {
            length: if keep_length {
                self.length.clone()
            } else {
                Length::default()
            },
            ..Default::default()
        }
    }

    pub fn save(&self, writer: &mut StateWriter) {
        self.length.save(writer);
        self.volume_and_envelope.save(writer);
        writer.u8(self.nr43);
        writer.bool(self.is_enabled);
        writer.u16(self.lfsr);
        writer.u32(self.timer);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.length.load(reader)?;
        self.volume_and_envelope.load(reader)?;
        self.nr43 = reader.u8()?;
        self.is_enabled = reader.bool()?;
        self.lfsr = reader.u16()? & 0x7fff;
        self.timer = reader.u32()?;
        if self.timer > 112 << 15 {
            return Err(StateError::InvalidValue("noise timer"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggered(nr43: u8) -> NoiseChannel {
        let mut channel = NoiseChannel::default();
        channel.write_nr42(0xf0);
        channel.write_nr43(nr43);
        channel.write_nr44(0x80, true);
        channel
    }

    #[test]
    fn lfsr_feedback() {
        let mut channel = triggered(0x00);
        assert_eq!(0x7fff, channel.lfsr);
        assert_eq!(0, channel.output());
        // all ones: xor is 0, so zeros shift in from bit 14
        channel.tick(8);
        assert_eq!(0x3fff, channel.lfsr);
        channel.tick(8 * 13);
        assert_eq!(0x0001, channel.lfsr);
        channel.tick(8);
        assert_eq!(0x4000, channel.lfsr);
        assert_eq!(15, channel.output());
    }

    #[test]
    fn short_mode_copies_bit_6() {
        let mut channel = triggered(0x08);
        channel.tick(8);
        assert_eq!(0x3fbf, channel.lfsr);
    }

    #[test]
    fn shift_14_freezes() {
        let mut channel = triggered(0xe0);
        channel.tick(1 << 20);
        assert_eq!(0x7fff, channel.lfsr);
    }
}
