use crate::{
    apu::length::Length,
    error::StateError,
    save_state::{StateReader, StateWriter},
};

#[derive(Clone, Default)]
pub struct WaveChannel {
    is_enabled: bool,
    is_dac_on: bool,
    length: Length<256>,
    output_level: u8, // 2 bits
    period: u16,      // 11 bits
    ram: [u8; 16],
    timer: u16,
    position: u8, // 5 bits
    sample_buffer: u8,
}

impl WaveChannel {
    pub fn get_nr30(&self) -> u8 {
        (u8::from(self.is_dac_on) << 7) | 0b0111_1111
    }

    pub fn write_nr30(&mut self, value: u8) {
        self.is_dac_on = value & 0x80 != 0;
        self.is_enabled &= self.is_dac_on;
    }

    pub fn get_nr31(&self) -> u8 {
        0xff
    }

    pub fn write_nr31(&mut self, value: u8) {
        self.length.set_initial_timer_length(value);
    }

    pub fn get_nr32(&self) -> u8 {
        (self.output_level << 5) | 0b1001_1111
    }

    pub fn write_nr32(&mut self, value: u8) {
        self.output_level = (value >> 5) & 0b11;
    }

    pub fn get_nr33(&self) -> u8 {
        0xff
    }

    pub fn write_nr33(&mut self, value: u8) {
        self.period = self.period & 0xff00 | u16::from(value);
    }

    pub fn get_nr34(&self) -> u8 {
        (u8::from(self.length.is_enabled()) << 6) | 0b1011_1111
    }

    pub fn write_nr34(&mut self, value: u8, clocks_length_next: bool) {
        self.period = (u16::from(value & 0x07) << 8) | self.period & 0x00ff;
        self.is_enabled &= !self
            .length
            .set_is_enabled(value & 0x40 != 0, clocks_length_next);
        if value & 0x80 != 0 {
            self.trigger(clocks_length_next);
        }
    }

    fn trigger(&mut self, clocks_length_next: bool) {
        self.length.trigger(clocks_length_next);
        // first sample is delayed a bit after trigger
        self.timer = self.frequency_timer() + 6;
        self.position = 0;
        self.is_enabled = self.is_dac_on;
    }

    pub fn is_on(&self) -> bool {
        self.is_enabled
    }

    pub fn tick_length(&mut self) {
        self.is_enabled &= !self.length.tick();
    }

    fn frequency_timer(&self) -> u16 {
        (2048 - self.period) * 2
    }

    pub fn tick(&mut self, cycles: u32) {
        if !self.is_enabled {
            return;
        }
        let mut cycles = cycles;
        while cycles > 0 {
            let step = cycles.min(u32::from(self.timer));
            self.timer -= step as u16;
            cycles -= step;
            if self.timer == 0 {
                self.timer = self.frequency_timer();
                self.position = (self.position + 1) & 31;
                let byte = self.ram[usize::from(self.position / 2)];
                self.sample_buffer = if self.position % 2 == 0 {
                    byte >> 4
                } else {
                    byte & 0x0f
                };
            }
        }
    }

    /// Digital output, 0 to 15.
    pub fn output(&self) -> u8 {
        if !self.is_on() {
            return 0;
        }
        match self.output_level {
            0 => 0,
            level => self.sample_buffer >> (level - 1),
        }
    }

    pub fn is_dac_on(&self) -> bool {
        self.is_dac_on
    }

    // https://gbdev.io/pandocs/Audio_Registers.html#ff30ff3f--wave-pattern-ram
    // Citation: If the wave channel is enabled, accessing any byte from $FF30-$FF3F
    // is equivalent to accessing the current byte selected by the waveform position.
    fn ram_index(&self, index: u8) -> usize {
        if self.is_on() {
            usize::from(self.position / 2)
        } else {
            usize::from(index & 0x0f)
        }
    }

    pub fn write_ram(&mut self, index: u8, value: u8) {
        let index = self.ram_index(index);
        self.ram[index] = value;
    }

    pub fn read_ram(&self, index: u8) -> u8 {
        self.ram[self.ram_index(index)]
    }

    /// State after the APU is switched off: wave RAM survives.
    #[must_use]
    pub fn reset(&self, keep_length: bool) -> Self {
        Self {
            ram: self.ram,
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
        writer.bool(self.is_enabled);
        writer.bool(self.is_dac_on);
        writer.u8(self.output_level);
        writer.u16(self.period);
        writer.bytes(&self.ram);
        writer.u16(self.timer);
        writer.u8(self.position);
        writer.u8(self.sample_buffer);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.length.load(reader)?;
        self.is_enabled = reader.bool()?;
        self.is_dac_on = reader.bool()?;
        self.output_level = reader.u8()? & 0b11;
        self.period = reader.u16()? & 0x7ff;
        reader.bytes_into(&mut self.ram)?;
        self.timer = reader.u16()?;
        self.position = reader.u8()? & 31;
        self.sample_buffer = reader.u8()? & 0x0f;
        if self.timer > 2048 * 2 + 6 {
            return Err(StateError::InvalidValue("wave timer"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_nibbles_in_order() {
        let mut channel = WaveChannel::default();
        for index in 0..16 {
            channel.write_ram(index, 0x1e);
        }
        channel.write_nr30(0x80);
        channel.write_nr32(0x20);
        channel.write_nr33(0xff);
        channel.write_nr34(0x87, true);
        assert!(channel.is_on());
        // period 0x7ff: 2 cycles per nibble, plus the trigger delay
        channel.tick(8);
        assert_eq!(0x0e, channel.output());
        channel.tick(2);
        assert_eq!(0x01, channel.output());
        channel.write_nr32(0x60);
        assert_eq!(0x00, channel.output());
    }

    #[test]
    fn ram_follows_position_while_playing() {
        let mut channel = WaveChannel::default();
        channel.write_ram(3, 0x42);
        assert_eq!(0x42, channel.read_ram(3));
        channel.write_nr30(0x80);
        channel.write_nr34(0x80, true);
        assert_eq!(channel.read_ram(0), channel.read_ram(9));
        channel.write_nr30(0x00);
        assert!(!channel.is_on());
        assert_eq!(0x42, channel.read_ram(3));
    }
}
