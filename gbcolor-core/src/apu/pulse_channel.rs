use crate::{
    apu::{
        envelope::VolumeAndEnvelope,
        length::Length,
        sweep::{Ch1Sweep, Sweep},
    },
    error::StateError,
    save_state::{StateReader, StateWriter},
};

type Wave = [u8; 8];

// https://gbdev.io/pandocs/Audio_Registers.html#ff11--nr11-channel-1-length-timer--duty-cycle
const WAVE_00: Wave = [0, 0, 0, 0, 0, 0, 0, 1];
const WAVE_01: Wave = [1, 0, 0, 0, 0, 0, 0, 1];
const WAVE_10: Wave = [1, 0, 0, 0, 0, 1, 1, 1];
const WAVE_11: Wave = [0, 1, 1, 1, 1, 1, 1, 0];
const WAVES: [Wave; 4] = [WAVE_00, WAVE_01, WAVE_10, WAVE_11];

#[derive(Clone, Default)]
pub struct PulseChannel<S: Sweep> {
    length: Length<64>,
    duty_cycle: u8,
    volume_and_envelope: VolumeAndEnvelope,
    period_low: u8,
    period_high: u8,
    is_enabled: bool,
    sweep: S,
    timer: u16,
    duty_position: u8,
}

impl<S: Sweep + Default> PulseChannel<S> {
    pub fn tick_envelope(&mut self) {
        if self.is_on() {
            self.volume_and_envelope.tick();
        }
    }

    pub fn tick_length(&mut self) {
        self.is_enabled &= !self.length.tick();
    }

    pub fn get_nrx1(&self) -> u8 {
        (self.duty_cycle << 6) | 0b0011_1111
    }

    /// Length can be loaded while the APU is off on DMG, the duty cannot.
    pub fn write_nrx1(&mut self, value: u8, is_apu_on: bool) {
        if is_apu_on {
            self.duty_cycle = value >> 6;
        }
        self.length.set_initial_timer_length(value);
    }

    pub fn get_nrx2(&self) -> u8 {
        self.volume_and_envelope.get_register()
    }

    pub fn write_nrx2(&mut self, value: u8) {
        self.volume_and_envelope.write_register(value);
        self.is_enabled &= self.volume_and_envelope.is_dac_on();
    }

    pub fn get_nrx3(&self) -> u8 {
        0xff
    }

    pub fn write_nrx3(&mut self, value: u8) {
        self.period_low = value;
    }

    pub fn get_nrx4(&self) -> u8 {
        (u8::from(self.length.is_enabled()) << 6) | 0b1011_1111
    }

    pub fn write_nrx4(&mut self, value: u8, clocks_length_next: bool) {
        self.is_enabled &= !self
            .length
            .set_is_enabled(value & 0x40 != 0, clocks_length_next);

        self.period_high = value & 0x07;
        if value & 0x80 != 0 {
            self.trigger(clocks_length_next);
        }
    }

    fn trigger(&mut self, clocks_length_next: bool) {
        // according to blargg "Disabled DAC shouldn't stop other trigger effects"
        self.length.trigger(clocks_length_next);
        self.timer = (self.frequency_timer() & !3) | (self.timer & 3);

        // according to blargg "Disabled DAC should prevent enable at trigger"
        if !self.volume_and_envelope.is_dac_on() {
            return;
        }

        self.volume_and_envelope.trigger();
        self.is_enabled = self.sweep.trigger(self.get_period_value());
    }

    pub fn is_on(&self) -> bool {
        self.is_enabled
    }

    pub fn tick_sweep(&mut self) {
        if !self.is_on() {
            return;
        }
        let (is_enabled_from_sweep, new_period) = self.sweep.tick();
        if let Some(period) = new_period {
            self.set_period_value(period);
        }
        self.is_enabled = is_enabled_from_sweep;
    }

    // 11 bits
    pub fn get_period_value(&self) -> u16 {
        u16::from_be_bytes([self.period_high & 0x07, self.period_low])
    }

    fn set_period_value(&mut self, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.period_low = low;
        self.period_high = high & 0x07;
    }

    fn frequency_timer(&self) -> u16 {
        (2048 - self.get_period_value()) * 4
    }

    pub fn tick(&mut self, cycles: u32) {
        let mut cycles = cycles;
        while cycles > 0 {
            let step = cycles.min(u32::from(self.timer));
            self.timer -= step as u16;
            cycles -= step;
            if self.timer == 0 {
                self.timer = self.frequency_timer();
                self.duty_position = (self.duty_position + 1) & 7;
            }
        }
    }

    /// Digital output, 0 to 15.
    pub fn output(&self) -> u8 {
        if !self.is_on() {
            return 0;
        }
        WAVES[usize::from(self.duty_cycle)][usize::from(self.duty_position)]
            * self.volume_and_envelope.get_volume()
    }

    pub fn is_dac_on(&self) -> bool {
        self.volume_and_envelope.is_dac_on()
    }

    /// State after the APU is switched off.
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
        self.sweep.save(writer);
        writer.bytes(&[
            self.duty_cycle,
            self.period_low,
            self.period_high,
            self.duty_position,
        ]);
        writer.bool(self.is_enabled);
        writer.u16(self.timer);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.length.load(reader)?;
        self.volume_and_envelope.load(reader)?;
        self.sweep.load(reader)?;
        let mut fields = [0; 4];
        reader.bytes_into(&mut fields)?;
        let [duty_cycle, period_low, period_high, duty_position] = fields;
        self.duty_cycle = duty_cycle & 0b11;
        self.period_low = period_low;
        self.period_high = period_high & 0x07;
        self.duty_position = duty_position & 7;
        self.is_enabled = reader.bool()?;
        self.timer = reader.u16()?;
        if self.timer > 2048 * 4 {
            return Err(StateError::InvalidValue("pulse timer"));
        }
        Ok(())
    }
}

impl PulseChannel<Ch1Sweep> {
    pub fn get_nr10(&self) -> u8 {
        self.sweep.get_nr10() | 0x80
    }

    pub fn write_nr10(&mut self, value: u8) {
        self.sweep.set_nr10(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggered(duty: u8, period: u16) -> PulseChannel<()> {
        let mut channel = PulseChannel::<()>::default();
        channel.write_nrx1(duty << 6, true);
        channel.write_nrx2(0xf0);
        channel.write_nrx3(period as u8);
        channel.write_nrx4(0x80 | (period >> 8) as u8, true);
        channel
    }

    #[test]
    fn duty_12_5_percent() {
        let period = 0x7ff; // 4 cycles per step
        let mut channel = triggered(0, period);
        let mut high = 0;
        for _ in 0..8 {
            channel.tick(4);
            if channel.output() != 0 {
                high += 1;
            }
        }
        assert_eq!(1, high);
    }

    #[test]
    fn dac_off_disables() {
        let mut channel = triggered(2, 0x700);
        assert!(channel.is_on());
        channel.write_nrx2(0x00);
        assert!(!channel.is_on());
        assert_eq!(0, channel.output());
        channel.write_nrx4(0x80, true);
        assert!(!channel.is_on());
    }

    #[test]
    fn length_expires() {
        let mut channel = triggered(2, 0x700);
        channel.write_nrx1(62, true);
        channel.write_nrx4(0x40, true);
        channel.tick_length();
        assert!(channel.is_on());
        channel.tick_length();
        assert!(!channel.is_on());
        assert_eq!(0xff, channel.get_nrx4());
    }
}
