use arrayvec::ArrayVec;

use crate::{
    CLOCK_RATE,
    apu::{
        noise_channel::NoiseChannel, pulse_channel::PulseChannel, sweep::Ch1Sweep,
        wave_channel::WaveChannel,
    },
    error::StateError,
    registers::*,
    save_state::{Snapshot, StateReader, StateWriter},
};

mod envelope;
mod length;
mod noise_channel;
mod pulse_channel;
mod sweep;
mod wave_channel;

/// Samples handed to the audio callback at once.
pub const SAMPLE_BUFFER_LEN: usize = 512;
// https://gbdev.io/pandocs/Audio_details.html#div-apu
const FRAME_SEQUENCER_PERIOD: u32 = 8192;
// 4 channels of ±15, master volume up to 8
const SAMPLE_SCALE: i32 = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StereoSample {
    pub left: i16,
    pub right: i16,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq)]
    pub struct Nr52: u8 {
        const AUDIO_ON_OFF = 1 << 7;
        const CH4_ON = 1 << 3;
        const CH3_ON = 1 << 2;
        const CH2_ON = 1 << 1;
        const CH1_ON = 1;
    }
}

// Sound panning
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq, Default)]
    pub struct Nr51: u8 {
        const CH4_LEFT = 1 << 7;
        const CH3_LEFT = 1 << 6;
        const CH2_LEFT = 1 << 5;
        const CH1_LEFT = 1 << 4;
        const CH4_RIGHT = 1 << 3;
        const CH3_RIGHT = 1 << 2;
        const CH2_RIGHT = 1 << 1;
        const CH1_RIGHT = 1;
    }
}

// Master volume & VIN panning
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq, Default)]
    pub struct Nr50: u8 {
        const VIN_LEFT = 1 << 7;
        const LEFT_VOLUME_MASK = 0b01110000;
        const VIN_RIGHT = 1 << 3;
        const RIGHT_VOLUME_MASK = 0b00000111;
    }
}

#[derive(Clone)]
pub struct Apu {
    is_on: bool,
    nr51: Nr51,
    nr50: Nr50,
    pub ch1: PulseChannel<Ch1Sweep>,
    pub ch2: PulseChannel<()>,
    pub ch3: WaveChannel,
    pub ch4: NoiseChannel,
    sequencer_cycles: u32,
    // 0..8, the step run when `sequencer_cycles` reaches the period
    next_step: u8,
    sample_rate: u32,
    // cycles × sample rate, a sample is due each time it passes CLOCK_RATE
    sample_accumulator: u32,
    samples: ArrayVec<StereoSample, SAMPLE_BUFFER_LEN>,
    cgb: bool,
}

impl Apu {
    pub fn new(sample_rate: u32, cgb: bool) -> Self {
        Self {
            is_on: false,
            nr51: Nr51::empty(),
            nr50: Nr50::empty(),
            ch1: PulseChannel::default(),
            ch2: PulseChannel::default(),
            ch3: WaveChannel::default(),
            ch4: NoiseChannel::default(),
            sequencer_cycles: 0,
            next_step: 0,
            // keeps the per-sample cycle count above zero
            sample_rate: sample_rate.min(CLOCK_RATE),
            sample_accumulator: 0,
            samples: ArrayVec::new(),
            cgb,
        }
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Next frame sequencer step, 0 to 7.
    pub fn frame_step(&self) -> u8 {
        self.next_step
    }

    fn clocks_length_next(&self) -> bool {
        self.next_step.is_multiple_of(2)
    }

    pub fn get_nr52(&self) -> u8 {
        let mut flags = Nr52::empty();
        flags.set(Nr52::AUDIO_ON_OFF, self.is_on);
        flags.set(Nr52::CH4_ON, self.ch4.is_on());
        flags.set(Nr52::CH3_ON, self.ch3.is_on());
        flags.set(Nr52::CH2_ON, self.ch2.is_on());
        flags.set(Nr52::CH1_ON, self.ch1.is_on());
        flags.bits() | 0b0111_0000
    }

    pub fn write_nr52(&mut self, value: u8) {
        let is_on = Nr52::from_bits_retain(value).contains(Nr52::AUDIO_ON_OFF);
        if self.is_on == is_on {
            return;
        }
        self.is_on = is_on;
        log::info!("APU {}", if is_on { "on" } else { "off" });
        if self.is_on {
            self.sequencer_cycles = 0;
            self.next_step = 0;
        } else {
            // DMG length counters survive power off
            let keep_length = !self.cgb;
            self.ch1 = self.ch1.reset(keep_length);
            self.ch2 = self.ch2.reset(keep_length);
            self.ch3 = self.ch3.reset(keep_length);
            self.ch4 = self.ch4.reset(keep_length);
            self.nr50 = Nr50::empty();
            self.nr51 = Nr51::empty();
        }
    }

    /// PCM12 (`high` false) or PCM34: current digital output of two channels.
    pub fn pcm(&self, high: bool) -> u8 {
        if high {
            self.ch3.output() | (self.ch4.output() << 4)
        } else {
            self.ch1.output() | (self.ch2.output() << 4)
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            CH1_SWEEP => self.ch1.get_nr10(),
            CH1_LENGTH_TIMER_AND_DUTY_CYCLE => self.ch1.get_nrx1(),
            CH1_VOLUME_AND_ENVELOPE => self.ch1.get_nrx2(),
            CH1_PERIOD_LOW => self.ch1.get_nrx3(),
            CH1_PERIOD_HIGH_AND_CONTROL => self.ch1.get_nrx4(),
            CH2_LENGTH_TIMER_AND_DUTY_CYCLE => self.ch2.get_nrx1(),
            CH2_VOLUME_AND_ENVELOPE => self.ch2.get_nrx2(),
            CH2_PERIOD_LOW => self.ch2.get_nrx3(),
            CH2_PERIOD_HIGH_AND_CONTROL => self.ch2.get_nrx4(),
            CH3_DAC_ENABLE => self.ch3.get_nr30(),
            CH3_LENGTH_TIMER => self.ch3.get_nr31(),
            CH3_OUTPUT_LEVEL => self.ch3.get_nr32(),
            CH3_PERIOD_LOW => self.ch3.get_nr33(),
            CH3_PERIOD_HIGH_AND_CONTROL => self.ch3.get_nr34(),
            CH4_LENGTH_TIMER => self.ch4.read_nr41(),
            CH4_VOLUME_AND_ENVELOPE => self.ch4.read_nr42(),
            CH4_FREQUENCY_AND_RANDOMNESS => self.ch4.read_nr43(),
            CH4_CONTROL => self.ch4.read_nr44(),
            MASTER_VOLUME_AND_VIN_PANNING => self.nr50.bits(),
            SOUND_PANNING => self.nr51.bits(),
            AUDIO_MASTER_CONTROL => self.get_nr52(),
            WAVE..LCD_CONTROL => self.ch3.read_ram((address - WAVE) as u8),
            _ => 0xff,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        if !self.is_on && (CH1_SWEEP..AUDIO_MASTER_CONTROL).contains(&address) {
            // DMG still accepts length loads while off
            if !self.cgb {
                match address {
                    CH1_LENGTH_TIMER_AND_DUTY_CYCLE => self.ch1.write_nrx1(value, false),
                    CH2_LENGTH_TIMER_AND_DUTY_CYCLE => self.ch2.write_nrx1(value, false),
                    CH3_LENGTH_TIMER => self.ch3.write_nr31(value),
                    CH4_LENGTH_TIMER => self.ch4.write_nr41(value),
                    _ => {}
                }
            }
            return;
        }

        let clocks_next = self.clocks_length_next();
        match address {
            CH1_SWEEP => self.ch1.write_nr10(value),
            CH1_LENGTH_TIMER_AND_DUTY_CYCLE => self.ch1.write_nrx1(value, true),
            CH1_VOLUME_AND_ENVELOPE => self.ch1.write_nrx2(value),
            CH1_PERIOD_LOW => self.ch1.write_nrx3(value),
            CH1_PERIOD_HIGH_AND_CONTROL => self.ch1.write_nrx4(value, clocks_next),
            CH2_LENGTH_TIMER_AND_DUTY_CYCLE => self.ch2.write_nrx1(value, true),
            CH2_VOLUME_AND_ENVELOPE => self.ch2.write_nrx2(value),
            CH2_PERIOD_LOW => self.ch2.write_nrx3(value),
            CH2_PERIOD_HIGH_AND_CONTROL => self.ch2.write_nrx4(value, clocks_next),
            CH3_DAC_ENABLE => self.ch3.write_nr30(value),
            CH3_LENGTH_TIMER => self.ch3.write_nr31(value),
            CH3_OUTPUT_LEVEL => self.ch3.write_nr32(value),
            CH3_PERIOD_LOW => self.ch3.write_nr33(value),
            CH3_PERIOD_HIGH_AND_CONTROL => self.ch3.write_nr34(value, clocks_next),
            CH4_LENGTH_TIMER => self.ch4.write_nr41(value),
            CH4_VOLUME_AND_ENVELOPE => self.ch4.write_nr42(value),
            CH4_FREQUENCY_AND_RANDOMNESS => self.ch4.write_nr43(value),
            CH4_CONTROL => self.ch4.write_nr44(value, clocks_next),
            MASTER_VOLUME_AND_VIN_PANNING => self.nr50 = Nr50::from_bits_retain(value),
            SOUND_PANNING => self.nr51 = Nr51::from_bits_retain(value),
            AUDIO_MASTER_CONTROL => self.write_nr52(value),
            WAVE..LCD_CONTROL => self.ch3.write_ram((address - WAVE) as u8, value),
            _ => {}
        }
    }

    fn step_frame_sequencer(&mut self) {
        let step = self.next_step;
        if step.is_multiple_of(2) {
            self.ch1.tick_length();
            self.ch2.tick_length();
            self.ch3.tick_length();
            self.ch4.tick_length();
        }
        if step == 2 || step == 6 {
            self.ch1.tick_sweep();
        }
        if step == 7 {
            self.ch1.tick_envelope();
            self.ch2.tick_envelope();
            self.ch4.tick_envelope();
        }
        self.next_step = (step + 1) & 7;
    }

    fn advance_channels(&mut self, cycles: u32) {
        if !self.is_on {
            return;
        }
        self.ch1.tick(cycles);
        self.ch2.tick(cycles);
        self.ch3.tick(cycles);
        self.ch4.tick(cycles);
        self.sequencer_cycles += cycles;
        if self.sequencer_cycles >= FRAME_SEQUENCER_PERIOD {
            self.sequencer_cycles -= FRAME_SEQUENCER_PERIOD;
            self.step_frame_sequencer();
        }
    }

    fn mix(&self) -> StereoSample {
        if !self.is_on {
            return StereoSample::default();
        }
        // a DAC turns 0..15 into -15..15; a disabled channel is muted
        let analog = |on: bool, dac: bool, output: u8| {
            if on && dac {
                i32::from(output) * 2 - 15
            } else {
                0
            }
        };
        let channels = [
            analog(self.ch1.is_on(), self.ch1.is_dac_on(), self.ch1.output()),
            analog(self.ch2.is_on(), self.ch2.is_dac_on(), self.ch2.output()),
            analog(self.ch3.is_on(), self.ch3.is_dac_on(), self.ch3.output()),
            analog(self.ch4.is_on(), self.ch4.is_dac_on(), self.ch4.output()),
        ];
        let side = |shift: u32, volume: u8| {
            let sum: i32 = channels
                .iter()
                .enumerate()
                .filter(|(index, _)| self.nr51.bits() & (1 << (*index as u32 + shift)) != 0)
                .map(|(_, value)| *value)
                .sum();
            (sum * (i32::from(volume) + 1) * SAMPLE_SCALE) as i16
        };
        StereoSample {
            left: side(4, (self.nr50.bits() >> 4) & 7),
            right: side(0, self.nr50.bits() & 7),
        }
    }

    /// Runs the channels for `cycles` and emits the samples due in that time.
    pub fn tick(&mut self, cycles: u32, audio: &mut dyn FnMut(&[StereoSample])) {
        let mut cycles = cycles;
        while cycles > 0 {
            let mut step = cycles;
            if self.is_on {
                step = step.min(FRAME_SEQUENCER_PERIOD - self.sequencer_cycles);
            }
            if self.sample_rate != 0 {
                let missing = CLOCK_RATE - self.sample_accumulator;
                step = step.min(missing.div_ceil(self.sample_rate));
            }
            self.advance_channels(step);
            cycles -= step;

            if self.sample_rate == 0 {
                continue;
            }
            self.sample_accumulator += step * self.sample_rate;
            if self.sample_accumulator >= CLOCK_RATE {
                self.sample_accumulator -= CLOCK_RATE;
                // the buffer is flushed as soon as it fills, so there is always room here
                self.samples.push(self.mix());
                if self.samples.is_full() {
                    audio(&self.samples);
                    self.samples.clear();
                }
            }
        }
    }

    /// Samples not yet handed to the callback.
    pub fn pending_samples(&self) -> &[StereoSample] {
        &self.samples
    }
}

impl Snapshot for Apu {
    fn save(&self, writer: &mut StateWriter) {
        writer.bool(self.is_on);
        writer.u8(self.nr50.bits());
        writer.u8(self.nr51.bits());
        self.ch1.save(writer);
        self.ch2.save(writer);
        self.ch3.save(writer);
        self.ch4.save(writer);
        writer.u32(self.sequencer_cycles);
        writer.u8(self.next_step);
        writer.u32(self.sample_accumulator);
        // every slot is written so the state size does not depend on the fill level
        writer.u16(self.samples.len() as u16);
        for index in 0..SAMPLE_BUFFER_LEN {
            let sample = self.samples.get(index).copied().unwrap_or_default();
            writer.i16(sample.left);
            writer.i16(sample.right);
        }
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.is_on = reader.bool()?;
        self.nr50 = Nr50::from_bits_retain(reader.u8()?);
        self.nr51 = Nr51::from_bits_retain(reader.u8()?);
        self.ch1.load(reader)?;
        self.ch2.load(reader)?;
        self.ch3.load(reader)?;
        self.ch4.load(reader)?;
        self.sequencer_cycles = reader.u32()?;
        self.next_step = reader.u8()?;
        self.sample_accumulator = reader.u32()?;
        if self.sequencer_cycles >= FRAME_SEQUENCER_PERIOD
            || self.next_step > 7
            || self.sample_accumulator >= CLOCK_RATE
        {
            return Err(StateError::InvalidValue("apu timing"));
        }
        let len = usize::from(reader.u16()?);
        if len >= SAMPLE_BUFFER_LEN {
            return Err(StateError::InvalidValue("sample buffer length"));
        }
        self.samples.clear();
        for index in 0..SAMPLE_BUFFER_LEN {
            let left = reader.i16()?;
            let right = reader.i16()?;
            if index < len {
                self.samples.push(StereoSample { left, right });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn powered(sample_rate: u32) -> Apu {
        let mut apu = Apu::new(sample_rate, false);
        apu.write(AUDIO_MASTER_CONTROL, 0x80);
        apu
    }

    #[test]
    fn sequencer_steps_every_8192_cycles() {
        let mut apu = powered(0);
        let mut ignore = |_: &[StereoSample]| {};
        apu.tick(8191, &mut ignore);
        assert_eq!(0, apu.frame_step());
        apu.tick(1, &mut ignore);
        assert_eq!(1, apu.frame_step());
        apu.tick(8192 * 7, &mut ignore);
        assert_eq!(0, apu.frame_step());
    }

    #[test]
    fn sweep_only_on_steps_2_and_6() {
        let mut apu = powered(0);
        let mut ignore = |_: &[StereoSample]| {};
        apu.write(CH1_SWEEP, 0x11);
        apu.write(CH1_VOLUME_AND_ENVELOPE, 0xf0);
        apu.write(CH1_PERIOD_LOW, 0x00);
        apu.write(CH1_PERIOD_HIGH_AND_CONTROL, 0x81);
        let mut changes = Vec::new();
        let mut period = apu.ch1.get_period_value();
        for _ in 0..8 {
            let step = apu.frame_step();
            apu.tick(FRAME_SEQUENCER_PERIOD, &mut ignore);
            if apu.ch1.get_period_value() != period {
                period = apu.ch1.get_period_value();
                changes.push(step);
            }
        }
        assert_eq!([2, 6], changes[..]);
        assert_eq!(0x240, period);
    }

    #[test]
    fn callback_gets_full_buffers() {
        let mut apu = powered(48_000);
        let mut calls = 0;
        let mut on_samples = |samples: &[StereoSample]| {
            assert_eq!(SAMPLE_BUFFER_LEN, samples.len());
            calls += 1;
        };
        // one second of emulation
        for _ in 0..CLOCK_RATE / 4 {
            apu.tick(4, &mut on_samples);
        }
        assert_eq!(48_000 / SAMPLE_BUFFER_LEN as u32, calls);
        assert_eq!(48_000 % SAMPLE_BUFFER_LEN, apu.pending_samples().len());
    }

    #[test]
    fn silence_while_off() {
        let mut apu = Apu::new(48_000, false);
        let mut received = Vec::new();
        apu.tick(CLOCK_RATE / 8, &mut |samples: &[StereoSample]| {
            received.extend_from_slice(samples)
        });
        assert_eq!(SAMPLE_BUFFER_LEN * 11, received.len());
        assert!(received.iter().all(|sample| *sample == StereoSample::default()));
    }

    #[test]
    fn power_off_clears_registers_but_not_wave_ram() {
        let mut apu = powered(0);
        apu.write(WAVE, 0x5a);
        apu.write(SOUND_PANNING, 0xf3);
        apu.write(CH1_LENGTH_TIMER_AND_DUTY_CYCLE, 0x80);
        apu.write(AUDIO_MASTER_CONTROL, 0x00);
        assert_eq!(0x70, apu.read(AUDIO_MASTER_CONTROL));
        assert_eq!(0x00, apu.read(SOUND_PANNING));
        assert_eq!(0x3f, apu.read(CH1_LENGTH_TIMER_AND_DUTY_CYCLE));
        assert_eq!(0x5a, apu.read(WAVE));
        // ignored while off
        apu.write(SOUND_PANNING, 0xff);
        assert_eq!(0x00, apu.read(SOUND_PANNING));
    }

    #[test]
    fn routing_and_volume() {
        let mut apu = powered(0);
        apu.write(MASTER_VOLUME_AND_VIN_PANNING, 0x70);
        apu.write(SOUND_PANNING, 0x10);
        apu.write(CH1_VOLUME_AND_ENVELOPE, 0xf0);
        apu.write(CH1_LENGTH_TIMER_AND_DUTY_CYCLE, 0xc0);
        apu.write(CH1_PERIOD_HIGH_AND_CONTROL, 0x80);
        let sample = apu.mix();
        assert_eq!(0, sample.right);
        assert_ne!(0, sample.left);
        assert_eq!(0xf1, apu.read(AUDIO_MASTER_CONTROL));
    }
}
