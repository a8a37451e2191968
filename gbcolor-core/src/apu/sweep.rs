use crate::{
    error::StateError,
    save_state::{StateReader, StateWriter},
};

#[derive(Clone, Default)]
pub struct Ch1Sweep {
    nr10: u8,
    pace_countdown: u8,
    // shadow register
    period_value: u16,
    // https://gbdev.io/pandocs/Audio_details.html#pulse-channel-with-sweep-ch1
    // The “enabled flag” is set if either the sweep pace or individual step are non-zero, cleared otherwise.
    is_enabled: bool,
}

impl Ch1Sweep {
    pub fn set_nr10(&mut self, value: u8) {
        let old_pace = self.pace();
        self.nr10 = value;
        // https://gbdev.io/pandocs/Audio_Registers.html#ff10--nr10-channel-1-sweep
        // Citation: However, if 0 is written to this field, then iterations are instantly
        // disabled, and **it will be reloaded as soon as it’s set to something else**.
        if old_pace == 0 && self.pace() != 0 {
            self.pace_countdown = self.pace();
        }
    }

    pub fn get_nr10(&self) -> u8 {
        self.nr10
    }

    fn is_decreasing(&self) -> bool {
        self.nr10 & 0x08 != 0
    }

    // 3 bits
    fn individual_step(&self) -> u8 {
        self.nr10 & 0x07
    }

    fn pace(&self) -> u8 {
        (self.nr10 >> 4) & 0x07
    }

    // None -> overflow
    fn compute_next_value_and_check_overflow(&self) -> Option<u16> {
        let delta = self.period_value >> self.individual_step();
        if self.is_decreasing() {
            return Some(self.period_value - delta);
        }
        let new_period = self.period_value + delta;
        (new_period <= 0x7ff).then_some(new_period)
    }
}

/// Frequency sweep of a pulse channel. Only channel 1 has a real one.
pub trait Sweep {
    /// Returns false if the channel must be disabled.
    #[must_use]
    fn trigger(&mut self, period: u16) -> bool;
    /// Returns whether the channel stays enabled and the period to write back.
    #[must_use]
    fn tick(&mut self) -> (bool, Option<u16>);
    fn save(&self, writer: &mut StateWriter);
    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError>;
}

impl Sweep for Ch1Sweep {
    fn trigger(&mut self, period: u16) -> bool {
        self.period_value = period;
        self.pace_countdown = if self.pace() == 0 { 8 } else { self.pace() };
        self.is_enabled = self.pace() != 0 || self.individual_step() != 0;
        // https://gbdev.io/pandocs/Audio_details.html#pulse-channel-with-sweep-ch1
        // Citation: If the individual step is non-zero, frequency calculation and overflow check are performed immediately.
        self.individual_step() == 0 || self.compute_next_value_and_check_overflow().is_some()
    }

    fn tick(&mut self) -> (bool, Option<u16>) {
        if !self.is_enabled {
            return (true, None);
        }

        self.pace_countdown = self.pace_countdown.saturating_sub(1);
        if self.pace_countdown > 0 {
            return (true, None);
        }

        // https://gbdev.io/pandocs/Audio_Registers.html#ff10--nr10-channel-1-sweep
        // Citation: Note that the value written to this field is not re-read by the hardware until a sweep iteration completes
        if self.pace() == 0 {
            self.pace_countdown = 8;
            return (true, None);
        }
        self.pace_countdown = self.pace();

        let Some(new_period_value) = self.compute_next_value_and_check_overflow() else {
            return (false, None);
        };

        // https://gbdev.io/pandocs/Audio_details.html#pulse-channel-with-sweep-ch1
        // Citation: If the new frequency is 2047 or less and **the individual step is not zero**,
        // this new frequency is written back to the “shadow register”
        if self.individual_step() == 0 {
            return (true, None);
        }

        self.period_value = new_period_value;

        // Citation: then frequency calculation and overflow check are run again immediately
        // using this new value, but this second new frequency is not written back
        (
            self.compute_next_value_and_check_overflow().is_some(),
            Some(new_period_value),
        )
    }

    fn save(&self, writer: &mut StateWriter) {
        writer.u8(self.nr10);
        writer.u8(self.pace_countdown);
        writer.u16(self.period_value);
        writer.bool(self.is_enabled);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.nr10 = reader.u8()?;
        self.pace_countdown = reader.u8()?;
        self.period_value = reader.u16()? & 0x7ff;
        self.is_enabled = reader.bool()?;
        Ok(())
    }
}

impl Sweep for () {
    fn trigger(&mut self, _: u16) -> bool {
        true
    }

    fn tick(&mut self) -> (bool, Option<u16>) {
        (true, None)
    }

    fn save(&self, _: &mut StateWriter) {}

    fn load(&mut self, _: &mut StateReader<'_>) -> Result<(), StateError> {
        Ok(())
    }
}
