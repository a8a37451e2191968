use crate::{
    error::StateError,
    save_state::{StateReader, StateWriter},
};

/// Length counter of a channel with `L` steps (64, or 256 for the wave channel).
#[derive(Clone, Default, Debug)]
pub struct Length<const L: u16> {
    is_enabled: bool,
    remaining: u16,
}

impl<const L: u16> Length<L> {
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn set_initial_timer_length(&mut self, value: u8) {
        // according to blargg "Length can be reloaded at any time"
        self.remaining = L - u16::from(value) % L;
    }

    /// Returns true if the channel must be disabled.
    ///
    /// `clocks_next` tells if the next frame sequencer step clocks length.
    pub fn set_is_enabled(&mut self, is_enabled: bool, clocks_next: bool) -> bool {
        let was_enabled = self.is_enabled;
        self.is_enabled = is_enabled;
        // https://gbdev.io/pandocs/Audio_details.html#obscure-behavior
        // Citation: Extra length clocking occurs when writing to NRx4 when the frame sequencer's
        // next step is one that doesn't clock the length counter.
        if !was_enabled && is_enabled && !clocks_next && self.remaining > 0 {
            self.remaining -= 1;
            return self.remaining == 0;
        }
        false
    }

    pub fn trigger(&mut self, clocks_next: bool) {
        if self.remaining == 0 {
            self.remaining = L;
            if self.is_enabled && !clocks_next {
                self.remaining -= 1;
            }
        }
    }

    /// Returns true if the counter just expired.
    pub fn tick(&mut self) -> bool {
        if self.is_enabled && self.remaining > 0 {
            self.remaining -= 1;
            return self.remaining == 0;
        }
        false
    }

    pub fn save(&self, writer: &mut StateWriter) {
        writer.bool(self.is_enabled);
        writer.u16(self.remaining);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.is_enabled = reader.bool()?;
        self.remaining = reader.u16()?;
        if self.remaining > L {
            return Err(StateError::InvalidValue("length counter"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_loaded_steps() {
        let mut length = Length::<64>::default();
        length.set_initial_timer_length(62);
        length.set_is_enabled(true, true);
        assert!(!length.tick());
        assert!(length.tick());
        assert!(!length.tick());
    }

    #[test]
    fn extra_clock_in_first_half() {
        let mut length = Length::<64>::default();
        length.set_initial_timer_length(63);
        assert!(length.set_is_enabled(true, false));

        // a trigger on a zero counter reloads one less
        length.trigger(false);
        assert_eq!(63, length.remaining);
    }

    #[test]
    fn wave_length_uses_whole_byte() {
        let mut length = Length::<256>::default();
        length.set_initial_timer_length(0);
        assert_eq!(256, length.remaining);
    }
}
