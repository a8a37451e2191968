use crate::{
    error::StateError,
    save_state::{Snapshot, StateReader, StateWriter},
};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq)]
    struct JoypadFlags: u8 {
        const NOT_BUTTONS = 1 << 5;
        const NOT_DPAD = 1 << 4;
        const NOT_START_DOWN = 1 << 3;
        const NOT_SELECT_UP = 1 << 2;
        const NOT_B_LEFT = 1 << 1;
        const NOT_A_RIGHT = 1;
    }
}

bitflags::bitflags! {
    /// Host side buttons, passed to [`crate::Emulator::set_buttons`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u8 {
        const A = 1;
        const B = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const RIGHT = 1 << 4;
        const LEFT = 1 << 5;
        const UP = 1 << 6;
        const DOWN = 1 << 7;
    }
}

#[derive(Clone, Default)]
pub struct Joypad {
    pressed: Buttons,
    is_dpad_selected: bool,
    is_buttons_selected: bool,
}

impl Joypad {
    /// Returns true if a button went from released to pressed.
    pub fn set_buttons(&mut self, buttons: Buttons, pressed: bool) -> bool {
        let before = self.pressed;
        self.pressed.set(buttons, pressed);
        !(self.pressed - before).is_empty()
    }

    pub fn pressed(&self) -> Buttons {
        self.pressed
    }

    pub fn set_register(&mut self, value: u8) {
        let value = JoypadFlags::from_bits_retain(value);
        self.is_dpad_selected = !value.contains(JoypadFlags::NOT_DPAD);
        self.is_buttons_selected = !value.contains(JoypadFlags::NOT_BUTTONS);
    }

    pub fn get_register(&self) -> u8 {
        // the upper nibble of Buttons is the d-pad, the lower nibble the buttons
        let mut lines = 0;
        if self.is_dpad_selected {
            lines |= self.pressed.bits() >> 4;
        }
        if self.is_buttons_selected {
            lines |= self.pressed.bits() & 0x0f;
        }
        let mut value = JoypadFlags::from_bits_retain(!lines & 0x0f);
        value.set(JoypadFlags::NOT_DPAD, !self.is_dpad_selected);
        value.set(JoypadFlags::NOT_BUTTONS, !self.is_buttons_selected);
        value.bits() | 0b11000000 // unused bits return 1
    }
}

impl Snapshot for Joypad {
    fn save(&self, writer: &mut StateWriter) {
        writer.u8(self.pressed.bits());
        writer.bool(self.is_dpad_selected);
        writer.bool(self.is_buttons_selected);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.pressed = Buttons::from_bits_retain(reader.u8()?);
        self.is_dpad_selected = reader.bool()?;
        self.is_buttons_selected = reader.bool()?;
        Ok(())
    }
}
