use crate::{
    error::StateError,
    registers::{DIV, TIMER_CONTROL, TIMER_COUNTER, TIMER_MODULO},
    save_state::{Snapshot, StateReader, StateWriter},
};

// The system counter is 16 bits wide and incremented every T-cycle. DIV is its upper byte,
// so DIV runs at 4194304 / 256 = 16384 Hz as pandocs says.
// TIMA is clocked by the falling edge of (selected counter bit AND timer enable), which is
// why resetting DIV or rewriting TAC can tick TIMA once more.
// https://gbdev.io/pandocs/Timer_Obscure_Behaviour.html

const TAC_ENABLE: u8 = 0b100;

#[derive(Clone, Default)]
pub struct Timer {
    system_counter: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    interrupt: bool,
}

impl Timer {
    fn selected_bit(tac: u8) -> u16 {
        match tac & 0b11 {
            0b00 => 1 << 9,
            0b01 => 1 << 3,
            0b10 => 1 << 5,
            _ => 1 << 7,
        }
    }

    fn input(counter: u16, tac: u8) -> bool {
        tac & TAC_ENABLE != 0 && counter & Self::selected_bit(tac) != 0
    }

    fn increment_tima(&mut self) {
        self.tima = if let Some(value) = self.tima.checked_add(1) {
            value
        } else {
            self.interrupt = true;
            self.tma
        };
    }

    /// Advances by `cycles` T-cycles. Returns true if TIMA overflowed.
    pub fn tick(&mut self, cycles: u32) -> bool {
        let start = u32::from(self.system_counter);
        if self.tac & TAC_ENABLE != 0 {
            // the selected bit falls each time the counter reaches a multiple of twice its value
            let period = u32::from(Self::selected_bit(self.tac)) << 1;
            let edges = (start + cycles) / period - start / period;
            for _ in 0..edges {
                self.increment_tima();
            }
        }
        self.system_counter = self.system_counter.wrapping_add(cycles as u16);
        core::mem::take(&mut self.interrupt)
    }

    pub fn div(&self) -> u8 {
        self.system_counter.to_be_bytes()[0]
    }

    pub fn reset_div(&mut self) {
        if Self::input(self.system_counter, self.tac) {
            self.increment_tima();
        }
        self.system_counter = 0;
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            DIV => self.div(),
            TIMER_COUNTER => self.tima,
            TIMER_MODULO => self.tma,
            TIMER_CONTROL => self.tac | 0b1111_1000,
            _ => 0xff,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            // Citation:
            // Writing any value to this register resets it to $00
            DIV => self.reset_div(),
            TIMER_COUNTER => self.tima = value,
            TIMER_MODULO => self.tma = value,
            TIMER_CONTROL => {
                let before = Self::input(self.system_counter, self.tac);
                self.tac = value & 0b111;
                if before && !Self::input(self.system_counter, self.tac) {
                    self.increment_tima();
                }
            }
            _ => {}
        }
    }

    /// Raised by a TIMA increment caused by a register write.
    pub fn take_interrupt(&mut self) -> bool {
        core::mem::take(&mut self.interrupt)
    }

    pub(crate) fn set_system_counter(&mut self, value: u16) {
        self.system_counter = value;
    }
}

impl Snapshot for Timer {
    fn save(&self, writer: &mut StateWriter) {
        writer.u16(self.system_counter);
        writer.u8(self.tima);
        writer.u8(self.tma);
        writer.u8(self.tac);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.system_counter = reader.u16()?;
        self.tima = reader.u8()?;
        self.tma = reader.u8()?;
        self.tac = reader.u8()? & 0b111;
        self.interrupt = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_runs_at_16384_hz() {
        let mut timer = Timer::default();
        timer.tick(255);
        assert_eq!(0, timer.div());
        timer.tick(1);
        assert_eq!(1, timer.div());
        timer.write(DIV, 0x12);
        assert_eq!(0, timer.div());
    }

    #[test]
    fn overflow_reloads_modulo() {
        let mut timer = Timer::default();
        timer.write(TIMER_MODULO, 0xf0);
        timer.write(TIMER_COUNTER, 0xfe);
        // 262144 Hz: one increment every 16 cycles
        timer.write(TIMER_CONTROL, 0b101);
        assert!(!timer.tick(16));
        assert_eq!(0xff, timer.read(TIMER_COUNTER));
        assert!(timer.tick(16));
        assert_eq!(0xf0, timer.read(TIMER_COUNTER));
    }

    #[test]
    fn disabled_timer_does_not_count() {
        let mut timer = Timer::default();
        timer.write(TIMER_CONTROL, 0b001);
        timer.tick(1024);
        assert_eq!(0, timer.read(TIMER_COUNTER));
        assert_eq!(0xf9, timer.read(TIMER_CONTROL));
    }

    #[test]
    fn div_reset_falling_edge() {
        let mut timer = Timer::default();
        timer.write(TIMER_CONTROL, 0b101);
        // bit 3 set
        timer.tick(8);
        timer.write(DIV, 0);
        assert_eq!(1, timer.read(TIMER_COUNTER));
    }

    #[test]
    fn jumping_to_edges_matches_single_steps() {
        for tac in [0b100, 0b101, 0b110, 0b111, 0b011] {
            for start in [0, 7, 0x1ff, 0xfff0] {
                let mut jumped = Timer::default();
                jumped.set_system_counter(start);
                jumped.write(TIMER_MODULO, 0xfa);
                jumped.write(TIMER_COUNTER, 0xf0);
                jumped.write(TIMER_CONTROL, tac);
                let mut stepped = jumped.clone();

                for cycles in [3, 24, 1000, 4, 70224] {
                    let overflow = jumped.tick(cycles);
                    for _ in 0..cycles {
                        let before = Timer::input(stepped.system_counter, stepped.tac);
                        stepped.system_counter = stepped.system_counter.wrapping_add(1);
                        if before && !Timer::input(stepped.system_counter, stepped.tac) {
                            stepped.increment_tima();
                        }
                    }
                    let stepped_overflow = stepped.take_interrupt();
                    assert_eq!(stepped_overflow, overflow, "tac {tac:03b} start {start}");
                    assert_eq!(stepped.system_counter, jumped.system_counter);
                    assert_eq!(stepped.read(TIMER_COUNTER), jumped.read(TIMER_COUNTER));
                }
            }
        }
    }

    #[test]
    fn edge_reached_by_a_long_tick() {
        let mut timer = Timer::default();
        timer.set_system_counter(0x03f8);
        timer.write(TIMER_CONTROL, 0b100);
        // bit 9 falls at 0x0400 and again at 0x0800
        timer.tick(8);
        assert_eq!(1, timer.read(TIMER_COUNTER));
        timer.tick(0x400);
        assert_eq!(2, timer.read(TIMER_COUNTER));
    }
}
