use crate::{
    error::StateError,
    mbc::{Mbc, RamAccess, ram_enable},
    save_state::{Snapshot, StateReader, StateWriter},
};

pub const FRAMES_PER_SECOND: u8 = 60;

const DAY_HIGH_MASK: u8 = 0xc1;
const HALT: u8 = 1 << 6;
const DAY_CARRY: u8 = 1 << 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_low: u8,
    /// Bit 0 is the 9th day bit, bit 6 halts the clock and bit 7 is the day carry.
    pub day_high: u8,
}

impl RtcRegisters {
    pub fn day_counter(&self) -> u16 {
        u16::from(self.day_high & 1) << 8 | u16::from(self.day_low)
    }

    pub fn halted(&self) -> bool {
        self.day_high & HALT != 0
    }

    fn select(&self, register: u8) -> u8 {
        match register {
            0x08 => self.seconds,
            0x09 => self.minutes,
            0x0a => self.hours,
            0x0b => self.day_low,
            _ => self.day_high,
        }
    }

    fn select_mut(&mut self, register: u8) -> &mut u8 {
        match register {
            0x08 => &mut self.seconds,
            0x09 => &mut self.minutes,
            0x0a => &mut self.hours,
            0x0b => &mut self.day_low,
            _ => &mut self.day_high,
        }
    }

    /// Advances one second. Out of range values keep counting up to their bit width.
    pub fn tick_second(&mut self) {
        if self.halted() {
            return;
        }
        self.seconds = self.seconds.wrapping_add(1) & 0x3f;
        if self.seconds != 60 {
            return;
        }
        self.seconds = 0;
        self.minutes = self.minutes.wrapping_add(1) & 0x3f;
        if self.minutes != 60 {
            return;
        }
        self.minutes = 0;
        self.hours = self.hours.wrapping_add(1) & 0x1f;
        if self.hours != 24 {
            return;
        }
        self.hours = 0;
        let (day_low, overflow) = self.day_low.overflowing_add(1);
        self.day_low = day_low;
        if overflow {
            if self.day_high & 1 != 0 {
                self.day_high = (self.day_high & !1) | DAY_CARRY;
            } else {
                self.day_high |= 1;
            }
        }
    }

    fn save(&self, writer: &mut StateWriter) {
        writer.bytes(&[
            self.seconds,
            self.minutes,
            self.hours,
            self.day_low,
            self.day_high,
        ]);
    }

    fn load(reader: &mut StateReader<'_>) -> Result<Self, StateError> {
        let mut bytes = [0; 5];
        reader.bytes_into(&mut bytes)?;
        let [seconds, minutes, hours, day_low, day_high] = bytes;
        Ok(Self {
            seconds,
            minutes,
            hours,
            day_low,
            day_high: day_high & DAY_HIGH_MASK,
        })
    }
}

#[derive(Clone, Copy, Default)]
pub struct Rtc {
    live: RtcRegisters,
    latched: RtcRegisters,
    // the latch fires on a 0 then 1 write sequence
    latch_armed: bool,
    frames: u8,
}

impl Rtc {
    fn latch_write(&mut self, value: u8) {
        if self.latch_armed && value == 1 {
            self.latched = self.live;
        }
        self.latch_armed = value == 0;
    }

    fn tick_frame(&mut self) {
        self.frames += 1;
        if self.frames >= FRAMES_PER_SECOND {
            self.frames = 0;
            self.live.tick_second();
        }
    }
}

#[derive(Clone, Copy)]
pub struct Mbc3 {
    ram_enabled: bool,
    // 7 bits, 0 reads as 1
    rom_bank: u8,
    // 0x00-0x07 selects a RAM bank, 0x08-0x0c an RTC register
    select: u8,
    rtc: Option<Rtc>,
}

impl Mbc3 {
    pub fn new(has_rtc: bool) -> Self {
        Self {
            ram_enabled: false,
            rom_bank: 1,
            select: 0,
            rtc: has_rtc.then(Rtc::default),
        }
    }
}

impl Mbc for Mbc3 {
    fn write_register(&mut self, address: u16, value: u8) -> bool {
        match address {
            0x0000..=0x1fff => {
                let enabled = ram_enable(value);
                let changed = enabled != self.ram_enabled;
                self.ram_enabled = enabled;
                changed
            }
            0x2000..=0x3fff => {
                let bank = (value & 0x7f).max(1);
                let changed = bank != self.rom_bank;
                self.rom_bank = bank;
                changed
            }
            0x4000..=0x5fff => {
                if value > 0x0c || (0x08..=0x0c).contains(&value) && self.rtc.is_none() {
                    log::warn!("MBC3: ignoring RAM/RTC select 0x{value:02x}");
                    return false;
                }
                let changed = value != self.select;
                self.select = value;
                changed
            }
            _ => {
                if let Some(rtc) = &mut self.rtc {
                    rtc.latch_write(value);
                }
                false
            }
        }
    }

    fn rom_bank_high(&self) -> usize {
        usize::from(self.rom_bank)
    }

    fn ram_access(&self) -> RamAccess {
        match self.select {
            _ if !self.ram_enabled => RamAccess::Disabled,
            bank @ 0x00..=0x07 => RamAccess::Bank(usize::from(bank)),
            _ => RamAccess::Rtc,
        }
    }

    fn read_rtc(&self) -> u8 {
        match &self.rtc {
            Some(rtc) if self.select == 0x0c => rtc.latched.day_high | !DAY_HIGH_MASK,
            Some(rtc) => rtc.latched.select(self.select),
            None => 0xff,
        }
    }

    // Writes reach the running clock and the latched copy so they read back at once.
    fn write_rtc(&mut self, value: u8) {
        let select = self.select;
        if let Some(rtc) = &mut self.rtc {
            let value = value
                & match select {
                    0x08 | 0x09 => 0x3f,
                    0x0a => 0x1f,
                    0x0b => 0xff,
                    _ => DAY_HIGH_MASK,
                };
            if select == 0x08 {
                rtc.frames = 0;
            }
            *rtc.live.select_mut(select) = value;
            *rtc.latched.select_mut(select) = value;
        }
    }

    fn tick_frame(&mut self) {
        if let Some(rtc) = &mut self.rtc {
            rtc.tick_frame();
        }
    }

    fn rtc(&self) -> Option<RtcRegisters> {
        self.rtc.map(|rtc| rtc.live)
    }

    fn set_rtc(&mut self, registers: RtcRegisters) -> bool {
        let Some(rtc) = &mut self.rtc else {
            return false;
        };
        rtc.live = RtcRegisters {
            seconds: registers.seconds.min(59),
            minutes: registers.minutes.min(59),
            hours: registers.hours.min(23),
            day_low: registers.day_low,
            day_high: registers.day_high & DAY_HIGH_MASK,
        };
        rtc.latched = rtc.live;
        true
    }
}

impl Snapshot for Mbc3 {
    fn save(&self, writer: &mut StateWriter) {
        writer.bool(self.ram_enabled);
        writer.u8(self.rom_bank);
        writer.u8(self.select);
        writer.bool(self.rtc.is_some());
        if let Some(rtc) = &self.rtc {
            rtc.live.save(writer);
            rtc.latched.save(writer);
            writer.bool(rtc.latch_armed);
            writer.u8(rtc.frames);
        }
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enabled = reader.bool()?;
        self.rom_bank = reader.u8()? & 0x7f;
        self.select = reader.u8()?;
        if self.rom_bank == 0 || self.select > 0x0c {
            return Err(StateError::InvalidValue("mbc3 bank"));
        }
        if reader.bool()? != self.rtc.is_some() {
            return Err(StateError::InvalidValue("mbc3 clock presence"));
        }
        if let Some(rtc) = &mut self.rtc {
            rtc.live = RtcRegisters::load(reader)?;
            rtc.latched = RtcRegisters::load(reader)?;
            rtc.latch_armed = reader.bool()?;
            rtc.frames = reader.u8()? % FRAMES_PER_SECOND;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_rtc(mbc: &mut Mbc3, register: u8) {
        mbc.write_register(0x0000, 0x0a);
        mbc.write_register(0x4000, register);
    }

    #[test]
    fn rom_bank_is_7_bits() {
        let mut mbc = Mbc3::new(false);
        mbc.write_register(0x2000, 0);
        assert_eq!(1, mbc.rom_bank_high());
        mbc.write_register(0x2000, 0xff);
        assert_eq!(0x7f, mbc.rom_bank_high());
    }

    #[test]
    fn rtc_select_without_clock_is_ignored() {
        let mut mbc = Mbc3::new(false);
        mbc.write_register(0x0000, 0x0a);
        mbc.write_register(0x4000, 0x08);
        assert_eq!(RamAccess::Bank(0), mbc.ram_access());
    }

    #[test]
    fn latch_needs_0_then_1() {
        let mut mbc = Mbc3::new(true);
        select_rtc(&mut mbc, 0x08);
        assert_eq!(RamAccess::Rtc, mbc.ram_access());
        for _ in 0..FRAMES_PER_SECOND * 3 {
            mbc.tick_frame();
        }
        assert_eq!(0, mbc.read_rtc());

        mbc.write_register(0x6000, 1);
        assert_eq!(0, mbc.read_rtc());
        mbc.write_register(0x6000, 0);
        mbc.write_register(0x6000, 1);
        assert_eq!(3, mbc.read_rtc());
    }

    #[test]
    fn halted_clock_does_not_tick() {
        let mut mbc = Mbc3::new(true);
        select_rtc(&mut mbc, 0x0c);
        mbc.write_rtc(0xff);
        // only 0xc1 is writable, the rest reads as 1
        assert_eq!(0xff, mbc.read_rtc());
        assert_eq!(0xc1, mbc.rtc().unwrap().day_high);
        for _ in 0..FRAMES_PER_SECOND {
            mbc.tick_frame();
        }
        assert_eq!(0, mbc.rtc().unwrap().seconds);
    }

    #[test]
    fn day_counter_carries() {
        let mut registers = RtcRegisters {
            seconds: 59,
            minutes: 59,
            hours: 23,
            day_low: 0xff,
            day_high: 1,
        };
        assert_eq!(511, registers.day_counter());
        registers.tick_second();
        assert_eq!(
            RtcRegisters {
                day_high: DAY_CARRY,
                ..Default::default()
            },
            registers
        );
    }
}
