#![no_std]

extern crate alloc;

use alloc::boxed::Box;

use crate::{
    bus::{Bus, Hooks},
    cartridge::{Cartridge, CgbSupport},
    cpu::Cpu,
    registers::Interruptions,
    save_state::{Snapshot, StateReader, StateWriter},
};

pub mod apu;
pub mod bits;
pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod dma;
pub mod error;
pub mod joypad;
pub mod mbc;
pub mod memory;
pub mod ppu;
pub mod registers;
pub mod save_state;
pub mod serial;
pub mod timer;

pub use apu::StereoSample;
pub use cartridge::{CartridgeInfo, get_rom_info};
pub use error::{Diagnostic, LoadError, ParseError, SramSizeMismatch, StateError};
pub use joypad::Buttons;
pub use mbc::RtcRegisters;
pub use ppu::{
    PixelSink,
    color::{DMG_SHADES, rgb555_to_rgb888},
};
pub use save_state::SaveState;

pub const WIDTH: u8 = 160;
pub const HEIGHT: u8 = 144;
/// T-cycles per second at normal speed.
pub const CLOCK_RATE: u32 = 4_194_304;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum System {
    Dmg,
    Cgb,
}

/// Which hardware to emulate when a ROM is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemPreference {
    /// CGB when the cartridge supports it.
    #[default]
    Auto,
    Dmg,
    Cgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtcUpdate {
    /// One RTC second every 60 emulated frames.
    #[default]
    EmulatedTime,
    Frozen,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub system: SystemPreference,
    /// Output sample rate in Hz, clamped to [`CLOCK_RATE`].
    pub sample_rate: u32,
    /// RGB555 shades for DMG colours 0 to 3, lightest first.
    pub dmg_palette: [u16; 4],
    pub rtc_update: RtcUpdate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system: SystemPreference::Auto,
            sample_rate: 48000,
            dmg_palette: DMG_SHADES,
            rtc_update: RtcUpdate::EmulatedTime,
        }
    }
}

fn select_system(preference: SystemPreference, support: CgbSupport) -> Result<System, LoadError> {
    match (preference, support) {
        (SystemPreference::Dmg, CgbSupport::Only) => Err(LoadError::UnsupportedSystem {
            cgb_only: true,
            forced: System::Dmg,
        }),
        (SystemPreference::Cgb, CgbSupport::None) => Err(LoadError::UnsupportedSystem {
            cgb_only: false,
            forced: System::Cgb,
        }),
        (SystemPreference::Dmg, _) | (SystemPreference::Auto, CgbSupport::None) => Ok(System::Dmg),
        _ => Ok(System::Cgb),
    }
}

#[derive(Clone)]
struct Machine {
    cpu: Cpu,
    bus: Bus,
}

type VblankCallback = Box<dyn FnMut(&PixelSink)>;
type AudioCallback = Box<dyn FnMut(&[StereoSample])>;
type ColourCallback = Box<dyn Fn(u16) -> u32>;
type DiagnosticCallback = Box<dyn FnMut(&Diagnostic)>;
type LinkCallback = Box<dyn FnMut(u8) -> u8>;

pub struct Emulator {
    config: Config,
    machine: Option<Machine>,
    sink: PixelSink,
    on_vblank: VblankCallback,
    on_audio: AudioCallback,
    colour: ColourCallback,
    on_diagnostic: DiagnosticCallback,
    link: LinkCallback,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Emulator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            machine: None,
            sink: PixelSink::default(),
            on_vblank: Box::new(|_| {}),
            on_audio: Box::new(|_| {}),
            colour: Box::new(rgb555_to_rgb888),
            on_diagnostic: Box::new(|_| {}),
            // nothing plugged in
            link: Box::new(|_| 0xff),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Installs a cartridge and resets the machine to the state the boot ROM leaves behind.
    /// On error the previous cartridge and state are kept.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<CartridgeInfo, LoadError> {
        let info = get_rom_info(rom)?;
        if rom.len() < info.rom_size {
            return Err(LoadError::RomTruncated {
                declared: info.rom_size,
                actual: rom.len(),
            });
        }
        let system = select_system(self.config.system, info.cgb)?;
        let cgb = system == System::Cgb;

        let mut bus = Bus::new(
            Cartridge::new(info.clone(), rom),
            cgb,
            self.config.sample_rate,
            self.config.dmg_palette,
        );
        bus.post_boot();
        self.machine = Some(Machine {
            cpu: Cpu::post_boot(cgb),
            bus,
        });
        log::info!("loaded \"{}\" as {system:?}", info.title);
        Ok(info)
    }

    /// Replaces the cartridge RAM, typically with a battery save read by the caller.
    pub fn set_sram(&mut self, sram: &[u8]) -> Result<(), SramSizeMismatch> {
        let result = match self.machine.as_mut() {
            Some(machine) => machine.bus.memory.cartridge_mut().set_ram(sram),
            None => Err(SramSizeMismatch {
                expected: 0,
                actual: sram.len(),
            }),
        };
        if let Err(error) = &result {
            log::warn!("{error}");
        }
        result
    }

    /// Cartridge RAM, `None` without a cartridge or when it has no RAM.
    pub fn sram(&self) -> Option<&[u8]> {
        let ram = self.machine.as_ref()?.bus.memory.cartridge().ram();
        (!ram.is_empty()).then_some(ram)
    }

    /// Returns the previous sink.
    pub fn set_pixel_sink(&mut self, sink: PixelSink) -> PixelSink {
        core::mem::replace(&mut self.sink, sink)
    }

    pub fn pixel_sink(&self) -> &PixelSink {
        &self.sink
    }

    pub fn set_buttons(&mut self, buttons: Buttons, pressed: bool) {
        let Some(Machine { cpu, bus }) = self.machine.as_mut() else {
            return;
        };
        if bus.joypad.set_buttons(buttons, pressed) {
            bus.request_interrupt(Interruptions::JOYPAD);
            cpu.wake();
        }
    }

    pub fn set_vblank_callback(&mut self, callback: impl FnMut(&PixelSink) + 'static) {
        self.on_vblank = Box::new(callback);
    }

    pub fn set_audio_callback(&mut self, callback: impl FnMut(&[StereoSample]) + 'static) {
        self.on_audio = Box::new(callback);
    }

    /// Converts RGB555 colours to host pixels. Every cached colour is recomputed.
    pub fn set_colour_callback(&mut self, callback: impl Fn(u16) -> u32 + 'static) {
        self.colour = Box::new(callback);
        if let Some(machine) = self.machine.as_mut() {
            machine.bus.ppu.palettes.mark_dirty();
        }
    }

    pub fn set_diagnostic_callback(&mut self, callback: impl FnMut(&Diagnostic) + 'static) {
        self.on_diagnostic = Box::new(callback);
    }

    /// Receives the byte shifted out on the serial port and returns the byte shifted in.
    pub fn set_link_callback(&mut self, callback: impl FnMut(u8) -> u8 + 'static) {
        self.link = Box::new(callback);
    }

    /// Runs one instruction or interrupt dispatch and everything it owes to the other
    /// components. Returns the elapsed cycles at PPU rate, 0 without a cartridge.
    pub fn run_step(&mut self) -> u32 {
        self.step().0
    }

    fn step(&mut self) -> (u32, bool) {
        let Some(Machine { cpu, bus }) = self.machine.as_mut() else {
            return (0, false);
        };

        let mut cycles = cpu.step(bus);
        let mut frame_done;
        {
            let mut hooks = Hooks {
                sink: &mut self.sink,
                colour: &*self.colour,
                audio: &mut *self.on_audio,
                link: &mut *self.link,
            };
            frame_done = bus.tick(cycles, &mut hooks);
            // HDMA blocks can queue more stall while the previous one is paid
            loop {
                let stall = bus.take_stall();
                if stall == 0 {
                    break;
                }
                cycles += stall;
                frame_done |= bus.tick(stall, &mut hooks);
            }
        }

        for diagnostic in bus.take_diagnostics() {
            (self.on_diagnostic)(&diagnostic);
        }
        if frame_done {
            (self.on_vblank)(&self.sink);
        }

        let cycles = if bus.is_double_speed() {
            cycles / 2
        } else {
            cycles
        };
        (cycles, frame_done)
    }

    /// Runs until the PPU finishes a frame.
    pub fn run_frame(&mut self) {
        if self.machine.is_none() {
            return;
        }
        while !self.step().1 {}
        if self.config.rtc_update == RtcUpdate::EmulatedTime
            && let Some(machine) = self.machine.as_mut()
        {
            machine.bus.memory.tick_rtc_frame();
        }
    }

    /// The next frame leaves the pixel sink untouched.
    pub fn skip_next_frame(&mut self) {
        if let Some(machine) = self.machine.as_mut() {
            machine.bus.ppu.skip_next_frame();
        }
    }

    pub fn save_state(&self) -> Result<SaveState, StateError> {
        let machine = self.machine.as_ref().ok_or(StateError::NoCartridge)?;
        let info = machine.bus.memory.cartridge().info();
        let mut writer = StateWriter::with_header(info.header_checksum, info.global_checksum);
        writer.bool(machine.bus.is_cgb());
        machine.cpu.save(&mut writer);
        machine.bus.save(&mut writer);
        Ok(writer.finish())
    }

    /// Restores a state saved from the same cartridge. Nothing changes on error.
    pub fn load_state(&mut self, state: &SaveState) -> Result<(), StateError> {
        let machine = self.machine.as_ref().ok_or(StateError::NoCartridge)?;
        let info = machine.bus.memory.cartridge().info();
        let mut reader =
            StateReader::open(state.as_bytes(), info.header_checksum, info.global_checksum)?;

        if reader.bool()? != machine.bus.is_cgb() {
            return Err(StateError::InvalidValue("system"));
        }
        // the layout is fixed for a given cartridge and system
        let expected = self.save_state()?.len();
        if state.len() != expected {
            return Err(StateError::SizeMismatch {
                expected,
                actual: state.len(),
            });
        }
        let mut restored = machine.clone();
        restored.cpu.load(&mut reader)?;
        restored.bus.load(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(StateError::SizeMismatch {
                expected: state.len() - reader.remaining(),
                actual: state.len(),
            });
        }

        self.machine = Some(restored);
        log::info!("save state loaded");
        Ok(())
    }

    pub fn rtc(&self) -> Option<RtcRegisters> {
        self.machine.as_ref()?.bus.memory.cartridge().rtc()
    }

    /// Out of range values are clamped. Returns false if the cartridge has no clock.
    pub fn set_rtc(&mut self, registers: RtcRegisters) -> bool {
        self.machine
            .as_mut()
            .is_some_and(|machine| machine.bus.memory.cartridge_mut().set_rtc(registers))
    }

    pub fn cartridge_info(&self) -> Option<&CartridgeInfo> {
        Some(self.machine.as_ref()?.bus.memory.cartridge().info())
    }

    pub fn has_battery(&self) -> bool {
        self.cartridge_info().is_some_and(CartridgeInfo::has_battery)
    }

    pub fn has_rtc(&self) -> bool {
        self.cartridge_info().is_some_and(CartridgeInfo::has_rtc)
    }

    pub fn is_cgb(&self) -> bool {
        self.machine
            .as_ref()
            .is_some_and(|machine| machine.bus.is_cgb())
    }

    /// Rumble motor state on MBC5 rumble cartridges.
    pub fn rumble(&self) -> bool {
        self.machine
            .as_ref()
            .is_some_and(|machine| machine.bus.memory.cartridge().rumble())
    }

    pub fn cpu(&self) -> Option<&Cpu> {
        self.machine.as_ref().map(|machine| &machine.cpu)
    }

    pub fn bus(&self) -> Option<&Bus> {
        self.machine.as_ref().map(|machine| &machine.bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_policy() {
        use SystemPreference as P;
        assert_eq!(Ok(System::Dmg), select_system(P::Auto, CgbSupport::None));
        assert_eq!(Ok(System::Cgb), select_system(P::Auto, CgbSupport::Supported));
        assert_eq!(Ok(System::Cgb), select_system(P::Auto, CgbSupport::Only));
        assert_eq!(Ok(System::Dmg), select_system(P::Dmg, CgbSupport::Supported));
        assert_eq!(Ok(System::Cgb), select_system(P::Cgb, CgbSupport::Supported));
        assert_eq!(
            Err(LoadError::UnsupportedSystem {
                cgb_only: true,
                forced: System::Dmg
            }),
            select_system(P::Dmg, CgbSupport::Only)
        );
        assert!(select_system(P::Cgb, CgbSupport::None).is_err());
    }

    #[test]
    fn no_cartridge() {
        let mut emulator = Emulator::default();
        assert_eq!(0, emulator.run_step());
        emulator.run_frame();
        assert_eq!(Err(StateError::NoCartridge), emulator.save_state());
        assert!(emulator.sram().is_none());
        assert!(emulator.set_sram(&[0; 4]).is_err());
        assert!(!emulator.is_cgb());
    }
}
