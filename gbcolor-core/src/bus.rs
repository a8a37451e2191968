use arrayvec::ArrayVec;

use crate::{
    apu::{Apu, StereoSample},
    cartridge::Cartridge,
    dma::Dma,
    error::{Diagnostic, StateError},
    joypad::Joypad,
    memory::Memory,
    ppu::{BLOCK_SIZE, HdmaRequest, PixelSink, Ppu},
    registers::*,
    save_state::{Snapshot, StateReader, StateWriter},
    serial::Serial,
    timer::Timer,
};

const MAX_PENDING_DIAGNOSTICS: usize = 8;
// per 16 byte block, at CPU speed
const HBLANK_DMA_STALL: u32 = 32;
const DMG_POST_BOOT_COUNTER: u16 = 0xabcc;
const CGB_POST_BOOT_COUNTER: u16 = 0x1ea0;

/// Host side sinks the components report to while time advances.
pub struct Hooks<'a> {
    pub sink: &'a mut PixelSink,
    pub colour: &'a dyn Fn(u16) -> u32,
    pub audio: &'a mut dyn FnMut(&[StereoSample]),
    pub link: &'a mut dyn FnMut(u8) -> u8,
}

/// Everything the CPU can reach through the address space.
#[derive(Clone)]
pub struct Bus {
    pub memory: Memory,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub joypad: Joypad,
    serial: Serial,
    dma: Dma,
    interrupt_flag: Interruptions,
    // all 8 bits are kept
    interrupt_enable: u8,
    speed_switch_armed: bool,
    double_speed: bool,
    // CPU cycles owed to HDMA transfers
    stall: u32,
    diagnostics: ArrayVec<Diagnostic, MAX_PENDING_DIAGNOSTICS>,
    cgb: bool,
}

impl Bus {
    pub fn new(cartridge: Cartridge, cgb: bool, sample_rate: u32, dmg_shades: [u16; 4]) -> Self {
        Self {
            memory: Memory::new(cartridge, cgb),
            ppu: Ppu::new(cgb, dmg_shades),
            apu: Apu::new(sample_rate, cgb),
            timer: Timer::default(),
            joypad: Joypad::default(),
            serial: Serial::new(cgb),
            dma: Dma::default(),
            interrupt_flag: Interruptions::empty(),
            interrupt_enable: 0,
            speed_switch_armed: false,
            double_speed: false,
            stall: 0,
            diagnostics: ArrayVec::new(),
            cgb,
        }
    }

    /// IO state left behind by the boot ROM.
    // https://gbdev.io/pandocs/Power_Up_Sequence.html#hardware-registers
    pub fn post_boot(&mut self) {
        self.timer.set_system_counter(if self.cgb {
            CGB_POST_BOOT_COUNTER
        } else {
            DMG_POST_BOOT_COUNTER
        });
        self.interrupt_flag = Interruptions::VBLANK;
        self.joypad.set_register(0xcf);
        self.write(AUDIO_MASTER_CONTROL, 0x80);
        self.write(MASTER_VOLUME_AND_VIN_PANNING, 0x77);
        self.write(SOUND_PANNING, 0xf3);
        self.write(BGP, 0xfc);
        self.write(OBP0, 0xff);
        self.write(OBP1, 0xff);
        self.write(LCD_CONTROL, 0x91);
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn is_double_speed(&self) -> bool {
        self.double_speed
    }

    pub fn pending_interrupts(&self) -> Interruptions {
        self.interrupt_flag & Interruptions::from_bits_truncate(self.interrupt_enable)
    }

    pub fn request_interrupt(&mut self, interrupt: Interruptions) {
        self.interrupt_flag |= interrupt;
    }

    pub fn acknowledge(&mut self, interrupt: Interruptions) {
        self.interrupt_flag.remove(interrupt);
    }

    /// Toggles double speed if KEY1 armed it. Returns true on a switch.
    pub fn try_speed_switch(&mut self) -> bool {
        if !self.cgb || !self.speed_switch_armed {
            return false;
        }
        self.speed_switch_armed = false;
        self.double_speed = !self.double_speed;
        log::info!(
            "switched to {} speed",
            if self.double_speed { "double" } else { "normal" }
        );
        true
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        if self.diagnostics.try_push(diagnostic).is_err() {
            log::warn!("diagnostic queue full, dropping {diagnostic:?}");
        }
    }

    pub fn take_diagnostics(&mut self) -> ArrayVec<Diagnostic, MAX_PENDING_DIAGNOSTICS> {
        core::mem::take(&mut self.diagnostics)
    }

    pub fn take_stall(&mut self) -> u32 {
        core::mem::take(&mut self.stall)
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            ..ECHO_RAM => self.memory.read(address),
            ECHO_RAM..OAM => self.memory.read(address - 0x2000),
            OAM..NOT_USABLE => {
                if self.dma.is_active() {
                    0xff
                } else {
                    self.memory.oam[usize::from(address - OAM)]
                }
            }
            NOT_USABLE..JOYPAD => 0xff,
            JOYPAD => self.joypad.get_register(),
            SB | SC => self.serial.read(address),
            DIV..=TIMER_CONTROL => self.timer.read(address),
            INTERRUPT_FLAG => self.interrupt_flag.bits() | 0b1110_0000,
            CH1_SWEEP..LCD_CONTROL => self.apu.read(address),
            DMA => self.dma.register(),
            LCD_CONTROL..=WX => self.ppu.read(address),
            KEY1 if self.cgb => {
                (u8::from(self.double_speed) << 7)
                    | u8::from(self.speed_switch_armed)
                    | 0b0111_1110
            }
            VBK if self.cgb => self.memory.vram_bank() | 0b1111_1110,
            HDMA1..=HDMA5 if self.cgb => self.ppu.hdma.read(address),
            BCPS..=OPRI => self.ppu.read(address),
            SVBK if self.cgb => self.memory.wram_bank() | 0b1111_1000,
            PCM12 if self.cgb => self.apu.pcm(false),
            PCM34 if self.cgb => self.apu.pcm(true),
            HRAM..INTERRUPT_ENABLE => self.memory.hram[usize::from(address - HRAM)],
            INTERRUPT_ENABLE => self.interrupt_enable,
            _ => 0xff,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            ..ECHO_RAM => self.memory.write(address, value),
            ECHO_RAM..OAM => self.memory.write(address - 0x2000, value),
            OAM..NOT_USABLE => {
                if !self.dma.is_active() {
                    self.memory.oam[usize::from(address - OAM)] = value
                }
            }
            NOT_USABLE..JOYPAD => {}
            JOYPAD => self.joypad.set_register(value),
            SB | SC => self.serial.write(address, value),
            DIV..=TIMER_CONTROL => {
                self.timer.write(address, value);
                if self.timer.take_interrupt() {
                    self.interrupt_flag |= Interruptions::TIMER;
                }
            }
            INTERRUPT_FLAG => self.interrupt_flag = Interruptions::from_bits_truncate(value),
            CH1_SWEEP..LCD_CONTROL => self.apu.write(address, value),
            DMA => self.dma.start(value),
            LCD_CONTROL..=WX => {
                let interrupts = self.ppu.write(address, value);
                self.interrupt_flag |= interrupts;
            }
            KEY1 if self.cgb => self.speed_switch_armed = value & 1 != 0,
            VBK => self.memory.set_vram_bank(value),
            HDMA1..=HDMA5 if self.cgb => {
                if let Some(HdmaRequest::General { blocks }) = self.ppu.hdma.write(address, value)
                {
                    self.general_dma(blocks);
                }
            }
            BCPS..=OPRI => {
                self.ppu.write(address, value);
            }
            SVBK => self.memory.set_wram_bank(value),
            HRAM..INTERRUPT_ENABLE => self.memory.hram[usize::from(address - HRAM)] = value,
            INTERRUPT_ENABLE => self.interrupt_enable = value,
            _ => {}
        }
    }

    fn copy_hdma_block(&mut self) {
        let (source, destination) = self.ppu.hdma.next_block();
        // https://gbdev.io/pandocs/CGB_Registers.html#ff51ff52--hdma1-hdma2-cgb-mode-only-vram-dma-source-high-low-w
        let from_vram = (VIDEO_RAM..EXTERNAL_RAM).contains(&source);
        if from_vram {
            self.report(Diagnostic::InvalidHdmaSource { source });
        }
        for offset in 0..BLOCK_SIZE {
            let value = if from_vram {
                0xff
            } else {
                self.read(source.wrapping_add(offset))
            };
            self.memory.write_vram(destination + offset, value);
        }
    }

    fn general_dma(&mut self, blocks: u8) {
        log::debug!(
            "general dma of {blocks} blocks from ${:04x}",
            self.ppu.hdma.source()
        );
        for _ in 0..blocks {
            self.copy_hdma_block();
        }
        self.ppu.hdma.finish_general();
        // length / 16 + 1 M-cycles
        self.stall += (u32::from(blocks) + 1) * 4;
    }

    /// Advances every component by `cycles` CPU cycles. Returns true when a frame ended.
    pub fn tick(&mut self, cycles: u32, hooks: &mut Hooks<'_>) -> bool {
        let video_cycles = if self.double_speed {
            cycles / 2
        } else {
            cycles
        };

        if self.timer.tick(cycles) {
            self.interrupt_flag |= Interruptions::TIMER;
        }
        if self.serial.tick(cycles, hooks.link) {
            self.interrupt_flag |= Interruptions::SERIAL;
        }
        for offset in self.dma.advance(cycles) {
            let value = self.memory.read(self.dma.source(offset));
            self.memory.oam[usize::from(offset)] = value;
        }

        let events = self
            .ppu
            .tick(video_cycles, &self.memory, hooks.sink, hooks.colour);
        self.interrupt_flag |= events.interrupts;
        for _ in 0..events.hblanks {
            if self.ppu.hdma.is_active() {
                self.copy_hdma_block();
                self.ppu.hdma.finish_hblank_block();
                self.stall += HBLANK_DMA_STALL;
            }
        }

        self.apu.tick(video_cycles, hooks.audio);
        events.frame_done
    }
}

impl Snapshot for Bus {
    fn save(&self, writer: &mut StateWriter) {
        self.memory.save(writer);
        self.ppu.save(writer);
        self.apu.save(writer);
        self.timer.save(writer);
        self.joypad.save(writer);
        self.serial.save(writer);
        self.dma.save(writer);
        writer.u8(self.interrupt_flag.bits());
        writer.u8(self.interrupt_enable);
        writer.bool(self.speed_switch_armed);
        writer.bool(self.double_speed);
        writer.u32(self.stall);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        self.memory.load(reader)?;
        self.ppu.load(reader)?;
        self.apu.load(reader)?;
        self.timer.load(reader)?;
        self.joypad.load(reader)?;
        self.serial.load(reader)?;
        self.dma.load(reader)?;
        self.interrupt_flag = Interruptions::from_bits_truncate(reader.u8()?);
        self.interrupt_enable = reader.u8()?;
        self.speed_switch_armed = reader.bool()?;
        self.double_speed = reader.bool()?;
        if self.double_speed && !self.cgb {
            return Err(StateError::InvalidValue("double speed on DMG"));
        }
        self.stall = reader.u32()?;
        self.diagnostics.clear();
        Ok(())
    }
}
