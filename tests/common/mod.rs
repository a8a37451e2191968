#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use gbcolor_core::{Config, Emulator, StereoSample};

pub const ENTRY: u16 = 0x0150;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles a cartridge image in memory. Code is placed with [`RomBuilder::at`] and
/// [`RomBuilder::code`]; the header checksum is fixed up by [`RomBuilder::build`].
pub struct RomBuilder {
    rom: Vec<u8>,
    cursor: usize,
}

impl RomBuilder {
    pub fn new(cartridge_type: u8) -> Self {
        let mut rom = vec![0; 0x8000];
        rom[0x134..0x138].copy_from_slice(b"TEST");
        rom[0x147] = cartridge_type;
        // NOP ; JP $0150
        rom[0x100..0x104].copy_from_slice(&[0x00, 0xc3, 0x50, 0x01]);
        Self {
            rom,
            cursor: usize::from(ENTRY),
        }
    }

    pub fn title(mut self, title: &[u8]) -> Self {
        self.rom[0x134..0x144].fill(0);
        self.rom[0x134..0x134 + title.len()].copy_from_slice(title);
        self
    }

    pub fn cgb_flag(mut self, flag: u8) -> Self {
        self.rom[0x143] = flag;
        self
    }

    /// ROM size code, the image grows to match.
    pub fn rom_size(mut self, code: u8) -> Self {
        self.rom[0x148] = code;
        self.rom.resize(0x8000 << code, 0);
        self
    }

    pub fn ram_size(mut self, code: u8) -> Self {
        self.rom[0x149] = code;
        self
    }

    pub fn at(mut self, address: usize) -> Self {
        self.cursor = address;
        self
    }

    pub fn code(mut self, bytes: &[u8]) -> Self {
        self.rom[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let checksum = self.rom[0x134..0x14d]
            .iter()
            .fold(0u8, |x, byte| x.wrapping_sub(*byte).wrapping_sub(1));
        self.rom[0x14d] = checksum;
        self.rom
    }
}

/// `program` placed at the entry point of a plain 32 KiB ROM.
pub fn program_rom(program: &[u8]) -> Vec<u8> {
    RomBuilder::new(0x00).code(program).build()
}

pub fn emulator(rom: &[u8]) -> Emulator {
    emulator_with(rom, Config::default())
}

pub fn emulator_with(rom: &[u8], config: Config) -> Emulator {
    init_logger();
    let mut emulator = Emulator::new(config);
    emulator.load_rom(rom).unwrap();
    emulator
}

/// Collects every sample buffer the emulator hands out.
pub fn record_audio(emulator: &mut Emulator) -> Rc<RefCell<Vec<StereoSample>>> {
    let samples = Rc::new(RefCell::new(Vec::new()));
    let sink = samples.clone();
    emulator.set_audio_callback(move |buffer| sink.borrow_mut().extend_from_slice(buffer));
    samples
}

pub fn read(emulator: &Emulator, address: u16) -> u8 {
    emulator.bus().unwrap().read(address)
}

// FNV-1a
pub fn hash_pixels(pixels: &[u32], hash: u64) -> u64 {
    pixels
        .iter()
        .flat_map(|pixel| pixel.to_le_bytes())
        .fold(hash, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

pub const HASH_SEED: u64 = 0xcbf2_9ce4_8422_2325;

/// Fills VRAM forever with DIV xor P1 while channel 1 plays a tone. What ends up on
/// screen depends on timing and on the buttons held.
pub const NOISY_PROGRAM: &[u8] = &[
    0x3e, 0x80, // LD A,$80
    0xe0, 0x11, // LDH (NR11),A
    0x3e, 0xf0, // LD A,$f0
    0xe0, 0x12, // LDH (NR12),A
    0x3e, 0x00, // LD A,$00
    0xe0, 0x13, // LDH (NR13),A
    0x3e, 0x87, // LD A,$87
    0xe0, 0x14, // LDH (NR14),A
    0x3e, 0x10, // LD A,$10 (select buttons)
    0xe0, 0x00, // LDH (P1),A
    0x21, 0x00, 0x80, // LD HL,$8000
    // loop: $0167
    0xf0, 0x00, // LDH A,(P1)
    0x47, // LD B,A
    0xf0, 0x04, // LDH A,(DIV)
    0xa8, // XOR B
    0x22, // LD (HL+),A
    0x7c, // LD A,H
    0xfe, 0xa0, // CP $a0
    0x20, 0xf4, // JR NZ,loop
    0x26, 0x80, // LD H,$80
    0x18, 0xf0, // JR loop
];
