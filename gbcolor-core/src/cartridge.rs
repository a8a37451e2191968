use alloc::{boxed::Box, rc::Rc, vec, vec::Vec};
use arrayvec::ArrayString;

use crate::{
    error::{ParseError, SramSizeMismatch, StateError},
    mbc::{Mbc, Mbc0, Mbc1, Mbc2, Mbc3, Mbc5, RamAccess, RtcRegisters},
    save_state::{Snapshot, StateReader, StateWriter},
};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
pub const MBC2_RAM_SIZE: usize = 0x200;

const HEADER_END: usize = 0x150;
const TITLE: usize = 0x134;
const CGB_FLAG: usize = 0x143;
const CARTRIDGE_TYPE: usize = 0x147;
const ROM_SIZE: usize = 0x148;
const RAM_SIZE: usize = 0x149;
const HEADER_CHECKSUM: usize = 0x14d;
const GLOBAL_CHECKSUM: usize = 0x14e;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CartridgeFlags: u8 {
        const RAM = 1;
        const BATTERY = 1 << 1;
        const RTC = 1 << 2;
        const RUMBLE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcVariant {
    Mbc0,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgbSupport {
    None,
    Supported,
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbcEntry {
    pub variant: MbcVariant,
    pub flags: CartridgeFlags,
}

/// Cartridge type byte to controller, indexed by header byte 0x147.
pub static MBC_TABLE: [Option<MbcEntry>; 256] = build_mbc_table();

const fn build_mbc_table() -> [Option<MbcEntry>; 256] {
    let mut table = [None; 256];
    let mut cartridge_type = 0;
    while cartridge_type < table.len() {
        table[cartridge_type] = classify(cartridge_type as u8);
        cartridge_type += 1;
    }
    table
}

// https://gbdev.io/pandocs/The_Cartridge_Header.html#0147--cartridge-type
const fn classify(cartridge_type: u8) -> Option<MbcEntry> {
    use MbcVariant::*;
    const RAM: u8 = CartridgeFlags::RAM.bits();
    const BATTERY: u8 = CartridgeFlags::BATTERY.bits();
    const RTC: u8 = CartridgeFlags::RTC.bits();
    const RUMBLE: u8 = CartridgeFlags::RUMBLE.bits();

    let (variant, flags) = match cartridge_type {
        0x00 => (Mbc0, 0),
        0x08 => (Mbc0, RAM),
        0x09 => (Mbc0, RAM | BATTERY),
        0x01 => (Mbc1, 0),
        0x02 => (Mbc1, RAM),
        0x03 => (Mbc1, RAM | BATTERY),
        // the 512 half-bytes are built into the controller
        0x05 => (Mbc2, RAM),
        0x06 => (Mbc2, RAM | BATTERY),
        0x0f => (Mbc3, RTC | BATTERY),
        0x10 => (Mbc3, RTC | RAM | BATTERY),
        0x11 => (Mbc3, 0),
        0x12 => (Mbc3, RAM),
        0x13 => (Mbc3, RAM | BATTERY),
        0x19 => (Mbc5, 0),
        0x1a => (Mbc5, RAM),
        0x1b => (Mbc5, RAM | BATTERY),
        0x1c => (Mbc5, RUMBLE),
        0x1d => (Mbc5, RUMBLE | RAM),
        0x1e => (Mbc5, RUMBLE | RAM | BATTERY),
        _ => return None,
    };
    Some(MbcEntry {
        variant,
        flags: CartridgeFlags::from_bits_retain(flags),
    })
}

/// What the header says about a cartridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeInfo {
    pub title: ArrayString<16>,
    pub cartridge_type: u8,
    pub mbc: MbcVariant,
    pub flags: CartridgeFlags,
    pub cgb: CgbSupport,
    pub rom_size: usize,
    pub ram_size: usize,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl CartridgeInfo {
    pub fn has_battery(&self) -> bool {
        self.flags.contains(CartridgeFlags::BATTERY)
    }

    pub fn has_rtc(&self) -> bool {
        self.flags.contains(CartridgeFlags::RTC)
    }

    pub fn has_rumble(&self) -> bool {
        self.flags.contains(CartridgeFlags::RUMBLE)
    }

    pub fn rom_banks(&self) -> usize {
        self.rom_size / ROM_BANK_SIZE
    }
}

pub fn header_checksum(rom: &[u8]) -> u8 {
    rom[TITLE..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |x, byte| x.wrapping_sub(*byte).wrapping_sub(1))
}

// https://gbdev.io/pandocs/The_Cartridge_Header.html#0149--ram-size
fn ram_size(code: u8) -> Option<usize> {
    Some(match code {
        0 => 0,
        1 => 0x800,
        2 => 0x2000,
        3 => 0x8000,
        4 => 0x20000,
        5 => 0x10000,
        _ => return None,
    })
}

fn title(rom: &[u8], cgb: CgbSupport) -> ArrayString<16> {
    let len = if cgb == CgbSupport::None { 16 } else { 15 };
    let mut title = ArrayString::new();
    for &byte in rom[TITLE..TITLE + len].iter().take_while(|byte| **byte != 0) {
        if byte.is_ascii_graphic() || byte == b' ' {
            title.push(char::from(byte));
        }
    }
    title
}

/// Parses and validates the header of a ROM image.
pub fn get_rom_info(rom: &[u8]) -> Result<CartridgeInfo, ParseError> {
    if rom.len() < HEADER_END {
        return Err(ParseError::TooSmall { len: rom.len() });
    }

    let cartridge_type = rom[CARTRIDGE_TYPE];
    let entry =
        MBC_TABLE[usize::from(cartridge_type)].ok_or(ParseError::UnknownCartridgeType(cartridge_type))?;

    let rom_code = rom[ROM_SIZE];
    if rom_code > 8 {
        return Err(ParseError::InvalidRomSize(rom_code));
    }
    let rom_size = 0x8000 << rom_code;

    let ram_code = rom[RAM_SIZE];
    let declared_ram = ram_size(ram_code).ok_or(ParseError::InvalidRamSize(ram_code))?;
    let ram_size = match entry.variant {
        MbcVariant::Mbc2 => MBC2_RAM_SIZE,
        _ if entry.flags.contains(CartridgeFlags::RAM) => declared_ram,
        _ => 0,
    };

    let computed = header_checksum(rom);
    let expected = rom[HEADER_CHECKSUM];
    if computed != expected {
        return Err(ParseError::HeaderChecksum { expected, computed });
    }

    let cgb = match rom[CGB_FLAG] {
        flag if flag & 0xc0 == 0xc0 => CgbSupport::Only,
        flag if flag & 0x80 != 0 => CgbSupport::Supported,
        _ => CgbSupport::None,
    };

    Ok(CartridgeInfo {
        title: title(rom, cgb),
        cartridge_type,
        mbc: entry.variant,
        flags: entry.flags,
        cgb,
        rom_size,
        ram_size,
        header_checksum: expected,
        global_checksum: u16::from_be_bytes([rom[GLOBAL_CHECKSUM], rom[GLOBAL_CHECKSUM + 1]]),
    })
}

/// A window into ROM or cartridge RAM: `base + (address & mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub base: usize,
    pub mask: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamMapping {
    Unmapped,
    Ram(Mapping),
    /// MBC2 half-bytes, upper nibble reads as 1s.
    Nibbles(Mapping),
    Rtc,
}

/// A loaded cartridge: the ROM image, its RAM and the controller deciding what is visible.
#[derive(Clone)]
pub struct Cartridge {
    info: CartridgeInfo,
    rom: Rc<[u8]>,
    ram: Vec<u8>,
    mbc: Box<dyn Mbc>,
}

impl Cartridge {
    /// The ROM must already be validated by [`get_rom_info`].
    pub fn new(info: CartridgeInfo, rom: &[u8]) -> Self {
        let mbc: Box<dyn Mbc> = match info.mbc {
            MbcVariant::Mbc0 => Box::new(Mbc0),
            MbcVariant::Mbc1 => Box::new(Mbc1::new()),
            MbcVariant::Mbc2 => Box::new(Mbc2::default()),
            MbcVariant::Mbc3 => Box::new(Mbc3::new(info.has_rtc())),
            MbcVariant::Mbc5 => Box::new(Mbc5::new(info.has_rumble())),
        };
        // MBC2 cells keep their upper nibble set
        let fill = if info.mbc == MbcVariant::Mbc2 { 0xff } else { 0x00 };
        log::info!(
            "cartridge \"{}\": {:?} {:?}, {} KiB ROM, {} bytes RAM",
            info.title,
            info.mbc,
            info.flags,
            info.rom_size / 1024,
            info.ram_size
        );
        Self {
            ram: vec![fill; info.ram_size],
            rom: Rc::from(rom),
            mbc,
            info,
        }
    }

    pub fn info(&self) -> &CartridgeInfo {
        &self.info
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn set_ram(&mut self, ram: &[u8]) -> Result<(), SramSizeMismatch> {
        if ram.len() != self.ram.len() {
            return Err(SramSizeMismatch {
                expected: self.ram.len(),
                actual: ram.len(),
            });
        }
        self.ram.copy_from_slice(ram);
        Ok(())
    }

    /// Returns true when the banks visible to the CPU changed.
    pub fn write_register(&mut self, address: u16, value: u8) -> bool {
        self.mbc.write_register(address, value)
    }

    /// Offset and mask of a 16 KiB ROM bank, wrapped to the real ROM size.
    pub fn resolve_rom_bank(&self, bank: usize) -> Mapping {
        let banks = (self.rom.len() / ROM_BANK_SIZE).max(1);
        Mapping {
            base: (bank % banks) * ROM_BANK_SIZE,
            mask: (ROM_BANK_SIZE - 1) as u16,
        }
    }

    pub fn low_rom(&self) -> Mapping {
        self.resolve_rom_bank(self.mbc.rom_bank_low())
    }

    pub fn high_rom(&self) -> Mapping {
        self.resolve_rom_bank(self.mbc.rom_bank_high())
    }

    pub fn resolve_ram_bank(&self) -> RamMapping {
        match self.mbc.ram_access() {
            RamAccess::Disabled => RamMapping::Unmapped,
            RamAccess::Rtc => RamMapping::Rtc,
            RamAccess::Nibbles => RamMapping::Nibbles(Mapping {
                base: 0,
                mask: (MBC2_RAM_SIZE - 1) as u16,
            }),
            RamAccess::Bank(_) if self.ram.is_empty() => RamMapping::Unmapped,
            RamAccess::Bank(bank) => {
                let window = self.ram.len().min(RAM_BANK_SIZE);
                let banks = (self.ram.len() / RAM_BANK_SIZE).max(1);
                RamMapping::Ram(Mapping {
                    base: (bank % banks) * RAM_BANK_SIZE,
                    mask: (window - 1) as u16,
                })
            }
        }
    }

    pub fn read_rtc(&self) -> u8 {
        self.mbc.read_rtc()
    }

    pub fn write_rtc(&mut self, value: u8) {
        self.mbc.write_rtc(value);
    }

    pub fn tick_frame(&mut self) {
        self.mbc.tick_frame();
    }

    pub fn rtc(&self) -> Option<RtcRegisters> {
        self.mbc.rtc()
    }

    pub fn set_rtc(&mut self, registers: RtcRegisters) -> bool {
        self.mbc.set_rtc(registers)
    }

    pub fn rumble(&self) -> bool {
        self.mbc.rumble()
    }
}

impl Snapshot for Cartridge {
    fn save(&self, writer: &mut StateWriter) {
        writer.u32(self.ram.len() as u32);
        writer.bytes(&self.ram);
        self.mbc.save(writer);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        let len = reader.u32()? as usize;
        if len != self.ram.len() {
            return Err(StateError::SizeMismatch {
                expected: self.ram.len(),
                actual: len,
            });
        }
        reader.bytes_into(&mut self.ram)?;
        self.mbc.load(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(cartridge_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0; 0x8000 << rom_code.min(8)];
        rom[TITLE..TITLE + 5].copy_from_slice(b"HELLO");
        rom[CARTRIDGE_TYPE] = cartridge_type;
        rom[ROM_SIZE] = rom_code;
        rom[RAM_SIZE] = ram_code;
        rom[HEADER_CHECKSUM] = header_checksum(&rom);
        rom
    }

    #[test]
    fn too_small() {
        assert_eq!(
            Err(ParseError::TooSmall { len: 0x14f }),
            get_rom_info(&[0; 0x14f])
        );
    }

    #[test]
    fn unknown_type() {
        assert_eq!(
            Err(ParseError::UnknownCartridgeType(0xfc)),
            get_rom_info(&rom(0xfc, 0, 0))
        );
    }

    #[test]
    fn bad_sizes() {
        assert_eq!(
            Err(ParseError::InvalidRamSize(7)),
            get_rom_info(&rom(0x03, 0, 7))
        );
        let mut image = rom(0x00, 0, 0);
        image[ROM_SIZE] = 9;
        assert_eq!(Err(ParseError::InvalidRomSize(9)), get_rom_info(&image));
    }

    #[test]
    fn checksum_mismatch() {
        let mut image = rom(0x00, 0, 0);
        image[HEADER_CHECKSUM] ^= 1;
        assert!(matches!(
            get_rom_info(&image),
            Err(ParseError::HeaderChecksum { .. })
        ));
    }

    #[test]
    fn parses_header() {
        let mut image = rom(0x10, 2, 3);
        image[CGB_FLAG] = 0x80;
        image[HEADER_CHECKSUM] = header_checksum(&image);
        let info = get_rom_info(&image).unwrap();
        assert_eq!("HELLO", info.title.as_str());
        assert_eq!(MbcVariant::Mbc3, info.mbc);
        assert!(info.has_rtc() && info.has_battery());
        assert_eq!(CgbSupport::Supported, info.cgb);
        assert_eq!(0x20000, info.rom_size);
        assert_eq!(8, info.rom_banks());
        assert_eq!(0x8000, info.ram_size);
    }

    #[test]
    fn mbc2_has_builtin_ram() {
        let info = get_rom_info(&rom(0x06, 1, 0)).unwrap();
        assert_eq!(MBC2_RAM_SIZE, info.ram_size);
    }

    #[test]
    fn ram_flag_decides_size() {
        // a plain MBC1 ignores a declared RAM size
        assert_eq!(0, get_rom_info(&rom(0x01, 0, 2)).unwrap().ram_size);
    }

    #[test]
    fn table_lookup() {
        assert_eq!(MbcVariant::Mbc5, MBC_TABLE[0x1e].unwrap().variant);
        assert!(MBC_TABLE[0x1e].unwrap().flags.contains(CartridgeFlags::RUMBLE));
        assert_eq!(None, MBC_TABLE[0x04]);
        assert_eq!(MbcVariant::Mbc0, MBC_TABLE[0x09].unwrap().variant);
    }

    #[test]
    fn sram_size_is_checked() {
        let image = rom(0x03, 1, 2);
        let mut cartridge = Cartridge::new(get_rom_info(&image).unwrap(), &image);
        assert_eq!(
            Err(SramSizeMismatch {
                expected: 0x2000,
                actual: 3
            }),
            cartridge.set_ram(&[1, 2, 3])
        );
        assert!(cartridge.set_ram(&[7; 0x2000]).is_ok());
        assert_eq!(7, cartridge.ram()[0x1fff]);
    }

    #[test]
    fn small_ram_is_mirrored() {
        let image = rom(0x03, 1, 1);
        let mut cartridge = Cartridge::new(get_rom_info(&image).unwrap(), &image);
        cartridge.write_register(0x0000, 0x0a);
        assert_eq!(
            RamMapping::Ram(Mapping {
                base: 0,
                mask: 0x7ff
            }),
            cartridge.resolve_ram_bank()
        );
    }
}
