use alloc::{boxed::Box, vec};

use crate::{
    cartridge::{Cartridge, Mapping, RamMapping},
    error::StateError,
    save_state::{Snapshot, StateReader, StateWriter},
};

pub const VRAM_BANK_SIZE: usize = 0x2000;
pub const WRAM_BANK_SIZE: usize = 0x1000;
pub const OAM_SIZE: usize = 0xa0;
pub const HRAM_SIZE: usize = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Rom,
    Vram,
    Wram,
    CartRam,
    Nibbles,
    Rtc,
    Unmapped,
    // echo tail, OAM, IO and HRAM are routed by the bus
    High,
}

/// One 4 KiB slot of the address space: `base + (address & mask)` inside `region`.
#[derive(Debug, Clone, Copy)]
struct Page {
    region: Region,
    base: usize,
    mask: u16,
}

impl Page {
    const fn new(region: Region, base: usize, mask: u16) -> Self {
        Self { region, base, mask }
    }

    fn offset(self, address: u16) -> usize {
        self.base + usize::from(address & self.mask)
    }
}

/// The cartridge plus every RAM the CPU can reach, with a page table rebuilt on each bank switch.
#[derive(Clone)]
pub struct Memory {
    cartridge: Cartridge,
    vram: Box<[u8]>,
    wram: Box<[u8]>,
    pub oam: [u8; OAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    vram_bank: u8,
    wram_bank: u8,
    cgb: bool,
    pages: [Page; 16],
}

impl Memory {
    pub fn new(cartridge: Cartridge, cgb: bool) -> Self {
        let mut memory = Self {
            cartridge,
            vram: vec![0; 2 * VRAM_BANK_SIZE].into_boxed_slice(),
            wram: vec![0; 8 * WRAM_BANK_SIZE].into_boxed_slice(),
            oam: [0; OAM_SIZE],
            hram: [0; HRAM_SIZE],
            vram_bank: 0,
            wram_bank: 1,
            cgb,
            pages: [Page::new(Region::Unmapped, 0, 0); 16],
        };
        memory.remap();
        memory
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cartridge
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    /// Both VRAM banks, bank 1 starting at 0x2000.
    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn vram_bank(&self) -> u8 {
        self.vram_bank
    }

    pub fn set_vram_bank(&mut self, value: u8) {
        if self.cgb {
            self.vram_bank = value & 1;
            self.remap();
        }
    }

    pub fn wram_bank(&self) -> u8 {
        self.wram_bank
    }

    pub fn set_wram_bank(&mut self, value: u8) {
        if self.cgb {
            self.wram_bank = (value & 0x07).max(1);
            self.remap();
        }
    }

    /// Writes straight into the current VRAM bank, used by HDMA.
    pub fn write_vram(&mut self, address: u16, value: u8) {
        let offset = usize::from(self.vram_bank) * VRAM_BANK_SIZE + usize::from(address & 0x1fff);
        self.vram[offset] = value;
    }

    pub fn remap(&mut self) {
        let low = self.cartridge.low_rom();
        let high = self.cartridge.high_rom();
        let rom = |Mapping { base, mask }: Mapping| Page::new(Region::Rom, base, mask);
        for page in 0x0..0x4 {
            self.pages[page] = rom(low);
        }
        for page in 0x4..0x8 {
            self.pages[page] = rom(high);
        }

        let vram = Page::new(
            Region::Vram,
            usize::from(self.vram_bank) * VRAM_BANK_SIZE,
            0x1fff,
        );
        self.pages[0x8] = vram;
        self.pages[0x9] = vram;

        let cart_ram = match self.cartridge.resolve_ram_bank() {
            RamMapping::Unmapped => Page::new(Region::Unmapped, 0, 0),
            RamMapping::Ram(Mapping { base, mask }) => Page::new(Region::CartRam, base, mask),
            RamMapping::Nibbles(Mapping { base, mask }) => Page::new(Region::Nibbles, base, mask),
            RamMapping::Rtc => Page::new(Region::Rtc, 0, 0),
        };
        self.pages[0xa] = cart_ram;
        self.pages[0xb] = cart_ram;

        let wram_low = Page::new(Region::Wram, 0, 0x0fff);
        self.pages[0xc] = wram_low;
        self.pages[0xd] = Page::new(
            Region::Wram,
            usize::from(self.wram_bank) * WRAM_BANK_SIZE,
            0x0fff,
        );
        self.pages[0xe] = wram_low;
        self.pages[0xf] = Page::new(Region::High, 0, 0);
    }

    /// Reads 0x0000-0xefff. Anything above belongs to the bus.
    pub fn read(&self, address: u16) -> u8 {
        let page = self.pages[usize::from(address >> 12)];
        match page.region {
            Region::Rom => self
                .cartridge
                .rom()
                .get(page.offset(address))
                .copied()
                .unwrap_or(0xff),
            Region::Vram => self.vram[page.offset(address)],
            Region::Wram => self.wram[page.offset(address)],
            Region::CartRam => self.cartridge.ram()[page.offset(address)],
            Region::Nibbles => self.cartridge.ram()[page.offset(address)] | 0xf0,
            Region::Rtc => self.cartridge.read_rtc(),
            Region::Unmapped | Region::High => 0xff,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        let page = self.pages[usize::from(address >> 12)];
        match page.region {
            Region::Rom => {
                if self.cartridge.write_register(address, value) {
                    log::debug!("bank switch: ${address:04x} <- 0x{value:02x}");
                    self.remap();
                }
            }
            Region::Vram => self.vram[page.offset(address)] = value,
            Region::Wram => self.wram[page.offset(address)] = value,
            Region::CartRam => self.cartridge.ram_mut()[page.offset(address)] = value,
            Region::Nibbles => self.cartridge.ram_mut()[page.offset(address)] = value | 0xf0,
            Region::Rtc => self.cartridge.write_rtc(value),
            Region::Unmapped => {
                log::warn!("write to unmapped cartridge RAM ${address:04x}");
            }
            Region::High => {}
        }
    }

    pub fn tick_rtc_frame(&mut self) {
        self.cartridge.tick_frame();
    }
}

impl Snapshot for Memory {
    fn save(&self, writer: &mut StateWriter) {
        writer.bytes(&self.vram);
        writer.bytes(&self.wram);
        writer.bytes(&self.oam);
        writer.bytes(&self.hram);
        writer.u8(self.vram_bank);
        writer.u8(self.wram_bank);
        self.cartridge.save(writer);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        reader.bytes_into(&mut self.vram)?;
        reader.bytes_into(&mut self.wram)?;
        reader.bytes_into(&mut self.oam)?;
        reader.bytes_into(&mut self.hram)?;
        let vram_bank = reader.u8()?;
        let wram_bank = reader.u8()?;
        let valid = if self.cgb {
            vram_bank <= 1 && (1..=7).contains(&wram_bank)
        } else {
            // DMG has no bank registers
            vram_bank == 0 && wram_bank == 1
        };
        if !valid {
            return Err(StateError::InvalidValue("memory bank"));
        }
        self.vram_bank = vram_bank;
        self.wram_bank = wram_bank;
        self.cartridge.load(reader)?;
        self.remap();
        Ok(())
    }
}
