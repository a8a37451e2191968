use crate::{
    error::StateError,
    save_state::{StateReader, StateWriter},
};

/// Default colour conversion: RGB555 (red in the low bits) to `0x00RRGGBB`.
pub fn rgb555_to_rgb888(color: u16) -> u32 {
    let expand = |channel: u16| {
        let channel = u32::from(channel & 0x1f);
        (channel << 3) | (channel >> 2)
    };
    expand(color) << 16 | expand(color >> 5) << 8 | expand(color >> 10)
}

/// Greyscale shades, lightest first.
pub const DMG_SHADES: [u16; 4] = [0x7fff, 0x56b5, 0x294a, 0x0000];

const WHITE: [u8; 2] = [0xff, 0x7f];

/// 8 palettes of 4 RGB555 colours written through an index register (BCPS/OCPS).
#[derive(Clone)]
pub struct PaletteRam {
    data: [u8; 64],
    index: u8,
    auto_increment: bool,
    cache: [[u32; 4]; 8],
    // one bit per palette
    dirty: u8,
}

impl Default for PaletteRam {
    fn default() -> Self {
        let mut data = [0; 64];
        for color in data.chunks_exact_mut(2) {
            color.copy_from_slice(&WHITE);
        }
        Self {
            data,
            index: 0,
            auto_increment: false,
            cache: [[0; 4]; 8],
            dirty: 0xff,
        }
    }
}

impl PaletteRam {
    pub fn read_index(&self) -> u8 {
        (u8::from(self.auto_increment) << 7) | 0x40 | self.index
    }

    pub fn write_index(&mut self, value: u8) {
        self.auto_increment = value & 0x80 != 0;
        self.index = value & 0x3f;
    }

    pub fn read_data(&self) -> u8 {
        self.data[usize::from(self.index)]
    }

    pub fn write_data(&mut self, value: u8) {
        self.data[usize::from(self.index)] = value;
        self.dirty |= 1 << (self.index / 8);
        if self.auto_increment {
            self.index = (self.index + 1) & 0x3f;
        }
    }

    pub fn rgb555(&self, palette: u8, color: u8) -> u16 {
        let offset = usize::from(palette & 7) * 8 + usize::from(color & 3) * 2;
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Recomputes host colours of the palettes written since the last call.
    pub fn refresh(&mut self, convert: &dyn Fn(u16) -> u32) {
        if self.dirty == 0 {
            return;
        }
        for palette in 0..8u8 {
            if self.dirty & (1 << palette) == 0 {
                continue;
            }
            for color in 0..4u8 {
                self.cache[usize::from(palette)][usize::from(color)] =
                    convert(self.rgb555(palette, color));
            }
        }
        self.dirty = 0;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = 0xff;
    }

    pub fn host_color(&self, palette: u8, color: u8) -> u32 {
        self.cache[usize::from(palette & 7)][usize::from(color & 3)]
    }

    pub fn save(&self, writer: &mut StateWriter) {
        writer.bytes(&self.data);
        writer.u8(self.index);
        writer.bool(self.auto_increment);
    }

    pub fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        reader.bytes_into(&mut self.data)?;
        self.index = reader.u8()? & 0x3f;
        self.auto_increment = reader.bool()?;
        self.mark_dirty();
        Ok(())
    }
}

/// BGP, OBP0 or OBP1 resolved through the configured shades.
#[derive(Clone)]
pub struct DmgPalette {
    register: u8,
    cache: [u32; 4],
    dirty: bool,
}

impl DmgPalette {
    pub fn new(register: u8) -> Self {
        Self {
            register,
            cache: [0; 4],
            dirty: true,
        }
    }

    pub fn register(&self) -> u8 {
        self.register
    }

    pub fn set_register(&mut self, value: u8) {
        self.dirty |= value != self.register;
        self.register = value;
    }

    pub fn shade(&self, color: u8) -> u8 {
        (self.register >> ((color & 3) * 2)) & 0b11
    }

    pub fn refresh(&mut self, shades: &[u16; 4], convert: &dyn Fn(u16) -> u32) {
        if !self.dirty {
            return;
        }
        for color in 0..4u8 {
            self.cache[usize::from(color)] = convert(shades[usize::from(self.shade(color))]);
        }
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn host_color(&self, color: u8) -> u32 {
        self.cache[usize::from(color & 3)]
    }
}

#[derive(Clone)]
pub struct Palettes {
    pub background: PaletteRam,
    pub object: PaletteRam,
    pub bgp: DmgPalette,
    pub obp: [DmgPalette; 2],
    shades: [u16; 4],
    blank: u32,
}

impl Palettes {
    pub fn new(shades: [u16; 4]) -> Self {
        Self {
            background: PaletteRam::default(),
            object: PaletteRam::default(),
            bgp: DmgPalette::new(0xfc),
            obp: [DmgPalette::new(0xff), DmgPalette::new(0xff)],
            shades,
            blank: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.background.mark_dirty();
        self.object.mark_dirty();
        self.bgp.mark_dirty();
        self.obp[0].mark_dirty();
        self.obp[1].mark_dirty();
    }

    pub fn refresh(&mut self, cgb: bool, convert: &dyn Fn(u16) -> u32) {
        if cgb {
            self.background.refresh(convert);
            self.object.refresh(convert);
            self.blank = convert(0x7fff);
        } else {
            self.bgp.refresh(&self.shades, convert);
            self.obp[0].refresh(&self.shades, convert);
            self.obp[1].refresh(&self.shades, convert);
            self.blank = convert(self.shades[0]);
        }
    }

    /// Colour of a disabled screen or blanked background.
    pub fn blank(&self) -> u32 {
        self.blank
    }
}
