use arrayvec::ArrayVec;

use crate::{
    HEIGHT, WIDTH,
    bits::tile_pixel,
    memory::VRAM_BANK_SIZE,
    ppu::{LcdControl, ObjectAttribute, ObjectFlags, TileAttributes, color::Palettes},
};

pub const MAX_OBJECTS_PER_LINE: usize = 10;

/// What the background left in a column, needed to resolve sprite priority.
#[derive(Clone, Copy, Default)]
struct BackgroundPixel {
    color: u8,
    palette: u8,
    priority: bool,
}

/// Registers the renderer needs for one line.
pub struct LineContext<'a> {
    pub vram: &'a [u8],
    pub oam: &'a [u8],
    pub lcd_control: LcdControl,
    pub ly: u8,
    pub scx: u8,
    pub scy: u8,
    pub wx: u8,
    pub window_line: Option<u8>,
    pub cgb: bool,
    pub sort_by_x: bool,
}

impl LineContext<'_> {
    fn object_height(&self) -> u8 {
        if self.lcd_control.contains(LcdControl::OBJ_SIZE) {
            16
        } else {
            8
        }
    }

    fn tile_row(&self, map_base: u16, tile_x: u8, y: u8) -> (u8, u8, TileAttributes) {
        let map_index =
            usize::from(map_base - 0x8000) + usize::from(y / 8) * 32 + usize::from(tile_x & 31);
        let tile_index = self.vram[map_index];
        let attributes = if self.cgb {
            TileAttributes::from_bits_retain(self.vram[VRAM_BANK_SIZE + map_index])
        } else {
            TileAttributes::empty()
        };
        let mut row = usize::from(y % 8);
        if attributes.contains(TileAttributes::Y_FLIP) {
            row = 7 - row;
        }
        let tile_address = if self.lcd_control.contains(LcdControl::BG_AND_WINDOW_TILES) {
            usize::from(tile_index) * 16
        } else {
            // signed addressing from 0x9000
            (0x1000 + i32::from(tile_index as i8) * 16) as usize
        };
        let bank = if attributes.contains(TileAttributes::BANK) {
            VRAM_BANK_SIZE
        } else {
            0
        };
        let address = bank + tile_address + row * 2;
        (self.vram[address], self.vram[address + 1], attributes)
    }

    /// Objects hit by this line, in drawing priority order.
    pub fn objects(&self) -> ArrayVec<ObjectAttribute, MAX_OBJECTS_PER_LINE> {
        let height = self.object_height();
        let line = u16::from(self.ly) + 16;
        let mut objects: ArrayVec<(usize, ObjectAttribute), MAX_OBJECTS_PER_LINE> = self
            .oam
            .chunks_exact(4)
            .map(|chunk| ObjectAttribute::from([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .enumerate()
            .filter(|(_, object)| {
                let y = u16::from(object.y);
                y <= line && line < y + u16::from(height)
            })
            .take(MAX_OBJECTS_PER_LINE)
            .collect();
        if self.sort_by_x {
            // https://gbdev.io/pandocs/OAM.html#drawing-priority
            // Citation: the smaller the X coordinate, the higher the priority.
            // When X coordinates are identical, the object located first in OAM has higher priority.
            objects.sort_unstable_by_key(|(index, object)| (object.x, *index));
        }
        objects.into_iter().map(|(_, object)| object).collect()
    }

    fn background(&self, line: &mut [BackgroundPixel; WIDTH as usize]) -> bool {
        let mut window_drawn = false;
        if !self.cgb && !self.lcd_control.contains(LcdControl::BG_AND_WINDOW_ENABLE) {
            *line = [BackgroundPixel::default(); WIDTH as usize];
            return window_drawn;
        }

        let map = if self.lcd_control.contains(LcdControl::BG_TILE_MAP) {
            0x9c00
        } else {
            0x9800
        };
        let y = self.ly.wrapping_add(self.scy);
        let mut x = 0;
        while x < WIDTH {
            let scrolled_x = self.scx.wrapping_add(x);
            let (low, high, attributes) = self.tile_row(map, scrolled_x / 8, y);
            let mut column = scrolled_x % 8;
            while column < 8 && x < WIDTH {
                line[usize::from(x)] = Self::pixel(low, high, attributes, column);
                column += 1;
                x += 1;
            }
        }

        let Some(window_line) = self.window_line else {
            return window_drawn;
        };
        if !self.lcd_control.contains(LcdControl::WINDOW_ENABLE) || self.wx > 166 {
            return window_drawn;
        }
        let map = if self.lcd_control.contains(LcdControl::WINDOW_TILE_MAP) {
            0x9c00
        } else {
            0x9800
        };
        let start = i16::from(self.wx) - 7;
        for x in start.max(0)..i16::from(WIDTH) {
            let window_x = (x - start) as u8;
            let (low, high, attributes) = self.tile_row(map, window_x / 8, window_line);
            line[x as usize] = Self::pixel(low, high, attributes, window_x % 8);
            window_drawn = true;
        }
        window_drawn
    }

    fn pixel(low: u8, high: u8, attributes: TileAttributes, column: u8) -> BackgroundPixel {
        let column = if attributes.contains(TileAttributes::X_FLIP) {
            7 - column
        } else {
            column
        };
        BackgroundPixel {
            color: tile_pixel(low, high, column),
            palette: (attributes & TileAttributes::PALETTE).bits(),
            priority: attributes.contains(TileAttributes::PRIORITY),
        }
    }

    fn object_row(&self, object: &ObjectAttribute) -> (u8, u8) {
        let height = self.object_height();
        let mut row = self.ly.wrapping_add(16).wrapping_sub(object.y);
        if object.flags.contains(ObjectFlags::Y_FLIP) {
            row = height - 1 - row;
        }
        let tile = if height == 16 {
            object.tile_index & 0xfe
        } else {
            object.tile_index
        };
        let bank = if self.cgb && object.flags.contains(ObjectFlags::CGB_BANK) {
            VRAM_BANK_SIZE
        } else {
            0
        };
        let address = bank + usize::from(tile) * 16 + usize::from(row) * 2;
        (self.vram[address], self.vram[address + 1])
    }
}

/// Draws line `ly`. Returns true if the window covered at least one pixel.
pub fn render_line(context: &LineContext<'_>, palettes: &Palettes, row: &mut [u32]) -> bool {
    debug_assert!(context.ly < HEIGHT);
    let mut line = [BackgroundPixel::default(); WIDTH as usize];
    let window_drawn = context.background(&mut line);

    let bg_blank = !context.cgb && !context.lcd_control.contains(LcdControl::BG_AND_WINDOW_ENABLE);
    for (target, pixel) in row.iter_mut().zip(line.iter()) {
        *target = if bg_blank {
            palettes.blank()
        } else if context.cgb {
            palettes.background.host_color(pixel.palette, pixel.color)
        } else {
            palettes.bgp.host_color(pixel.color)
        };
    }

    if !context.lcd_control.contains(LcdControl::OBJ_ENABLE) {
        return window_drawn;
    }

    let objects = context.objects();
    // CGB: LCDC bit 0 clear gives objects priority over everything
    let master_priority = context.cgb && !context.lcd_control.contains(LcdControl::BG_AND_WINDOW_ENABLE);
    for x in 0..WIDTH {
        let screen_x = i16::from(x) + 8;
        for object in &objects {
            let left = i16::from(object.x);
            if screen_x < left || screen_x >= left + 8 {
                continue;
            }
            let mut column = (screen_x - left) as u8;
            if object.flags.contains(ObjectFlags::X_FLIP) {
                column = 7 - column;
            }
            let (low, high) = context.object_row(object);
            let color = tile_pixel(low, high, column);
            if color == 0 {
                continue;
            }
            // the first opaque object pixel decides, even if the background hides it
            let background = line[usize::from(x)];
            let hidden = !master_priority
                && background.color != 0
                && (object.flags.contains(ObjectFlags::PRIORITY) || (context.cgb && background.priority));
            if !hidden {
                row[usize::from(x)] = if context.cgb {
                    palettes
                        .object
                        .host_color((object.flags & ObjectFlags::CGB_PALETTE).bits(), color)
                } else {
                    let palette = usize::from(object.flags.contains(ObjectFlags::DMG_PALETTE));
                    palettes.obp[palette].host_color(color)
                };
            }
            break;
        }
    }
    window_drawn
}
