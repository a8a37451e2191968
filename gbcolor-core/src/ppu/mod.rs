pub mod color;
mod hdma;
mod renderer;

use alloc::{boxed::Box, vec};

use crate::{
    HEIGHT, WIDTH,
    error::StateError,
    memory::Memory,
    ppu::{
        color::Palettes,
        renderer::{LineContext, render_line},
    },
    registers::{
        BCPD, BCPS, BGP, Interruptions, LCD_CONTROL, LCD_STATUS, LY, LYC, LcdStatus, OBP0, OBP1,
        OCPD, OCPS, OPRI, SCX, SCY, WX, WY,
    },
    save_state::{Snapshot, StateReader, StateWriter},
};

pub use hdma::{BLOCK_SIZE, Hdma, HdmaRequest};
pub use renderer::MAX_OBJECTS_PER_LINE;

pub const SCANLINE_DURATION: u16 = 456;
pub const LINES_PER_FRAME: u8 = 154;
pub const FRAME_DURATION: u32 = SCANLINE_DURATION as u32 * LINES_PER_FRAME as u32;
const OAM_SCAN_DURATION: u16 = 80;
const DRAWING_DURATION: u16 = 172;
const OBJECT_PENALTY: u16 = 6;
const MAX_DRAWING_DURATION: u16 =
    DRAWING_DURATION + 7 + OBJECT_PENALTY * MAX_OBJECTS_PER_LINE as u16;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq, Default)]
    pub struct LcdControl: u8 {
        const LCD_PPU_ENABLE = 1 << 7;
        const WINDOW_TILE_MAP = 1 << 6;
        const WINDOW_ENABLE = 1 << 5;
        const BG_AND_WINDOW_TILES = 1 << 4;
        const BG_TILE_MAP = 1 << 3;
        const OBJ_SIZE = 1 << 2;
        const OBJ_ENABLE = 1 << 1;
        const BG_AND_WINDOW_ENABLE = 1;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Default, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u8 {
        const PRIORITY = 1 << 7;
        const Y_FLIP = 1 << 6;
        const X_FLIP = 1 << 5;
        const DMG_PALETTE = 1 << 4;
        const CGB_BANK = 1 << 3;
        const CGB_PALETTE = 0b111;
    }
}

bitflags::bitflags! {
    /// CGB background map attributes, stored in VRAM bank 1.
    #[derive(Debug, Clone, Default, Copy, PartialEq, Eq)]
    pub struct TileAttributes: u8 {
        const PRIORITY = 1 << 7;
        const Y_FLIP = 1 << 6;
        const X_FLIP = 1 << 5;
        const BANK = 1 << 3;
        const PALETTE = 0b111;
    }
}

#[derive(Clone, Copy)]
pub struct ObjectAttribute {
    y: u8,
    x: u8,
    tile_index: u8,
    flags: ObjectFlags,
}

impl From<[u8; 4]> for ObjectAttribute {
    fn from([y, x, tile_index, flags]: [u8; 4]) -> Self {
        Self {
            y,
            x,
            tile_index,
            flags: ObjectFlags::from_bits_retain(flags),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    HorizontalBlank = 0,
    VerticalBlank = 1,
    OamScan = 2,
    Drawing = 3,
}

impl Mode {
    fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::HorizontalBlank,
            1 => Self::VerticalBlank,
            2 => Self::OamScan,
            _ => Self::Drawing,
        }
    }
}

/// Where the PPU writes its pixels: `stride` words per line, 144 lines.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PixelSink {
    pixels: Box<[u32]>,
    stride: usize,
}

impl Default for PixelSink {
    fn default() -> Self {
        Self::with_stride(usize::from(WIDTH))
    }
}

impl PixelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stride below 160 is raised to 160.
    pub fn with_stride(stride: usize) -> Self {
        let stride = stride.max(usize::from(WIDTH));
        Self {
            pixels: vec![0; stride * usize::from(HEIGHT)].into_boxed_slice(),
            stride,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn row(&self, y: u8) -> &[u32] {
        let start = usize::from(y) * self.stride;
        &self.pixels[start..start + usize::from(WIDTH)]
    }

    fn row_mut(&mut self, y: u8) -> &mut [u32] {
        let start = usize::from(y) * self.stride;
        &mut self.pixels[start..start + usize::from(WIDTH)]
    }

    fn fill(&mut self, color: u32) {
        for y in 0..HEIGHT {
            self.row_mut(y).fill(color);
        }
    }

    pub fn into_pixels(self) -> Box<[u32]> {
        self.pixels
    }
}

/// What happened during [`Ppu::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuEvents {
    pub interrupts: Interruptions,
    pub frame_done: bool,
    pub hblanks: u8,
}

#[derive(Clone)]
pub struct Ppu {
    lcd_control: LcdControl,
    // writable interrupt selection bits only
    lcd_status: LcdStatus,
    mode: Mode,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    wy: u8,
    wx: u8,
    opri: u8,
    // position in the current line
    dots: u16,
    drawing_duration: u16,
    window_line: u8,
    window_triggered: bool,
    stat_line: bool,
    lcd_off_cycles: u32,
    skip_pending: bool,
    skip_current: bool,
    cgb: bool,
    pub palettes: Palettes,
    pub hdma: Hdma,
}

impl Ppu {
    pub fn new(cgb: bool, dmg_shades: [u16; 4]) -> Self {
        Self {
            lcd_control: LcdControl::empty(),
            lcd_status: LcdStatus::empty(),
            mode: Mode::HorizontalBlank,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            wy: 0,
            wx: 0,
            opri: if cgb { 0 } else { 1 },
            dots: 0,
            drawing_duration: DRAWING_DURATION,
            window_line: 0,
            window_triggered: false,
            stat_line: false,
            lcd_off_cycles: 0,
            skip_pending: false,
            skip_current: false,
            cgb,
            palettes: Palettes::new(dmg_shades),
            hdma: Hdma::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcd_control(&self) -> LcdControl {
        self.lcd_control
    }

    pub fn is_enabled(&self) -> bool {
        self.lcd_control.contains(LcdControl::LCD_PPU_ENABLE)
    }

    pub fn skip_next_frame(&mut self) {
        self.skip_pending = true;
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            LCD_CONTROL => self.lcd_control.bits(),
            LCD_STATUS => {
                let mut status = self.lcd_status;
                status.set(LcdStatus::LYC_EQUAL_TO_LY, self.ly == self.lyc);
                status.bits() | self.mode as u8 | 0b1000_0000
            }
            SCY => self.scy,
            SCX => self.scx,
            LY => self.ly,
            LYC => self.lyc,
            BGP => self.palettes.bgp.register(),
            OBP0 => self.palettes.obp[0].register(),
            OBP1 => self.palettes.obp[1].register(),
            WY => self.wy,
            WX => self.wx,
            BCPS if self.cgb => self.palettes.background.read_index(),
            BCPD if self.cgb => self.palettes.background.read_data(),
            OCPS if self.cgb => self.palettes.object.read_index(),
            OCPD if self.cgb => self.palettes.object.read_data(),
            OPRI if self.cgb => self.opri | 0xfe,
            _ => 0xff,
        }
    }

    /// Returns interrupts raised by the write (a STAT line rising edge).
    pub fn write(&mut self, address: u16, value: u8) -> Interruptions {
        match address {
            LCD_CONTROL => self.set_lcd_control(LcdControl::from_bits_retain(value)),
            // https://gbdev.io/pandocs/STAT.html#ff41--stat-lcd-status 3 last bits readonly
            LCD_STATUS => {
                self.lcd_status = LcdStatus::from_bits_truncate(value) - LcdStatus::READONLY_MASK
            }
            SCY => self.scy = value,
            SCX => self.scx = value,
            LY => {} // read only
            LYC => self.lyc = value,
            BGP => self.palettes.bgp.set_register(value),
            OBP0 => self.palettes.obp[0].set_register(value),
            OBP1 => self.palettes.obp[1].set_register(value),
            WY => self.wy = value,
            WX => self.wx = value,
            BCPS if self.cgb => self.palettes.background.write_index(value),
            BCPD if self.cgb => self.palettes.background.write_data(value),
            OCPS if self.cgb => self.palettes.object.write_index(value),
            OCPD if self.cgb => self.palettes.object.write_data(value),
            OPRI if self.cgb => self.opri = value & 1,
            _ => {}
        }
        self.update_stat_line()
    }

    fn set_lcd_control(&mut self, value: LcdControl) {
        let was_on = self.is_enabled();
        self.lcd_control = value;
        match (was_on, self.is_enabled()) {
            (true, false) => {
                log::info!("LCD off at line {}", self.ly);
                self.ly = 0;
                self.dots = 0;
                self.mode = Mode::HorizontalBlank;
                // the sink is blanked when the first LCD-off frame is reported
                self.lcd_off_cycles = 0;
            }
            (false, true) => {
                log::info!("LCD on");
                self.ly = 0;
                self.dots = 0;
                self.mode = Mode::OamScan;
                self.stat_line = false;
                self.start_frame();
                self.start_line();
            }
            _ => {}
        }
    }

    fn stat_line(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let status = self.lcd_status;
        let mode = match self.mode {
            Mode::HorizontalBlank => status.contains(LcdStatus::HBLANK_INT),
            Mode::VerticalBlank => status.contains(LcdStatus::VBLANK_INT),
            Mode::OamScan => status.contains(LcdStatus::OAM_INT),
            Mode::Drawing => false,
        };
        mode || (status.contains(LcdStatus::LYC_INT) && self.ly == self.lyc)
    }

    // rising edge described by https://raw.githubusercontent.com/geaz/emu-gameboy/master/docs/The%20Cycle-Accurate%20Game%20Boy%20Docs.pdf
    fn update_stat_line(&mut self) -> Interruptions {
        let line = self.stat_line();
        let rising = line && !self.stat_line;
        self.stat_line = line;
        if rising {
            Interruptions::LCD
        } else {
            Interruptions::empty()
        }
    }

    fn start_frame(&mut self) {
        self.window_line = 0;
        self.window_triggered = false;
        self.skip_current = core::mem::take(&mut self.skip_pending);
    }

    fn start_line(&mut self) {
        // Citation:
        // at some point in this frame the value of WY was equal to LY (checked at the start of Mode 2 only)
        self.window_triggered |= self.ly == self.wy;
    }

    fn line_context<'a>(&self, memory: &'a Memory) -> LineContext<'a> {
        LineContext {
            vram: memory.vram(),
            oam: &memory.oam,
            lcd_control: self.lcd_control,
            ly: self.ly,
            scx: self.scx,
            scy: self.scy,
            wx: self.wx,
            window_line: self.window_triggered.then_some(self.window_line),
            cgb: self.cgb,
            sort_by_x: self.opri & 1 != 0,
        }
    }

    /// Advances by `cycles` dots. Pixels of each line are written when the line leaves mode 3.
    pub fn tick(
        &mut self,
        cycles: u32,
        memory: &Memory,
        sink: &mut PixelSink,
        convert: &dyn Fn(u16) -> u32,
    ) -> PpuEvents {
        let mut events = PpuEvents::default();

        if !self.is_enabled() {
            self.lcd_off_cycles += cycles;
            if self.lcd_off_cycles >= FRAME_DURATION {
                self.lcd_off_cycles -= FRAME_DURATION;
                self.skip_current = core::mem::take(&mut self.skip_pending);
                if !self.skip_current {
                    self.palettes.refresh(self.cgb, convert);
                    sink.fill(self.palettes.blank());
                }
                events.frame_done = true;
            }
            return events;
        }

        let mut remaining = cycles;
        while remaining > 0 {
            let end = match self.mode {
                Mode::OamScan => OAM_SCAN_DURATION,
                Mode::Drawing => OAM_SCAN_DURATION + self.drawing_duration,
                Mode::HorizontalBlank | Mode::VerticalBlank => SCANLINE_DURATION,
            };
            let step = u32::from(end - self.dots).min(remaining);
            remaining -= step;
            self.dots += step as u16;
            if self.dots < end {
                break;
            }
            self.switch_mode(memory, sink, convert, &mut events);
            events.interrupts |= self.update_stat_line();
        }
        events
    }

    fn switch_mode(
        &mut self,
        memory: &Memory,
        sink: &mut PixelSink,
        convert: &dyn Fn(u16) -> u32,
        events: &mut PpuEvents,
    ) {
        match self.mode {
            Mode::OamScan => {
                let objects = if self.lcd_control.contains(LcdControl::OBJ_ENABLE) {
                    self.line_context(memory).objects().len() as u16
                } else {
                    0
                };
                self.drawing_duration =
                    DRAWING_DURATION + u16::from(self.scx % 8) + OBJECT_PENALTY * objects;
                self.mode = Mode::Drawing;
            }
            Mode::Drawing => {
                if !self.skip_current {
                    self.palettes.refresh(self.cgb, convert);
                    let context = self.line_context(memory);
                    let window_drawn = render_line(&context, &self.palettes, sink.row_mut(self.ly));
                    self.window_line += u8::from(window_drawn);
                } else if self.window_visible() {
                    self.window_line += 1;
                }
                self.mode = Mode::HorizontalBlank;
                events.hblanks += 1;
            }
            Mode::HorizontalBlank => {
                self.dots = 0;
                self.ly += 1;
                if self.ly == HEIGHT {
                    self.mode = Mode::VerticalBlank;
                    events.interrupts |= Interruptions::VBLANK;
                    events.frame_done = true;
                } else {
                    self.mode = Mode::OamScan;
                    self.start_line();
                }
            }
            Mode::VerticalBlank => {
                self.dots = 0;
                self.ly += 1;
                if self.ly == LINES_PER_FRAME {
                    self.ly = 0;
                    self.mode = Mode::OamScan;
                    self.start_frame();
                    self.start_line();
                }
            }
        }
    }

    // same condition the renderer uses, for skipped frames
    fn window_visible(&self) -> bool {
        self.window_triggered
            && self.lcd_control.contains(LcdControl::WINDOW_ENABLE)
            && (self.cgb || self.lcd_control.contains(LcdControl::BG_AND_WINDOW_ENABLE))
            && self.wx <= 166
    }
}

impl Snapshot for Ppu {
    fn save(&self, writer: &mut StateWriter) {
        writer.u8(self.lcd_control.bits());
        writer.u8(self.lcd_status.bits());
        writer.u8(self.mode as u8);
        writer.bytes(&[self.scy, self.scx, self.ly, self.lyc, self.wy, self.wx, self.opri]);
        writer.u8(self.palettes.bgp.register());
        writer.u8(self.palettes.obp[0].register());
        writer.u8(self.palettes.obp[1].register());
        writer.u16(self.dots);
        writer.u16(self.drawing_duration);
        writer.u8(self.window_line);
        writer.bool(self.window_triggered);
        writer.bool(self.stat_line);
        writer.u32(self.lcd_off_cycles);
        writer.bool(self.skip_pending);
        writer.bool(self.skip_current);
        self.palettes.background.save(writer);
        self.palettes.object.save(writer);
        self.hdma.save(writer);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut loaded = self.clone();
        loaded.lcd_control = LcdControl::from_bits_retain(reader.u8()?);
        loaded.lcd_status =
            LcdStatus::from_bits_truncate(reader.u8()?) - LcdStatus::READONLY_MASK;
        loaded.mode = Mode::from_bits(reader.u8()?);
        let mut registers = [0; 7];
        reader.bytes_into(&mut registers)?;
        [loaded.scy, loaded.scx, loaded.ly, loaded.lyc, loaded.wy, loaded.wx, loaded.opri] =
            registers;
        loaded.palettes.bgp.set_register(reader.u8()?);
        loaded.palettes.obp[0].set_register(reader.u8()?);
        loaded.palettes.obp[1].set_register(reader.u8()?);
        loaded.dots = reader.u16()?;
        loaded.drawing_duration = reader.u16()?;
        loaded.window_line = reader.u8()?;
        loaded.window_triggered = reader.bool()?;
        loaded.stat_line = reader.bool()?;
        loaded.lcd_off_cycles = reader.u32()?;
        loaded.skip_pending = reader.bool()?;
        loaded.skip_current = reader.bool()?;
        loaded.palettes.background.load(reader)?;
        loaded.palettes.object.load(reader)?;
        loaded.hdma.load(reader)?;
        loaded.check_timing()?;
        loaded.palettes.mark_dirty();
        *self = loaded;
        Ok(())
    }
}

impl Ppu {
    /// Mode, line and dot counter must describe a point `tick` can reach.
    fn check_timing(&self) -> Result<(), StateError> {
        if !(DRAWING_DURATION..=MAX_DRAWING_DURATION).contains(&self.drawing_duration) {
            return Err(StateError::InvalidValue("ppu timing"));
        }
        let visible = self.ly < HEIGHT;
        let consistent = match self.mode {
            Mode::OamScan => visible && self.dots < OAM_SCAN_DURATION,
            Mode::Drawing => {
                visible
                    && (OAM_SCAN_DURATION..OAM_SCAN_DURATION + self.drawing_duration)
                        .contains(&self.dots)
            }
            Mode::HorizontalBlank => visible && self.dots < SCANLINE_DURATION,
            Mode::VerticalBlank => {
                (HEIGHT..LINES_PER_FRAME).contains(&self.ly) && self.dots < SCANLINE_DURATION
            }
        };
        if !consistent || self.window_line > HEIGHT
            || self.lcd_off_cycles >= FRAME_DURATION
        {
            return Err(StateError::InvalidValue("ppu timing"));
        }
        Ok(())
    }
}
