pub const ROM_BANK: u16 = 0x0000;
pub const SWITCHABLE_ROM_BANK: u16 = 0x4000;
pub const VIDEO_RAM: u16 = 0x8000;
pub const EXTERNAL_RAM: u16 = 0xa000;
pub const WORK_RAM: u16 = 0xc000;
pub const SWITCHABLE_WORK_RAM: u16 = 0xd000;
pub const ECHO_RAM: u16 = 0xe000;
pub const OAM: u16 = 0xfe00;
pub const NOT_USABLE: u16 = 0xfea0;
pub const JOYPAD: u16 = 0xff00;
pub const SB: u16 = 0xff01; // Serial transfer data
pub const SC: u16 = 0xff02; // Serial transfer control
pub const DIV: u16 = 0xff04; // Divider register (timer)
pub const TIMER_COUNTER: u16 = 0xff05; // TIMA
pub const TIMER_MODULO: u16 = 0xff06; // TMA
pub const TIMER_CONTROL: u16 = 0xff07; // TAC
pub const INTERRUPT_FLAG: u16 = 0xff0f;
pub const CH1_SWEEP: u16 = 0xff10;
pub const CH1_LENGTH_TIMER_AND_DUTY_CYCLE: u16 = 0xff11;
pub const CH1_VOLUME_AND_ENVELOPE: u16 = 0xff12;
pub const CH1_PERIOD_LOW: u16 = 0xff13;
pub const CH1_PERIOD_HIGH_AND_CONTROL: u16 = 0xff14;
pub const CH2_LENGTH_TIMER_AND_DUTY_CYCLE: u16 = 0xff16;
pub const CH2_VOLUME_AND_ENVELOPE: u16 = 0xff17;
pub const CH2_PERIOD_LOW: u16 = 0xff18;
pub const CH2_PERIOD_HIGH_AND_CONTROL: u16 = 0xff19;
pub const CH3_DAC_ENABLE: u16 = 0xff1a;
pub const CH3_LENGTH_TIMER: u16 = 0xff1b;
pub const CH3_OUTPUT_LEVEL: u16 = 0xff1c;
pub const CH3_PERIOD_LOW: u16 = 0xff1d;
pub const CH3_PERIOD_HIGH_AND_CONTROL: u16 = 0xff1e;
pub const CH4_LENGTH_TIMER: u16 = 0xff20;
pub const CH4_VOLUME_AND_ENVELOPE: u16 = 0xff21;
pub const CH4_FREQUENCY_AND_RANDOMNESS: u16 = 0xff22;
pub const CH4_CONTROL: u16 = 0xff23;
pub const MASTER_VOLUME_AND_VIN_PANNING: u16 = 0xff24;
pub const SOUND_PANNING: u16 = 0xff25;
pub const AUDIO_MASTER_CONTROL: u16 = 0xff26;
pub const WAVE: u16 = 0xff30;
pub const LCD_CONTROL: u16 = 0xff40;
pub const LCD_STATUS: u16 = 0xff41;
pub const SCY: u16 = 0xff42;
pub const SCX: u16 = 0xff43;
pub const LY: u16 = 0xff44; // LCD Y
pub const LYC: u16 = 0xff45; // LY compare
pub const DMA: u16 = 0xff46;
pub const BGP: u16 = 0xff47;
pub const OBP0: u16 = 0xff48;
pub const OBP1: u16 = 0xff49;
pub const WY: u16 = 0xff4a;
pub const WX: u16 = 0xff4b;
// CGB only
pub const KEY1: u16 = 0xff4d; // Prepare speed switch
pub const VBK: u16 = 0xff4f; // VRAM bank
pub const BOOT_ROM_MAPPING_CONTROL: u16 = 0xff50;
pub const HDMA1: u16 = 0xff51;
pub const HDMA2: u16 = 0xff52;
pub const HDMA3: u16 = 0xff53;
pub const HDMA4: u16 = 0xff54;
pub const HDMA5: u16 = 0xff55;
pub const RP: u16 = 0xff56; // Infrared port
pub const BCPS: u16 = 0xff68;
pub const BCPD: u16 = 0xff69;
pub const OCPS: u16 = 0xff6a;
pub const OCPD: u16 = 0xff6b;
pub const OPRI: u16 = 0xff6c; // Object priority mode
pub const SVBK: u16 = 0xff70; // WRAM bank
pub const UNDOCUMENTED_72: u16 = 0xff72;
pub const UNDOCUMENTED_73: u16 = 0xff73;
pub const UNDOCUMENTED_74: u16 = 0xff74;
pub const UNDOCUMENTED_75: u16 = 0xff75;
pub const PCM12: u16 = 0xff76;
pub const PCM34: u16 = 0xff77;
pub const HRAM: u16 = 0xff80;
pub const INTERRUPT_ENABLE: u16 = 0xffff;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq, Default)]
    pub struct SerialControl: u8 {
        const TRANSFER_ENABLE = 1 << 7;
        const CLOCK_SPEED = 1 << 1;
        const CLOCK_SELECT = 1;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy,  PartialEq, Eq, Default)]
    pub struct LcdStatus: u8 {
        const LYC_INT = 1 << 6;
        const OAM_INT = 1 << 5;
        const VBLANK_INT = 1 << 4;
        const HBLANK_INT = 1 << 3;
        const LYC_EQUAL_TO_LY = 1 << 2;
        const PPU_MASK = 0b11;
        const READONLY_MASK = 0b111;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Default, Copy, PartialEq, Eq)]
    pub struct Interruptions: u8 {
        const VBLANK = 1;
        const LCD = 1 << 1;
        const TIMER = 1 << 2;
        const SERIAL = 1 << 3;
        const JOYPAD = 1 << 4;
    }
}

impl Interruptions {
    /// Highest priority pending interrupt, VBlank first.
    pub fn highest_priority(self) -> Option<Self> {
        self.iter().next()
    }

    pub fn vector(self) -> u16 {
        match self {
            Self::VBLANK => 0x40,
            Self::LCD => 0x48,
            Self::TIMER => 0x50,
            Self::SERIAL => 0x58,
            Self::JOYPAD => 0x60,
            _ => 0x00,
        }
    }
}
