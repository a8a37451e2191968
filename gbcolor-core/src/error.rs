use core::fmt;

use crate::System;

/// Why a byte buffer is not a usable cartridge image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    TooSmall { len: usize },
    HeaderChecksum { expected: u8, computed: u8 },
    UnknownCartridgeType(u8),
    InvalidRomSize(u8),
    InvalidRamSize(u8),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall { len } => write!(f, "rom is too small ({len} bytes, need 0x150)"),
            Self::HeaderChecksum { expected, computed } => write!(
                f,
                "header checksum mismatch: header says 0x{expected:02x}, computed 0x{computed:02x}"
            ),
            Self::UnknownCartridgeType(value) => write!(f, "unknown cartridge type 0x{value:02x}"),
            Self::InvalidRomSize(value) => write!(f, "invalid rom size code 0x{value:02x}"),
            Self::InvalidRamSize(value) => write!(f, "invalid ram size code 0x{value:02x}"),
        }
    }
}

impl core::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    InvalidRom(ParseError),
    RomTruncated { declared: usize, actual: usize },
    UnsupportedSystem { cgb_only: bool, forced: System },
}

impl From<ParseError> for LoadError {
    fn from(value: ParseError) -> Self {
        Self::InvalidRom(value)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRom(error) => write!(f, "invalid rom: {error}"),
            Self::RomTruncated { declared, actual } => write!(
                f,
                "rom is truncated: header declares {declared} bytes, got {actual}"
            ),
            Self::UnsupportedSystem { cgb_only, forced } => {
                if *cgb_only {
                    write!(f, "rom needs a Game Boy Color but {forced:?} is forced")
                } else {
                    write!(f, "rom does not support the Game Boy Color but {forced:?} is forced")
                }
            }
        }
    }
}

impl core::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::InvalidRom(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    NoCartridge,
    Truncated,
    BadMagic,
    UnsupportedVersion(u16),
    SizeMismatch { expected: usize, actual: usize },
    CartridgeMismatch,
    InvalidValue(&'static str),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCartridge => write!(f, "no cartridge is loaded"),
            Self::Truncated => write!(f, "save state is truncated"),
            Self::BadMagic => write!(f, "not a save state"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported save state version {version}")
            }
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "save state size mismatch: expected {expected} bytes, got {actual}"
            ),
            Self::CartridgeMismatch => write!(f, "save state belongs to another cartridge"),
            Self::InvalidValue(field) => write!(f, "invalid value for {field}"),
        }
    }
}

impl core::error::Error for StateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SramSizeMismatch {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for SramSizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "save ram size mismatch: cartridge has {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

impl core::error::Error for SramSizeMismatch {}

/// Faults met while running. They never stop the emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    UnknownInstruction { opcode: u8, cb_prefix: bool, pc: u16 },
    InvalidHdmaSource { source: u16 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownInstruction {
                opcode,
                cb_prefix,
                pc,
            } => {
                let prefix = if *cb_prefix { "0xcb " } else { "" };
                write!(f, "unknown instruction {prefix}0x{opcode:02x} at ${pc:04x}")
            }
            Self::InvalidHdmaSource { source } => {
                write!(f, "hdma source ${source:04x} is not readable")
            }
        }
    }
}
