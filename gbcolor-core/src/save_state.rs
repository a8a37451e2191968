//! Versioned binary snapshot of the whole machine.
//!
//! Layout: `b"GBCS"`, format version (u16), total length (u32), cartridge header checksum (u8),
//! cartridge global checksum (u16), then one section per component in a fixed order. Every
//! multi-byte integer is little-endian and booleans take one byte. The ROM is not included.

use alloc::vec::Vec;

use crate::error::StateError;

pub const MAGIC: [u8; 4] = *b"GBCS";
pub const VERSION: u16 = 1;
pub(crate) const HEADER_LEN: usize = 4 + 2 + 4 + 1 + 2;

/// An opaque save state produced by [`crate::Emulator::save_state`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SaveState(Vec<u8>);

impl SaveState {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Wraps bytes read back by the caller. Validation happens on load.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SaveState {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

/// Components that can write themselves into a save state and read themselves back.
pub trait Snapshot {
    fn save(&self, writer: &mut StateWriter);
    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError>;
}

#[derive(Default)]
pub struct StateWriter {
    buffer: Vec<u8>,
}

impl StateWriter {
    pub(crate) fn with_header(header_checksum: u8, global_checksum: u16) -> Self {
        let mut writer = Self::default();
        writer.bytes(&MAGIC);
        writer.u16(VERSION);
        // patched by finish
        writer.u32(0);
        writer.u8(header_checksum);
        writer.u16(global_checksum);
        writer
    }

    pub(crate) fn finish(mut self) -> SaveState {
        let len = u32::try_from(self.buffer.len()).unwrap_or(u32::MAX);
        self.buffer[6..10].copy_from_slice(&len.to_le_bytes());
        SaveState(self.buffer)
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    pub fn u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes(&mut self, value: &[u8]) {
        self.buffer.extend_from_slice(value);
    }
}

pub struct StateReader<'a> {
    data: &'a [u8],
}

impl<'a> StateReader<'a> {
    /// Checks the header and returns a reader positioned on the first section.
    pub(crate) fn open(
        data: &'a [u8],
        header_checksum: u8,
        global_checksum: u16,
    ) -> Result<Self, StateError> {
        let mut reader = Self { data };
        let mut magic = [0; 4];
        reader.bytes_into(&mut magic)?;
        if magic != MAGIC {
            return Err(StateError::BadMagic);
        }
        let version = reader.u16()?;
        if version != VERSION {
            return Err(StateError::UnsupportedVersion(version));
        }
        let len = reader.u32()? as usize;
        if len != data.len() {
            return Err(StateError::SizeMismatch {
                expected: len,
                actual: data.len(),
            });
        }
        if reader.u8()? != header_checksum || reader.u16()? != global_checksum {
            return Err(StateError::CartridgeMismatch);
        }
        Ok(reader)
    }

    /// A reader over a bare section, without header.
    #[cfg(test)]
    pub(crate) fn section(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], StateError> {
        let (head, tail) = self
            .data
            .split_first_chunk::<N>()
            .ok_or(StateError::Truncated)?;
        self.data = tail;
        Ok(*head)
    }

    pub fn u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool, StateError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(StateError::InvalidValue("boolean")),
        }
    }

    pub fn u16(&mut self) -> Result<u16, StateError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn i16(&mut self) -> Result<i16, StateError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> Result<u32, StateError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn u64(&mut self) -> Result<u64, StateError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    pub fn bytes_into(&mut self, buffer: &mut [u8]) -> Result<(), StateError> {
        if self.data.len() < buffer.len() {
            return Err(StateError::Truncated);
        }
        let (head, tail) = self.data.split_at(buffer.len());
        buffer.copy_from_slice(head);
        self.data = tail;
        Ok(())
    }
}
