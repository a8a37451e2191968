// Small helpers shared by every register implementation.

#[inline]
pub const fn bit(value: u8, index: u8) -> bool {
    (value >> index) & 1 != 0
}

#[inline]
pub const fn with_bit(value: u8, index: u8, set: bool) -> u8 {
    (value & !(1 << index)) | ((set as u8) << index)
}

/// Extracts the inclusive bit range `high..=low` shifted down to bit 0.
#[inline]
pub const fn bit_range(value: u8, high: u8, low: u8) -> u8 {
    (value >> low) & (0xff >> (7 - (high - low)))
}

#[inline]
pub const fn sign_extend(value: u8) -> u16 {
    value as i8 as i16 as u16
}

#[inline]
pub const fn join(msb: u8, lsb: u8) -> u16 {
    u16::from_be_bytes([msb, lsb])
}

#[inline]
pub const fn split(value: u16) -> (u8, u8) {
    let [msb, lsb] = value.to_be_bytes();
    (msb, lsb)
}

// Tile rows are stored as two bitplanes, leftmost pixel in bit 7.
#[inline]
pub const fn tile_pixel(low: u8, high: u8, x: u8) -> u8 {
    let shift = 7 - x;
    (((high >> shift) & 1) << 1) | ((low >> shift) & 1)
}
