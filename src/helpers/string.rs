//! Little-endian scalar reads over record payload slices.

/// Reads an f64 from the first 8 bytes of a slice.
#[inline]
pub(crate) fn le_f64(s: &[u8]) -> f64 {
    f64::from_le_bytes(s[..8].try_into().expect("f64"))
}

/// Reads a u32 from the first 4 bytes of a slice.
#[inline]
pub(crate) fn le_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes(s[..4].try_into().expect("u32"))
}

/// Reads a u16 from the first 2 bytes of a slice.
#[inline]
pub(crate) fn le_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes(s[..2].try_into().expect("u16"))
}

/// Reads a u32 and widens it to usize.
#[inline]
pub(crate) fn le_usize(s: &[u8]) -> usize {
    le_u32(s) as usize
}
