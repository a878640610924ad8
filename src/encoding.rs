//! Wire-format integer primitives shared by the table writer.
//!
//! All fixed-width integers are little-endian. Varints are standard
//! base-128 with the high bit of each byte as the continuation flag.

use byteorder::{LittleEndian, WriteBytesExt};

/// Appends `value` as a fixed-width little-endian u32.
pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    dst.write_u32::<LittleEndian>(value).unwrap();
}

/// Appends `value` as a fixed-width little-endian u64.
pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    dst.write_u64::<LittleEndian>(value).unwrap();
}

/// Appends `value` as a varint32 (1..=5 bytes).
pub fn put_varint32(dst: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Appends `value` as a varint64 (1..=10 bytes).
pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Decodes a varint32 from the front of `input`, advancing it past the
/// consumed bytes. Returns `None` on truncated or overlong input.
pub fn get_varint32(input: &mut &[u8]) -> Option<u32> {
    let mut result: u32 = 0;
    for shift in (0..35).step_by(7) {
        let (&byte, rest) = input.split_first()?;
        *input = rest;
        if byte & 0x80 != 0 {
            result |= ((byte & 0x7f) as u32) << shift;
        } else {
            result |= (byte as u32) << shift;
            return Some(result);
        }
    }
    None
}

/// Decodes a varint64 from the front of `input`, advancing it past the
/// consumed bytes. Returns `None` on truncated or overlong input.
pub fn get_varint64(input: &mut &[u8]) -> Option<u64> {
    let mut result: u64 = 0;
    for shift in (0..70).step_by(7) {
        let (&byte, rest) = input.split_first()?;
        *input = rest;
        if byte & 0x80 != 0 {
            result |= ((byte & 0x7f) as u64) << shift;
        } else {
            result |= (byte as u64) << shift;
            return Some(result);
        }
    }
    None
}
