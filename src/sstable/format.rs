//! On-disk framing shared by every block in a table: handles, trailers,
//! the footer, and the masked CRC that guards each block.

use byteorder::{ByteOrder, LittleEndian};
use crc::{Crc, CRC_32_ISCSI};

use crate::encoding::{get_varint64, put_fixed64, put_varint64};
use crate::error::{Error, Result};

/// CRC32C (Castagnoli), the polynomial every block trailer is checked with.
pub const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Every block is followed by a 5-byte trailer: a compression type byte and
/// a masked CRC32C (fixed32 LE) covering the payload plus the type byte.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Maximum encoded length of a [`BlockHandle`]: two varint64s.
pub const MAX_ENCODED_HANDLE: usize = 10 + 10;

/// The footer occupies exactly this many bytes at the end of every table:
/// two block handles padded to their maximum length, then the magic number.
pub const FOOTER_SIZE: usize = 2 * MAX_ENCODED_HANDLE + 8;

/// Identifies the table format; the ASCII bytes "EMBERDB1" as a u64,
/// written fixed64 little-endian as the last eight bytes of the file.
/// Readers must verify an exact match.
pub const TABLE_MAGIC: u64 = 0x454d_4245_5244_4231;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Masks a CRC so that a CRC computed over bytes that themselves contain an
/// embedded CRC does not collide with it.
pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask_crc`].
pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// Locates a block's payload inside the file: its starting offset and its
/// length excluding the trailer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Appends the handle as two varint64s.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Decodes a handle from the front of `input`, advancing past the
    /// consumed bytes.
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        let offset = get_varint64(input)
            .ok_or_else(|| Error::Corruption("bad block handle".to_string()))?;
        let size = get_varint64(input)
            .ok_or_else(|| Error::Corruption("bad block handle".to_string()))?;
        Ok(Self { offset, size })
    }
}

/// The fixed-size record at the tail of every table, pointing at the
/// metaindex and index blocks. Its distance from end-of-file is the only
/// thing a reader can rely on when opening a table.
#[derive(Clone, Copy, Debug, Default)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Appends exactly [`FOOTER_SIZE`] bytes to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let start = dst.len();
        self.metaindex_handle.encode_to(dst);
        self.index_handle.encode_to(dst);
        dst.resize(start + 2 * MAX_ENCODED_HANDLE, 0); // Padding
        put_fixed64(dst, TABLE_MAGIC);
        debug_assert_eq!(dst.len(), start + FOOTER_SIZE);
    }

    /// Decodes a footer from exactly [`FOOTER_SIZE`] bytes.
    pub fn decode_from(input: &[u8]) -> Result<Self> {
        if input.len() < FOOTER_SIZE {
            return Err(Error::Corruption("footer too short".to_string()));
        }
        let magic = LittleEndian::read_u64(&input[FOOTER_SIZE - 8..FOOTER_SIZE]);
        if magic != TABLE_MAGIC {
            return Err(Error::Corruption("bad table magic number".to_string()));
        }
        let mut handles = &input[..2 * MAX_ENCODED_HANDLE];
        let metaindex_handle = BlockHandle::decode_from(&mut handles)?;
        let index_handle = BlockHandle::decode_from(&mut handles)?;
        Ok(Self {
            metaindex_handle,
            index_handle,
        })
    }
}
