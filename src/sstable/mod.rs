//! Immutable sorted-table (SSTable) construction.
//!
//! An SSTable is the on-disk storage format of the LSM-tree: an immutable
//! file of sorted key-value pairs. This module builds them; it never reads
//! them back. A table is composed of:
//!
//! 1.  **Data blocks:** variable-sized blocks of prefix-compressed key-value
//!     pairs with restart points for in-block binary search ([`block`]).
//!
//! 2.  **Filter block:** an optional block of bloom filters sharded by data
//!     offset, letting a reader skip blocks that cannot contain a key
//!     ([`filter_block`]).
//!
//! 3.  **Metaindex block:** maps meta-block names (currently only
//!     `"filter.<policy>"`) to their handles.
//!
//! 4.  **Index block:** one entry per data block, keyed by a short separator
//!     between that block's last key and the next block's first key.
//!
//! 5.  **Footer:** a fixed 48-byte record holding the metaindex and index
//!     handles plus the table magic ([`format`]).
//!
//! [`table::TableBuilder`] streams entries through the block builders and
//! stitches the file together.

pub mod block;
pub mod filter_block;
pub mod format;
pub mod table;

pub use block::BlockBuilder;
pub use filter_block::{FilterBlockBuilder, FILTER_BASE, FILTER_BASE_LG};
pub use format::{BlockHandle, Footer, BLOCK_TRAILER_SIZE, FOOTER_SIZE, TABLE_MAGIC};
pub use table::TableBuilder;
