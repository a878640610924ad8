use std::fmt;
use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter::FilterPolicy;

/// Block compression codecs. The discriminant is the on-disk type byte in
/// every block trailer, so readers must support whatever the writer emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Snappy = 1,
}

impl Compression {
    /// The trailer type byte for this codec.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Options controlling how a table is built.
#[derive(Clone)]
pub struct Options {
    /// Total order over keys. Readers must open the table with the same
    /// comparator.
    pub comparator: Arc<dyn Comparator>,

    /// Optional policy for the table's filter block. None disables filters.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Compression applied to data, index, and metaindex blocks.
    pub compression: Compression,

    /// Target uncompressed size of a data block before it is flushed
    /// (default: 4096). A block may exceed this by one entry.
    pub block_size: usize,

    /// Number of entries between restart points in a data block
    /// (default: 16). Index blocks always use 1.
    pub block_restart_interval: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            filter_policy: None,
            compression: Compression::None,
            block_size: 4096,
            block_restart_interval: 16,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key comparator
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Set the filter policy
    pub fn filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    /// Set block compression
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the target data-block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the restart cadence inside data blocks
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.name()))
            .field("compression", &self.compression)
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .finish()
    }
}
