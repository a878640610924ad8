//! Filter block construction.
//!
//! Filters are sharded by *data offset*, not by key count: one filter covers
//! all keys added while data blocks were being written inside a single
//! `FILTER_BASE`-byte window of the file. A reader can then map a data
//! block's byte offset straight to the filter that covers it, without any
//! per-block bookkeeping.
//!
//! ## Block layout
//!
//! ```text
//! +--------------------------------------+
//! | filter 0                             |
//! | filter 1                             |
//! | ...                                  |
//! | filter N-1                           |
//! +--------------------------------------+
//! | offset of filter 0 (u32 LE)          |
//! | ...                                  |
//! | offset of filter N-1 (u32 LE)        |
//! +--------------------------------------+
//! | offset of the offset array (u32 LE)  |
//! | base lg (u8)                         |
//! +--------------------------------------+
//! ```

use std::sync::Arc;

use crate::encoding::put_fixed32;
use crate::filter::FilterPolicy;

/// log2 of the shard width. Readers undo the offset-to-shard mapping with
/// this byte, so it is persisted at the tail of every filter block.
pub const FILTER_BASE_LG: u8 = 11;

/// Generate a new filter every this many bytes of data section.
pub const FILTER_BASE: u64 = 1 << FILTER_BASE_LG; // 2 KiB

pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Flattened keys of the shard in progress.
    keys: Vec<u8>,
    /// Start offset into `keys` of each key.
    starts: Vec<usize>,
    /// Filters emitted so far.
    result: Vec<u8>,
    /// Offset into `result` of each shard's filter.
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            keys: Vec::new(),
            starts: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Advances shard bookkeeping to the data block starting at
    /// `block_offset`. A block spanning several shard windows produces
    /// consecutive empty-shard markers, which a reader indexing by offset
    /// depends on.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        assert!(filter_index >= self.filter_offsets.len() as u64);
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    /// Registers a key for the shard in progress.
    pub fn add_key(&mut self, key: &[u8]) {
        self.starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Emits any buffered filter, then the offset array, its start, and the
    /// base-lg byte. The slice stays valid for the builder's lifetime.
    pub fn finish(&mut self) -> &[u8] {
        if !self.starts.is_empty() {
            self.generate_filter();
        }

        // Append array of per-filter offsets.
        let array_offset = self.result.len() as u32;
        for i in 0..self.filter_offsets.len() {
            put_fixed32(&mut self.result, self.filter_offsets[i]);
        }
        put_fixed32(&mut self.result, array_offset);
        self.result.push(FILTER_BASE_LG); // Save encoding parameter in result
        &self.result
    }

    fn generate_filter(&mut self) {
        let num_keys = self.starts.len();
        if num_keys == 0 {
            // Fast path if there are no keys for this filter: an empty
            // shard marker pointing at the previous filter's end.
            self.filter_offsets.push(self.result.len() as u32);
            return;
        }

        // Make list of keys from flattened key structure.
        self.starts.push(self.keys.len()); // Simplify length computation
        let tmp_keys: Vec<&[u8]> = (0..num_keys)
            .map(|i| &self.keys[self.starts[i]..self.starts[i + 1]])
            .collect();

        // Generate filter for current set of keys and append to result.
        self.filter_offsets.push(self.result.len() as u32);
        self.policy.create_filter(&tmp_keys, &mut self.result);

        self.keys.clear();
        self.starts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BloomFilterPolicy;

    fn policy() -> Arc<dyn FilterPolicy> {
        Arc::new(BloomFilterPolicy::new(10))
    }

    /// Splits a finished filter block into (filters, offsets, base_lg).
    fn parse_filter_block(block: &[u8]) -> (Vec<Vec<u8>>, Vec<u32>, u8) {
        let base_lg = block[block.len() - 1];
        let array_offset =
            u32::from_le_bytes(block[block.len() - 5..block.len() - 1].try_into().unwrap())
                as usize;
        let offsets: Vec<u32> = block[array_offset..block.len() - 5]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let mut filters = Vec::new();
        for (i, &start) in offsets.iter().enumerate() {
            let end = offsets
                .get(i + 1)
                .map(|&o| o as usize)
                .unwrap_or(array_offset);
            filters.push(block[start as usize..end].to_vec());
        }
        (filters, offsets, base_lg)
    }

    #[test]
    fn test_empty_builder() {
        let mut builder = FilterBlockBuilder::new(policy());
        let block = builder.finish();
        // No filters: just a zero array offset and the base lg byte.
        assert_eq!(block, [0, 0, 0, 0, FILTER_BASE_LG]);
    }

    #[test]
    fn test_single_shard() {
        let mut builder = FilterBlockBuilder::new(policy());
        builder.start_block(100);
        builder.add_key(b"foo");
        builder.add_key(b"bar");
        builder.add_key(b"box");
        builder.start_block(200);
        builder.add_key(b"box");
        builder.start_block(300);
        builder.add_key(b"hello");

        let block = builder.finish().to_vec();
        let (filters, offsets, base_lg) = parse_filter_block(&block);
        assert_eq!(base_lg, FILTER_BASE_LG);
        // All three blocks start below FILTER_BASE: one shard.
        assert_eq!(offsets, vec![0]);

        let p = policy();
        for key in [b"foo".as_slice(), b"bar", b"box", b"hello"] {
            assert!(p.key_may_match(key, &filters[0]));
        }
        assert!(!p.key_may_match(b"missing", &filters[0]));
        assert!(!p.key_may_match(b"other", &filters[0]));
    }

    #[test]
    fn test_multiple_shards() {
        let mut builder = FilterBlockBuilder::new(policy());

        // First filter: shard 0.
        builder.start_block(0);
        builder.add_key(b"foo");
        builder.start_block(2000);
        builder.add_key(b"bar");

        // Second filter: shard 1 ([2048, 4096)).
        builder.start_block(3100);
        builder.add_key(b"box");

        // Third filter: shard 4 ([8192, ...)); shards 2 and 3 are empty.
        builder.start_block(9000);
        builder.add_key(b"hello");

        let block = builder.finish().to_vec();
        let (filters, offsets, _) = parse_filter_block(&block);
        assert_eq!(offsets.len(), 5);

        let p = policy();
        // Shard 0 holds "foo" and "bar" but not the later keys.
        assert!(p.key_may_match(b"foo", &filters[0]));
        assert!(p.key_may_match(b"bar", &filters[0]));
        assert!(!p.key_may_match(b"box", &filters[0]));
        assert!(!p.key_may_match(b"hello", &filters[0]));

        // Shard 1 holds only "box".
        assert!(p.key_may_match(b"box", &filters[1]));
        assert!(!p.key_may_match(b"foo", &filters[1]));

        // Shards 2 and 3 are empty markers: zero length, repeating the
        // previous offset.
        assert!(filters[2].is_empty());
        assert!(filters[3].is_empty());
        assert_eq!(offsets[2], offsets[3]);
        assert_eq!(offsets[3], offsets[4]);

        // Shard 4 holds only "hello".
        assert!(p.key_may_match(b"hello", &filters[4]));
        assert!(!p.key_may_match(b"bar", &filters[4]));
    }

    #[test]
    fn test_one_block_spanning_many_shards() {
        let mut builder = FilterBlockBuilder::new(policy());
        builder.start_block(0);
        builder.add_key(b"key");
        // The single data block was larger than four shard windows.
        builder.start_block(5 * FILTER_BASE);
        builder.add_key(b"tail");

        let block = builder.finish().to_vec();
        let (filters, offsets, _) = parse_filter_block(&block);
        assert_eq!(offsets.len(), 6);
        // One real filter, then four empty markers, then the tail filter.
        assert!(!filters[0].is_empty());
        for shard in 1..5 {
            assert!(filters[shard].is_empty());
        }
        assert!(policy().key_may_match(b"tail", &filters[5]));
    }
}
