//! Prefix-compressed block construction.
//!
//! A block stores sorted key/value entries where each key drops the prefix
//! it shares with the previous key. Once every `block_restart_interval`
//! entries the full key is stored instead; these "restart points" let a
//! reader binary-search the block without decoding it front to back.
//!
//! ## Entry encoding
//!
//! ```text
//! +------------------+----------------------+-------------------+
//! | shared: varint32 | non_shared: varint32 | val_len: varint32 |
//! +------------------+----------------------+-------------------+
//! | key[shared..]: non_shared bytes | value: val_len bytes      |
//! +--------------------------------------------------------------+
//! ```
//!
//! `shared == 0` at every restart point. The block ends with the restart
//! offsets and their count, each a fixed32 LE:
//!
//! ```text
//! | restarts: u32 x num_restarts | num_restarts: u32 |
//! ```

use crate::config::Options;
use crate::encoding::{put_fixed32, put_varint32};

pub struct BlockBuilder {
    options: Options,
    /// Destination buffer.
    buffer: Vec<u8>,
    /// Offsets of restart points.
    restarts: Vec<u32>,
    /// Number of entries emitted since the last restart.
    counter: usize,
    /// Has finish() been called?
    finished: bool,
    /// Last key added, stored in full.
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(options: Options) -> Self {
        assert!(options.block_restart_interval >= 1);
        Self {
            options,
            buffer: Vec::new(),
            restarts: vec![0], // First restart point is at offset 0
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Resets the contents as if the builder was just constructed.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Swaps in new options. Takes effect from the next entry; the restart
    /// already in progress keeps its original cadence until it completes.
    pub(crate) fn change_options(&mut self, options: Options) {
        assert!(options.block_restart_interval >= 1);
        self.options = options;
    }

    /// Appends an entry.
    ///
    /// REQUIRES: `finish()` has not been called since the last `reset()`.
    /// REQUIRES: `key` is larger than any previously added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished);
        assert!(self.counter <= self.options.block_restart_interval);
        assert!(
            self.buffer.is_empty() // No entries yet?
                || self.options.comparator.compare(key, &self.last_key) == std::cmp::Ordering::Greater
        );

        let mut shared = 0;
        if self.counter < self.options.block_restart_interval {
            // See how much sharing to do with the previous key.
            let min_length = self.last_key.len().min(key.len());
            while shared < min_length && self.last_key[shared] == key[shared] {
                shared += 1;
            }
        } else {
            // Restart compression: this entry stores the full key.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        // Add "<shared><non_shared><value_len>" followed by the key tail
        // and the value.
        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        // Update state. Only the tail past the shared prefix changed.
        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Appends the restart array and returns the block contents. The slice
    /// stays valid until `reset()` is called.
    pub fn finish(&mut self) -> &[u8] {
        for i in 0..self.restarts.len() {
            put_fixed32(&mut self.buffer, self.restarts[i]);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// The exact size of the block `finish()` would produce right now.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() // Raw data buffer
            + self.restarts.len() * std::mem::size_of::<u32>() // Restart array
            + std::mem::size_of::<u32>() // Restart array length
    }

    /// True iff no entries have been added since the last `reset()`.
    pub fn empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::get_varint32;

    /// Decodes a finished block back into its entries, checking restart
    /// bookkeeping along the way. Returns (entries, restarts).
    fn decode_block(block: &[u8]) -> (Vec<(Vec<u8>, Vec<u8>)>, Vec<u32>) {
        let num_restarts =
            u32::from_le_bytes(block[block.len() - 4..].try_into().unwrap()) as usize;
        let restarts_offset = block.len() - 4 - num_restarts * 4;
        let restarts: Vec<u32> = block[restarts_offset..block.len() - 4]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let mut entries = Vec::new();
        let mut last_key: Vec<u8> = Vec::new();
        let mut input = &block[..restarts_offset];
        let mut pos = 0u32;
        while !input.is_empty() {
            let entry_start = pos;
            let before = input.len();
            let shared = get_varint32(&mut input).unwrap() as usize;
            let non_shared = get_varint32(&mut input).unwrap() as usize;
            let value_len = get_varint32(&mut input).unwrap() as usize;

            // Restart points store the full key.
            if restarts.contains(&entry_start) {
                assert_eq!(shared, 0, "restart entry at {entry_start} must not share");
            }

            let mut key = last_key[..shared].to_vec();
            key.extend_from_slice(&input[..non_shared]);
            let value = input[non_shared..non_shared + value_len].to_vec();
            input = &input[non_shared + value_len..];
            pos += (before - input.len()) as u32;

            last_key = key.clone();
            entries.push((key, value));
        }
        (entries, restarts)
    }

    fn build(interval: usize, entries: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut builder =
            BlockBuilder::new(Options::default().block_restart_interval(interval));
        for (key, value) in entries {
            builder.add(key, value);
        }
        builder.finish().to_vec()
    }

    #[test]
    fn test_empty_block() {
        let block = build(16, &[]);
        // Just the restart array: one restart at offset 0, count 1.
        assert_eq!(block, [0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_prefix_compression_roundtrip() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
            .map(|i| {
                (
                    format!("key{i:06}").into_bytes(),
                    format!("value{i}").into_bytes(),
                )
            })
            .collect();
        let refs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let block = build(16, &refs);

        let (decoded, restarts) = decode_block(&block);
        assert_eq!(decoded, entries);
        // 100 entries at interval 16: restarts at entries 0, 16, ... 96.
        assert_eq!(restarts.len(), 7);
        assert_eq!(restarts[0], 0);
    }

    #[test]
    fn test_restart_interval_two() {
        let block = build(2, &[(b"a", b"1"), (b"ab", b"2"), (b"ac", b"3")]);
        let (decoded, restarts) = decode_block(&block);

        assert_eq!(
            decoded,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"ab".to_vec(), b"2".to_vec()),
                (b"ac".to_vec(), b"3".to_vec()),
            ]
        );
        // Entries 0 and 2 are restarts; entry 2 stores "ac" in full.
        assert_eq!(restarts.len(), 2);

        // shared lengths are 0, 1, 0: "a" full, "b" after sharing "a",
        // then a restart with the full "ac".
        let mut input = &block[..];
        let shared0 = get_varint32(&mut input).unwrap();
        assert_eq!(shared0, 0);
        let non_shared0 = get_varint32(&mut input).unwrap();
        let value0 = get_varint32(&mut input).unwrap();
        input = &input[(non_shared0 + value0) as usize..];
        let shared1 = get_varint32(&mut input).unwrap();
        assert_eq!(shared1, 1);
        let non_shared1 = get_varint32(&mut input).unwrap();
        let value1 = get_varint32(&mut input).unwrap();
        input = &input[(non_shared1 + value1) as usize..];
        let shared2 = get_varint32(&mut input).unwrap();
        assert_eq!(shared2, 0);
    }

    #[test]
    fn test_size_estimate_is_exact() {
        let mut builder = BlockBuilder::new(Options::default().block_restart_interval(3));
        assert_eq!(builder.current_size_estimate(), 8);
        for i in 0..50 {
            builder.add(format!("key{i:04}").as_bytes(), b"value");
        }
        let estimate = builder.current_size_estimate();
        assert_eq!(builder.finish().len(), estimate);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut builder = BlockBuilder::new(Options::default());
        builder.add(b"zebra", b"1");
        builder.finish();
        builder.reset();

        assert!(builder.empty());
        // A key smaller than the pre-reset one must be accepted again.
        builder.add(b"aardvark", b"2");
        let (decoded, _) = decode_block(&builder.finish().to_vec());
        assert_eq!(decoded[0].0, b"aardvark");
    }

    #[test]
    fn test_empty_key_and_value() {
        let block = build(16, &[(b"", b""), (b"a", b"")]);
        let (decoded, _) = decode_block(&block);
        assert_eq!(decoded[0], (Vec::new(), Vec::new()));
        assert_eq!(decoded[1], (b"a".to_vec(), Vec::new()));
    }

    #[test]
    #[should_panic]
    fn test_out_of_order_key_panics() {
        let mut builder = BlockBuilder::new(Options::default());
        builder.add(b"b", b"1");
        builder.add(b"a", b"2");
    }

    #[test]
    #[should_panic]
    fn test_duplicate_key_panics() {
        let mut builder = BlockBuilder::new(Options::default());
        builder.add(b"a", b"1");
        builder.add(b"a", b"2");
    }
}
