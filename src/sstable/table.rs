//! Streaming construction of an immutable sorted table.
//!
//! A [`TableBuilder`] consumes a strictly increasing sequence of key/value
//! pairs and appends a self-describing table to a byte sink.
//!
//! ## Table File Layout
//!
//! ```text
//! +--------------------------+
//! | Data Block 1   | trailer |
//! +--------------------------+
//! | Data Block 2   | trailer |
//! +--------------------------+
//! | ...                      |
//! +--------------------------+
//! | Filter Block   | trailer |   (optional)
//! +--------------------------+
//! | Metaindex Block| trailer |
//! +--------------------------+
//! | Index Block    | trailer |
//! +--------------------------+
//! | Footer (48 bytes)        |
//! +--------------------------+
//! ```
//!
//! Every block trailer is 5 bytes: the compression type byte and a masked
//! CRC32C over the payload plus that byte. The footer holds the handles of
//! the metaindex and index blocks and the table magic; its distance from
//! end-of-file is the sole anchor a reader recovers the table from.

use std::io::Write;

use crate::config::{Compression, Options};
use crate::error::{Error, Result};
use crate::sstable::block::BlockBuilder;
use crate::sstable::filter_block::FilterBlockBuilder;
use crate::sstable::format::{mask_crc, BlockHandle, Footer, BLOCK_TRAILER_SIZE, CRC32C};

pub struct TableBuilder<W: Write> {
    options: Options,
    /// Append-only byte sink the table is written to.
    file: W,
    /// Bytes appended so far; the next block's starting offset.
    offset: u64,
    /// First error observed. Sticky: once set, add/flush stop touching the
    /// file and every remaining write in finish() is skipped.
    status: Result<()>,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    /// Last key passed to add(), stored in full.
    last_key: Vec<u8>,
    num_entries: u64,
    /// Either finish() or abandon() has been called.
    closed: bool,
    filter_block: Option<FilterBlockBuilder>,

    /// We do not emit the index entry for a block until we have seen the
    /// first key for the next data block. This allows us to use shorter
    /// keys in the index block. For example, consider a block boundary
    /// between the keys "the quick brown fox" and "the who": "the r" can
    /// serve as the index key, since it is >= all entries in the first
    /// block and < all entries in subsequent blocks.
    ///
    /// Invariant: pending_index_entry is true only if data_block is empty.
    pending_index_entry: bool,
    /// Handle of the most recently flushed data block.
    pending_handle: BlockHandle,

    /// Scratch buffer reused across snappy compressions.
    compressed_output: Vec<u8>,
}

impl<W: Write> TableBuilder<W> {
    pub fn new(options: Options, file: W) -> Self {
        // The index block stores coarse entries and is binary-searched, so
        // every entry is a restart.
        let index_block_options = options.clone().block_restart_interval(1);
        let mut filter_block = options
            .filter_policy
            .clone()
            .map(FilterBlockBuilder::new);
        if let Some(filter_block) = &mut filter_block {
            filter_block.start_block(0);
        }
        Self {
            data_block: BlockBuilder::new(options.clone()),
            index_block: BlockBuilder::new(index_block_options),
            options,
            file,
            offset: 0,
            status: Ok(()),
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            filter_block,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            compressed_output: Vec::new(),
        }
    }

    /// Replaces the builder's options. Fields that fix the table's on-disk
    /// identity cannot change mid-build; currently that is the comparator.
    /// A rejection is local and does not poison the builder.
    pub fn change_options(&mut self, options: Options) -> Result<()> {
        if options.comparator.name() != self.options.comparator.name() {
            return Err(Error::InvalidArgument(
                "changing comparator while building table".to_string(),
            ));
        }
        self.data_block.change_options(options.clone());
        self.index_block
            .change_options(options.clone().block_restart_interval(1));
        self.options = options;
        Ok(())
    }

    /// Appends an entry. Keys must arrive in strictly increasing comparator
    /// order; the slices are consumed during the call.
    ///
    /// REQUIRES: finish() and abandon() have not been called.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed);
        self.status.clone()?;
        if self.num_entries > 0 {
            assert!(
                self.options.comparator.compare(key, &self.last_key)
                    == std::cmp::Ordering::Greater,
                "keys must be added in strictly increasing order"
            );
        }

        if self.pending_index_entry {
            assert!(self.data_block.empty());
            self.options
                .comparator
                .find_shortest_separator(&mut self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(filter_block) = &mut self.filter_block {
            filter_block.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Forces the current data block out to the sink. Advanced clients only;
    /// add() flushes on its own once a block crosses the size threshold.
    pub fn flush(&mut self) -> Result<()> {
        assert!(!self.closed);
        self.status.clone()?;
        if self.data_block.empty() {
            return Ok(());
        }
        assert!(!self.pending_index_entry, "flush without any new entry");

        let raw = self.data_block.finish().to_vec();
        let result = self
            .write_block(raw)
            .and_then(|handle| {
                self.pending_handle = handle;
                self.pending_index_entry = true;
                self.file.flush().map_err(Error::from)
            })
            .map_err(|e| self.poison(e));
        self.data_block.reset();

        // Shard bookkeeping follows the file offset even when the sink
        // failed; the sticky status keeps any further bytes from landing.
        if let Some(filter_block) = &mut self.filter_block {
            filter_block.start_block(self.offset);
        }

        if result.is_ok() {
            tracing::debug!(
                offset = self.pending_handle.offset,
                size = self.pending_handle.size,
                "flushed data block"
            );
        }
        result
    }

    /// Compresses `raw` per the options and appends it with its trailer.
    /// Falls back to storing the raw bytes whenever compression does not
    /// save more than 12.5%.
    fn write_block(&mut self, raw: Vec<u8>) -> Result<BlockHandle> {
        let (contents, compression) = match self.options.compression {
            Compression::None => (raw, Compression::None),
            Compression::Snappy => {
                self.compressed_output
                    .resize(snap::raw::max_compress_len(raw.len()), 0);
                match snap::raw::Encoder::new().compress(&raw, &mut self.compressed_output) {
                    Ok(len) if len < raw.len() - raw.len() / 8 => {
                        self.compressed_output.truncate(len);
                        (
                            std::mem::take(&mut self.compressed_output),
                            Compression::Snappy,
                        )
                    }
                    // Compressed less than 12.5%, or snappy failed: store
                    // the uncompressed form.
                    _ => (raw, Compression::None),
                }
            }
        };

        let handle = self.write_raw_block(&contents, compression)?;
        if compression == Compression::Snappy {
            // Reclaim the scratch buffer for the next block.
            self.compressed_output = contents;
        }
        self.compressed_output.clear();
        Ok(handle)
    }

    /// Appends `contents` followed by its 5-byte trailer. The offset only
    /// advances after both appends succeed, so a failed write leaves the
    /// builder's view of the file unchanged.
    fn write_raw_block(
        &mut self,
        contents: &[u8],
        compression: Compression,
    ) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, contents.len() as u64);
        self.file.write_all(contents)?;

        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = compression.as_byte();
        let mut digest = CRC32C.digest();
        digest.update(contents);
        digest.update(&trailer[..1]); // Extend crc to cover the type byte
        trailer[1..].copy_from_slice(&mask_crc(digest.finalize()).to_le_bytes());
        self.file.write_all(&trailer)?;

        self.offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }

    /// Finishes the table: flushes pending data, then writes the filter
    /// block, the metaindex block, the index block, and the footer. No
    /// add() may follow, whatever the outcome.
    pub fn finish(&mut self) -> Result<()> {
        let _ = self.flush();
        assert!(!self.closed);
        self.closed = true;

        // Write filter block. It is indexed by raw byte ranges, so it is
        // never compressed.
        let mut filter_block_handle = None;
        if self.status.is_ok() {
            if let Some(mut filter_block) = self.filter_block.take() {
                let contents = filter_block.finish().to_vec();
                match self.write_raw_block(&contents, Compression::None) {
                    Ok(handle) => filter_block_handle = Some(handle),
                    Err(e) => {
                        self.poison(e);
                    }
                }
            }
        }

        // Write metaindex block.
        let mut metaindex_block_handle = BlockHandle::default();
        if self.status.is_ok() {
            let mut metaindex_block = BlockBuilder::new(self.options.clone());
            if let Some(handle) = filter_block_handle {
                // Map "filter.<policy name>" to the filter block's location.
                let mut key = "filter.".to_string();
                key.push_str(self.options.filter_policy.as_ref().unwrap().name());
                let mut handle_encoding = Vec::new();
                handle.encode_to(&mut handle_encoding);
                metaindex_block.add(key.as_bytes(), &handle_encoding);
            }
            let raw = metaindex_block.finish().to_vec();
            match self.write_block(raw) {
                Ok(handle) => metaindex_block_handle = handle,
                Err(e) => {
                    self.poison(e);
                }
            }
        }

        // Write index block.
        let mut index_block_handle = BlockHandle::default();
        if self.status.is_ok() {
            if self.pending_index_entry {
                self.options
                    .comparator
                    .find_short_successor(&mut self.last_key);
                let mut handle_encoding = Vec::new();
                self.pending_handle.encode_to(&mut handle_encoding);
                self.index_block.add(&self.last_key, &handle_encoding);
                self.pending_index_entry = false;
            }
            let raw = self.index_block.finish().to_vec();
            match self.write_block(raw) {
                Ok(handle) => index_block_handle = handle,
                Err(e) => {
                    self.poison(e);
                }
            }
        }

        // Write footer.
        if self.status.is_ok() {
            let footer = Footer {
                metaindex_handle: metaindex_block_handle,
                index_handle: index_block_handle,
            };
            let mut footer_encoding = Vec::new();
            footer.encode_to(&mut footer_encoding);
            match self.file.write_all(&footer_encoding).map_err(Error::from) {
                Ok(()) => self.offset += footer_encoding.len() as u64,
                Err(e) => {
                    self.poison(e);
                }
            }
        }

        if self.status.is_ok() {
            tracing::debug!(
                entries = self.num_entries,
                file_size = self.offset,
                "finished table"
            );
        }
        self.status.clone()
    }

    /// Stops building without writing any further bytes. The partially
    /// written file is the caller's to discard.
    ///
    /// REQUIRES: finish() and abandon() have not been called.
    pub fn abandon(&mut self) {
        assert!(!self.closed);
        self.closed = true;
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Size of the file generated so far. Calling after a successful
    /// finish() returns the size of the final file.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// First error this builder ran into, if any.
    pub fn status(&self) -> Result<()> {
        self.status.clone()
    }

    fn poison(&mut self, err: Error) -> Error {
        if self.status.is_ok() {
            self.status = Err(err.clone());
        }
        err
    }
}

impl<W: Write> Drop for TableBuilder<W> {
    fn drop(&mut self) {
        // Catch callers that forgot the terminal finish()/abandon() call.
        debug_assert!(
            self.closed || std::thread::panicking(),
            "TableBuilder dropped without finish() or abandon()"
        );
    }
}
