//! Bump-pointer arena backing key/value buffers.
//!
//! The arena hands out raw pointers into large owned blocks and never frees
//! an individual allocation; everything is released when the arena is
//! dropped. Allocation is single-threaded, but [`Arena::memory_usage`] may be
//! polled concurrently from other threads.

use std::sync::atomic::{AtomicUsize, Ordering};

const BLOCK_SIZE: usize = 4096;

/// Minimum alignment for [`Arena::allocate_aligned`]: at least the pointer
/// width, never below 8.
const ALIGN: usize = {
    let ptr_size = std::mem::size_of::<*const u8>();
    if ptr_size > 8 {
        ptr_size
    } else {
        8
    }
};
const _: () = assert!(ALIGN.is_power_of_two());
const _: () = assert!(ALIGN <= std::mem::align_of::<u64>());

pub struct Arena {
    /// Allocation cursor into the current block.
    alloc_ptr: *mut u8,
    /// Bytes left in the current block.
    alloc_bytes_remaining: usize,
    /// Every block ever allocated, as u64 words so block starts satisfy
    /// ALIGN. Boxes keep their heap addresses stable, so pointers handed
    /// out stay valid while the arena is alive.
    blocks: Vec<Box<[u64]>>,
    /// Total bytes allocated, including per-block bookkeeping overhead.
    memory_usage: AtomicUsize,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            alloc_ptr: std::ptr::null_mut(),
            alloc_bytes_remaining: 0,
            blocks: Vec::new(),
            memory_usage: AtomicUsize::new(0),
        }
    }

    /// Returns a pointer to `bytes` bytes of uninitialized-but-zeroed memory.
    /// The pointer stays valid until the arena is dropped.
    pub fn allocate(&mut self, bytes: usize) -> *mut u8 {
        // The semantics of what to return for a zero-byte allocation are a
        // little messy, so we disallow them entirely.
        assert!(bytes > 0);
        if bytes <= self.alloc_bytes_remaining {
            let result = self.alloc_ptr;
            // SAFETY: alloc_ptr points into the current block and at least
            // `alloc_bytes_remaining` bytes follow it.
            self.alloc_ptr = unsafe { self.alloc_ptr.add(bytes) };
            self.alloc_bytes_remaining -= bytes;
            return result;
        }
        self.allocate_fallback(bytes)
    }

    /// As [`Arena::allocate`], but the returned pointer is aligned to
    /// `max(pointer size, 8)` bytes. Alignment padding counts as allocated.
    pub fn allocate_aligned(&mut self, bytes: usize) -> *mut u8 {
        assert!(bytes > 0);
        let current_mod = self.alloc_ptr as usize & (ALIGN - 1);
        let slop = if current_mod == 0 { 0 } else { ALIGN - current_mod };
        let needed = bytes + slop;
        let result = if needed <= self.alloc_bytes_remaining {
            // SAFETY: slop + bytes fit in the current block.
            let result = unsafe { self.alloc_ptr.add(slop) };
            self.alloc_ptr = unsafe { self.alloc_ptr.add(needed) };
            self.alloc_bytes_remaining -= needed;
            result
        } else {
            // Fresh blocks come straight from the global allocator and are
            // always aligned well past ALIGN.
            self.allocate_fallback(bytes)
        };
        assert_eq!(result as usize & (ALIGN - 1), 0);
        result
    }

    /// Total memory held by the arena. Safe to read concurrently with
    /// allocations happening on another thread.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    fn allocate_fallback(&mut self, bytes: usize) -> *mut u8 {
        if bytes > BLOCK_SIZE / 4 {
            // Allocate the object separately to avoid wasting too much
            // space in leftover bytes of the current block.
            return self.allocate_new_block(bytes);
        }

        // We waste the remaining space in the current block.
        self.alloc_ptr = self.allocate_new_block(BLOCK_SIZE);
        self.alloc_bytes_remaining = BLOCK_SIZE;

        let result = self.alloc_ptr;
        // SAFETY: the fresh block is BLOCK_SIZE bytes and bytes <= BLOCK_SIZE/4.
        self.alloc_ptr = unsafe { self.alloc_ptr.add(bytes) };
        self.alloc_bytes_remaining -= bytes;
        result
    }

    fn allocate_new_block(&mut self, block_bytes: usize) -> *mut u8 {
        let word_size = std::mem::size_of::<u64>();
        let words = (block_bytes + word_size - 1) / word_size;
        let mut block = vec![0u64; words].into_boxed_slice();
        let result = block.as_mut_ptr() as *mut u8;
        self.blocks.push(block);
        self.memory_usage.fetch_add(
            block_bytes + std::mem::size_of::<usize>(),
            Ordering::Relaxed,
        );
        result
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
