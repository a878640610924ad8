//! Filter policies for skipping data-block reads.
//!
//! A [`FilterPolicy`] summarizes a set of keys into a compact byte string
//! that can later answer "was this key possibly in the set?". The built-in
//! [`BloomFilterPolicy`] is a standard bloom filter using double hashing.

/// Summarizes key sets into filters and answers membership probes against
/// them. The policy's [`name`](FilterPolicy::name) is persisted with every
/// table; change it whenever the filter encoding changes incompatibly, so
/// old filters are never fed to a new decoder.
pub trait FilterPolicy: Send + Sync {
    /// The name of this policy.
    fn name(&self) -> &'static str;

    /// Appends a filter summarizing `keys` to `dst`. The initial contents of
    /// `dst` must be preserved.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// Returns true if `key` may have been in the set a preceding
    /// `create_filter` call summarized into `filter`. False positives are
    /// allowed, false negatives are not.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Bloom filter with a configurable number of bits per key. Roughly 10 bits
/// per key yields a ~1% false positive rate.
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    /// Number of probes per key, derived from bits_per_key.
    k: usize,
}

impl BloomFilterPolicy {
    pub fn new(bits_per_key: usize) -> Self {
        // ln(2) factor minimizes the false positive rate for a given size.
        let k = (bits_per_key as f64 * 0.69) as usize;
        Self {
            bits_per_key,
            k: k.clamp(1, 30),
        }
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "emberdb.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // Compute bloom filter size (in both bits and bytes).
        let mut bits = keys.len() * self.bits_per_key;

        // For small n, we can see a very high false positive rate.
        // Fix it by enforcing a minimum bloom filter length.
        if bits < 64 {
            bits = 64;
        }

        let bytes = (bits + 7) / 8;
        let bits = bytes * 8;

        let init_size = dst.len();
        dst.resize(init_size + bytes, 0);
        dst.push(self.k as u8); // Remember # of probes in filter
        let array = &mut dst[init_size..init_size + bytes];
        for key in keys {
            // Use double-hashing to generate a sequence of hash values.
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bit_pos = (h as usize) % bits;
                array[bit_pos / 8] |= 1 << (bit_pos % 8);
                h = h.wrapping_add(delta);
            }
        }
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        let len = filter.len();
        if len < 2 {
            return false;
        }

        let bits = (len - 1) * 8;

        // Use the encoded k so we can read filters generated by bloom
        // filters created using different parameters.
        let k = filter[len - 1] as usize;
        if k > 30 {
            // Reserved for potentially new encodings for short bloom
            // filters. Consider it a match.
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bit_pos = (h as usize) % bits;
            if filter[bit_pos / 8] & (1 << (bit_pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

fn bloom_hash(key: &[u8]) -> u32 {
    hash(key, 0xbc9f1d34)
}

/// Murmur-style 32-bit hash over a byte string.
fn hash(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0xc6a4a793;
    const R: u32 = 24;
    let mut h = seed ^ (data.len() as u32).wrapping_mul(M);

    // Pick up four bytes at a time.
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let w = u32::from_le_bytes(chunk.try_into().unwrap());
        h = h.wrapping_add(w);
        h = h.wrapping_mul(M);
        h ^= h >> 16;
    }

    // Pick up the remaining bytes.
    let rest = chunks.remainder();
    if rest.len() >= 3 {
        h = h.wrapping_add((rest[2] as u32) << 16);
    }
    if rest.len() >= 2 {
        h = h.wrapping_add((rest[1] as u32) << 8);
    }
    if !rest.is_empty() {
        h = h.wrapping_add(rest[0] as u32);
        h = h.wrapping_mul(M);
        h ^= h >> R;
    }
    h
}
