//! Probabilistic membership filter: "is this key in the file?"
//!
//! - If any probed bit is 0 the key is DEFINITELY NOT in the file.
//! - If all probed bits are 1 the key is PROBABLY in the file.
//!
//! Point lookups consult the filter before touching the disk, so a lookup
//! for a key the table never held costs no I/O at all. False positives only
//! cost a wasted scan; false negatives never happen.
//!
//! The filter is not persisted. [`crate::SSTable::open`] repopulates it by
//! scanning the file, which keeps the in-memory state and the on-disk keys
//! consistent by construction.

use crc32fast::Hasher as Crc32;

/// Default filter width in bits.
pub const DEFAULT_FILTER_BITS: usize = 100_000;

/// Default number of probes per key.
pub const DEFAULT_FILTER_HASHES: u32 = 3;

/// Fixed-size bit array with `k` derived hash positions per key.
///
/// Probe `i` (1-based) hashes the decimal rendering of `i` followed by the
/// key bytes through a CRC-32 and reduces the result modulo the bit count.
/// The same scheme runs at write time and at open-time rebuild, so the
/// probed positions always agree.
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates an all-zero filter of `num_bits` bits probed `num_hashes`
    /// times per key.
    ///
    /// # Panics
    /// Panics if `num_bits` is 0 or `num_hashes` is 0.
    pub fn new(num_bits: usize, num_hashes: u32) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        assert!(num_hashes > 0, "num_hashes must be > 0");
        Self {
            bits: vec![0u64; num_bits.div_ceil(64)],
            num_bits,
            num_hashes,
        }
    }

    /// Marks `key` as possibly present.
    pub fn insert(&mut self, key: &[u8]) {
        for i in 1..=self.num_hashes {
            let pos = self.probe(i, key);
            self.set_bit(pos);
        }
    }

    /// Returns `false` only if `key` was never inserted.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        (1..=self.num_hashes).all(|i| self.check_bit(self.probe(i, key)))
    }

    /// Bit position for probe `i` of `key`: CRC-32 over the decimal
    /// rendering of `i` followed by the key bytes, reduced mod `num_bits`.
    fn probe(&self, i: u32, key: &[u8]) -> usize {
        let mut hasher = Crc32::new();
        hasher.update(i.to_string().as_bytes());
        hasher.update(key);
        hasher.finalize() as usize % self.num_bits
    }

    fn set_bit(&mut self, pos: usize) {
        self.bits[pos / 64] |= 1 << (pos % 64);
    }

    fn check_bit(&self, pos: usize) -> bool {
        (self.bits[pos / 64] >> (pos % 64)) & 1 == 1
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_BITS, DEFAULT_FILTER_HASHES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_key_is_reported() {
        let mut f = BloomFilter::default();
        f.insert(b"hello");
        assert!(f.may_contain(b"hello"));
    }

    #[test]
    fn fresh_filter_rejects_everything() {
        let f = BloomFilter::default();
        assert!(!f.may_contain(b"anything"));
        assert!(!f.may_contain(b""));
    }

    #[test]
    fn no_false_negatives_under_load() {
        let mut f = BloomFilter::default();
        for i in 0..10_000 {
            f.insert(format!("key-{}", i).as_bytes());
        }
        for i in 0..10_000 {
            assert!(f.may_contain(format!("key-{}", i).as_bytes()));
        }
    }

    #[test]
    fn unseen_keys_are_mostly_rejected() {
        let mut f = BloomFilter::default();
        for i in 0..1_000 {
            f.insert(format!("present-{}", i).as_bytes());
        }
        let false_positives = (0..1_000)
            .filter(|i| f.may_contain(format!("absent-{}", i).as_bytes()))
            .count();
        // 1k keys in a 100k-bit filter with 3 probes: the false-positive
        // rate is well under 1%, so 50 of 1000 leaves a wide margin.
        assert!(false_positives < 50, "too many false positives: {}", false_positives);
    }

    #[test]
    fn rebuild_from_same_keys_agrees() {
        let keys: Vec<Vec<u8>> = (0..500).map(|i| format!("k{}", i).into_bytes()).collect();

        let mut a = BloomFilter::default();
        let mut b = BloomFilter::default();
        for k in &keys {
            a.insert(k);
        }
        for k in keys.iter().rev() {
            b.insert(k);
        }

        for k in &keys {
            assert_eq!(a.may_contain(k), b.may_contain(k));
        }
        for i in 0..500 {
            let probe = format!("other{}", i).into_bytes();
            assert_eq!(a.may_contain(&probe), b.may_contain(&probe));
        }
    }

    #[test]
    fn tiny_filter_still_has_no_false_negatives() {
        let mut f = BloomFilter::new(64, 3);
        for i in 0..200 {
            f.insert(format!("k{}", i).as_bytes());
        }
        for i in 0..200 {
            assert!(f.may_contain(format!("k{}", i).as_bytes()));
        }
    }
}
