//! Probabilistic membership filter backing the frontier's seen set
//!
//! A sized Bloom filter: false positives cause rare under-fetching at
//! the configured rate, never over-fetching of duplicates. The bit
//! array is sized from an expected item count and a target
//! false-positive rate, with bit positions derived by double hashing.

/// Bloom filter over byte keys
pub struct SeenFilter {
    words: Vec<u64>,
    bits: usize,
    hashes: u32,
}

const SEED_A: u64 = 0x517c_c1b7_2722_0a95;
const SEED_B: u64 = 0x6d0f_27bd_ceb7_b067;

impl SeenFilter {
    /// Sizes the filter for `expected` insertions at `fp_rate` false
    /// positives (clamped to a sane range).
    pub fn with_capacity(expected: usize, fp_rate: f64) -> Self {
        let expected = expected.max(1) as f64;
        let fp_rate = fp_rate.clamp(1e-6, 0.5);

        let ln2 = std::f64::consts::LN_2;
        let bits = (-(expected * fp_rate.ln()) / (ln2 * ln2)).ceil() as usize;
        let bits = bits.max(64);
        let hashes = ((bits as f64 / expected) * ln2).round().max(1.0) as u32;

        Self {
            words: vec![0u64; bits.div_ceil(64)],
            bits,
            hashes,
        }
    }

    /// Inserts a key. Returns false when every bit was already set,
    /// meaning the key is probably a duplicate.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let (h1, h2) = self.key_hashes(key);
        let mut inserted = false;
        for i in 0..self.hashes {
            let idx = self.bit_index(h1, h2, i);
            let mask = 1u64 << (idx % 64);
            if self.words[idx / 64] & mask == 0 {
                inserted = true;
                self.words[idx / 64] |= mask;
            }
        }
        inserted
    }

    /// Membership test without mutation.
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = self.key_hashes(key);
        (0..self.hashes).all(|i| {
            let idx = self.bit_index(h1, h2, i);
            self.words[idx / 64] & (1u64 << (idx % 64)) != 0
        })
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> usize {
        let combined = h1.wrapping_add((i as u64).wrapping_mul(h2 | 1));
        (combined % self.bits as u64) as usize
    }

    fn key_hashes(&self, key: &[u8]) -> (u64, u64) {
        (mix(key, SEED_A), mix(key, SEED_B))
    }
}

fn mix(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed ^ data.len() as u64;
    for &byte in data {
        hash ^= (byte as u64).wrapping_mul(0x1000_0000_01b3);
        hash = hash.rotate_left(13).wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    hash ^ (hash >> 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_contains() {
        let mut filter = SeenFilter::with_capacity(1000, 0.01);
        assert!(!filter.contains(b"https://example.com/a"));
        assert!(filter.insert(b"https://example.com/a"));
        assert!(filter.contains(b"https://example.com/a"));
        // second insertion reports a probable duplicate
        assert!(!filter.insert(b"https://example.com/a"));
    }

    #[test]
    fn test_false_positive_rate_within_tolerance() {
        // The approximate set trades a bounded false-positive rate for
        // memory: a positive may rarely be wrong (under-fetching), a
        // negative never is. Verify the configured 1% bound holds with
        // some slack on a disjoint probe set.
        let mut filter = SeenFilter::with_capacity(10_000, 0.01);
        for i in 0..10_000u32 {
            filter.insert(format!("https://example.com/page/{}", i).as_bytes());
        }

        let mut false_positives = 0;
        for i in 0..10_000u32 {
            if filter.contains(format!("https://other.org/item/{}", i).as_bytes()) {
                false_positives += 1;
            }
        }
        assert!(
            false_positives < 300,
            "false positive rate too high: {}/10000",
            false_positives
        );
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = SeenFilter::with_capacity(500, 0.01);
        let keys: Vec<String> = (0..500).map(|i| format!("key-{}", i)).collect();
        for key in &keys {
            filter.insert(key.as_bytes());
        }
        for key in &keys {
            assert!(filter.contains(key.as_bytes()));
        }
    }
}
