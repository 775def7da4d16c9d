//! Bloom filter used as the fast, probabilistic dedup layer
//!
//! The filter is sized from the number of keys it is expected to hold and the
//! tolerated false-positive rate. It never reports a false negative.

/// Word-backed Bloom filter with double hashing
#[derive(Debug, Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    bit_count: usize,
    hash_count: u32,
    items: usize,
}

impl BloomFilter {
    /// Creates a filter holding `expected_items` keys at roughly `error_rate`
    /// false positives
    ///
    /// Uses the optimal sizing `m = -n ln p / (ln 2)^2` and `k = (m / n) ln 2`.
    pub fn with_rate(expected_items: usize, error_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = error_rate.clamp(f64::MIN_POSITIVE, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let bits = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as usize;
        let hash_count = ((bits as f64 / n) * ln2).round().max(1.0) as u32;
        let word_count = (bits + 63) / 64;

        Self {
            words: vec![0u64; word_count],
            bit_count: word_count * 64,
            hash_count,
            items: 0,
        }
    }

    /// Returns true if `data` may have been inserted before
    pub fn contains(&self, data: &[u8]) -> bool {
        self.bit_indexes(data)
            .all(|idx| self.words[idx / 64] & (1u64 << (idx % 64)) != 0)
    }

    /// Inserts `data`, returning false if every bit was already set
    pub fn insert(&mut self, data: &[u8]) -> bool {
        let indexes: Vec<usize> = self.bit_indexes(data).collect();
        let mut inserted = false;

        for idx in indexes {
            let mask = 1u64 << (idx % 64);
            let word = &mut self.words[idx / 64];
            if *word & mask == 0 {
                *word |= mask;
                inserted = true;
            }
        }

        if inserted {
            self.items += 1;
        }
        inserted
    }

    /// Number of insertions that changed at least one bit
    pub fn len(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    fn bit_indexes(&self, data: &[u8]) -> impl Iterator<Item = usize> {
        let h1 = bloom_hash(data, HASH_SEEDS[0]);
        // Forcing h2 odd keeps the probe sequence from collapsing onto one bit.
        let h2 = bloom_hash(data, HASH_SEEDS[1]) | 1;
        let bit_count = self.bit_count as u64;

        (0..self.hash_count as u64)
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % bit_count) as usize)
    }
}

const HASH_SEEDS: [u64; 2] = [0x517c_c1b7_2722_0a95, 0x9e37_79b1_85eb_ca87];

fn bloom_hash(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed ^ data.len() as u64;
    for &byte in data {
        hash ^= (byte as u64).wrapping_mul(0x1000_0000_01b3);
        hash = hash.rotate_left(13).wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    hash ^ (hash >> 33)
}
