//! Content fingerprints by weighted bit-voting over token hashes
//!
//! Every distinct whitespace-separated token votes on each of the 256 output
//! bits with a weight equal to its frequency. The sign of each accumulated vote
//! decides the bit. Similar texts therefore yield fingerprints with a small
//! Hamming distance, and identical texts yield identical fingerprints.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Width of a fingerprint in bits
pub const FINGERPRINT_BITS: usize = 256;

/// A 256-bit content fingerprint
///
/// Bytes are stored big-endian: bit `i` (0 = least significant) lives in
/// byte `31 - i / 8`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Number of differing bits between two fingerprints
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Computes the fingerprint of `content`
///
/// # Algorithm
///
/// 1. Split on whitespace and count each distinct token
/// 2. Hash each token to 256 bits (SHA-256)
/// 3. For each bit `i`, add the token's frequency to accumulator `i` if the
///    hash has bit `i` set, otherwise subtract it
/// 4. Output bit `i` is 1 when accumulator `i` is non-negative
///
/// # Example
///
/// ```
/// use tidepool::dedup::fingerprint;
///
/// let a = fingerprint("the quick brown fox");
/// let b = fingerprint("the   quick brown\nfox");
/// assert_eq!(a, b);
/// ```
pub fn fingerprint(content: &str) -> Fingerprint {
    let mut frequency: HashMap<&str, i64> = HashMap::new();
    for token in content.split_whitespace() {
        *frequency.entry(token).or_insert(0) += 1;
    }

    let mut votes = [0i64; FINGERPRINT_BITS];
    for (token, freq) in &frequency {
        let hash: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        for (i, vote) in votes.iter_mut().enumerate() {
            if bit_of(&hash, i) {
                *vote += freq;
            } else {
                *vote -= freq;
            }
        }
    }

    let mut bytes = [0u8; 32];
    for (i, vote) in votes.iter().enumerate() {
        if *vote >= 0 {
            bytes[31 - i / 8] |= 1 << (i % 8);
        }
    }

    Fingerprint(bytes)
}

fn bit_of(bytes: &[u8; 32], i: usize) -> bool {
    bytes[31 - i / 8] & (1 << (i % 8)) != 0
}
