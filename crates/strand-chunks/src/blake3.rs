//! BLAKE3 content hashing for blocks and feeds
//!
//! Every block is addressed by the BLAKE3 hash of its bytes. A finalized
//! feed is addressed by the hash of its block count and ordered block hashes.

use anyhow::Result;

/// A BLAKE3 hash digest (32 bytes), displayed as 64 hex chars
pub type Hash = blake3::Hash;

/// Hash a byte slice in memory.
pub fn hash_bytes(data: &[u8]) -> Hash {
    blake3::hash(data)
}

/// Content address of an ordered block sequence.
///
/// The block count is mixed in first so that a feed can never collide with
/// a prefix or extension of another feed's hash list.
pub fn feed_root(block_hashes: &[Hash]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(block_hashes.len() as u64).to_le_bytes());
    for h in block_hashes {
        hasher.update(h.as_bytes());
    }
    hasher.finalize()
}

/// Format a hash as lowercase hex string (64 chars)
pub fn hash_to_hex(hash: &Hash) -> String {
    hash.to_hex().to_string()
}

/// Parse a 64-char hex string into a Hash
pub fn hash_from_hex(hex: &str) -> Result<Hash> {
    blake3::Hash::from_hex(hex).map_err(|e| anyhow::anyhow!("invalid BLAKE3 hex '{}': {}", hex, e))
}
