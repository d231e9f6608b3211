//! Feed tree: the persisted, ordered list of a finalized feed's block hashes.

use serde::{Deserialize, Serialize};
use strand_chunks::{feed_root, hash_from_hex, hash_to_hex, Hash};
use strand_core::FeedId;

use crate::error::{LogError, LogResult};

pub const TREE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedTree {
    /// Tree format version
    pub version: u32,
    /// Ordered block hashes (hex)
    pub blocks: Vec<String>,
}

impl FeedTree {
    pub fn new(hashes: &[Hash]) -> Self {
        FeedTree {
            version: TREE_VERSION,
            blocks: hashes.iter().map(hash_to_hex).collect(),
        }
    }

    pub fn from_bytes(data: &[u8]) -> LogResult<Self> {
        let tree: FeedTree = serde_json::from_slice(data)
            .map_err(|e| LogError::Serialization(format!("feed tree: {e}")))?;
        if tree.version != TREE_VERSION {
            return Err(LogError::Serialization(format!(
                "unsupported feed tree version {}",
                tree.version
            )));
        }
        Ok(tree)
    }

    pub fn to_bytes(&self) -> LogResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LogError::Serialization(format!("feed tree: {e}")))
    }

    pub fn hashes(&self) -> LogResult<Vec<Hash>> {
        self.blocks
            .iter()
            .map(|h| hash_from_hex(h).map_err(|e| LogError::Serialization(e.to_string())))
            .collect()
    }

    /// Parse the hashes and check they add up to `id`.
    pub fn verify(&self, id: &FeedId) -> LogResult<Vec<Hash>> {
        let hashes = self.hashes()?;
        if FeedId::from(feed_root(&hashes)) != *id {
            return Err(LogError::Verification(format!("feed tree does not match id {id}")));
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_chunks::hash_bytes;

    #[test]
    fn tree_roundtrip_and_verify() {
        let hashes = vec![hash_bytes(b"one"), hash_bytes(b"two")];
        let id = FeedId::from(feed_root(&hashes));
        let bytes = FeedTree::new(&hashes).to_bytes().unwrap();

        let parsed = FeedTree::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.verify(&id).unwrap(), hashes);
    }

    #[test]
    fn tampered_tree_fails_verification() {
        let hashes = vec![hash_bytes(b"one"), hash_bytes(b"two")];
        let id = FeedId::from(feed_root(&hashes));
        let mut tree = FeedTree::new(&hashes);
        tree.blocks.swap(0, 1);
        assert!(matches!(tree.verify(&id), Err(LogError::Verification(_))));
    }

    #[test]
    fn rejects_unknown_version_and_garbage() {
        assert!(FeedTree::from_bytes(br#"{"version":9,"blocks":[]}"#).is_err());
        assert!(FeedTree::from_bytes(b"not json").is_err());
        let bad_hex = FeedTree { version: 1, blocks: vec!["zz".into()] };
        assert!(bad_hex.hashes().is_err());
    }
}
