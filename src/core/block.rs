use crate::error::Result;
use crate::utils::{current_timestamp, deserialize, serialize, sha256_concat, Digest, HASH_LEN};
use data_encoding::HEXLOWER;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: Digest = [0u8; HASH_LEN];

const GENESIS_PAYLOAD: &[u8] = b"Genesis Block";
const GENESIS_TIMESTAMP: i64 = 0;

// Every node derives the same genesis so chains from different peers share a root.
static GENESIS_BLOCK: Lazy<Block> = Lazy::new(|| {
    Block::with_timestamp(
        GENESIS_PAYLOAD.to_vec(),
        GENESIS_TIMESTAMP,
        GENESIS_PREVIOUS_HASH,
    )
});

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    payload: Vec<u8>,
    created_at: i64,
    previous_hash: Digest,
    hash: Digest,
}

impl Block {
    /// Create a block on top of `previous_hash`, stamped with the current time.
    pub fn new_block(payload: Vec<u8>, previous_hash: Digest) -> Result<Block> {
        Ok(Block::with_timestamp(
            payload,
            current_timestamp()?,
            previous_hash,
        ))
    }

    pub fn with_timestamp(payload: Vec<u8>, created_at: i64, previous_hash: Digest) -> Block {
        let hash = Self::compute_hash(&payload, created_at, &previous_hash);
        Block {
            payload,
            created_at,
            previous_hash,
            hash,
        }
    }

    pub fn genesis() -> Block {
        GENESIS_BLOCK.clone()
    }

    /// `SHA-256(payload ‖ created_at (big-endian) ‖ previous_hash)`
    pub fn compute_hash(payload: &[u8], created_at: i64, previous_hash: &Digest) -> Digest {
        sha256_concat(&[
            payload,
            created_at.to_be_bytes().as_slice(),
            previous_hash.as_slice(),
        ])
    }

    /// Whether the stored hash matches the block contents.
    pub fn verify_hash(&self) -> bool {
        Self::compute_hash(&self.payload, self.created_at, &self.previous_hash) == self.hash
    }

    pub fn is_genesis(&self) -> bool {
        *self == *GENESIS_BLOCK
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn get_timestamp(&self) -> i64 {
        self.created_at
    }

    pub fn get_previous_hash(&self) -> &Digest {
        &self.previous_hash
    }

    pub fn get_hash(&self) -> &Digest {
        &self.hash
    }

    pub fn hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    /// Build a block with an arbitrary stored hash (for testing only)
    #[cfg(test)]
    pub fn new_test_block(
        payload: Vec<u8>,
        created_at: i64,
        previous_hash: Digest,
        hash: Digest,
    ) -> Block {
        Block {
            payload,
            created_at,
            previous_hash,
            hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a, b);
        assert_eq!(a.get_previous_hash(), &GENESIS_PREVIOUS_HASH);
        assert!(a.verify_hash());
        assert!(a.is_genesis());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let block = Block::with_timestamp(b"data".to_vec(), 42, [7u8; HASH_LEN]);
        assert!(block.verify_hash());

        let other_payload = Block::with_timestamp(b"date".to_vec(), 42, [7u8; HASH_LEN]);
        let other_time = Block::with_timestamp(b"data".to_vec(), 43, [7u8; HASH_LEN]);
        let other_prev = Block::with_timestamp(b"data".to_vec(), 42, [8u8; HASH_LEN]);
        assert_ne!(block.get_hash(), other_payload.get_hash());
        assert_ne!(block.get_hash(), other_time.get_hash());
        assert_ne!(block.get_hash(), other_prev.get_hash());
    }

    #[test]
    fn test_tampered_hash_is_detected() {
        let block = Block::new_test_block(b"data".to_vec(), 1, [0u8; HASH_LEN], [9u8; HASH_LEN]);
        assert!(!block.verify_hash());
        assert!(!block.is_genesis());
    }

    #[test]
    fn test_block_serialization() {
        let block = Block::new_block(b"payload".to_vec(), *Block::genesis().get_hash()).unwrap();
        let bytes = block.serialize().unwrap();
        assert_eq!(Block::deserialize(&bytes).unwrap(), block);
    }
}
