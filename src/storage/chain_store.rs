// Durable storage for the chain. The ledger stays authoritative in memory;
// a store only has to hand back what it was given.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::info;
use sled::transaction::TransactionError;
use sled::{Db, Tree};
use std::path::{Path, PathBuf};

const BLOCKS_TREE: &str = "blocks";
const HEIGHT_KEY: &[u8] = b"height";

/// Load/save contract between the ledger and durable storage.
pub trait ChainStore: Send + Sync {
    /// The stored chain, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<Block>>>;

    /// Persist `block` at position `index` (the chain length before the append).
    fn append(&self, index: usize, block: &Block) -> Result<()>;

    /// Overwrite the whole stored chain.
    fn replace(&self, blocks: &[Block]) -> Result<()>;
}

/// Blocks stored in a sled tree keyed by big-endian position.
pub struct SledStore {
    db: Db,
    path: PathBuf,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SledStore> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).map_err(|e| {
            BlockchainError::Database(format!("Failed to open database at {}: {e}", path.display()))
        })?;
        Ok(SledStore { db, path })
    }

    fn tree(&self) -> Result<Tree> {
        self.db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))
    }

    fn index_key(index: usize) -> [u8; 8] {
        (index as u64).to_be_bytes()
    }

    fn decode_height(bytes: &[u8]) -> Result<usize> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| BlockchainError::Database("Corrupt height record".to_string()))?;
        Ok(u64::from_be_bytes(raw) as usize)
    }
}

impl ChainStore for SledStore {
    fn load(&self) -> Result<Option<Vec<Block>>> {
        let tree = self.tree()?;
        let height = match tree.get(HEIGHT_KEY)? {
            Some(bytes) => Self::decode_height(bytes.as_ref())?,
            None => return Ok(None),
        };

        let mut blocks = Vec::with_capacity(height);
        for index in 0..height {
            let bytes = tree.get(Self::index_key(index))?.ok_or_else(|| {
                BlockchainError::Database(format!("Block {index} missing from store"))
            })?;
            blocks.push(Block::deserialize(bytes.as_ref())?);
        }
        info!("Loaded {height} blocks from {}", self.path.display());
        Ok(Some(blocks))
    }

    fn append(&self, index: usize, block: &Block) -> Result<()> {
        let tree = self.tree()?;
        let data = block.serialize()?;
        let height = ((index + 1) as u64).to_be_bytes();

        tree.transaction(|tx_db| {
            tx_db.insert(Self::index_key(index).as_slice(), data.as_slice())?;
            tx_db.insert(HEIGHT_KEY, height.as_slice())?;
            Ok(())
        })
        .map_err(|e: TransactionError| {
            BlockchainError::Database(format!("Failed to append block: {e}"))
        })?;
        self.db.flush()?;
        Ok(())
    }

    fn replace(&self, blocks: &[Block]) -> Result<()> {
        let tree = self.tree()?;
        let encoded = blocks
            .iter()
            .map(Block::serialize)
            .collect::<Result<Vec<_>>>()?;
        let new_height = blocks.len();
        let old_height = match tree.get(HEIGHT_KEY)? {
            Some(bytes) => Self::decode_height(bytes.as_ref())?,
            None => 0,
        };

        tree.transaction(|tx_db| {
            for (index, data) in encoded.iter().enumerate() {
                tx_db.insert(Self::index_key(index).as_slice(), data.as_slice())?;
            }
            for index in new_height..old_height {
                tx_db.remove(Self::index_key(index).as_slice())?;
            }
            tx_db.insert(HEIGHT_KEY, (new_height as u64).to_be_bytes().as_slice())?;
            Ok(())
        })
        .map_err(|e: TransactionError| {
            BlockchainError::Database(format!("Failed to replace chain: {e}"))
        })?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chain_of(len: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis()];
        for i in 1..len {
            let prev = *blocks[i - 1].get_hash();
            blocks.push(Block::with_timestamp(vec![i as u8], i as i64, prev));
        }
        blocks
    }

    #[test]
    fn test_empty_store_is_absent() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("chain")).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_append_then_load() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("chain")).unwrap();
        let blocks = chain_of(3);
        for (index, block) in blocks.iter().enumerate() {
            store.append(index, block).unwrap();
        }
        assert_eq!(store.load().unwrap(), Some(blocks));
    }

    #[test]
    fn test_replace_shrinks_and_grows() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("chain")).unwrap();
        store.replace(&chain_of(5)).unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), 5);

        let shorter = chain_of(2);
        store.replace(&shorter).unwrap();
        assert_eq!(store.load().unwrap(), Some(shorter));
    }
}
