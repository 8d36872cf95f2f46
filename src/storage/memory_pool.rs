use crate::core::{Block, Transaction};
use crate::utils::Digest;
use data_encoding::HEXLOWER;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Pending transactions in arrival order.
///
/// ( K -> txid_hex, V => Transaction )
///
/// The pool carries no lock of its own: it lives inside the ledger state and
/// is only touched while the ledger lock is held.
#[derive(Debug, Default)]
pub struct MemoryPool {
    order: Vec<String>,
    entries: HashMap<String, Transaction>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool::default()
    }

    pub fn get(&self, txid_hex: &str) -> Option<&Transaction> {
        self.entries.get(txid_hex)
    }

    /// Insert `tx` unless its id is already pooled. Returns whether it was inserted.
    pub fn add(&mut self, tx: Transaction) -> bool {
        let key = tx.id_hex();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.entries.insert(key, tx);
        true
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        self.entries.contains_key(txid_hex)
    }

    pub fn remove(&mut self, txid_hex: &str) -> Option<Transaction> {
        let removed = self.entries.remove(txid_hex)?;
        self.order.retain(|key| key != txid_hex);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All pooled transactions, oldest first.
    pub fn get_all(&self) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct TransitState {
    // Full hash list each peer announced through `inv`, genesis first.
    announced: HashMap<String, Vec<Digest>>,
    // Blocks that arrived but do not extend the local tip yet.
    received: HashMap<String, Block>,
}

impl TransitState {
    // Drop buffered blocks that no remaining announcement lists.
    fn prune_unreferenced(&mut self) {
        let wanted: HashSet<String> = self
            .announced
            .values()
            .flatten()
            .map(|hash| HEXLOWER.encode(hash))
            .collect();
        let before = self.received.len();
        self.received.retain(|key, _| wanted.contains(key));
        let dropped = before - self.received.len();
        if dropped > 0 {
            log::debug!("Dropped {dropped} buffered blocks no peer announces");
        }
    }
}

/// Most blocks held for reassembly at once.
pub const MAX_BUFFERED_BLOCKS: usize = 4096;

/// Blocks being downloaded from peers.
///
/// Every inbound connection is handled on its own thread, so blocks requested
/// with `getdata` can arrive in any order. They wait here until they either
/// extend the tip or complete a chain a peer announced. A block stays only while
/// some peer's announcement still lists it, and the buffer is bounded.
pub struct BlockInTransit {
    inner: RwLock<TransitState>,
    capacity: usize,
}

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        Self::with_capacity(MAX_BUFFERED_BLOCKS)
    }

    pub fn with_capacity(capacity: usize) -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(TransitState::default()),
            capacity,
        }
    }

    /// Record the chain `peer` announced, replacing any earlier announcement.
    pub fn announce(&self, peer: &str, hashes: &[Digest]) {
        match self.inner.write() {
            Ok(mut inner) => {
                let replaced = inner.announced.insert(peer.to_string(), hashes.to_vec());
                if replaced.is_some() {
                    inner.prune_unreferenced();
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on block transit");
            }
        }
    }

    pub fn announced(&self, peer: &str) -> Option<Vec<Digest>> {
        match self.inner.read() {
            Ok(inner) => inner.announced.get(peer).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on block transit");
                None
            }
        }
    }

    /// Drop `peer`'s announcement and every buffered block only it listed.
    pub fn forget_peer(&self, peer: &str) {
        match self.inner.write() {
            Ok(mut inner) => {
                if inner.announced.remove(peer).is_some() {
                    inner.prune_unreferenced();
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on block transit");
            }
        }
    }

    /// Buffer `block`. When the buffer is full, unannounced blocks are evicted
    /// first; if it is still full the block is dropped.
    pub fn store(&self, block: Block) {
        match self.inner.write() {
            Ok(mut inner) => {
                if inner.received.len() >= self.capacity {
                    inner.prune_unreferenced();
                }
                if inner.received.len() >= self.capacity {
                    log::warn!(
                        "Block transit buffer is full, dropping block {}",
                        block.hash_hex()
                    );
                    return;
                }
                inner.received.insert(block.hash_hex(), block);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on block transit");
            }
        }
    }

    pub fn get(&self, hash: &Digest) -> Option<Block> {
        match self.inner.read() {
            Ok(inner) => inner.received.get(&HEXLOWER.encode(hash)).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on block transit");
                None
            }
        }
    }

    /// Remove and return a buffered block whose parent is `hash`.
    pub fn take_child_of(&self, hash: &Digest) -> Option<Block> {
        match self.inner.write() {
            Ok(mut inner) => {
                let key = inner
                    .received
                    .iter()
                    .find(|(_, block)| block.get_previous_hash() == hash)
                    .map(|(key, _)| key.clone())?;
                inner.received.remove(&key)
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on block transit");
                None
            }
        }
    }

    pub fn remove(&self, hash: &Digest) {
        match self.inner.write() {
            Ok(mut inner) => {
                inner.received.remove(&HEXLOWER.encode(hash));
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on block transit");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.received.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on block transit");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.inner.read() {
            Ok(inner) => inner.received.is_empty(),
            Err(_) => {
                log::error!("Failed to acquire read lock on block transit");
                true
            }
        }
    }
}
