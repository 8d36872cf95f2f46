// The ledger is the node's whole state: the hash-linked chain plus the pool of
// transactions waiting to be folded into a block.
//
// Every connection handler shares one Ledger, so all of it sits behind a single
// RwLock. Mutations take the write lock for their whole duration, which makes
// add_transaction, mine_block, add_block, accept_block and merge_chain mutually
// exclusive. A durable store, when present, is written before the in-memory
// state changes so a storage failure leaves both sides untouched.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{ChainStore, MemoryPool};
use crate::utils::Digest;
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct LedgerState {
    blocks: Vec<Block>,
    mempool: MemoryPool,
}

#[derive(Clone)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
    store: Option<Arc<dyn ChainStore>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    // An in-memory ledger holding only the genesis block
    pub fn new() -> Ledger {
        Self::from_blocks(vec![Block::genesis()], None)
    }

    // Open a ledger backed by `store`. A stored chain must pass the same
    // checks as a chain received from a peer; an empty store gets genesis.
    pub fn open(store: Arc<dyn ChainStore>) -> Result<Ledger> {
        let blocks = match store.load()? {
            Some(blocks) => {
                Self::validate_chain(&blocks)?;
                info!("Opened existing chain with {} blocks", blocks.len());
                blocks
            }
            None => {
                let blocks = vec![Block::genesis()];
                store.replace(&blocks)?;
                info!("No stored chain found, created genesis block");
                blocks
            }
        };
        Ok(Self::from_blocks(blocks, Some(store)))
    }

    fn from_blocks(blocks: Vec<Block>, store: Option<Arc<dyn ChainStore>>) -> Ledger {
        Ledger {
            state: Arc::new(RwLock::new(LedgerState {
                blocks,
                mempool: MemoryPool::new(),
            })),
            store,
        }
    }

    // A poisoned lock only means another handler panicked mid-read; the chain
    // itself is never left half-written because every mutation is a single push
    // or swap after all fallible work is done.
    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check that `blocks` is a well-formed chain rooted at genesis.
    pub fn validate_chain(blocks: &[Block]) -> Result<()> {
        let first = blocks
            .first()
            .ok_or_else(|| BlockchainError::ChainIntegrity("Chain is empty".to_string()))?;
        if !first.is_genesis() {
            return Err(BlockchainError::ChainIntegrity(
                "First block is not the genesis block".to_string(),
            ));
        }
        for (index, block) in blocks.iter().enumerate() {
            if !block.verify_hash() {
                return Err(BlockchainError::ChainIntegrity(format!(
                    "Block {index} ({}) has an invalid hash",
                    block.hash_hex()
                )));
            }
            if index > 0 && block.get_previous_hash() != blocks[index - 1].get_hash() {
                return Err(BlockchainError::ChainIntegrity(format!(
                    "Block {index} ({}) does not link to its predecessor",
                    block.hash_hex()
                )));
            }
        }
        Ok(())
    }

    fn append_locked(&self, state: &mut LedgerState, block: Block) -> Result<()> {
        if let Some(store) = &self.store {
            store.append(state.blocks.len(), &block)?;
        }
        state.blocks.push(block);
        Ok(())
    }

    fn tip_hash(state: &LedgerState) -> Digest {
        // blocks is never empty: it starts at genesis and is only ever replaced
        // by a validated, non-empty chain
        state
            .blocks
            .last()
            .map(|block| *block.get_hash())
            .unwrap_or_else(|| *Block::genesis().get_hash())
    }

    /// Append a new block carrying `payload` on top of the current tip.
    pub fn add_block(&self, payload: Vec<u8>) -> Result<Block> {
        let mut state = self.write();
        let block = Block::new_block(payload, Self::tip_hash(&state))?;
        self.append_locked(&mut state, block.clone())?;
        debug!("Added block {} at height {}", block.hash_hex(), state.blocks.len());
        Ok(block)
    }

    /// Append a block produced elsewhere, if it extends the current tip.
    ///
    /// Returns `Ok(false)` when the block does not link to the tip (it may
    /// belong to a longer chain still being downloaded).
    pub fn accept_block(&self, block: Block) -> Result<bool> {
        if !block.verify_hash() {
            return Err(BlockchainError::ChainIntegrity(format!(
                "Block {} has an invalid hash",
                block.hash_hex()
            )));
        }
        let mut state = self.write();
        if *block.get_previous_hash() != Self::tip_hash(&state) {
            return Ok(false);
        }
        self.append_locked(&mut state, block.clone())?;
        Self::prune_mempool(&mut state.mempool, std::slice::from_ref(&block));
        Ok(true)
    }

    pub fn height(&self) -> usize {
        self.read().blocks.len()
    }

    pub fn tip(&self) -> Block {
        let state = self.read();
        state.blocks.last().cloned().unwrap_or_else(Block::genesis)
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read().blocks.clone()
    }

    /// Hashes of every block, genesis first.
    pub fn block_hashes(&self) -> Vec<Digest> {
        self.read()
            .blocks
            .iter()
            .map(|block| *block.get_hash())
            .collect()
    }

    pub fn get_block(&self, hash: &Digest) -> Option<Block> {
        self.read()
            .blocks
            .iter()
            .find(|block| block.get_hash() == hash)
            .cloned()
    }

    pub fn has_block(&self, hash: &Digest) -> bool {
        self.read().blocks.iter().any(|block| block.get_hash() == hash)
    }

    /// Insert `tx` into the mempool.
    ///
    /// Returns the mempool size after the insert, or `None` when a transaction
    /// with the same id is already pooled or already in a block (re-adding is a
    /// no-op).
    pub fn add_transaction(&self, tx: Transaction) -> Option<usize> {
        let mut state = self.write();
        if Self::chain_contains_tx(&state.blocks, tx.get_id()) {
            return None;
        }
        if state.mempool.add(tx) {
            Some(state.mempool.len())
        } else {
            None
        }
    }

    pub fn get_transaction(&self, id: &Digest) -> Option<Transaction> {
        self.read().mempool.get(&HEXLOWER.encode(id)).cloned()
    }

    pub fn has_transaction(&self, id: &Digest) -> bool {
        self.read().mempool.contains(&HEXLOWER.encode(id))
    }

    /// Whether `id` is recorded in a block payload on the chain.
    pub fn has_mined_transaction(&self, id: &Digest) -> bool {
        Self::chain_contains_tx(&self.read().blocks, id)
    }

    pub fn mempool_len(&self) -> usize {
        self.read().mempool.len()
    }

    /// Pending transactions, oldest first.
    pub fn mempool(&self) -> Vec<Transaction> {
        self.read().mempool.get_all()
    }

    /// Fold every pending transaction into a new block.
    ///
    /// Calling this with an empty mempool is a caller bug and returns
    /// [`BlockchainError::EmptyMempool`].
    pub fn mine_block(&self) -> Result<Block> {
        let mut state = self.write();
        if state.mempool.is_empty() {
            return Err(BlockchainError::EmptyMempool);
        }

        let transactions = state.mempool.get_all();
        let payload = Transaction::serialize_set(&transactions)?;
        let block = Block::new_block(payload, Self::tip_hash(&state))?;
        self.append_locked(&mut state, block.clone())?;

        for tx in &transactions {
            state.mempool.remove(&tx.id_hex());
        }
        info!(
            "New block {} is mined with {} transactions",
            block.hash_hex(),
            transactions.len()
        );
        Ok(block)
    }

    /// Adopt `remote` if it is a valid chain strictly longer than ours.
    ///
    /// Returns `Ok(true)` when the chain was replaced and `Ok(false)` when the
    /// candidate is not longer. An invalid candidate is a
    /// [`BlockchainError::ChainIntegrity`] error. Local state is untouched
    /// unless the result is `Ok(true)`.
    pub fn merge_chain(&self, remote: Vec<Block>) -> Result<bool> {
        if remote.len() <= self.height() {
            return Ok(false);
        }
        Self::validate_chain(&remote)?;

        let mut state = self.write();
        // Another handler may have grown the chain since the length check
        if remote.len() <= state.blocks.len() {
            return Ok(false);
        }
        if let Some(store) = &self.store {
            store.replace(&remote)?;
        }
        Self::prune_mempool(&mut state.mempool, &remote);
        let previous = state.blocks.len();
        state.blocks = remote;
        info!(
            "Replaced local chain of {previous} blocks with {} blocks",
            state.blocks.len()
        );
        Ok(true)
    }

    fn chain_contains_tx(blocks: &[Block], id: &Digest) -> bool {
        blocks.iter().any(|block| {
            Transaction::deserialize_set(block.get_payload())
                .map(|transactions| transactions.iter().any(|tx| tx.get_id() == id))
                .unwrap_or(false)
        })
    }

    // Drop pooled transactions already recorded in `blocks`. Payloads that are
    // not transaction sets are skipped.
    fn prune_mempool(mempool: &mut MemoryPool, blocks: &[Block]) {
        if mempool.is_empty() {
            return;
        }
        for block in blocks {
            match Transaction::deserialize_set(block.get_payload()) {
                Ok(transactions) => {
                    for tx in transactions {
                        mempool.remove(&tx.id_hex());
                    }
                }
                Err(_) if block.is_genesis() => {}
                Err(e) => warn!(
                    "Block {} payload is not a transaction set: {e}",
                    block.hash_hex()
                ),
            }
        }
    }
}
