//! Data storage and persistence
//!
//! The pending-transaction pool, the buffer for blocks arriving from peers,
//! and the durable chain store.

pub mod chain_store;
pub mod memory_pool;

pub use chain_store::{ChainStore, SledStore};
pub use memory_pool::{BlockInTransit, MemoryPool};
