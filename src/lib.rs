//! # Networkchain
//!
//! A small peer-to-peer blockchain node. Every node keeps a hash-linked chain
//! of blocks and a pool of pending transactions, and talks to its peers over
//! TCP with one framed message per connection.
//!
//! ## Layout
//! - `core/`: blocks, transactions and the [`Ledger`] that owns chain and mempool
//! - `network/`: wire codec, outbound transport, protocol handlers, accept loop
//! - `storage/`: the mempool, the download buffer and sled-backed persistence
//! - `config/`: defaults, TOML file and environment overrides
//! - `utils/`: hashing and serialization helpers
//! - `cli/`: command-line arguments for the `networkchain` binary
//!
//! ## Roles
//! The node whose address equals the bootstrap address relays transactions to
//! every peer it knows. Any other node mines as soon as its mempool holds an
//! even number (at least two) of transactions, then announces the new chain.
//! Chains converge by longest-valid-chain replacement.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{Block, Ledger, Transaction, GENESIS_PREVIOUS_HASH};
pub use error::{BlockchainError, Result};
pub use network::{
    send_message, start_node, Message, NodeEvent, OpType, PeerSet, Protocol, Server,
    TcpTransport, Transport,
};
pub use storage::{BlockInTransit, ChainStore, MemoryPool, SledStore};
pub use utils::{current_timestamp, sha256_digest, Digest};
