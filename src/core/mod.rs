//! Core ledger functionality
//!
//! Blocks, transactions and the ledger that links them together.

pub mod block;
pub mod ledger;
pub mod transaction;

pub use block::{Block, GENESIS_PREVIOUS_HASH};
pub use ledger::Ledger;
pub use transaction::Transaction;
