//! Utility functions and helpers
//!
//! Hashing, timestamps and the bincode layer used throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_concat, sha256_digest, Digest, HASH_LEN};

pub use serialization::{deserialize, serialize};
