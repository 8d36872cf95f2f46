//! Error handling for the node
//!
//! One error type covers the ledger, the wire codec, peer sends and storage.
//! Only [`BlockchainError::ListenFailure`] is fatal to the process; every other
//! kind is scoped to the connection or call that produced it.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error kinds raised by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Malformed frame or payload received from a peer
    WireDecode(String),
    /// A command name that cannot be framed
    InvalidCommand(String),
    /// A block or chain that fails the hash/linkage invariant
    ChainIntegrity(String),
    /// Dial or write failure towards a peer
    PeerUnreachable { addr: String, reason: String },
    /// The listen address could not be bound
    ListenFailure { addr: String, reason: String },
    /// `mine_block` called with nothing pending
    EmptyMempool,
    /// Storage collaborator errors
    Database(String),
    /// Serialization/deserialization errors outside the wire path
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl BlockchainError {
    /// Whether this error should terminate the node.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BlockchainError::ListenFailure { .. })
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::WireDecode(msg) => write!(f, "Wire decode error: {msg}"),
            BlockchainError::InvalidCommand(msg) => write!(f, "Invalid command: {msg}"),
            BlockchainError::ChainIntegrity(msg) => write!(f, "Chain integrity error: {msg}"),
            BlockchainError::PeerUnreachable { addr, reason } => {
                write!(f, "Peer {addr} is not available: {reason}")
            }
            BlockchainError::ListenFailure { addr, reason } => {
                write!(f, "Failed to listen on {addr}: {reason}")
            }
            BlockchainError::EmptyMempool => write!(f, "Cannot mine a block from an empty mempool"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_listen_failure_is_fatal() {
        let listen = BlockchainError::ListenFailure {
            addr: "localhost:3000".to_string(),
            reason: "address in use".to_string(),
        };
        assert!(listen.is_fatal());

        let unreachable = BlockchainError::PeerUnreachable {
            addr: "localhost:3001".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(!unreachable.is_fatal());
        assert!(!BlockchainError::WireDecode("bad".to_string()).is_fatal());
        assert!(!BlockchainError::ChainIntegrity("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_display_names_the_peer() {
        let err = BlockchainError::PeerUnreachable {
            addr: "localhost:3001".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Peer localhost:3001 is not available: connection refused"
        );
    }
}
