use log::info;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};

/// Structured events the node emits while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A peer announced itself with `version` and was not known before
    PeerConnected { addr: String },
    /// An address learned through `addr` gossip
    PeerDiscovered { addr: String },
    /// A block received from a peer was appended to the tip
    BlockAdded { hash: String, height: usize },
    /// This node folded its mempool into a block
    BlockMined {
        hash: String,
        height: usize,
        transactions: usize,
    },
    TransactionReceived { id: String, from: String },
    /// The local chain was replaced by a longer one
    ChainReplaced { height: usize },
    /// A peer speaks a newer protocol version
    UpgradeRequired { peer: String, version: i32 },
    PongReceived { from: String, nonce: i64 },
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::PeerConnected { addr } => write!(f, "Peer connected: {addr}"),
            NodeEvent::PeerDiscovered { addr } => write!(f, "Peer discovered: {addr}"),
            NodeEvent::BlockAdded { hash, height } => {
                write!(f, "Added block {hash}, height is now {height}")
            }
            NodeEvent::BlockMined {
                hash,
                height,
                transactions,
            } => write!(
                f,
                "Mined block {hash} with {transactions} transactions, height is now {height}"
            ),
            NodeEvent::TransactionReceived { id, from } => {
                write!(f, "Added transaction {id} from {from}")
            }
            NodeEvent::ChainReplaced { height } => {
                write!(f, "Chain replaced, height is now {height}")
            }
            NodeEvent::UpgradeRequired { peer, version } => write!(
                f,
                "Peer {peer} runs protocol version {version}, please update your node software"
            ),
            NodeEvent::PongReceived { from, nonce } => {
                write!(f, "Received pong {nonce} from {from}")
            }
        }
    }
}

/// Logs every event and forwards it to an optional listener.
#[derive(Default)]
pub struct EventSink {
    sender: Option<Mutex<Sender<NodeEvent>>>,
}

impl EventSink {
    pub fn new(sender: Sender<NodeEvent>) -> Self {
        Self {
            sender: Some(Mutex::new(sender)),
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        info!("{event}");
        if let Some(sender) = &self.sender {
            // A dropped receiver just means nobody is listening any more
            let _ = sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(event);
        }
    }
}
