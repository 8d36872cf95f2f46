//! Test utilities for protocol testing

use crate::core::{Ledger, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::codec::{decode_frame, Frame, Message, TxPayload};
use crate::network::{Protocol, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A transport that records every message instead of dialing.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Message)>>,
}

impl RecordingTransport {
    /// Every message sent so far, with its destination, in send order.
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, addr: &str, frame: &[u8]) -> Result<()> {
        match decode_frame(frame)? {
            Frame::Known(message) => {
                self.sent.lock().unwrap().push((addr.to_string(), message));
                Ok(())
            }
            Frame::Unknown(command) => Err(BlockchainError::InvalidCommand(command)),
        }
    }
}

/// A protocol engine over an in-memory ledger and a recording transport.
pub fn test_protocol(node_addr: &str, bootstrap: &str) -> (Protocol, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let protocol = Protocol::new(node_addr, bootstrap, Ledger::new(), transport.clone());
    (protocol, transport)
}

/// A framed `tx` message carrying a transaction built from `payload`.
pub fn tx_frame(addr_from: &str, payload: &[u8]) -> Vec<u8> {
    let tx = Transaction::new(payload.to_vec());
    Message::Tx(TxPayload {
        addr_from: addr_from.to_string(),
        transaction: tx.serialize().unwrap(),
    })
    .encode()
    .unwrap()
}

type Outbox = Arc<Mutex<VecDeque<(String, Vec<u8>)>>>;

struct QueueTransport {
    outbox: Outbox,
}

impl Transport for QueueTransport {
    fn send(&self, addr: &str, frame: &[u8]) -> Result<()> {
        self.outbox
            .lock()
            .unwrap()
            .push_back((addr.to_string(), frame.to_vec()));
        Ok(())
    }
}

/// Several nodes wired together through a shared in-memory queue.
///
/// Sends are queued and only delivered by [`TestNetwork::pump`], so tests run
/// deterministically on one thread.
pub struct TestNetwork {
    outbox: Outbox,
    nodes: HashMap<String, Arc<Protocol>>,
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork {
    const MAX_DELIVERIES: usize = 10_000;

    pub fn new() -> Self {
        Self {
            outbox: Arc::new(Mutex::new(VecDeque::new())),
            nodes: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node_addr: &str, bootstrap: &str) -> Arc<Protocol> {
        let transport = Arc::new(QueueTransport {
            outbox: Arc::clone(&self.outbox),
        });
        let node = Arc::new(Protocol::new(node_addr, bootstrap, Ledger::new(), transport));
        self.nodes.insert(node_addr.to_string(), Arc::clone(&node));
        node
    }

    /// Deliver queued frames until the network is quiet. Returns how many
    /// frames were delivered; frames for unknown addresses are dropped.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.outbox.lock().unwrap().pop_front();
            let Some((addr, frame)) = next else {
                return delivered;
            };
            assert!(
                delivered < Self::MAX_DELIVERIES,
                "network did not settle after {delivered} deliveries"
            );
            if let Some(node) = self.nodes.get(&addr) {
                if let Err(e) = node.handle_frame(&frame) {
                    log::warn!("{addr} failed to handle frame: {e}");
                }
                delivered += 1;
            }
        }
    }
}
