use crate::core::{Block, Ledger, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::codec::{
    decode_frame, Addr, BlockPayload, Frame, GetAddr, GetBlocks, GetData, Inv, Message, OpType,
    Ping, Pong, TxPayload, Version, NODE_VERSION,
};
use crate::network::events::{EventSink, NodeEvent};
use crate::network::peers::PeerSet;
use crate::network::transport::{read_frame, Transport};
use crate::storage::BlockInTransit;
use crate::utils::Digest;
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use std::io::Read;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Frame `message` and hand it to `transport`.
pub fn send_message(transport: &dyn Transport, addr: &str, message: &Message) -> Result<()> {
    info!("Sending {} to {addr}", message.command());
    let frame = message.encode()?;
    transport.send(addr, &frame)
}

/// Message dispatch and the outbound side of the protocol.
///
/// A `Protocol` owns everything a node shares between connections: the
/// ledger, the peer set and the buffer of blocks being downloaded. Each
/// inbound connection carries one message, handled by [`Protocol::handle_frame`].
///
/// The bootstrap node is the only node that relays transactions; every other
/// node treats an inbound transaction as a possible mining trigger.
pub struct Protocol {
    ledger: Ledger,
    peers: PeerSet,
    transit: BlockInTransit,
    transport: Arc<dyn Transport>,
    events: EventSink,
}

impl Protocol {
    pub fn new(
        node_addr: &str,
        bootstrap_addr: &str,
        ledger: Ledger,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            ledger,
            peers: PeerSet::new(node_addr, bootstrap_addr),
            transit: BlockInTransit::new(),
            transport,
            events: EventSink::default(),
        }
    }

    /// Forward [`NodeEvent`]s to `sender` in addition to logging them.
    pub fn with_events(mut self, sender: Sender<NodeEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    pub fn node_addr(&self) -> &str {
        self.peers.node_addr()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn is_bootstrap_node(&self) -> bool {
        self.peers.is_bootstrap_node()
    }

    /// First outbound act of a node: introduce itself to the bootstrap node
    /// and ask for the addresses it knows. The bootstrap node itself does nothing.
    pub fn bootstrap(&self) {
        if self.is_bootstrap_node() {
            info!("{} is the bootstrap node", self.node_addr());
            return;
        }
        let bootstrap = self.peers.bootstrap().to_string();
        self.send_version(&bootstrap);
        self.send_get_addr(&bootstrap);
    }

    /// Read one frame from `stream` and dispatch it.
    pub fn handle_stream<R: Read>(&self, stream: R) -> Result<()> {
        let frame = read_frame(stream)?;
        self.handle_frame(&frame)
    }

    /// Decode and dispatch one frame. Unknown commands are logged and dropped.
    pub fn handle_frame(&self, frame: &[u8]) -> Result<()> {
        match decode_frame(frame)? {
            Frame::Known(message) => self.dispatch(message),
            Frame::Unknown(command) => {
                info!("Unknown command {command:?}, dropping");
                Ok(())
            }
        }
    }

    pub fn dispatch(&self, message: Message) -> Result<()> {
        match message {
            Message::Version(payload) => self.handle_version(payload),
            Message::GetBlocks(payload) => self.handle_get_blocks(payload),
            Message::Inv(payload) => self.handle_inv(payload),
            Message::GetData(payload) => self.handle_get_data(payload),
            Message::Block(payload) => self.handle_block(payload),
            Message::Tx(payload) => self.handle_tx(payload),
            Message::Addr(payload) => self.handle_addr(payload),
            Message::GetAddr(payload) => self.handle_get_addr(payload),
            Message::Ping(payload) => self.handle_ping(payload),
            Message::Pong(payload) => self.handle_pong(payload),
        }
    }

    fn handle_version(&self, payload: Version) -> Result<()> {
        let Version {
            version,
            best_height,
            addr_from,
        } = payload;
        info!("Received version {version} and best height {best_height} from {addr_from}");

        if version < NODE_VERSION {
            self.send_version(&addr_from);
        } else if version > NODE_VERSION {
            self.events.emit(NodeEvent::UpgradeRequired {
                peer: addr_from.clone(),
                version,
            });
        }

        if best_height > self.ledger.height() as u64 {
            self.send_get_blocks(&addr_from);
        }

        if self.peers.add(&addr_from) {
            self.events
                .emit(NodeEvent::PeerConnected { addr: addr_from });
        }
        Ok(())
    }

    fn handle_get_blocks(&self, payload: GetBlocks) -> Result<()> {
        let hashes = self.ledger.block_hashes();
        self.send_inv(&payload.addr_from, OpType::Block, hashes);
        Ok(())
    }

    fn handle_inv(&self, payload: Inv) -> Result<()> {
        let Inv {
            addr_from,
            op_type,
            items,
        } = payload;
        info!(
            "Received inventory with {} {op_type} items from {addr_from}",
            items.len()
        );

        match op_type {
            OpType::Block => {
                self.transit.announce(&addr_from, &items);
                for hash in &items {
                    if !self.ledger.has_block(hash) && self.transit.get(hash).is_none() {
                        self.send_get_data(&addr_from, OpType::Block, hash);
                    }
                }
                // Everything announced may already be here
                self.try_assemble(&addr_from)
            }
            OpType::Tx => {
                for id in &items {
                    if self.ledger.has_transaction(id) || self.ledger.has_mined_transaction(id) {
                        continue;
                    }
                    self.send_get_data(&addr_from, OpType::Tx, id);
                }
                Ok(())
            }
        }
    }

    fn handle_get_data(&self, payload: GetData) -> Result<()> {
        let GetData {
            addr_from,
            op_type,
            id,
        } = payload;

        match op_type {
            OpType::Block => match self.ledger.get_block(&id) {
                Some(block) => self.send_block(&addr_from, &block),
                None => debug!("Block {} not found, ignoring", HEXLOWER.encode(&id)),
            },
            OpType::Tx => match self.ledger.get_transaction(&id) {
                Some(tx) => self.send_tx(&addr_from, &tx),
                None => debug!("Transaction {} not found, ignoring", HEXLOWER.encode(&id)),
            },
        }
        Ok(())
    }

    fn handle_block(&self, payload: BlockPayload) -> Result<()> {
        let BlockPayload { addr_from, block } = payload;
        let block = Block::deserialize(&block)
            .map_err(|e| BlockchainError::WireDecode(format!("Failed to deserialize block: {e}")))?;
        info!("Received block {} from {addr_from}", block.hash_hex());

        if self.ledger.has_block(block.get_hash()) {
            debug!("Block {} already held", block.hash_hex());
        } else if self.ledger.accept_block(block.clone())? {
            self.emit_block_added(&block);
        } else {
            self.transit.store(block);
        }

        // The tip may have moved while this block was in flight
        self.drain_transit()?;
        self.try_assemble(&addr_from)
    }

    fn handle_tx(&self, payload: TxPayload) -> Result<()> {
        let TxPayload {
            addr_from,
            transaction,
        } = payload;
        let tx = Transaction::deserialize(&transaction).map_err(|e| {
            BlockchainError::WireDecode(format!("Failed to deserialize transaction: {e}"))
        })?;
        info!("Received a new transaction from {addr_from}");

        let mempool_size = match self.ledger.add_transaction(tx.clone()) {
            Some(size) => size,
            None => {
                debug!("Transaction {} already known", tx.id_hex());
                return Ok(());
            }
        };
        self.events.emit(NodeEvent::TransactionReceived {
            id: tx.id_hex(),
            from: addr_from.clone(),
        });

        if self.is_bootstrap_node() {
            for node in self.peers.gossip_targets(&[addr_from.as_str()]) {
                self.send_inv(&node, OpType::Tx, vec![*tx.get_id()]);
            }
        } else if mempool_size >= 2 && mempool_size % 2 == 0 {
            self.mine_and_announce()?;
        }
        Ok(())
    }

    fn handle_addr(&self, payload: Addr) -> Result<()> {
        for addr in payload.addr_list {
            if self.peers.add(&addr) {
                self.events.emit(NodeEvent::PeerDiscovered { addr });
            }
        }
        info!("There are {} known nodes now", self.peers.len());
        Ok(())
    }

    fn handle_get_addr(&self, payload: GetAddr) -> Result<()> {
        self.send_addr(&payload.addr_from);
        Ok(())
    }

    fn handle_ping(&self, payload: Ping) -> Result<()> {
        self.send_pong(&payload.addr_from, payload.nonce);
        Ok(())
    }

    fn handle_pong(&self, payload: Pong) -> Result<()> {
        self.events.emit(NodeEvent::PongReceived {
            from: payload.addr_from,
            nonce: payload.nonce,
        });
        Ok(())
    }

    fn emit_block_added(&self, block: &Block) {
        self.events.emit(NodeEvent::BlockAdded {
            hash: block.hash_hex(),
            height: self.ledger.height(),
        });
    }

    // Append buffered blocks for as long as one of them extends the tip.
    fn drain_transit(&self) -> Result<()> {
        loop {
            let tip = self.ledger.tip();
            let Some(child) = self.transit.take_child_of(tip.get_hash()) else {
                return Ok(());
            };
            if self.ledger.accept_block(child.clone())? {
                self.emit_block_added(&child);
            } else {
                // The tip moved underneath us; keep the block for assembly
                self.transit.store(child);
                return Ok(());
            }
        }
    }

    // Once every block `peer` announced is held, offer the whole chain to the ledger.
    fn try_assemble(&self, peer: &str) -> Result<()> {
        let Some(hashes) = self.transit.announced(peer) else {
            return Ok(());
        };

        let mut candidate = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            match self
                .ledger
                .get_block(hash)
                .or_else(|| self.transit.get(hash))
            {
                Some(block) => candidate.push(block),
                None => return Ok(()),
            }
        }

        self.transit.forget_peer(peer);
        let outcome = self.ledger.merge_chain(candidate);
        for hash in &hashes {
            self.transit.remove(hash);
        }
        match outcome {
            Ok(true) => {
                self.events.emit(NodeEvent::ChainReplaced {
                    height: self.ledger.height(),
                });
                Ok(())
            }
            Ok(false) => {
                debug!("Chain announced by {peer} is not longer than ours");
                Ok(())
            }
            Err(e) => {
                warn!("Rejected chain announced by {peer}");
                Err(e)
            }
        }
    }

    fn mine_and_announce(&self) -> Result<()> {
        let block = match self.ledger.mine_block() {
            Ok(block) => block,
            Err(BlockchainError::EmptyMempool) => {
                // A concurrent handler already folded these transactions
                debug!("Mempool drained by another handler, nothing to mine");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let transactions = Transaction::deserialize_set(block.get_payload())
            .map(|txs| txs.len())
            .unwrap_or_default();
        self.events.emit(NodeEvent::BlockMined {
            hash: block.hash_hex(),
            height: self.ledger.height(),
            transactions,
        });

        let hashes = self.ledger.block_hashes();
        for node in self.peers.gossip_targets(&[]) {
            self.send_inv(&node, OpType::Block, hashes.clone());
        }
        Ok(())
    }

    /// Send `message` to `addr`. Fire-and-forget: failures are logged only.
    pub fn send(&self, addr: &str, message: Message) {
        if let Err(e) = self.deliver(addr, &message) {
            warn!("Dropped {} for {addr}: {e}", message.command());
        }
    }

    /// Send `message` to `addr`, reporting failure to the caller.
    pub fn deliver(&self, addr: &str, message: &Message) -> Result<()> {
        send_message(self.transport.as_ref(), addr, message)
    }

    pub fn send_version(&self, addr: &str) {
        self.send(
            addr,
            Message::Version(Version {
                version: NODE_VERSION,
                best_height: self.ledger.height() as u64,
                addr_from: self.node_addr().to_string(),
            }),
        );
    }

    pub fn send_get_blocks(&self, addr: &str) {
        self.send(
            addr,
            Message::GetBlocks(GetBlocks {
                addr_from: self.node_addr().to_string(),
            }),
        );
    }

    pub fn send_inv(&self, addr: &str, op_type: OpType, items: Vec<Digest>) {
        self.send(
            addr,
            Message::Inv(Inv {
                addr_from: self.node_addr().to_string(),
                op_type,
                items,
            }),
        );
    }

    pub fn send_get_data(&self, addr: &str, op_type: OpType, id: &Digest) {
        self.send(
            addr,
            Message::GetData(GetData {
                addr_from: self.node_addr().to_string(),
                op_type,
                id: *id,
            }),
        );
    }

    pub fn send_block(&self, addr: &str, block: &Block) {
        match block.serialize() {
            Ok(bytes) => self.send(
                addr,
                Message::Block(BlockPayload {
                    addr_from: self.node_addr().to_string(),
                    block: bytes,
                }),
            ),
            Err(e) => warn!("Failed to serialize block {}: {e}", block.hash_hex()),
        }
    }

    pub fn send_tx(&self, addr: &str, tx: &Transaction) {
        match tx.serialize() {
            Ok(bytes) => self.send(
                addr,
                Message::Tx(TxPayload {
                    addr_from: self.node_addr().to_string(),
                    transaction: bytes,
                }),
            ),
            Err(e) => warn!("Failed to serialize transaction {}: {e}", tx.id_hex()),
        }
    }

    pub fn send_addr(&self, addr: &str) {
        self.send(
            addr,
            Message::Addr(Addr {
                addr_list: self.peers.addresses(),
            }),
        );
    }

    pub fn send_get_addr(&self, addr: &str) {
        self.send(
            addr,
            Message::GetAddr(GetAddr {
                addr_from: self.node_addr().to_string(),
            }),
        );
    }

    /// Ping `addr` with a random nonce and return the nonce.
    pub fn send_ping(&self, addr: &str) -> i64 {
        let nonce = rand::random::<i64>();
        self.send(
            addr,
            Message::Ping(Ping {
                addr_from: self.node_addr().to_string(),
                nonce,
            }),
        );
        nonce
    }

    pub fn send_pong(&self, addr: &str, nonce: i64) {
        self.send(
            addr,
            Message::Pong(Pong {
                addr_from: self.node_addr().to_string(),
                nonce,
            }),
        );
    }
}
