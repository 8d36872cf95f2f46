//! Peer-to-peer networking
//!
//! Nodes talk over plain TCP, one framed message per connection. `codec` owns
//! the frame layout, `transport` the dial-and-write side, `protocol` the
//! per-command handlers and `server` the accept loop.

pub mod codec;
pub mod events;
pub mod peers;
pub mod protocol;
pub mod server;
pub mod transport;

pub use codec::{decode_frame, Frame, Message, OpType, COMMAND_LENGTH, NODE_VERSION};
pub use events::{EventSink, NodeEvent};
pub use peers::PeerSet;
pub use protocol::{send_message, Protocol};
pub use server::{open_ledger, start_node, Server};
pub use transport::{read_frame, TcpTransport, Transport, TCP_WRITE_TIMEOUT};
