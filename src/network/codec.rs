//! Wire format
//!
//! Every message is `[12-byte zero-padded command][payload]`, where the
//! payload is the bincode encoding of the command's payload struct. One
//! connection carries exactly one message.

use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the command field.
pub const COMMAND_LENGTH: usize = 12;

/// Protocol version this node speaks.
pub const NODE_VERSION: i32 = 1;

pub const CMD_VERSION: &str = "version";
pub const CMD_GET_BLOCKS: &str = "getblocks";
pub const CMD_INV: &str = "inv";
pub const CMD_GET_DATA: &str = "getdata";
pub const CMD_BLOCK: &str = "block";
pub const CMD_TX: &str = "tx";
pub const CMD_ADDR: &str = "addr";
pub const CMD_GET_ADDR: &str = "getaddr";
pub const CMD_PING: &str = "ping";
pub const CMD_PONG: &str = "pong";

/// Zero-pad `name` into the fixed command field.
///
/// Names must be non-empty and shorter than [`COMMAND_LENGTH`], so at least
/// one padding byte always follows the name. Longer names are rejected, never
/// truncated.
pub fn encode_command(name: &str) -> Result<[u8; COMMAND_LENGTH]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= COMMAND_LENGTH {
        return Err(BlockchainError::InvalidCommand(format!(
            "command name must be 1..{} bytes, got {} bytes",
            COMMAND_LENGTH - 1,
            bytes.len()
        )));
    }
    if bytes.contains(&0) {
        return Err(BlockchainError::InvalidCommand(
            "command name contains a zero byte".to_string(),
        ));
    }
    let mut field = [0u8; COMMAND_LENGTH];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Strip the zero padding from a command field.
pub fn decode_command(field: &[u8]) -> Result<String> {
    if field.len() != COMMAND_LENGTH {
        return Err(BlockchainError::WireDecode(format!(
            "command field is {} bytes, expected {COMMAND_LENGTH}",
            field.len()
        )));
    }
    let end = field
        .iter()
        .rposition(|&b| b != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| BlockchainError::WireDecode(format!("command is not UTF-8: {e}")))
}

pub fn encode_payload<T: Serialize + bincode::Encode>(value: &T) -> Result<Vec<u8>> {
    serialize(value)
}

pub fn decode_payload<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    deserialize(bytes).map_err(|e| BlockchainError::WireDecode(e.to_string()))
}

/// What an inventory or data request refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum OpType {
    Block,
    Tx,
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpType::Block => write!(f, "block"),
            OpType::Tx => write!(f, "tx"),
        }
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Version {
    pub version: i32,
    pub best_height: u64,
    pub addr_from: String,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct GetBlocks {
    pub addr_from: String,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Inv {
    pub addr_from: String,
    pub op_type: OpType,
    pub items: Vec<Digest>,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct GetData {
    pub addr_from: String,
    pub op_type: OpType,
    pub id: Digest,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct BlockPayload {
    pub addr_from: String,
    /// Serialized [`crate::core::Block`]
    pub block: Vec<u8>,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TxPayload {
    pub addr_from: String,
    /// Serialized [`crate::core::Transaction`]
    pub transaction: Vec<u8>,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Addr {
    pub addr_list: Vec<String>,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct GetAddr {
    pub addr_from: String,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Ping {
    pub addr_from: String,
    pub nonce: i64,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Pong {
    pub addr_from: String,
    pub nonce: i64,
}

/// A protocol message, one variant per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(Version),
    GetBlocks(GetBlocks),
    Inv(Inv),
    GetData(GetData),
    Block(BlockPayload),
    Tx(TxPayload),
    Addr(Addr),
    GetAddr(GetAddr),
    Ping(Ping),
    Pong(Pong),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Known(Message),
    /// A well-formed frame whose command this node does not handle
    Unknown(String),
}

impl Message {
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => CMD_VERSION,
            Message::GetBlocks(_) => CMD_GET_BLOCKS,
            Message::Inv(_) => CMD_INV,
            Message::GetData(_) => CMD_GET_DATA,
            Message::Block(_) => CMD_BLOCK,
            Message::Tx(_) => CMD_TX,
            Message::Addr(_) => CMD_ADDR,
            Message::GetAddr(_) => CMD_GET_ADDR,
            Message::Ping(_) => CMD_PING,
            Message::Pong(_) => CMD_PONG,
        }
    }

    /// The sender address carried by the payload, if the command has one.
    pub fn addr_from(&self) -> Option<&str> {
        match self {
            Message::Version(p) => Some(&p.addr_from),
            Message::GetBlocks(p) => Some(&p.addr_from),
            Message::Inv(p) => Some(&p.addr_from),
            Message::GetData(p) => Some(&p.addr_from),
            Message::Block(p) => Some(&p.addr_from),
            Message::Tx(p) => Some(&p.addr_from),
            Message::Addr(_) => None,
            Message::GetAddr(p) => Some(&p.addr_from),
            Message::Ping(p) => Some(&p.addr_from),
            Message::Pong(p) => Some(&p.addr_from),
        }
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        match self {
            Message::Version(p) => encode_payload(p),
            Message::GetBlocks(p) => encode_payload(p),
            Message::Inv(p) => encode_payload(p),
            Message::GetData(p) => encode_payload(p),
            Message::Block(p) => encode_payload(p),
            Message::Tx(p) => encode_payload(p),
            Message::Addr(p) => encode_payload(p),
            Message::GetAddr(p) => encode_payload(p),
            Message::Ping(p) => encode_payload(p),
            Message::Pong(p) => encode_payload(p),
        }
    }

    /// Frame the message for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = self.encode_body()?;
        let mut frame = Vec::with_capacity(COMMAND_LENGTH + body.len());
        frame.extend_from_slice(&encode_command(self.command())?);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode the payload for `command`. Unknown commands yield `None`.
    pub fn from_parts(command: &str, payload: &[u8]) -> Result<Option<Message>> {
        let message = match command {
            CMD_VERSION => Message::Version(decode_payload(payload)?),
            CMD_GET_BLOCKS => Message::GetBlocks(decode_payload(payload)?),
            CMD_INV => Message::Inv(decode_payload(payload)?),
            CMD_GET_DATA => Message::GetData(decode_payload(payload)?),
            CMD_BLOCK => Message::Block(decode_payload(payload)?),
            CMD_TX => Message::Tx(decode_payload(payload)?),
            CMD_ADDR => Message::Addr(decode_payload(payload)?),
            CMD_GET_ADDR => Message::GetAddr(decode_payload(payload)?),
            CMD_PING => Message::Ping(decode_payload(payload)?),
            CMD_PONG => Message::Pong(decode_payload(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

/// Split a raw frame into command and payload and decode it.
pub fn decode_frame(frame: &[u8]) -> Result<Frame> {
    if frame.len() < COMMAND_LENGTH {
        return Err(BlockchainError::WireDecode(format!(
            "frame is {} bytes, shorter than the command field",
            frame.len()
        )));
    }
    let (field, payload) = frame.split_at(COMMAND_LENGTH);
    let command = decode_command(field)?;
    match Message::from_parts(&command, payload)? {
        Some(message) => Ok(Frame::Known(message)),
        None => Ok(Frame::Unknown(command)),
    }
}
