//! The fixed set of peer-wire messages (BEP-3) and their framing. A
//! [`Message`] is a regular, length-prefixed frame; the handshake is
//! framed differently (no length prefix) and lives in [`handshake`].

pub(crate) mod codec;
pub mod handshake;

pub use codec::{read_message, write_message};
pub use handshake::{read_handshake_end, read_handshake_start, write_handshake};

use crate::bitfield::BitField;
use std::io;
use thiserror::Error;

/// 16 MiB of block payload plus the 13-byte Piece header — the largest
/// legitimate regular frame (§4.4.3).
pub const MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024 + 13;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame length {0} is negative")]
    NegativeLength(i32),
    #[error("frame length {0} exceeds the configured maximum")]
    LengthTooLarge(u32),
    #[error("unknown message id {0}")]
    UnknownMessageId(u8),
    #[error("frame truncated mid-message")]
    Eof,
    #[error("handshake protocol name is not valid UTF-8")]
    InvalidProtocolName,
    #[error("I/O error on peer connection: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    BitField(BitField),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Port(u16),
}

impl Message {
    pub fn id(&self) -> Option<u8> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(0),
            Message::Unchoke => Some(1),
            Message::Interested => Some(2),
            Message::NotInterested => Some(3),
            Message::Have(_) => Some(4),
            Message::BitField(_) => Some(5),
            Message::Request { .. } => Some(6),
            Message::Piece { .. } => Some(7),
            Message::Cancel { .. } => Some(8),
            Message::Port(_) => Some(9),
        }
    }
}
