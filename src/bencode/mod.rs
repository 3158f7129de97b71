//! Bencode codec: the canonical binary format used for `.torrent` files,
//! tracker requests/responses, and the DHT wire (KRPC, out of scope here).
//!
//! A [`Value`] is a tagged union of the four bencode types. Dictionaries are
//! stored in a `BTreeMap` so that any `Value` built in memory is already
//! canonically ordered; the decoder additionally validates that the keys in
//! the *source bytes* were strictly increasing and unique, since that is the
//! invariant the info-hash computation in [`crate::metainfo`] depends on.

mod decode;
mod encode;
mod hash_sink;

pub use decode::{decode, decode_from_reader};
pub use encode::{encode, encode_to_writer};
pub use hash_sink::HashingSink;

use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// Maximum byte-string length the decoder will allocate for in one go.
/// Guards against a hostile `<huge-number>:` header exhausting memory
/// before the actual bytes are even read.
pub const MAX_STRING_LEN: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    String(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key))
    }

    pub fn string<S: Into<Vec<u8>>>(s: S) -> Value {
        Value::String(s.into())
    }
}

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input")]
    Eof,
    #[error("malformed integer at byte offset {0}")]
    MalformedNumber(u64),
    #[error("dictionary key at byte offset {0} is not a byte-string")]
    InvalidKeyType(u64),
    #[error("dictionary key {0:?} at byte offset {1} is out of order")]
    Unordered(Vec<u8>, u64),
    #[error("duplicate dictionary key {0:?} at byte offset {1}")]
    DuplicateKey(Vec<u8>, u64),
    #[error("byte-string length {0} exceeds the configured maximum")]
    LengthOverflow(u64),
    #[error("unexpected byte {0:#04x} at offset {1}")]
    UnexpectedByte(u8, u64),
    #[error("I/O error reading bencode stream: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BencodeError>;
