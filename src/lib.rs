//! Protocol-layer building blocks for the BitTorrent ecosystem: a
//! bencode codec, a `.torrent` metainfo model, HTTP/UDP tracker clients,
//! and a peer-wire session endpoint with a pooled execution model.
//!
//! This crate does not ship a download client, a CLI, piece
//! verification, disk I/O, a choking/request-scheduling policy, or DHT
//! routing — callers supply those on top.

pub mod bencode;
pub mod bitfield;
pub mod error;
pub mod executor;
pub mod hash;
pub mod metainfo;
pub mod peer;
pub mod pool;
pub mod tracker;
pub mod wire;

pub use error::{Error, Result};
pub use hash::{NodeId, PeerId, Sha1Hash};
