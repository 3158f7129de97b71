//! Crate-level error aggregation (§7, SPEC_FULL component H): each
//! subsystem defines its own `thiserror` enum; this `Error` wraps all
//! of them behind `#[from]` so a caller that touches more than one
//! layer (e.g. parsing a torrent, then spawning a session) can
//! propagate with a single `?` chain if it wants to.

use crate::bencode::BencodeError;
use crate::metainfo::MetaInfoError;
use crate::pool::PoolError;
use crate::tracker::TrackerError;
use crate::wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bencode(#[from] BencodeError),
    #[error(transparent)]
    MetaInfo(#[from] MetaInfoError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
