//! Tracker clients (§4.3): HTTP(S) announce, UDP (BEP-15) announce, and
//! a [`BackedTracker`] that fails over across an ordered list of
//! sub-trackers with BEP-12 move-to-front promotion on success.
//!
//! A torrent's full set of trackers is `{single(announce)} ∪ {backed(tier)
//! for tier in announce-list}` (§4.3.1); [`trackers_for`] builds exactly
//! that set from a parsed [`crate::metainfo::TorrentMetaInfo`].

mod backed;
mod http;
mod udp;

pub use backed::BackedTracker;
pub use http::HttpTracker;
pub use udp::UdpTracker;

use crate::bencode::BencodeError;
use crate::hash::{PeerId, Sha1Hash};
use crate::metainfo::TorrentMetaInfo;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error communicating with tracker: {0}")]
    Io(#[from] std::io::Error),
    #[error("bencode decode error in tracker response: {0}")]
    Bencode(#[from] BencodeError),
    #[error("tracker response is not a dictionary")]
    NotADict,
    #[error("tracker response field `{0}` has the wrong type or is missing")]
    InvalidField(&'static str),
    #[error("UDP response transaction id does not match the request")]
    TransactionIdMismatch,
    #[error("UDP response action {got} does not match the expected {expected}")]
    ActionMismatch { expected: u32, got: u32 },
    #[error("UDP response is too short to contain its declared fields")]
    ShortResponse,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("announce URL could not be parsed: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// The event a [`TrackerRequest`] reports, per §3.6. `Regular` is the
/// periodic re-announce with no particular lifecycle meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    Started,
    Stopped,
    Completed,
    Regular,
}

impl TrackerEvent {
    fn as_http_str(self) -> &'static str {
        match self {
            TrackerEvent::Started => "started",
            TrackerEvent::Stopped => "stopped",
            TrackerEvent::Completed => "completed",
            TrackerEvent::Regular => "",
        }
    }

    /// UDP wire encoding (§4.3.3): started=1, completed=2, stopped=3,
    /// regular=0.
    fn as_udp_code(self) -> u32 {
        match self {
            TrackerEvent::Regular => 0,
            TrackerEvent::Started => 1,
            TrackerEvent::Completed => 2,
            TrackerEvent::Stopped => 3,
        }
    }
}

/// Parameters of one announce call (§3.6).
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
    pub port: u16,
    pub uploaded: i64,
    pub downloaded: i64,
    pub left: i64,
    pub event: TrackerEvent,
    pub compact: bool,
    pub want_peer_id: bool,
    pub ip: Option<IpAddr>,
    pub num_want: Option<i32>,
    pub key: String,
    pub tracker_id: Option<String>,
}

/// One peer returned by a tracker, in either wire shape (§3.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub ip: IpAddr,
    pub port: u16,
    pub peer_id: Option<PeerId>,
}

/// A tracker's announce response. `failure_reason` set means the
/// tracker understood the request but declined it (§7): the other
/// fields are left at their defaults in that case and should not be
/// consulted. Network/parse/timeout errors never reach this type — they
/// are reported as `None` from [`Tracker::announce`].
#[derive(Debug, Clone, Default)]
pub struct TrackerResponse {
    pub interval: i64,
    pub min_interval: Option<i64>,
    pub tracker_id: Option<String>,
    pub complete: i64,
    pub incomplete: i64,
    pub warning: Option<String>,
    pub peers: Vec<PeerAddr>,
    pub failure_reason: Option<String>,
}

impl TrackerResponse {
    pub fn is_failure(&self) -> bool {
        self.failure_reason.is_some()
    }
}

/// Implemented by every tracker variant (§4.3.1): a single HTTP(S)
/// tracker, a single UDP tracker, or a [`BackedTracker`] wrapping
/// several of either. `budget` bounds the whole call; on any IO, parse,
/// or timeout error the call returns `None` rather than propagating an
/// error (§7's tracker-layer recovery policy).
pub trait Tracker: Send + Sync {
    fn announce(&self, request: &TrackerRequest, budget: Duration) -> Option<TrackerResponse>;
}

/// Builds the full set of trackers for a torrent (§4.3.1): the primary
/// `announce` URL as a single tracker, plus one [`BackedTracker`] per
/// `announce-list` tier.
pub fn trackers_for(meta: &TorrentMetaInfo) -> Vec<Arc<dyn Tracker>> {
    let mut out: Vec<Arc<dyn Tracker>> = Vec::new();
    out.push(single_tracker(&meta.announce));
    if let Some(tiers) = &meta.announce_list {
        for tier in tiers {
            let sub_trackers: Vec<Arc<dyn Tracker>> =
                tier.iter().map(|url| single_tracker(url)).collect();
            out.push(Arc::new(BackedTracker::new(sub_trackers)));
        }
    }
    out
}

/// Picks the HTTP or UDP implementation by URL scheme.
fn single_tracker(url: &str) -> Arc<dyn Tracker> {
    if url.starts_with("udp://") {
        Arc::new(UdpTracker::new(url.to_string()))
    } else {
        Arc::new(HttpTracker::new(url.to_string()))
    }
}

/// FNV-1a over `s`'s bytes, folded to 32 bits. Used to derive the UDP
/// announce's `key` field deterministically from
/// [`TrackerRequest::key`] (see DESIGN.md for why: a fresh random value
/// per packet would defeat the tracker's ability to recognize the same
/// client across NAT rebinds, which is the entire purpose of the `key`
/// parameter per BEP-7/15).
pub(crate) fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
