//! HTTP(S) tracker announce (§4.3.2, §6.3). Builds the query string by
//! hand rather than through `url::Url::query_pairs_mut`, because
//! `info_hash`/`peer_id` need byte-exact percent-encoding of their raw
//! 20 bytes (§9 open question, resolved: byte-by-byte, not a UTF-8
//! round trip) and `url`'s own encoder is UTF-8-aware.

use super::{PeerAddr, Tracker, TrackerRequest, TrackerResponse};
use crate::bencode::{self, Value};
use crate::hash::{percent_encode_bytes, PeerId};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// An HTTP(S) tracker endpoint, identified by its announce URL.
///
/// Holds no connection state between announces: each call to
/// [`Tracker::announce`] builds a fresh `reqwest::blocking::Client`
/// scoped to that call's time budget (§4.3.2).
pub struct HttpTracker {
    announce_url: String,
}

impl HttpTracker {
    /// Builds a tracker client for the given announce URL.
    ///
    /// # Arguments
    /// * `announce_url` - the tracker's announce endpoint, e.g.
    ///   `"http://tracker.example/announce"`. Not validated as a URL here;
    ///   a malformed URL surfaces as a `send` failure on the first announce.
    ///
    /// # Returns
    /// * `Self` - ready to announce.
    pub fn new(announce_url: String) -> Self {
        HttpTracker { announce_url }
    }

    /// The announce URL this tracker was constructed with.
    pub fn announce_url(&self) -> &str {
        &self.announce_url
    }

    /// Builds the announce query string for `request`.
    ///
    /// Percent-encodes `info_hash`/`peer_id`/`ip`/`key`/`tracker_id`
    /// byte-by-byte via [`percent_encode_bytes`](crate::hash::percent_encode_bytes)
    /// rather than through `url`'s UTF-8-aware encoder, per §9's resolved
    /// open question on exact wire encoding.
    ///
    /// # Arguments
    /// * `request` - the announce parameters to encode.
    ///
    /// # Returns
    /// * `String` - a `key=value&key=value...` query string, without a
    ///   leading `?` or `&`.
    fn build_query(&self, request: &TrackerRequest) -> String {
        let mut parts = vec![
            format!("info_hash={}", percent_encode_bytes(request.info_hash.as_bytes())),
            format!("peer_id={}", percent_encode_bytes(request.peer_id.as_bytes())),
            format!("port={}", request.port),
            format!("uploaded={}", request.uploaded),
            format!("downloaded={}", request.downloaded),
            format!("left={}", request.left),
        ];
        if request.compact {
            parts.push("compact=1".to_string());
        }
        parts.push(format!("no_peer_id={}", if request.want_peer_id { 0 } else { 1 }));
        let event_str = request.event.as_http_str();
        if !event_str.is_empty() {
            parts.push(format!("event={event_str}"));
        }
        if let Some(ip) = request.ip {
            parts.push(format!("ip={}", percent_encode_bytes(ip.to_string().as_bytes())));
        }
        if let Some(num_want) = request.num_want {
            parts.push(format!("numwant={num_want}"));
        }
        parts.push(format!("key={}", percent_encode_bytes(request.key.as_bytes())));
        if let Some(tracker_id) = &request.tracker_id {
            parts.push(format!("trackerid={}", percent_encode_bytes(tracker_id.as_bytes())));
        }
        parts.join("&")
    }

    /// Sends the announce request and parses the tracker's bencoded reply.
    ///
    /// # Arguments
    /// * `request` - the announce parameters.
    /// * `budget` - the overall time budget (§4.3.2); the connect timeout
    ///   is the full budget and the read timeout is a fifth of it, since
    ///   `reqwest::blocking` exposes one request-level timeout rather than
    ///   separate connect/read phases.
    ///
    /// # Returns
    /// * `super::Result<TrackerResponse>` - the parsed response, or an
    ///   error if the request fails, times out, or the body isn't a
    ///   well-formed tracker response dict.
    #[instrument(skip(self, request), fields(url = %self.announce_url))]
    fn send(&self, request: &TrackerRequest, budget: Duration) -> super::Result<TrackerResponse> {
        let separator = if self.announce_url.contains('?') { '&' } else { '?' };
        let full_url = format!("{}{}{}", self.announce_url, separator, self.build_query(request));

        // §4.3.2: connect-timeout = budget, read-timeout = budget/5.
        // reqwest's blocking client exposes one overall request timeout
        // rather than separate connect/read phases; `timeout` is set to
        // the tighter read-timeout bound and `connect_timeout` to the
        // full budget, which matches the spec's intent that a slow
        // connect eats into the same budget as a slow read.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(budget)
            .timeout(budget / 5)
            .build()?;

        let response = client.get(&full_url).send()?;
        let body = response.bytes()?;
        let value = bencode::decode(&body)?;
        parse_response(&value)
    }
}

impl Tracker for HttpTracker {
    /// Announces to this tracker, swallowing the error into `None` per
    /// the [`Tracker`] trait's contract (§4.3.1: a single tracker's
    /// failure is a signal to [`BackedTracker`](super::BackedTracker),
    /// not a propagated error).
    ///
    /// # Arguments
    /// * `request` - the announce parameters.
    /// * `budget` - the time budget this call may spend.
    ///
    /// # Returns
    /// * `Option<TrackerResponse>` - `Some` on a successful, well-formed
    ///   reply; `None` on any failure (logged at `debug`).
    fn announce(&self, request: &TrackerRequest, budget: Duration) -> Option<TrackerResponse> {
        match self.send(request, budget) {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(url = %self.announce_url, error = %e, "HTTP tracker announce failed");
                None
            }
        }
    }
}

/// Parses a tracker's top-level bencoded response dict.
///
/// Handles both the `failure reason` short-circuit form and the normal
/// form (`interval`/`peers`/etc.), dispatching `peers` to
/// [`parse_compact_peers`] or [`parse_dict_peers`] depending on whether
/// the tracker replied in compact or non-compact form.
///
/// # Arguments
/// * `value` - the decoded bencode value of the whole response body.
///
/// # Returns
/// * `super::Result<TrackerResponse>` - the parsed response, or
///   `TrackerError::NotADict`/`InvalidField` if a required field is
///   missing or the wrong type.
fn parse_response(value: &Value) -> super::Result<TrackerResponse> {
    let dict = value.as_dict().ok_or(super::TrackerError::NotADict)?;

    if let Some(reason) = dict.get(b"failure reason".as_slice()) {
        let reason = reason
            .as_str()
            .ok_or(super::TrackerError::InvalidField("failure reason"))?
            .to_owned();
        return Ok(TrackerResponse {
            failure_reason: Some(reason),
            ..Default::default()
        });
    }

    let interval = dict
        .get(b"interval".as_slice())
        .ok_or(super::TrackerError::InvalidField("interval"))?
        .as_integer()
        .ok_or(super::TrackerError::InvalidField("interval"))?;
    let min_interval = dict
        .get(b"min interval".as_slice())
        .and_then(Value::as_integer);
    let tracker_id = dict
        .get(b"tracker id".as_slice())
        .and_then(Value::as_str)
        .map(str::to_owned);
    let complete = dict.get(b"complete".as_slice()).and_then(Value::as_integer).unwrap_or(0);
    let incomplete = dict
        .get(b"incomplete".as_slice())
        .and_then(Value::as_integer)
        .unwrap_or(0);
    let warning = dict
        .get(b"warning message".as_slice())
        .and_then(Value::as_str)
        .map(str::to_owned);

    let peers = match dict.get(b"peers".as_slice()) {
        Some(Value::String(blob)) => parse_compact_peers(blob)?,
        Some(Value::List(list)) => parse_dict_peers(list)?,
        Some(_) => return Err(super::TrackerError::InvalidField("peers")),
        None => Vec::new(),
    };

    Ok(TrackerResponse {
        interval,
        min_interval,
        tracker_id,
        complete,
        incomplete,
        warning,
        peers,
        failure_reason: None,
    })
}

/// Parses the compact peer form: `N * 6` bytes, each peer 4-byte IPv4
/// followed by a 2-byte big-endian port.
///
/// # Arguments
/// * `blob` - the raw `peers` string value; length must be a multiple of 6.
///
/// # Returns
/// * `super::Result<Vec<PeerAddr>>` - one entry per 6-byte chunk, or
///   `InvalidField` if `blob.len()` isn't a multiple of 6.
fn parse_compact_peers(blob: &[u8]) -> super::Result<Vec<PeerAddr>> {
    if blob.len() % 6 != 0 {
        return Err(super::TrackerError::InvalidField("peers"));
    }
    Ok(blob
        .chunks_exact(6)
        .map(|chunk| PeerAddr {
            ip: IpAddr::V4(Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3])),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
            peer_id: None,
        })
        .collect())
}

/// Parses the non-compact peer form: a list of `{ip, port, peer id?}`
/// dictionaries.
///
/// # Arguments
/// * `list` - the raw `peers` list value.
///
/// # Returns
/// * `super::Result<Vec<PeerAddr>>` - one entry per dict, or
///   `InvalidField` if an entry is missing `ip`/`port` or has the wrong type.
fn parse_dict_peers(list: &[Value]) -> super::Result<Vec<PeerAddr>> {
    let mut peers = Vec::with_capacity(list.len());
    for entry in list {
        let dict = entry.as_dict().ok_or(super::TrackerError::InvalidField("peers[]"))?;
        let ip_str = dict
            .get(b"ip".as_slice())
            .and_then(Value::as_str)
            .ok_or(super::TrackerError::InvalidField("peers[].ip"))?;
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| super::TrackerError::InvalidField("peers[].ip"))?;
        let port = dict
            .get(b"port".as_slice())
            .and_then(Value::as_integer)
            .ok_or(super::TrackerError::InvalidField("peers[].port"))? as u16;
        let peer_id = dict
            .get(b"peer id".as_slice())
            .and_then(Value::as_bytes)
            .and_then(PeerId::from_slice);
        peers.push(PeerAddr { ip, port, peer_id });
    }
    if peers.is_empty() && !list.is_empty() {
        warn!("peers[] list was non-empty but no entries parsed");
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha1Hash;
    use crate::tracker::TrackerEvent;
    use std::collections::BTreeMap;

    fn sample_request() -> TrackerRequest {
        TrackerRequest {
            info_hash: Sha1Hash::new([0x11; 20]),
            peer_id: PeerId::new([0x22; 20]),
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 1000,
            event: TrackerEvent::Started,
            compact: false,
            want_peer_id: true,
            ip: None,
            num_want: Some(8),
            key: "sessionkey".to_string(),
            tracker_id: None,
        }
    }

    #[test]
    fn query_contains_started_numwant_and_no_peer_id_but_not_compact() {
        let tracker = HttpTracker::new("http://tracker.example/announce".to_string());
        let query = tracker.build_query(&sample_request());
        assert!(query.contains("event=started"));
        assert!(query.contains("numwant=8"));
        assert!(query.contains("no_peer_id=0"));
        assert!(!query.contains("compact="));
    }

    #[test]
    fn query_byte_exact_encodes_info_hash() {
        let tracker = HttpTracker::new("http://tracker.example/announce".to_string());
        let query = tracker.build_query(&sample_request());
        assert!(query.contains(&format!("info_hash={}", "%11".repeat(20))));
    }

    #[test]
    fn parses_compact_peer_blob() {
        let mut blob = vec![192, 168, 0, 1];
        blob.extend_from_slice(&6881u16.to_be_bytes());
        let mut dict = BTreeMap::new();
        dict.insert(b"interval".to_vec(), Value::Integer(1800));
        dict.insert(b"peers".to_vec(), Value::String(blob));
        let response = parse_response(&Value::Dict(dict)).unwrap();
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].ip, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(response.peers[0].port, 6881);
        assert!(response.peers[0].peer_id.is_none());
    }

    #[test]
    fn parses_failure_reason() {
        let mut dict = BTreeMap::new();
        dict.insert(b"failure reason".to_vec(), Value::string("bad info_hash"));
        let response = parse_response(&Value::Dict(dict)).unwrap();
        assert_eq!(response.failure_reason.as_deref(), Some("bad info_hash"));
    }
}
