//! UDP tracker announce (BEP-15, §4.3.3, §6.4): a 4-step exchange over
//! one UDP socket bound fresh for each announce call. IPv6 variants are
//! out of scope (see spec.md §1 Non-goals); only actions 0 (connect)
//! and 1 (announce) are implemented.

use super::{fnv1a_32, PeerAddr, Tracker, TrackerRequest, TrackerResponse};
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, instrument};

/// BEP-15's fixed magic constant identifying the connect request.
const PROTOCOL_MAGIC: u64 = 0x0000_0417_2710_1980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;

pub struct UdpTracker {
    announce_url: String,
}

impl UdpTracker {
    pub fn new(announce_url: String) -> Self {
        UdpTracker { announce_url }
    }

    pub fn announce_url(&self) -> &str {
        &self.announce_url
    }

    fn resolve_addr(&self) -> super::Result<SocketAddr> {
        let url = url::Url::parse(&self.announce_url)?;
        let host = url
            .host_str()
            .ok_or(super::TrackerError::InvalidField("announce url host"))?;
        let port = url.port().unwrap_or(80);
        format!("{host}:{port}")
            .to_string()
            .parse::<SocketAddr>()
            .or_else(|_| {
                // Hostname rather than literal address: resolve via the
                // standard library's getaddrinfo-backed lookup.
                use std::net::ToSocketAddrs;
                (host, port)
                    .to_socket_addrs()
                    .ok()
                    .and_then(|mut it| it.next())
                    .ok_or(super::TrackerError::InvalidField("announce url host"))
            })
    }

    #[instrument(skip(self, request), fields(url = %self.announce_url))]
    fn send(&self, request: &TrackerRequest, budget: Duration) -> super::Result<TrackerResponse> {
        let addr = self.resolve_addr()?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(budget / 2))?;
        socket.connect(addr)?;

        let connection_id = self.do_connect(&socket)?;
        self.do_announce(&socket, connection_id, request)
    }

    fn do_connect(&self, socket: &UdpSocket) -> super::Result<u64> {
        let txid: u32 = rand::rng().random();
        let mut packet = Vec::with_capacity(16);
        packet.extend_from_slice(&PROTOCOL_MAGIC.to_be_bytes());
        packet.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
        packet.extend_from_slice(&txid.to_be_bytes());
        socket.send(&packet)?;

        let mut buf = [0u8; 16];
        let n = socket.recv(&mut buf)?;
        if n < 16 {
            return Err(super::TrackerError::ShortResponse);
        }
        let action = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let got_txid = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        if action != ACTION_CONNECT {
            return Err(super::TrackerError::ActionMismatch {
                expected: ACTION_CONNECT,
                got: action,
            });
        }
        if got_txid != txid {
            return Err(super::TrackerError::TransactionIdMismatch);
        }
        Ok(u64::from_be_bytes(buf[8..16].try_into().unwrap()))
    }

    fn do_announce(
        &self,
        socket: &UdpSocket,
        connection_id: u64,
        request: &TrackerRequest,
    ) -> super::Result<TrackerResponse> {
        let txid: u32 = rand::rng().random();
        let num_want = request.num_want.unwrap_or(-1);

        let mut packet = Vec::with_capacity(98);
        packet.extend_from_slice(&connection_id.to_be_bytes());
        packet.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
        packet.extend_from_slice(&txid.to_be_bytes());
        packet.extend_from_slice(request.info_hash.as_bytes());
        packet.extend_from_slice(request.peer_id.as_bytes());
        packet.extend_from_slice(&(request.downloaded as u64).to_be_bytes());
        packet.extend_from_slice(&(request.left as u64).to_be_bytes());
        packet.extend_from_slice(&(request.uploaded as u64).to_be_bytes());
        packet.extend_from_slice(&request.event.as_udp_code().to_be_bytes());
        match request.ip {
            Some(IpAddr::V4(addr)) => packet.extend_from_slice(&addr.octets()),
            _ => packet.extend_from_slice(&0u32.to_be_bytes()),
        }
        packet.extend_from_slice(&fnv1a_32(request.key.as_bytes()).to_be_bytes());
        packet.extend_from_slice(&num_want.to_be_bytes());
        packet.extend_from_slice(&request.port.to_be_bytes());
        debug_assert_eq!(packet.len(), 98);
        socket.send(&packet)?;

        let max_peers = if num_want > 0 { num_want as usize } else { 200 };
        let mut buf = vec![0u8; 20 + 6 * max_peers];
        let n = socket.recv(&mut buf)?;
        if n < 20 {
            return Err(super::TrackerError::ShortResponse);
        }
        let body = &buf[..n];

        let action = u32::from_be_bytes(body[0..4].try_into().unwrap());
        let got_txid = u32::from_be_bytes(body[4..8].try_into().unwrap());
        if action != ACTION_ANNOUNCE {
            return Err(super::TrackerError::ActionMismatch {
                expected: ACTION_ANNOUNCE,
                got: action,
            });
        }
        if got_txid != txid {
            return Err(super::TrackerError::TransactionIdMismatch);
        }
        let interval = u32::from_be_bytes(body[8..12].try_into().unwrap());
        let leechers = u32::from_be_bytes(body[12..16].try_into().unwrap());
        let seeders = u32::from_be_bytes(body[16..20].try_into().unwrap());

        let peers = body[20..]
            .chunks_exact(6)
            .map(|chunk| PeerAddr {
                ip: IpAddr::V4(Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3])),
                port: u16::from_be_bytes([chunk[4], chunk[5]]),
                peer_id: None,
            })
            .collect();

        Ok(TrackerResponse {
            interval: interval as i64,
            min_interval: None,
            tracker_id: None,
            complete: seeders as i64,
            incomplete: leechers as i64,
            warning: None,
            peers,
            failure_reason: None,
        })
    }
}

impl Tracker for UdpTracker {
    fn announce(&self, request: &TrackerRequest, budget: Duration) -> Option<TrackerResponse> {
        match self.send(request, budget) {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(url = %self.announce_url, error = %e, "UDP tracker announce failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{PeerId, Sha1Hash};
    use crate::tracker::TrackerEvent;
    use std::net::UdpSocket as StdUdpSocket;
    use std::thread;

    fn sample_request() -> TrackerRequest {
        TrackerRequest {
            info_hash: Sha1Hash::new([1; 20]),
            peer_id: PeerId::new([2; 20]),
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 100,
            event: TrackerEvent::Started,
            compact: true,
            want_peer_id: false,
            ip: None,
            num_want: Some(2),
            key: "k".to_string(),
            tracker_id: None,
        }
    }

    /// Scenario 5 of §8: a fake server answers connect then announce
    /// with two compact peer entries.
    #[test]
    fn full_handshake_round_trip() {
        let server = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (n, client_addr) = server.recv_from(&mut buf).unwrap();
            assert_eq!(n, 16);
            let txid = &buf[12..16];
            let mut reply = Vec::with_capacity(16);
            reply.extend_from_slice(&0u32.to_be_bytes());
            reply.extend_from_slice(txid);
            reply.extend_from_slice(&0xCAFE_BABE_DEAD_BEEFu64.to_be_bytes());
            server.send_to(&reply, client_addr).unwrap();

            let (n, client_addr) = server.recv_from(&mut buf).unwrap();
            assert_eq!(n, 98);
            assert_eq!(u32::from_be_bytes(buf[8..12].try_into().unwrap()), 1);
            let txid = &buf[12..16];
            let mut reply = Vec::with_capacity(32);
            reply.extend_from_slice(&1u32.to_be_bytes());
            reply.extend_from_slice(txid);
            reply.extend_from_slice(&1800u32.to_be_bytes());
            reply.extend_from_slice(&3u32.to_be_bytes());
            reply.extend_from_slice(&5u32.to_be_bytes());
            reply.extend_from_slice(&[10, 0, 0, 1, 0x1A, 0xE1]);
            reply.extend_from_slice(&[10, 0, 0, 2, 0x1A, 0xE2]);
            server.send_to(&reply, client_addr).unwrap();
        });

        let tracker = UdpTracker::new(format!("udp://{server_addr}/announce"));
        let response = tracker.announce(&sample_request(), Duration::from_secs(2)).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.incomplete, 3);
        assert_eq!(response.complete, 5);
        assert_eq!(response.peers.len(), 2);

        handle.join().unwrap();
    }

    /// Mismatched action on the announce step (the server is confused
    /// and echoes action=0 again): `announce` returns `None`.
    #[test]
    fn mismatched_announce_action_yields_absent_response() {
        let server = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (_, client_addr) = server.recv_from(&mut buf).unwrap();
            let txid = &buf[12..16];
            let mut reply = Vec::with_capacity(16);
            reply.extend_from_slice(&0u32.to_be_bytes());
            reply.extend_from_slice(txid);
            reply.extend_from_slice(&1u64.to_be_bytes());
            server.send_to(&reply, client_addr).unwrap();

            let (_, client_addr) = server.recv_from(&mut buf).unwrap();
            let txid = &buf[12..16];
            let mut reply = Vec::with_capacity(20);
            reply.extend_from_slice(&0u32.to_be_bytes()); // wrong action (expected 1)
            reply.extend_from_slice(txid);
            reply.extend_from_slice(&[0u8; 12]); // interval, leechers, seeders
            server.send_to(&reply, client_addr).unwrap();
        });

        let tracker = UdpTracker::new(format!("udp://{server_addr}/announce"));
        let response = tracker.announce(&sample_request(), Duration::from_secs(2));
        assert!(response.is_none());

        handle.join().unwrap();
    }
}
