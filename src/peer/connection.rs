//! A thin, byte-framed transport over one TCP stream (§4.5). The
//! connection itself carries no protocol state — it only marshals bytes —
//! but it does own the socket and the two read/write buffers sized to
//! hold the largest expected `Piece` message.

use crate::wire::codec::parse_body;
use crate::wire::{
    self, handshake, Message, HandshakeEnd, HandshakeStart, Result as WireResult, WireError,
    MAX_MESSAGE_LEN,
};
use bytes::BytesMut;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const BUFFER_CAPACITY: usize = MAX_MESSAGE_LEN as usize;

/// Owns the socket and the shared `closed` flag. [`reader`](Self::reader)
/// and [`writer`](Self::writer) hand out independent handles backed by
/// the same underlying `TcpStream` (via `try_clone`), so the receive and
/// send workers never contend on a single `&mut` — std's `TcpStream`
/// supports concurrent reads and writes from separate handles to the
/// same socket.
pub struct PeerConnection {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
}

impl PeerConnection {
    #[instrument(skip_all, fields(%addr))]
    pub fn connect(addr: SocketAddr, connect_timeout: Duration) -> std::io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        PeerConnection {
            stream,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reader(&self) -> std::io::Result<ConnectionReader> {
        Ok(ConnectionReader {
            stream: self.stream.try_clone()?,
            buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            closed: Arc::clone(&self.closed),
        })
    }

    pub fn writer(&self) -> std::io::Result<ConnectionWriter> {
        Ok(ConnectionWriter {
            stream: self.stream.try_clone()?,
            buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            closed: Arc::clone(&self.closed),
        })
    }

    /// Idempotent: only the first call actually shuts the socket down.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The receive-side handle: `receive_handshake_start`, then
/// `receive_handshake_end`, then a stream of `receive_message` calls.
pub struct ConnectionReader {
    stream: TcpStream,
    buf: BytesMut,
    closed: Arc<AtomicBool>,
}

impl ConnectionReader {
    pub fn receive_handshake_start(&mut self) -> WireResult<HandshakeStart> {
        handshake::read_handshake_start(&mut self.stream)
    }

    pub fn receive_handshake_end(&mut self) -> WireResult<HandshakeEnd> {
        handshake::read_handshake_end(&mut self.stream)
    }

    /// Reads one regular frame into the reusable receive buffer instead of
    /// allocating a fresh `Vec` per message (`wire::read_message` does the
    /// latter; this is the hot path a session's receive worker spins on).
    #[instrument(skip(self), level = "trace")]
    pub fn receive_message(&mut self) -> WireResult<Message> {
        let len = self.stream.read_i32::<BigEndian>()?;
        if len < 0 {
            return Err(WireError::NegativeLength(len));
        }
        let len = len as u32;
        if len == 0 {
            return Ok(Message::KeepAlive);
        }
        if len > MAX_MESSAGE_LEN {
            return Err(WireError::LengthTooLarge(len));
        }

        self.buf.clear();
        self.buf.resize(len as usize, 0);
        self.stream.read_exact(&mut self.buf)?;
        parse_body(&self.buf)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The send-side handle: `send_handshake` once, then a stream of
/// `send_message` calls.
pub struct ConnectionWriter {
    stream: TcpStream,
    buf: BytesMut,
    closed: Arc<AtomicBool>,
}

impl ConnectionWriter {
    pub fn send_handshake(
        &mut self,
        reserved: [u8; 8],
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> WireResult<()> {
        handshake::write_handshake(&mut self.stream, reserved, info_hash, peer_id)
    }

    /// Encodes into the reusable send buffer, then flushes it in one
    /// `write_all` rather than several small writes per message.
    #[instrument(skip(self, msg), level = "trace")]
    pub fn send_message(&mut self, msg: &Message) -> WireResult<()> {
        self.buf.clear();
        let mut scratch = Vec::with_capacity(self.buf.capacity());
        wire::write_message(&mut scratch, msg)?;
        self.buf.extend_from_slice(&scratch);
        self.stream.write_all(&self.buf).map_err(WireError::Io)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn reader_and_writer_share_close_state() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_thread = thread::spawn(move || listener.accept().unwrap().0);

        let conn = PeerConnection::connect(addr, Duration::from_secs(1)).unwrap();
        let _server_side = accept_thread.join().unwrap();

        let reader = conn.reader().unwrap();
        assert!(!reader.is_closed());
        conn.close();
        assert!(reader.is_closed());
        // Idempotent: a second close must not panic or double-shutdown.
        conn.close();
    }
}
