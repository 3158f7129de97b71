//! The mirrored per-side state machine described in §3.8/§4.6.1: each
//! session tracks a `local` and a `remote` [`SideState`], mutated by the
//! send and receive workers respectively as messages cross the wire.

use crate::bitfield::BitField;
use crate::hash::{PeerId, Sha1Hash};
use crate::wire::Message;
use parking_lot::RwLock;

/// One side (local or remote) of a session's handshake and choke/interest
/// state. Guarded by a `parking_lot::RwLock` so the owning worker takes
/// the write lock while readers (other threads, test assertions) take a
/// cheap read lock.
#[derive(Debug, Default)]
pub struct SideState {
    peer_id: Option<PeerId>,
    protocol_name: Option<String>,
    info_hash: Option<Sha1Hash>,
    reserved_flags: [u8; 8],
    claimed_pieces: BitField,
    choking: bool,
    interested: bool,
    handshake_started: bool,
    handshake_finished: bool,
}

impl SideState {
    fn new() -> Self {
        SideState {
            claimed_pieces: BitField::new(0),
            choking: true,
            interested: false,
            ..Default::default()
        }
    }

    pub fn peer_id(&self) -> Option<&PeerId> {
        self.peer_id.as_ref()
    }

    pub fn protocol_name(&self) -> Option<&str> {
        self.protocol_name.as_deref()
    }

    pub fn info_hash(&self) -> Option<&Sha1Hash> {
        self.info_hash.as_ref()
    }

    pub fn reserved_flags(&self) -> [u8; 8] {
        self.reserved_flags
    }

    pub fn claimed_pieces(&self) -> &BitField {
        &self.claimed_pieces
    }

    pub fn choking(&self) -> bool {
        self.choking
    }

    pub fn interested(&self) -> bool {
        self.interested
    }

    pub fn handshake_started(&self) -> bool {
        self.handshake_started
    }

    pub fn handshake_finished(&self) -> bool {
        self.handshake_finished
    }

    fn on_handshake_start(&mut self, protocol_name: String, reserved: [u8; 8], info_hash: Sha1Hash) {
        self.protocol_name = Some(protocol_name);
        self.reserved_flags = reserved;
        self.info_hash = Some(info_hash);
        self.handshake_started = true;
    }

    fn on_handshake_end(&mut self, peer_id: PeerId) {
        self.peer_id = Some(peer_id);
        self.handshake_finished = true;
    }

    /// Applies the state mutation prescribed by §4.6.1's table for
    /// `msg`. Messages not listed there (Request/Piece/Cancel/Port/
    /// KeepAlive) carry no state change and are forwarded as-is.
    fn apply(&mut self, msg: &Message) {
        match msg {
            Message::Choke => self.choking = true,
            Message::Unchoke => self.choking = false,
            Message::Interested => self.interested = true,
            Message::NotInterested => self.interested = false,
            Message::Have(index) => self.claimed_pieces.set_piece(*index),
            Message::BitField(bits) => self.claimed_pieces.union_with(bits),
            _ => {}
        }
    }
}

/// Owns the `local` and `remote` [`SideState`]s for one session, each
/// behind its own lock so the receive worker (mutating `remote`) and the
/// send worker (mutating `local`) never contend with one another.
#[derive(Debug, Default)]
pub struct SessionState {
    local: RwLock<SideState>,
    remote: RwLock<SideState>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            local: RwLock::new(SideState::new()),
            remote: RwLock::new(SideState::new()),
        }
    }

    pub fn local(&self) -> parking_lot::RwLockReadGuard<'_, SideState> {
        self.local.read()
    }

    pub fn remote(&self) -> parking_lot::RwLockReadGuard<'_, SideState> {
        self.remote.read()
    }

    pub fn on_local_handshake_start(&self, protocol_name: String, reserved: [u8; 8], info_hash: Sha1Hash) {
        self.local.write().on_handshake_start(protocol_name, reserved, info_hash);
    }

    pub fn on_local_handshake_end(&self, peer_id: PeerId) {
        self.local.write().on_handshake_end(peer_id);
    }

    pub fn on_remote_handshake_start(&self, protocol_name: String, reserved: [u8; 8], info_hash: Sha1Hash) {
        self.remote.write().on_handshake_start(protocol_name, reserved, info_hash);
    }

    pub fn on_remote_handshake_end(&self, peer_id: PeerId) {
        self.remote.write().on_handshake_end(peer_id);
    }

    /// Commits the effect of a message received from the remote side.
    /// Must be called, and complete, before the corresponding
    /// `receive-event` is handed to the event executor (§4.6.1's
    /// consistency invariant).
    pub fn apply_remote(&self, msg: &Message) {
        self.remote.write().apply(msg);
    }

    /// Commits the effect of a message the local side is about to send.
    pub fn apply_local(&self, msg: &Message) {
        self.local.write().apply(msg);
    }
}
