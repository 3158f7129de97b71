//! Listener dispatch (§4.6.2, §4.6.4). Listeners are invoked one at a
//! time, in wire/enqueue order, from the pool's single-threaded event
//! executor — never from the receive or send worker directly.

use crate::hash::{PeerId, Sha1Hash};
use crate::wire::Message;
use std::sync::Arc;

/// A message a session observed crossing the wire, widened beyond
/// [`Message`] to cover the two handshake halves (§3.7), which are
/// framed differently and so aren't part of the regular `Message` union.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    HandshakeStart {
        protocol_name: String,
        reserved: [u8; 8],
        info_hash: Sha1Hash,
    },
    HandshakeEnd {
        peer_id: PeerId,
    },
    Regular(Message),
}

/// One event a session can fire at a listener. `ReceiveEvent` fires after
/// the corresponding remote-side state mutation has already been
/// committed; `SendEvent` fires after the local-side mutation. `Close`
/// fires exactly once, the first time the session closes.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ReceiveEvent(SessionMessage),
    SendEvent(SessionMessage),
    Close,
}

/// Implemented by anything that wants to observe a session's traffic.
/// Registered against a [`super::PeerSession`] directly or against a
/// [`crate::pool::SessionPool`] (which fans registration out to every
/// session it owns, present and future).
pub trait SessionListener: Send + Sync {
    fn on_event(&self, session_id: u64, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(u64, &SessionEvent) + Send + Sync,
{
    fn on_event(&self, session_id: u64, event: &SessionEvent) {
        self(session_id, event)
    }
}

pub type ListenerHandle = Arc<dyn SessionListener>;
