//! The peer-wire endpoint: a non-blocking framed transport
//! ([`connection`]) wrapped by a stateful, dual-worker session
//! ([`session`]) that mirrors handshake/choke/interest state
//! ([`state`]) and dispatches events to [`listener`]s.

pub mod connection;
pub mod listener;
pub mod session;
pub mod state;

pub use connection::PeerConnection;
pub use listener::{ListenerHandle, SessionEvent, SessionListener, SessionMessage};
pub use session::PeerSession;
pub use state::{SessionState, SideState};
