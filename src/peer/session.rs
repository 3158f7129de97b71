//! The peer session: owns one [`PeerConnection`], runs its receive and
//! send workers, and dispatches events to listeners (§4.6).

use super::connection::{ConnectionReader, ConnectionWriter, PeerConnection};
use super::listener::{ListenerHandle, SessionEvent, SessionMessage};
use super::state::SessionState;
use crate::executor::EventExecutor;
use crate::hash::{PeerId, Sha1Hash};
use crate::wire::{handshake, Message};
use arc_swap::ArcSwap;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, instrument, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// The 1-minute poll wait of §4.6.2: the send worker wakes on this
/// cadence even with nothing queued, purely so it can't block forever on
/// a channel that (in principle) nobody will ever write to again.
const SEND_QUEUE_POLL: Duration = Duration::from_secs(60);

/// The deadline a session waits for its own (non-shared) executor to
/// drain on close, before giving up on waiting (§4.6.4, §9 "Pool
/// lifecycle").
const OWNED_EXECUTOR_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

pub struct PeerSession {
    id: u64,
    connection: PeerConnection,
    state: Arc<SessionState>,
    listeners: ArcSwap<Vec<ListenerHandle>>,
    output: Sender<Message>,
    executor: Arc<EventExecutor>,
    owns_executor: bool,
    close_fired: AtomicBool,
    workers: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl PeerSession {
    /// Writes the local handshake synchronously, then spawns the receive
    /// and send worker threads (§4.6.2). `executor` is the event
    /// executor events are dispatched through; `owns_executor` records
    /// whether this session is responsible for shutting it down on close
    /// (true for a standalone session with its own private executor,
    /// false for a session created by a [`crate::pool::SessionPool`]).
    #[instrument(skip(connection, executor), fields(session_id))]
    pub fn spawn(
        connection: PeerConnection,
        local_peer_id: PeerId,
        info_hash: Sha1Hash,
        reserved: [u8; 8],
        executor: Arc<EventExecutor>,
        owns_executor: bool,
    ) -> std::io::Result<Arc<Self>> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("session_id", id);

        let mut writer = connection.writer()?;
        writer.send_handshake(reserved, *info_hash.as_bytes(), *local_peer_id.as_bytes())?;

        let state = Arc::new(SessionState::new());
        state.on_local_handshake_start(handshake::PROTOCOL_NAME.to_string(), reserved, info_hash);
        state.on_local_handshake_end(local_peer_id);

        let (output_tx, output_rx) = unbounded::<Message>();
        let session = Arc::new(PeerSession {
            id,
            connection,
            state,
            listeners: ArcSwap::from_pointee(Vec::new()),
            output: output_tx,
            executor,
            owns_executor,
            close_fired: AtomicBool::new(false),
            workers: Mutex::new(None),
        });

        let reader = session.connection.reader()?;
        let recv_session = Arc::clone(&session);
        let recv_handle = thread::Builder::new()
            .name(format!("peer-recv-{id}"))
            .spawn(move || recv_session.receive_loop(reader))
            .expect("spawning the receive worker");

        let send_session = Arc::clone(&session);
        let send_handle = thread::Builder::new()
            .name(format!("peer-send-{id}"))
            .spawn(move || send_session.send_loop(writer, output_rx))
            .expect("spawning the send worker");

        *session.workers.lock().unwrap() = Some((recv_handle, send_handle));
        Ok(session)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub fn add_listener(&self, listener: ListenerHandle) {
        self.listeners.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::clone(&listener));
            next
        });
    }

    pub fn remove_listener(&self, listener: &ListenerHandle) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|l| !Arc::ptr_eq(l, listener))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Enqueues `msg` on the output FIFO; non-blocking. Returns `true`
    /// iff the message was enqueued (`false` once the session is closed
    /// and its send worker has exited).
    pub fn send_message(&self, msg: Message) -> bool {
        self.output.send(msg).is_ok()
    }

    /// Idempotent: only the first caller actually tears the session
    /// down. Closes the connection, wakes the send worker with a
    /// sentinel, and fires exactly one close-event (§4.6.4).
    pub fn close(&self) {
        if self.close_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session_id = self.id, "closing peer session");
        self.connection.close();
        let _ = self.output.send(Message::KeepAlive);
        self.fire(SessionEvent::Close);
        if self.owns_executor {
            self.executor.shutdown(OWNED_EXECUTOR_SHUTDOWN_DEADLINE);
        }
    }

    fn fire(&self, event: SessionEvent) {
        let id = self.id;
        let listeners = self.listeners.load_full();
        self.executor.submit(Box::new(move || {
            for listener in listeners.iter() {
                listener.on_event(id, &event);
            }
        }));
    }

    fn receive_loop(self: Arc<Self>, mut reader: ConnectionReader) {
        if let Err(e) = self.receive_handshake(&mut reader) {
            debug!(session_id = self.id, error = %e, "handshake receive failed");
            self.close();
            return;
        }
        loop {
            match reader.receive_message() {
                Ok(msg) => {
                    self.state.apply_remote(&msg);
                    self.fire(SessionEvent::ReceiveEvent(SessionMessage::Regular(msg)));
                }
                Err(e) => {
                    debug!(session_id = self.id, error = %e, "receive worker stopping");
                    self.close();
                    return;
                }
            }
        }
    }

    fn receive_handshake(&self, reader: &mut ConnectionReader) -> crate::wire::Result<()> {
        let start = reader.receive_handshake_start()?;
        let info_hash = Sha1Hash::new(start.info_hash);
        self.state.on_remote_handshake_start(
            start.protocol_name.clone(),
            start.reserved,
            info_hash.clone(),
        );
        self.fire(SessionEvent::ReceiveEvent(SessionMessage::HandshakeStart {
            protocol_name: start.protocol_name,
            reserved: start.reserved,
            info_hash,
        }));

        let end = reader.receive_handshake_end()?;
        let peer_id = PeerId::new(end.peer_id);
        self.state.on_remote_handshake_end(peer_id.clone());
        self.fire(SessionEvent::ReceiveEvent(SessionMessage::HandshakeEnd {
            peer_id,
        }));
        Ok(())
    }

    fn send_loop(
        self: Arc<Self>,
        mut writer: ConnectionWriter,
        output_rx: crossbeam_channel::Receiver<Message>,
    ) {
        loop {
            match output_rx.recv_timeout(SEND_QUEUE_POLL) {
                Ok(msg) => {
                    if self.connection.is_closed() {
                        return;
                    }
                    self.state.apply_local(&msg);
                    if let Err(e) = writer.send_message(&msg) {
                        debug!(session_id = self.id, error = %e, "send worker stopping");
                        self.close();
                        return;
                    }
                    self.fire(SessionEvent::SendEvent(SessionMessage::Regular(msg)));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.connection.is_closed() {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(session_id = self.id, "output queue disconnected unexpectedly");
                    self.close();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::listener::SessionListener;
    use crate::wire::handshake::PROTOCOL_NAME;
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex as StdMutex;

    struct RecordingListener {
        events: StdMutex<Vec<SessionEvent>>,
    }

    impl SessionListener for RecordingListener {
        fn on_event(&self, _session_id: u64, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    /// Writes a full handshake followed by BitField([0,2]), Have(5),
    /// Unchoke onto `stream`, matching scenario 6 of §8.
    fn write_fake_peer_script(mut stream: TcpStream) {
        use crate::bitfield::BitField;
        use crate::wire::write_message;
        handshake::write_handshake(&mut stream, [0u8; 8], [1u8; 20], [2u8; 20]).unwrap();
        let mut bf = BitField::new(8);
        bf.set_piece(0);
        bf.set_piece(2);
        write_message(&mut stream, &Message::BitField(bf)).unwrap();
        write_message(&mut stream, &Message::Have(5)).unwrap();
        write_message(&mut stream, &Message::Unchoke).unwrap();
    }

    #[test]
    fn scenario_six_event_ordering_and_close() {
        let listener_sock = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener_sock.local_addr().unwrap();
        let accept_thread = thread::spawn(move || listener_sock.accept().unwrap().0);

        let client_stream = TcpStream::connect(addr).unwrap();
        let server_stream = accept_thread.join().unwrap();

        let executor = Arc::new(EventExecutor::new());
        let session = PeerSession::spawn(
            PeerConnection::from_stream(client_stream),
            PeerId::new([9u8; 20]),
            Sha1Hash::new([1u8; 20]),
            [0u8; 8],
            Arc::clone(&executor),
            false,
        )
        .unwrap();

        let listener = Arc::new(RecordingListener {
            events: StdMutex::new(Vec::new()),
        });
        session.add_listener(listener.clone() as ListenerHandle);

        write_fake_peer_script(server_stream.try_clone().unwrap());

        // Wait for the 5 receive-events plus the close-event.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if listener.events.lock().unwrap().len() >= 5 || std::time::Instant::now() > deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(session.state().remote().protocol_name(), Some(PROTOCOL_NAME));
        let claimed: Vec<u32> = session.state().remote().claimed_pieces().iter_set().collect();
        assert_eq!(claimed, vec![0, 2, 5]);
        assert!(!session.state().remote().choking());

        drop(server_stream);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let events = listener.events.lock().unwrap();
            if events.iter().any(|e| matches!(e, SessionEvent::Close)) {
                break;
            }
            drop(events);
            if std::time::Instant::now() > deadline {
                panic!("close-event never observed");
            }
            thread::sleep(Duration::from_millis(10));
        }

        let events = listener.events.lock().unwrap();
        let close_count = events.iter().filter(|e| matches!(e, SessionEvent::Close)).count();
        assert_eq!(close_count, 1);

        let receive_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ReceiveEvent(_)))
            .collect();
        assert_eq!(receive_events.len(), 5);
    }
}
