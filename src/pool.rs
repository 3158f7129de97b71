//! The session pool (§4.7): owns the shared event executor every
//! session dispatches through, registers listeners against every
//! session present and future, and reaps closed sessions on a timer.

use crate::executor::EventExecutor;
use crate::hash::{PeerId, Sha1Hash};
use crate::peer::{ListenerHandle, PeerConnection, PeerSession};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// How often the reaper sweeps for closed sessions (§4.7).
const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

/// How long `close()` waits for sessions and executors to wind down
/// before giving up (§4.7 "forcibly shuts down").
const DEFAULT_CLOSE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("I/O error spawning a session: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;

/// Tunables for a [`SessionPool`], per spec.md §4.7's "cached thread
/// pool large enough to host two workers per session" and the reaper
/// interval — both exposed here instead of hardcoded, per this crate's
/// convention of small `*Options` structs over global state.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub reap_interval: Duration,
    pub close_deadline: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            reap_interval: DEFAULT_REAP_INTERVAL,
            close_deadline: DEFAULT_CLOSE_DEADLINE,
        }
    }
}

/// Owns the event executor shared by every session it creates, and a
/// registry of those sessions. Per §9 "Pool lifecycle": a pool
/// constructed via [`SessionPool::new`] owns its executor and shuts it
/// down on [`SessionPool::close`]; a pool constructed via
/// [`SessionPool::with_executor`] borrows one supplied by the caller and
/// never shuts it down itself.
pub struct SessionPool {
    executor: Arc<EventExecutor>,
    owns_executor: bool,
    sessions: Mutex<Vec<Arc<PeerSession>>>,
    listeners: ArcSwap<Vec<ListenerHandle>>,
    options: PoolOptions,
    reaper_stop: Sender<()>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SessionPool {
    /// Creates a pool with its own private event executor, which it
    /// will shut down on [`close`](Self::close).
    pub fn new(options: PoolOptions) -> Arc<Self> {
        Self::build(Arc::new(EventExecutor::new()), true, options)
    }

    /// Creates a pool that dispatches through an externally owned
    /// executor; the pool never shuts it down.
    pub fn with_executor(executor: Arc<EventExecutor>, options: PoolOptions) -> Arc<Self> {
        Self::build(executor, false, options)
    }

    fn build(executor: Arc<EventExecutor>, owns_executor: bool, options: PoolOptions) -> Arc<Self> {
        let (reaper_stop, stop_rx) = bounded(1);
        let pool = Arc::new(SessionPool {
            executor,
            owns_executor,
            sessions: Mutex::new(Vec::new()),
            listeners: ArcSwap::from_pointee(Vec::new()),
            options,
            reaper_stop,
            reaper_handle: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let reaper = Arc::clone(&pool);
        let handle = thread::Builder::new()
            .name("session-pool-reaper".into())
            .spawn(move || reaper.reap_loop(stop_rx))
            .expect("spawning the session pool reaper");
        *pool.reaper_handle.lock() = Some(handle);
        pool
    }

    /// Attaches a new session to this pool's executor and to every
    /// listener currently registered (§4.7).
    #[instrument(skip(self, connection))]
    pub fn new_session(
        &self,
        connection: PeerConnection,
        local_peer_id: PeerId,
        info_hash: Sha1Hash,
        reserved: [u8; 8],
    ) -> Result<Arc<PeerSession>> {
        let session = PeerSession::spawn(
            connection,
            local_peer_id,
            info_hash,
            reserved,
            Arc::clone(&self.executor),
            false,
        )?;
        for listener in self.listeners.load_full().iter() {
            session.add_listener(Arc::clone(listener));
        }
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }

    /// Registers `listener` against every session this pool currently
    /// owns and every session it creates afterward.
    pub fn add_listener(&self, listener: ListenerHandle) {
        self.listeners.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::clone(&listener));
            next
        });
        for session in self.sessions.lock().iter() {
            session.add_listener(Arc::clone(&listener));
        }
    }

    pub fn remove_listener(&self, listener: &ListenerHandle) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|l| !Arc::ptr_eq(l, listener))
                .cloned()
                .collect::<Vec<_>>()
        });
        for session in self.sessions.lock().iter() {
            session.remove_listener(listener);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn reap_loop(&self, stop_rx: Receiver<()>) {
        loop {
            match stop_rx.recv_timeout(self.options.reap_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {
                    let mut sessions = self.sessions.lock();
                    let before = sessions.len();
                    sessions.retain(|s| !s.is_closed());
                    let after = sessions.len();
                    drop(sessions);
                    if before != after {
                        debug!(reaped = before - after, remaining = after, "reaper swept closed sessions");
                    }
                }
            }
        }
    }

    /// Closes every session, stops the reaper, and — only if this pool
    /// constructed its own executor — shuts that executor down too.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for session in self.sessions.lock().drain(..) {
            session.close();
        }
        let _ = self.reaper_stop.send(());
        if let Some(handle) = self.reaper_handle.lock().take() {
            let _ = handle.join();
        }
        if self.owns_executor {
            self.executor.shutdown(self.options.close_deadline);
        } else {
            warn!("pool borrowed its executor; leaving it running on close");
        }
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.close();
    }
}
