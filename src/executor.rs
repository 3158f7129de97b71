//! A single-thread executor draining boxed closures in submission order.
//! Used as the pool's shared **event executor** (§4.6.2/§4.7): running
//! listener callbacks on one dedicated thread is what gives the
//! per-session (and, if shared, cross-session) event-ordering guarantee
//! "for free" — there is never more than one callback in flight.

use crossbeam_channel::{bounded, unbounded, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Shutdown,
}

pub struct EventExecutor {
    sender: Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventExecutor {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Command>();
        let handle = std::thread::Builder::new()
            .name("event-executor".into())
            .spawn(move || {
                for command in receiver {
                    match command {
                        Command::Run(job) => job(),
                        Command::Shutdown => break,
                    }
                }
            })
            .expect("spawning the event executor thread");
        EventExecutor {
            sender,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Enqueues `job` to run on the executor thread. Submission order is
    /// execution order, which is what makes per-session listener
    /// dispatch strictly ordered.
    pub fn submit(&self, job: Job) {
        if self.sender.send(Command::Run(job)).is_err() {
            warn!("event executor is shut down, dropping submitted job");
        }
    }

    /// Signals the executor to stop after draining already-submitted
    /// jobs, then waits up to `deadline` for the thread to exit. Safe
    /// Rust cannot forcibly terminate a running OS thread; past the
    /// deadline this simply stops waiting and lets the thread finish on
    /// its own, which is the only "forced shutdown" available here.
    pub fn shutdown(&self, deadline: Duration) {
        let _ = self.sender.send(Command::Shutdown);
        let Some(handle) = self.handle.lock().unwrap().take() else {
            return;
        };
        let (done_tx, done_rx) = bounded::<()>(1);
        let waiter = std::thread::spawn(move || {
            let _ = handle.join();
            let _ = done_tx.send(());
        });
        if done_rx.recv_timeout(deadline).is_err() {
            warn!("event executor did not shut down within the deadline");
        }
        let _ = waiter.join();
    }
}

impl Default for EventExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_run_in_submission_order() {
        let executor = EventExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            executor.submit(Box::new(move || order.lock().unwrap().push(i)));
        }
        executor.shutdown(Duration::from_secs(1));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shutdown_is_safe_to_call_once_and_stops_accepting_jobs() {
        let executor = EventExecutor::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        executor.submit(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        executor.shutdown(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Submitting after shutdown must not panic, just drop the job.
        executor.submit(Box::new(|| {}));
    }
}
