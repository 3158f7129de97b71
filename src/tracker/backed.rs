//! A tiered tracker that tries each sub-tracker in order, promoting the
//! first success to the front of the list (BEP-12 move-to-front, §3.3,
//! §4.3.1) and splitting its time budget across attempts (§4.3.4).

use super::{Tracker, TrackerRequest, TrackerResponse};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

pub struct BackedTracker {
    sub_trackers: Mutex<Vec<Arc<dyn Tracker>>>,
}

impl BackedTracker {
    pub fn new(sub_trackers: Vec<Arc<dyn Tracker>>) -> Self {
        BackedTracker {
            sub_trackers: Mutex::new(sub_trackers),
        }
    }

    /// A snapshot of the current try order, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.sub_trackers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Tracker for BackedTracker {
    /// §4.3.4: on entry, `remaining = budget`. For each sub-tracker,
    /// allocate `remaining / left` to that call, subtract the actual
    /// elapsed time, and decrement `left`. Stop at the first success or
    /// once `remaining <= 0`. Snapshotting the tier under the lock and
    /// mutating it again only on success keeps the move-to-front
    /// mutation a single atomic step, safe against concurrent callers.
    #[instrument(skip(self, request))]
    fn announce(&self, request: &TrackerRequest, budget: Duration) -> Option<TrackerResponse> {
        let tier = self.sub_trackers.lock().clone();
        if tier.is_empty() {
            return None;
        }

        let mut remaining = budget;
        let mut left = tier.len();
        for tracker in &tier {
            if remaining.is_zero() {
                break;
            }
            let slice = remaining / left as u32;
            let start = Instant::now();
            let result = tracker.announce(request, slice);
            remaining = remaining.saturating_sub(start.elapsed());
            left -= 1;

            if let Some(response) = result {
                self.promote(tracker);
                return Some(response);
            }
            debug!("sub-tracker attempt failed, trying next in tier");
        }
        None
    }
}

impl BackedTracker {
    fn promote(&self, winner: &Arc<dyn Tracker>) {
        let mut guard = self.sub_trackers.lock();
        if let Some(pos) = guard.iter().position(|t| Arc::ptr_eq(t, winner)) {
            let tracker = guard.remove(pos);
            guard.insert(0, tracker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{PeerId, Sha1Hash};
    use crate::tracker::TrackerEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyTracker {
        id: usize,
        fails: AtomicUsize,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl Tracker for FlakyTracker {
        fn announce(&self, _request: &TrackerRequest, _budget: Duration) -> Option<TrackerResponse> {
            self.calls.lock().push(self.id);
            if self.fails.load(Ordering::SeqCst) > 0 {
                self.fails.fetch_sub(1, Ordering::SeqCst);
                None
            } else {
                Some(TrackerResponse {
                    interval: 1800,
                    ..Default::default()
                })
            }
        }
    }

    fn sample_request() -> TrackerRequest {
        TrackerRequest {
            info_hash: Sha1Hash::new([0; 20]),
            peer_id: PeerId::new([0; 20]),
            port: 0,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: TrackerEvent::Regular,
            compact: true,
            want_peer_id: false,
            ip: None,
            num_want: None,
            key: String::new(),
            tracker_id: None,
        }
    }

    #[test]
    fn promotes_successful_sub_tracker_to_front() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(FlakyTracker { id: 0, fails: AtomicUsize::new(1), calls: calls.clone() });
        let b = Arc::new(FlakyTracker { id: 1, fails: AtomicUsize::new(0), calls: calls.clone() });
        let backed = BackedTracker::new(vec![a.clone() as Arc<dyn Tracker>, b.clone() as Arc<dyn Tracker>]);

        let response = backed.announce(&sample_request(), Duration::from_secs(1));
        assert!(response.is_some());
        assert_eq!(*calls.lock(), vec![0, 1]);

        // b succeeded, so it's now first; a second call should try b first.
        calls.lock().clear();
        a.fails.store(0, Ordering::SeqCst);
        let response = backed.announce(&sample_request(), Duration::from_secs(1));
        assert!(response.is_some());
        assert_eq!(*calls.lock(), vec![1]);
    }

    #[test]
    fn stops_after_first_success_without_trying_remaining() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(FlakyTracker { id: 0, fails: AtomicUsize::new(0), calls: calls.clone() });
        let b = Arc::new(FlakyTracker { id: 1, fails: AtomicUsize::new(0), calls: calls.clone() });
        let backed = BackedTracker::new(vec![a as Arc<dyn Tracker>, b as Arc<dyn Tracker>]);

        backed.announce(&sample_request(), Duration::from_secs(1));
        assert_eq!(*calls.lock(), vec![0]);
    }
}
