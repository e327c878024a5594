//! Request hold service — parks pull requests that found no data until
//! an arrival notification or their deadline, whichever comes first.
//!
//! The pull engine's drain task owns re-evaluation; this registry only
//! stores parked requests and carries the arrival signal.

use std::time::Instant;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::pull::PullRequest;

pub(crate) struct Parked {
    pub request: PullRequest,
    pub deadline: Instant,
}

pub struct HoldService {
    parked: Mutex<Vec<Parked>>,
    arrivals: Notify,
    closed: AtomicBool,
}

impl HoldService {
    pub fn new() -> Self {
        Self {
            parked: Mutex::new(Vec::new()),
            arrivals: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Park a request until `deadline`. A request suspended after close
    /// is completed immediately with an empty response.
    pub(crate) fn suspend(&self, request: PullRequest, deadline: Instant) {
        if self.closed.load(Ordering::Acquire) {
            request.complete_empty();
            return;
        }
        self.parked.lock().push(Parked { request, deadline });
        tracing::trace!("pull request suspended");
    }

    /// Signal that new data may satisfy a parked request.
    pub fn notify_message_arriving(&self) {
        self.arrivals.notify_one();
    }

    /// Await the next arrival signal.
    pub async fn wait_arrival(&self) {
        self.arrivals.notified().await;
    }

    /// Take every parked request for re-evaluation.
    pub(crate) fn drain(&self) -> Vec<Parked> {
        std::mem::take(&mut *self.parked.lock())
    }

    /// Put a still-unsatisfied request back.
    pub(crate) fn repark(&self, parked: Parked) {
        self.parked.lock().push(parked);
    }

    /// Release every parked request with an empty response.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let released = self.drain();
        if !released.is_empty() {
            tracing::info!(count = released.len(), "releasing parked pull requests");
        }
        for parked in released {
            parked.request.complete_empty();
        }
        // Wake the drain task so it observes shutdown.
        self.arrivals.notify_waiters();
    }

    pub fn parked_len(&self) -> usize {
        self.parked.lock().len()
    }
}

impl Default for HoldService {
    fn default() -> Self {
        Self::new()
    }
}
