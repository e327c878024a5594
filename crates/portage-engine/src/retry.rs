//! Bounded-attempt policy for connection acquisition.
//!
//! This bounds the spin while looking for a usable connection within one
//! send cycle — it never bounds redelivery, which is governed by the
//! retry queue instead.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct RetryPolicy {
    attempts: AtomicU32,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            max_attempts,
        }
    }

    /// Clear the attempt counter. Called once per send cycle.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Release);
    }

    /// True while attempts remain under the bound. Each call counts as
    /// one attempt.
    pub fn allow_retry(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::AcqRel) < self.max_attempts
    }
}
