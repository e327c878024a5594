//! Flow control — the admission gate consulted before every outbound
//! send. This is the sole backpressure mechanism on the push path, so
//! it must stay cheap under high-frequency polling: one short lock, no
//! allocation.

use std::time::Instant;

use parking_lot::Mutex;
use portage_core::wire::Packet;

/// Answer from the admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResult {
    pub allowed: bool,
    pub reason: &'static str,
}

impl ControlResult {
    pub const fn allowed() -> Self {
        Self {
            allowed: true,
            reason: "",
        }
    }

    pub const fn denied(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Admission-control policy. The dispatch loop polls this until it
/// reports allowed, with a short sleep between polls.
pub trait FlowController: Send + Sync {
    fn flow_control(&self, packet: &Packet) -> ControlResult;
}

/// Token bucket — each packet costs one token.
///
/// Refill happens on check, based on elapsed time. Rate 0 disables the
/// gate entirely (every packet admitted).
pub struct TokenBucketFlowController {
    rate: f64,
    burst: f64,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketFlowController {
    pub fn new(rate: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: f64::from(rate),
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }
}

impl FlowController for TokenBucketFlowController {
    fn flow_control(&self, _packet: &Packet) -> ControlResult {
        if self.rate == 0.0 {
            return ControlResult::allowed();
        }

        let mut bucket = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            ControlResult::allowed()
        } else {
            ControlResult::denied("rate limited")
        }
    }
}
