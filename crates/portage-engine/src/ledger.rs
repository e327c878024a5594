//! In-flight ledger — delivered packets awaiting client acknowledgment.
//!
//! The push and pull paths both record successful deliveries here; the
//! daemon's sweeper re-queues entries whose ack never arrived.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use portage_core::wire::Packet;

struct DeliveredEntry {
    packet: Packet,
    delivered_at: Instant,
}

#[derive(Clone)]
pub struct InFlightLedger {
    entries: Arc<DashMap<u64, DeliveredEntry>>,
}

impl InFlightLedger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Record a successful delivery, keyed by msg_id.
    pub fn record(&self, packet: Packet) {
        self.entries.insert(
            packet.msg_id,
            DeliveredEntry {
                packet,
                delivered_at: Instant::now(),
            },
        );
    }

    /// Clear an entry on client ack. Returns the packet if it was known.
    pub fn acknowledge(&self, msg_id: u64) -> Option<Packet> {
        self.entries.remove(&msg_id).map(|(_, e)| e.packet)
    }

    /// Remove and return every entry older than `ttl`, for redelivery.
    pub fn sweep(&self, ttl: Duration) -> Vec<Packet> {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|e| now.duration_since(e.delivered_at) >= ttl)
            .map(|e| *e.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, e)| e.packet))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InFlightLedger {
    fn default() -> Self {
        Self::new()
    }
}
