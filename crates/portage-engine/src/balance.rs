//! Connection selection policy over the live connection set.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::connection::Connection;

/// Stateless-per-call selection over a snapshot of live connections.
/// Must return `None` rather than fail on an empty set, and must tolerate
/// the set changing size between calls.
pub trait LoadBalance: Send + Sync {
    fn select<'a>(
        &self,
        connections: &'a [Arc<dyn Connection>],
    ) -> Option<&'a Arc<dyn Connection>>;
}

/// Rotating-cursor round robin. The cursor is taken modulo the snapshot
/// length on every call, so a shrinking set never indexes out of range.
/// Safe for concurrent callers.
pub struct RoundRobinLoadBalance {
    cursor: AtomicUsize,
}

impl RoundRobinLoadBalance {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinLoadBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn select<'a>(
        &self,
        connections: &'a [Arc<dyn Connection>],
    ) -> Option<&'a Arc<dyn Connection>> {
        if connections.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % connections.len();
        connections.get(idx)
    }
}
