//! Outbound connection abstraction and the live connection registry.
//!
//! The engines never own connection lifecycle — the transport layer
//! registers and unregisters as clients come and go. Engines only read
//! a snapshot per selection attempt.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use portage_core::wire::Packet;

use crate::error::ConnectionError;

/// One live outbound connection, as seen by the engines.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identifier, unique for the connection's lifetime.
    fn id(&self) -> u64;

    fn remote_addr(&self) -> SocketAddr;

    /// False once the underlying socket is gone.
    fn is_active(&self) -> bool;

    /// False while the outbound write queue is saturated.
    fn is_writable(&self) -> bool;

    /// Send a packet; resolves when the packet has been written to the
    /// socket (or the write failed). Completion handling — record vs
    /// re-queue — is the caller's job.
    async fn send(&self, packet: Packet) -> Result<(), ConnectionError>;
}

/// Tracked state for a registered client connection.
pub struct ClientEntry {
    pub connection: Arc<dyn Connection>,
    pub registered_at: Instant,
    pub last_heartbeat: Instant,
}

/// The live connection set — shared between the transport layer (writes)
/// and the engines (snapshot reads).
#[derive(Clone)]
pub struct ConnectionRegistry {
    clients: Arc<DashMap<u64, ClientEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, connection: Arc<dyn Connection>) {
        let now = Instant::now();
        self.clients.insert(
            connection.id(),
            ClientEntry {
                connection,
                registered_at: now,
                last_heartbeat: now,
            },
        );
    }

    pub fn unregister(&self, id: u64) -> Option<Arc<dyn Connection>> {
        self.clients.remove(&id).map(|(_, e)| e.connection)
    }

    /// Record a heartbeat from the client.
    pub fn touch(&self, id: u64) {
        if let Some(mut entry) = self.clients.get_mut(&id) {
            entry.last_heartbeat = Instant::now();
        }
    }

    /// Copy of the current connection set. Selection policies index into
    /// this snapshot, never into the live map.
    pub fn snapshot(&self) -> Vec<Arc<dyn Connection>> {
        self.clients
            .iter()
            .map(|e| e.connection.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
