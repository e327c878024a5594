//! TCP-backed implementation of the engine `Connection` trait.
//!
//! Each accepted socket gets a dedicated writer task; `send` enqueues a
//! packet and resolves once the writer has flushed it (or failed). A
//! full writer queue marks the connection not-writable, which makes the
//! load balancer skip it instead of queueing behind a slow client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use portage_core::wire::Packet;
use portage_engine::{Connection, ConnectionError};
use tokio::sync::{mpsc, oneshot};

/// Depth of the per-connection writer queue.
pub const WRITER_QUEUE_DEPTH: usize = 64;

/// One outbound write plus its completion signal.
pub struct Outbound {
    pub packet: Packet,
    pub done: oneshot::Sender<Result<(), ConnectionError>>,
}

pub struct TcpConnection {
    id: u64,
    remote_addr: SocketAddr,
    writer_tx: mpsc::Sender<Outbound>,
    active: Arc<AtomicBool>,
}

impl TcpConnection {
    pub fn new(
        id: u64,
        remote_addr: SocketAddr,
        writer_tx: mpsc::Sender<Outbound>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            writer_tx,
            active,
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn is_writable(&self) -> bool {
        self.is_active() && self.writer_tx.capacity() > 0
    }

    async fn send(&self, packet: Packet) -> Result<(), ConnectionError> {
        if !self.is_active() {
            return Err(ConnectionError::Inactive);
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.writer_tx
            .send(Outbound {
                packet,
                done: done_tx,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        done_rx.await.map_err(|_| ConnectionError::Closed)?
    }
}
