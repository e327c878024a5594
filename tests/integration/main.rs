//! Portage integration test harness.
//!
//! Each test assembles a full in-process proxy — engines, dispatcher,
//! TCP server, sweeper — on an ephemeral loopback port and drives it
//! with a raw framed client, the same way a remote consumer would.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Buf;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;

// Shared vocabulary for the test modules (`use crate::*`).
pub use portage_core::config::{DeliveryMode, PortageConfig};
pub use portage_core::record::Record;
pub use portage_core::wire::{Command, Packet};
pub use std::time::Duration;

use portage_engine::{
    ConnectionRegistry, IdGenerator, InFlightLedger, PullEngine, PushEngine,
    TokenBucketFlowController,
};
use portaged::dispatch::PacketDispatcher;
use portaged::handlers::{AckHandler, HeartbeatHandler, PullHandler, UnregisterHandler};
use portaged::server::TcpServer;
use portaged::source::{pump, ChannelSource};
use portaged::sweeper::ack_sweep_loop;

mod lifecycle;
mod pulling;
mod pushing;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Config tuned for fast test turnaround.
pub fn test_config() -> PortageConfig {
    let mut config = PortageConfig::default();
    config.server.bind_addr = "127.0.0.1".to_string();
    config.server.port = 0; // ephemeral
    config.push.repush_interval_ms = 100;
    config.push.poll_backoff_ms = 1;
    config.pull.hold_poll_interval_ms = 20;
    config.pull.suspend_timeout_secs = 5;
    config.ack.timeout_secs = 1;
    config.ack.sweep_interval_secs = 1;
    config
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub record_tx: mpsc::Sender<Record>,
    pub push_engine: PushEngine,
    pub pull_engine: PullEngine,
    pub ledger: InFlightLedger,
    pub connections: ConnectionRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl TestProxy {
    /// Assemble and start a proxy the way `portaged::main` does.
    pub async fn start(mode: DeliveryMode, config: PortageConfig) -> Result<Self> {
        let ids = Arc::new(IdGenerator::new());
        let connections = ConnectionRegistry::new();
        let ledger = InFlightLedger::new();
        let flow = Arc::new(TokenBucketFlowController::new(
            config.push.flow_rate,
            config.push.flow_burst,
        ));

        let push_engine = PushEngine::new(
            config.push.clone(),
            ids.clone(),
            connections.clone(),
            flow,
            ledger.clone(),
        );
        let pull_engine = PullEngine::new(config.pull.clone(), ids.clone());
        push_engine.start()?;
        pull_engine.start()?;

        let dispatcher = {
            let mut d = PacketDispatcher::new();
            d.register(
                Command::Heartbeat,
                Arc::new(HeartbeatHandler::new(connections.clone())),
            );
            d.register(
                Command::Unregister,
                Arc::new(UnregisterHandler::new(connections.clone())),
            );
            d.register(Command::Ack, Arc::new(AckHandler::new(ledger.clone())));
            d.register(
                Command::Pull,
                Arc::new(PullHandler::new(pull_engine.clone(), ledger.clone())),
            );
            Arc::new(d)
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let server = TcpServer::bind(
            config.server.clone(),
            connections.clone(),
            dispatcher,
            ids.clone(),
            shutdown_tx.subscribe(),
        )
        .await?;
        let addr = server.local_addr()?;
        tokio::spawn(server.run());

        tokio::spawn(ack_sweep_loop(
            ledger.clone(),
            push_engine.clone(),
            pull_engine.clone(),
            config.ack.clone(),
            shutdown_tx.subscribe(),
        ));

        let (record_tx, record_source) = ChannelSource::new(32);
        tokio::spawn(pump(
            record_source,
            push_engine.clone(),
            pull_engine.clone(),
            mode,
            shutdown_tx.subscribe(),
        ));

        Ok(Self {
            addr,
            record_tx,
            push_engine,
            pull_engine,
            ledger,
            connections,
            shutdown_tx,
        })
    }

    /// Feed one record through the source boundary.
    pub async fn feed(&self, record: Record) -> Result<()> {
        self.record_tx
            .send(record)
            .await
            .context("record source closed")
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.push_engine.close();
        self.pull_engine.close();
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Client helpers ────────────────────────────────────────────────────────────

pub type Client = Framed<TcpStream, portaged::codec::PacketCodec>;

pub async fn connect(addr: SocketAddr) -> Result<Client> {
    let stream = TcpStream::connect(addr).await.context("connect")?;
    Ok(Framed::new(stream, portaged::codec::PacketCodec))
}

pub async fn send_packet(client: &mut Client, packet: Packet) -> Result<()> {
    client.send(packet).await.context("client send")
}

pub async fn recv_packet(client: &mut Client, wait: Duration) -> Result<Packet> {
    match tokio::time::timeout(wait, client.next()).await {
        Err(_) => anyhow::bail!("timed out waiting for a packet"),
        Ok(None) => anyhow::bail!("connection closed"),
        Ok(Some(frame)) => frame.context("client recv"),
    }
}

/// Poll until `cond` holds or a few seconds pass.
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Decode a push packet body: `len(key)|key|len(value)|value`.
pub fn decode_key_value(mut body: bytes::Bytes) -> (bytes::Bytes, bytes::Bytes) {
    let key_len = body.get_u32() as usize;
    let key = body.split_to(key_len);
    let value_len = body.get_u32() as usize;
    let value = body.split_to(value_len);
    assert!(body.is_empty(), "trailing bytes after key/value");
    (key, value)
}

pub fn sample_record(topic: &str, partition: i32, offset: i64) -> Record {
    Record::new(
        topic,
        partition,
        offset,
        format!("key-{offset}").into_bytes(),
        format!("value-{offset}").into_bytes(),
    )
}
