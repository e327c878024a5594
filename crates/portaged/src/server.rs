//! TCP transport bootstrap — accept loop, socket options, and the
//! per-connection read/write tasks.
//!
//! Connection lifecycle drives the engine-visible connection set: a
//! client enters the registry when its socket is accepted and leaves on
//! disconnect, read timeout, protocol error, or explicit unregister.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;

use portage_core::config::ServerConfig;
use portage_core::wire::Packet;
use portage_engine::{Connection, ConnectionError, ConnectionRegistry, IdGenerator};

use crate::codec::PacketCodec;
use crate::connection::{Outbound, TcpConnection, WRITER_QUEUE_DEPTH};
use crate::dispatch::PacketDispatcher;

pub struct TcpServer {
    cfg: ServerConfig,
    listener: TcpListener,
    registry: ConnectionRegistry,
    dispatcher: Arc<PacketDispatcher>,
    ids: Arc<IdGenerator>,
    shutdown: broadcast::Receiver<()>,
}

impl TcpServer {
    pub async fn bind(
        cfg: ServerConfig,
        registry: ConnectionRegistry,
        dispatcher: Arc<PacketDispatcher>,
        ids: Arc<IdGenerator>,
        shutdown: broadcast::Receiver<()>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((cfg.bind_addr.as_str(), cfg.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", cfg.bind_addr, cfg.port))?;
        Ok(Self {
            cfg,
            listener,
            registry,
            dispatcher,
            ids,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        self.listener.local_addr().context("listener address")
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(addr = %self.local_addr()?, "tcp server listening");
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("tcp server shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                            continue;
                        }
                    };
                    if let Err(error) = configure_socket(&stream, &self.cfg) {
                        tracing::warn!(%error, %peer_addr, "socket option setup failed");
                    }
                    tokio::spawn(handle_connection(
                        stream,
                        peer_addr,
                        self.registry.clone(),
                        self.dispatcher.clone(),
                        self.ids.clone(),
                        self.cfg.read_timeout(),
                    ));
                }
            }
        }
    }
}

fn configure_socket(stream: &TcpStream, cfg: &ServerConfig) -> std::io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    if cfg.sndbuf_bytes > 0 {
        sock.set_send_buffer_size(cfg.sndbuf_bytes)?;
    }
    if cfg.rcvbuf_bytes > 0 {
        sock.set_recv_buffer_size(cfg.rcvbuf_bytes)?;
    }
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    registry: ConnectionRegistry,
    dispatcher: Arc<PacketDispatcher>,
    ids: Arc<IdGenerator>,
    read_timeout: Duration,
) {
    let id = ids.next_id();
    let (sink, mut frames) = Framed::new(stream, PacketCodec).split();
    let active = Arc::new(AtomicBool::new(true));
    let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE_DEPTH);

    let connection: Arc<dyn Connection> =
        Arc::new(TcpConnection::new(id, peer_addr, writer_tx, active.clone()));
    registry.register(connection.clone());
    tracing::info!(id, addr = %peer_addr, "client connected");

    tokio::spawn(write_loop(writer_rx, sink, active.clone()));

    loop {
        match tokio::time::timeout(read_timeout, frames.next()).await {
            Err(_elapsed) => {
                tracing::warn!(id, addr = %peer_addr, "read timeout, closing");
                break;
            }
            Ok(None) => {
                tracing::info!(id, addr = %peer_addr, "client disconnected");
                break;
            }
            Ok(Some(Err(error))) => {
                tracing::warn!(id, addr = %peer_addr, %error, "read failed, closing");
                break;
            }
            Ok(Some(Ok(packet))) => {
                dispatcher.dispatch(&connection, packet).await;
            }
        }
    }

    active.store(false, Ordering::Release);
    registry.unregister(id);
}

async fn write_loop(
    mut writer_rx: mpsc::Receiver<Outbound>,
    mut sink: SplitSink<Framed<TcpStream, PacketCodec>, Packet>,
    active: Arc<AtomicBool>,
) {
    while let Some(outbound) = writer_rx.recv().await {
        let result = sink
            .send(outbound.packet)
            .await
            .map_err(ConnectionError::from);
        let failed = result.is_err();
        let _ = outbound.done.send(result);
        if failed {
            active.store(false, Ordering::Release);
            break;
        }
    }
    // Receiver drops here; pending senders observe Closed.
}
