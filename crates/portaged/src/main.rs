//! portaged — Portage proxy daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use portage_core::config::PortageConfig;
use portage_core::wire::Command;
use portage_engine::{
    ConnectionRegistry, IdGenerator, InFlightLedger, PullEngine, PushEngine,
    TokenBucketFlowController,
};

use portaged::dispatch::PacketDispatcher;
use portaged::handlers::{AckHandler, HeartbeatHandler, PullHandler, UnregisterHandler};
use portaged::registry::{self, MemoryRegistry, RegisterMetadata, Registry};
use portaged::server::TcpServer;
use portaged::source::{pump, ChannelSource};
use portaged::sweeper::ack_sweep_loop;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PortageConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PortageConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PortageConfig::default()
    });
    tracing::info!(
        port = config.server.port,
        mode = ?config.server.mode,
        topic = %config.registry.topic,
        "portaged starting"
    );

    // Shared state — one instance each, passed explicitly.
    let ids = Arc::new(IdGenerator::new());
    let connections = ConnectionRegistry::new();
    let ledger = InFlightLedger::new();
    let flow = Arc::new(TokenBucketFlowController::new(
        config.push.flow_rate,
        config.push.flow_burst,
    ));

    // Engines
    let push_engine = PushEngine::new(
        config.push.clone(),
        ids.clone(),
        connections.clone(),
        flow,
        ledger.clone(),
    );
    let pull_engine = PullEngine::new(config.pull.clone(), ids.clone());
    push_engine.start().context("starting push engine")?;
    pull_engine.start().context("starting pull engine")?;

    // Command dispatcher
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

    // TCP server
    let server = TcpServer::bind(
        config.server.clone(),
        connections.clone(),
        dispatcher,
        ids.clone(),
        shutdown_tx.subscribe(),
    )
    .await?;
    let local_addr = server.local_addr()?;
    let server_task = tokio::spawn(server.run());

    // Service registration
    let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());
    let meta = RegisterMetadata {
        path: config.registry.provider_path(),
        address: local_addr,
    };
    tokio::spawn(registry::reregister_loop(
        registry,
        meta,
        config.registry.reregister_interval(),
        shutdown_tx.subscribe(),
    ));

    // Ack-expiry sweeper
    tokio::spawn(ack_sweep_loop(
        ledger.clone(),
        push_engine.clone(),
        pull_engine.clone(),
        config.ack.clone(),
        shutdown_tx.subscribe(),
    ));

    // Record source bridge. The upstream stream consumer plugs into
    // `record_tx`; it stays open for the daemon's lifetime.
    let (record_tx, record_source) = ChannelSource::new(config.push.queue_capacity);
    tokio::spawn(pump(
        record_source,
        push_engine.clone(),
        pull_engine.clone(),
        config.server.mode,
        shutdown_tx.subscribe(),
    ));

    tracing::info!("portaged ready");

    tokio::signal::ctrl_c().await.context("ctrl_c")?;
    tracing::info!("shutdown requested");

    drop(record_tx);
    let _ = shutdown_tx.send(());
    push_engine.close();
    pull_engine.close();
    let _ = server_task.await;

    tracing::info!("portaged stopped");
    Ok(())
}
