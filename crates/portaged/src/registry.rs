//! Service registry — advertises this proxy's address under a
//! topic-scoped path so consumers can discover it.
//!
//! The coordination-store client itself is outside this repository; the
//! trait is the boundary. `MemoryRegistry` backs tests and single-node
//! deployments. Registration is refreshed on a fixed period, the same
//! way the proxy would keep an ephemeral node alive in a real store.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

/// What gets registered: a provider path and this proxy's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMetadata {
    pub path: String,
    pub address: SocketAddr,
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, meta: &RegisterMetadata) -> anyhow::Result<()>;
    async fn unregister(&self, meta: &RegisterMetadata) -> anyhow::Result<()>;
}

/// In-process registry backend.
pub struct MemoryRegistry {
    entries: DashMap<String, HashSet<SocketAddr>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn addresses(&self, path: &str) -> Vec<SocketAddr> {
        self.entries
            .get(path)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, meta: &RegisterMetadata) -> anyhow::Result<()> {
        self.entries
            .entry(meta.path.clone())
            .or_default()
            .insert(meta.address);
        Ok(())
    }

    async fn unregister(&self, meta: &RegisterMetadata) -> anyhow::Result<()> {
        if let Some(mut set) = self.entries.get_mut(&meta.path) {
            set.remove(&meta.address);
        }
        Ok(())
    }
}

/// Register immediately, re-register on every tick, unregister on
/// shutdown.
pub async fn reregister_loop(
    registry: Arc<dyn Registry>,
    meta: RegisterMetadata,
    period: std::time::Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Err(error) = registry.register(&meta).await {
        tracing::warn!(%error, path = %meta.path, "initial registration failed");
    } else {
        tracing::info!(path = %meta.path, address = %meta.address, "registered");
    }

    let mut interval = tokio::time::interval(period);
    interval.tick().await; // skip the immediate first tick
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {
                if let Err(error) = registry.register(&meta).await {
                    tracing::warn!(%error, path = %meta.path, "re-registration failed");
                }
            }
        }
    }

    if let Err(error) = registry.unregister(&meta).await {
        tracing::warn!(%error, path = %meta.path, "unregistration failed");
    } else {
        tracing::info!(path = %meta.path, "unregistered");
    }
}
