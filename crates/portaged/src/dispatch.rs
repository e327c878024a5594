//! Routes inbound packets to the appropriate handler based on opcode.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use portage_core::wire::{Command, Packet};
use portage_engine::Connection;

/// Handler for one inbound command.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, connection: &Arc<dyn Connection>, packet: Packet)
        -> anyhow::Result<()>;
}

/// Maps opcodes to handlers and dispatches inbound packets.
pub struct PacketDispatcher {
    handlers: HashMap<Command, Arc<dyn PacketHandler>>,
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, cmd: Command, handler: Arc<dyn PacketHandler>) {
        self.handlers.insert(cmd, handler);
    }

    /// Dispatch an inbound packet. Returns false if no handler is
    /// registered for this opcode.
    pub async fn dispatch(&self, connection: &Arc<dyn Connection>, packet: Packet) -> bool {
        let cmd = packet.cmd;
        if let Some(handler) = self.handlers.get(&cmd) {
            if let Err(error) = handler.handle(connection, packet).await {
                tracing::warn!(?cmd, %error, "packet handler failed");
            }
            true
        } else {
            tracing::warn!(?cmd, "no handler registered, packet dropped");
            false
        }
    }
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
