//! Heartbeat handling — records client liveness.
//!
//! No reply is sent; the read timeout closes connections that go silent.

use std::sync::Arc;

use async_trait::async_trait;
use portage_core::wire::Packet;
use portage_engine::{Connection, ConnectionRegistry};

use crate::dispatch::PacketHandler;

pub struct HeartbeatHandler {
    registry: ConnectionRegistry,
}

impl HeartbeatHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PacketHandler for HeartbeatHandler {
    async fn handle(
        &self,
        connection: &Arc<dyn Connection>,
        packet: Packet,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            id = connection.id(),
            addr = %connection.remote_addr(),
            msg_id = packet.msg_id,
            "heartbeat"
        );
        self.registry.touch(connection.id());
        Ok(())
    }
}
