//! Unregister handling — removes a client from the connection set on
//! request, so the load balancer stops selecting it before the socket
//! actually closes.

use std::sync::Arc;

use async_trait::async_trait;
use portage_core::wire::Packet;
use portage_engine::{Connection, ConnectionRegistry};

use crate::dispatch::PacketHandler;

pub struct UnregisterHandler {
    registry: ConnectionRegistry,
}

impl UnregisterHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PacketHandler for UnregisterHandler {
    async fn handle(
        &self,
        connection: &Arc<dyn Connection>,
        _packet: Packet,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            id = connection.id(),
            addr = %connection.remote_addr(),
            "client unregistered"
        );
        self.registry.unregister(connection.id());
        Ok(())
    }
}
