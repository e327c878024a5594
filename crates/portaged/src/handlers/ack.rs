//! Ack handling — clears a delivered packet from the in-flight ledger.
//!
//! Packets never acknowledged are picked up by the sweeper and
//! re-queued for redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use portage_core::wire::Packet;
use portage_engine::{Connection, InFlightLedger};

use crate::dispatch::PacketHandler;

pub struct AckHandler {
    ledger: InFlightLedger,
}

impl AckHandler {
    pub fn new(ledger: InFlightLedger) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl PacketHandler for AckHandler {
    async fn handle(
        &self,
        connection: &Arc<dyn Connection>,
        packet: Packet,
    ) -> anyhow::Result<()> {
        match self.ledger.acknowledge(packet.msg_id) {
            Some(_) => {
                tracing::trace!(msg_id = packet.msg_id, id = connection.id(), "acknowledged");
            }
            None => {
                // Late ack for something already swept and redelivered.
                tracing::debug!(msg_id = packet.msg_id, "ack for unknown packet");
            }
        }
        Ok(())
    }
}
