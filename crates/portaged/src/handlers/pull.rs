//! Pull handling — runs the pull engine for an inbound batch request.
//!
//! A ready response is written back immediately on the calling task. A
//! suspended request completes later through its oneshot; a spawned task
//! waits for that and writes the response when it fires.

use std::sync::Arc;

use async_trait::async_trait;
use portage_core::wire::Packet;
use portage_engine::{Connection, InFlightLedger, PullEngine, PullReply, PullRequest};
use tokio::sync::oneshot;

use crate::dispatch::PacketHandler;

pub struct PullHandler {
    engine: PullEngine,
    ledger: InFlightLedger,
}

impl PullHandler {
    pub fn new(engine: PullEngine, ledger: InFlightLedger) -> Self {
        Self { engine, ledger }
    }
}

/// Write a batch response back and, when it carries data, record it for
/// ack tracking so the sweeper can redeliver an unacknowledged batch.
async fn deliver(connection: &Arc<dyn Connection>, ledger: &InFlightLedger, response: Packet) {
    let carries_data = !response.is_body_empty();
    match connection.send(response.clone()).await {
        Ok(()) => {
            if carries_data {
                ledger.record(response);
            }
        }
        Err(error) => {
            tracing::warn!(
                %error,
                msg_id = response.msg_id,
                id = connection.id(),
                "failed to write pull response"
            );
        }
    }
}

#[async_trait]
impl PacketHandler for PullHandler {
    async fn handle(
        &self,
        connection: &Arc<dyn Connection>,
        packet: Packet,
    ) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        let request = PullRequest::new(packet.msg_id, tx);

        match self.engine.pull(request, true) {
            PullReply::Ready(response) => {
                deliver(connection, &self.ledger, response).await;
            }
            PullReply::Suspended => {
                let connection = connection.clone();
                let ledger = self.ledger.clone();
                tokio::spawn(async move {
                    if let Ok(response) = rx.await {
                        deliver(&connection, &ledger, response).await;
                    }
                });
            }
        }
        Ok(())
    }
}
