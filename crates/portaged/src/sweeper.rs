//! Ack-expiry sweeper — re-queues delivered packets whose ack never
//! arrived. Push packets go back through the push engine's retry queue;
//! pull batches go back to the pull engine for re-merging.

use portage_core::config::AckConfig;
use portage_core::wire::Command;
use portage_engine::{InFlightLedger, PullEngine, PushEngine};
use tokio::sync::broadcast;

pub async fn ack_sweep_loop(
    ledger: InFlightLedger,
    push: PushEngine,
    pull: PullEngine,
    cfg: AckConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(cfg.sweep_interval());
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {}
        }

        let expired = ledger.sweep(cfg.timeout());
        if expired.is_empty() {
            continue;
        }
        tracing::info!(count = expired.len(), "redelivering unacknowledged packets");

        for packet in expired {
            let msg_id = packet.msg_id;
            let result = match packet.cmd {
                Command::Push => push.requeue(packet).await,
                Command::PullResp => pull.reput_message(packet).await,
                other => {
                    tracing::debug!(?other, msg_id, "unexpected command in ledger, dropped");
                    continue;
                }
            };
            if let Err(error) = result {
                tracing::warn!(%error, msg_id, "redelivery enqueue failed");
            }
        }
    }
    tracing::debug!("ack sweeper stopped");
}
