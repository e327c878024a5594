//! Record source boundary — where the upstream stream consumer hands
//! records to the proxy.
//!
//! The consumer itself (its subscriptions, offsets, commit policy) lives
//! outside this repository. `ChannelSource` is the in-process bridge: the
//! integration owns the sender half, the pump drains the receiver into
//! whichever engine the configured delivery mode selects.

use async_trait::async_trait;
use portage_core::config::DeliveryMode;
use portage_core::record::Record;
use portage_engine::{PullEngine, PushEngine};
use tokio::sync::{broadcast, mpsc};

#[async_trait]
pub trait RecordSource: Send {
    /// Next record from upstream, `None` when the stream is exhausted.
    async fn next_record(&mut self) -> Option<Record>;
}

/// mpsc-backed source. Dropping the sender ends the stream.
pub struct ChannelSource {
    rx: mpsc::Receiver<Record>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Record>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    async fn next_record(&mut self) -> Option<Record> {
        self.rx.recv().await
    }
}

/// Drain the source into the engine selected by `mode`. Engine
/// backpressure propagates here: a full engine queue stalls the pump,
/// which stalls the upstream sender.
pub async fn pump(
    mut source: impl RecordSource,
    push: PushEngine,
    pull: PullEngine,
    mode: DeliveryMode,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let record = tokio::select! {
            _ = shutdown.recv() => break,
            record = source.next_record() => match record {
                Some(r) => r,
                None => {
                    tracing::info!("record source exhausted, pump exiting");
                    break;
                }
            },
        };

        let result = match mode {
            DeliveryMode::Push => push.push_record(record).await,
            DeliveryMode::Pull => pull.put_message(record).await,
        };
        if let Err(error) = result {
            tracing::warn!(%error, "engine rejected record, pump exiting");
            break;
        }
    }
}
