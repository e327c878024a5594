//! Pull batch engine — serves on-demand batch requests from the record
//! and retry queues, suspending empty requests for long-poll completion.
//!
//! `pull` runs synchronously on whatever task delivers the inbound frame
//! and never blocks: batch assembly uses non-blocking queue polls only,
//! and an empty result is handed to the hold service instead of waiting.
//! The batch body is built in a local buffer and finalized into an
//! immutable packet at return time — it never escapes mid-assembly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::sync::{oneshot, Notify};

use portage_core::config::PullConfig;
use portage_core::record::{PullStatus, Record, RecordHeader};
use portage_core::wire::{self, Command, Packet};

use crate::error::EngineError;
use crate::hold::HoldService;
use crate::id::IdGenerator;
use crate::queue::BoundedQueue;

/// One inbound batch request.
///
/// Completion always flows through the oneshot: either `pull` returns the
/// response directly (the completer is dropped unused) or the hold
/// service fires it later. A dropped receiver (client gone) is tolerated.
pub struct PullRequest {
    pub msg_id: u64,
    completer: oneshot::Sender<Packet>,
}

impl PullRequest {
    pub fn new(msg_id: u64, completer: oneshot::Sender<Packet>) -> Self {
        Self { msg_id, completer }
    }

    pub(crate) fn complete(self, packet: Packet) {
        let _ = self.completer.send(packet);
    }

    pub(crate) fn complete_empty(self) {
        let msg_id = self.msg_id;
        self.complete(Packet::new(Command::PullResp, msg_id));
    }
}

/// Outcome of a `pull` call.
pub enum PullReply {
    /// The response is ready now (possibly with an empty body).
    Ready(Packet),
    /// The request was parked; the response arrives via the oneshot.
    Suspended,
}

#[derive(Clone)]
pub struct PullEngine {
    inner: Arc<PullInner>,
}

struct PullInner {
    cfg: PullConfig,
    retry_queue: BoundedQueue<Packet>,
    record_queue: BoundedQueue<Record>,
    hold: HoldService,
    ids: Arc<IdGenerator>,
    running: AtomicBool,
    shutdown: Notify,
}

impl PullEngine {
    pub fn new(cfg: PullConfig, ids: Arc<IdGenerator>) -> Self {
        Self {
            inner: Arc::new(PullInner {
                retry_queue: BoundedQueue::new(cfg.retry_capacity),
                record_queue: BoundedQueue::new(cfg.queue_capacity),
                hold: HoldService::new(),
                cfg,
                ids,
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Spawn the hold-service drain task. Double start is rejected.
    pub fn start(&self) -> Result<(), EngineError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyStarted);
        }
        tokio::spawn(self.inner.clone().hold_loop());
        tracing::info!("pull engine started");
        Ok(())
    }

    /// Assemble a batch response for `request`.
    ///
    /// The loop is bounded by the configured max item count and byte
    /// budget, whichever is hit first. At most one retry-queue packet is
    /// merged per call; it consumes one count slot. An empty poll of the
    /// record queue ends the loop early.
    pub fn pull(&self, request: PullRequest, suspend_if_empty: bool) -> PullReply {
        let body = self.inner.poll_batch();

        if body.is_empty() && suspend_if_empty && self.inner.running.load(Ordering::Acquire) {
            let deadline = Instant::now() + self.inner.cfg.suspend_timeout();
            self.inner.hold.suspend(request, deadline);
            return PullReply::Suspended;
        }

        PullReply::Ready(response(request.msg_id, body))
    }

    /// Append a fresh record, blocking while the queue is full — this is
    /// the backpressure on the upstream producer. Wakes suspended pulls.
    pub async fn put_message(&self, record: Record) -> Result<(), EngineError> {
        match self.inner.record_queue.put(record).await {
            Ok(()) => {
                self.inner.hold.notify_message_arriving();
                Ok(())
            }
            Err(_) => Err(EngineError::QueueClosed),
        }
    }

    /// Re-queue a previously delivered batch for redelivery.
    pub async fn reput_message(&self, packet: Packet) -> Result<(), EngineError> {
        match self.inner.retry_queue.put(packet).await {
            Ok(()) => {
                self.inner.hold.notify_message_arriving();
                Ok(())
            }
            Err(_) => Err(EngineError::QueueClosed),
        }
    }

    /// Stop the engine: release parked requests with empty responses,
    /// wake blocked producers, stop the drain task. In-flight completions
    /// still fire.
    pub fn close(&self) {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.inner.shutdown.notify_waiters();
        self.inner.record_queue.close();
        self.inner.retry_queue.close();
        self.inner.hold.close();
        tracing::info!("pull engine closed");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// (records queued, retry packets queued, requests parked)
    pub fn depths(&self) -> (usize, usize, usize) {
        (
            self.inner.record_queue.len(),
            self.inner.retry_queue.len(),
            self.inner.hold.parked_len(),
        )
    }
}

fn response(msg_id: u64, body: Bytes) -> Packet {
    Packet::with_parts(Command::PullResp, msg_id, Bytes::new(), body)
}

impl PullInner {
    fn poll_batch(&self) -> Bytes {
        let mut body = BytesMut::new();
        let mut remaining = self.cfg.max_batch_count;
        let mut merged_retry = false;

        while remaining > 0 && (body.len() as u64) < self.cfg.max_batch_bytes {
            if !merged_retry {
                if let Some(packet) = self.retry_queue.try_take() {
                    wire::append_packet_body(&mut body, &packet);
                    merged_retry = true;
                    remaining -= 1;
                    continue;
                }
            }

            match self.record_queue.try_take() {
                Some(record) => {
                    let msg_id = self.ids.next_id();
                    let header = RecordHeader::for_record(&record, msg_id, PullStatus::Found);
                    match header.to_bytes() {
                        Ok(header_bytes) => {
                            wire::append_record(&mut body, &header_bytes, &record.key, &record.value);
                            remaining -= 1;
                        }
                        Err(error) => {
                            tracing::error!(%error, topic = %record.topic, "header serialization failed, record skipped");
                        }
                    }
                }
                None => break,
            }
        }

        body.freeze()
    }

    /// Re-evaluates parked requests on arrival signals, with a periodic
    /// fallback tick so deadlines fire even while nothing arrives.
    async fn hold_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.cfg.hold_poll_interval());
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = self.hold.wait_arrival() => {}
                _ = interval.tick() => {}
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.redrive_parked();
        }
        tracing::debug!("pull hold loop stopped");
    }

    fn redrive_parked(&self) {
        let now = Instant::now();
        for parked in self.hold.drain() {
            let body = self.poll_batch();
            if !body.is_empty() {
                let msg_id = parked.request.msg_id;
                parked.request.complete(response(msg_id, body));
            } else if now >= parked.deadline {
                parked.request.complete_empty();
            } else {
                self.hold.repark(parked);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portage_core::wire::BatchIter;
    use std::time::Duration;

    fn engine_with(cfg: PullConfig) -> PullEngine {
        PullEngine::new(cfg, Arc::new(IdGenerator::new()))
    }

    fn engine() -> PullEngine {
        engine_with(PullConfig::default())
    }

    fn record(topic: &str, partition: i32, offset: i64) -> Record {
        Record::new(
            topic,
            partition,
            offset,
            format!("k{offset}").into_bytes(),
            format!("v{offset}").into_bytes(),
        )
    }

    fn request(msg_id: u64) -> (PullRequest, oneshot::Receiver<Packet>) {
        let (tx, rx) = oneshot::channel();
        (PullRequest::new(msg_id, tx), rx)
    }

    fn decode_offsets(body: Bytes) -> Vec<i64> {
        BatchIter::new(body)
            .map(|entry| {
                let entry = entry.unwrap();
                RecordHeader::from_bytes(&entry.header).unwrap().offset
            })
            .collect()
    }

    #[tokio::test]
    async fn two_records_return_in_order_and_drain_the_queue() {
        let engine = engine();
        engine.put_message(record("topicA", 0, 100)).await.unwrap();
        engine.put_message(record("topicA", 0, 101)).await.unwrap();

        let (req, _rx) = request(1);
        let packet = match engine.pull(req, false) {
            PullReply::Ready(p) => p,
            PullReply::Suspended => panic!("should not suspend"),
        };

        assert_eq!(packet.cmd, Command::PullResp);
        assert_eq!(packet.msg_id, 1);
        assert_eq!(decode_offsets(packet.body), vec![100, 101]);
        assert_eq!(engine.depths().0, 0);
    }

    #[tokio::test]
    async fn retry_packet_precedes_fresh_records() {
        let engine = engine();
        let retried = Packet::with_parts(
            Command::PullResp,
            9,
            Bytes::new(),
            Bytes::from_static(b"old"),
        );
        engine.reput_message(retried.clone()).await.unwrap();
        engine.put_message(record("t", 0, 1)).await.unwrap();

        let (req, _rx) = request(2);
        let packet = match engine.pull(req, false) {
            PullReply::Ready(p) => p,
            PullReply::Suspended => panic!("should not suspend"),
        };

        // Retry body comes first, verbatim, then the fresh record.
        assert!(packet.body.starts_with(b"old"));
        assert!(packet.body.len() > 3);
        assert_eq!(engine.depths(), (0, 0, 0));
    }

    #[tokio::test]
    async fn count_budget_one_returns_only_the_retry_packet() {
        let mut cfg = PullConfig::default();
        cfg.max_batch_count = 1;
        let engine = engine_with(cfg);

        let retried = Packet::with_parts(
            Command::PullResp,
            9,
            Bytes::new(),
            Bytes::from_static(b"old"),
        );
        engine.reput_message(retried).await.unwrap();
        engine.put_message(record("t", 0, 1)).await.unwrap();

        let (req, _rx) = request(3);
        let packet = match engine.pull(req, false) {
            PullReply::Ready(p) => p,
            PullReply::Suspended => panic!("should not suspend"),
        };

        assert_eq!(&packet.body[..], b"old");
        // The fresh record stays queued for the next call.
        assert_eq!(engine.depths().0, 1);
    }

    #[tokio::test]
    async fn at_most_one_retry_packet_per_call() {
        let engine = engine();
        for id in 0..3u64 {
            let p = Packet::with_parts(Command::PullResp, id, Bytes::new(), Bytes::from_static(b"x"));
            engine.reput_message(p).await.unwrap();
        }

        let (req, _rx) = request(1);
        let packet = match engine.pull(req, false) {
            PullReply::Ready(p) => p,
            PullReply::Suspended => panic!("should not suspend"),
        };
        assert_eq!(packet.body.len(), 1);
        assert_eq!(engine.depths().1, 2);
    }

    #[tokio::test]
    async fn byte_budget_stops_the_loop() {
        let mut cfg = PullConfig::default();
        cfg.max_batch_bytes = 1; // any first frame exceeds this
        let engine = engine_with(cfg);
        engine.put_message(record("t", 0, 1)).await.unwrap();
        engine.put_message(record("t", 0, 2)).await.unwrap();

        let (req, _rx) = request(1);
        let packet = match engine.pull(req, false) {
            PullReply::Ready(p) => p,
            PullReply::Suspended => panic!("should not suspend"),
        };
        assert_eq!(decode_offsets(packet.body), vec![1]);
        assert_eq!(engine.depths().0, 1);
    }

    #[tokio::test]
    async fn empty_without_suspend_returns_empty_packet() {
        let engine = engine();
        let (req, _rx) = request(4);
        match engine.pull(req, false) {
            PullReply::Ready(p) => {
                assert!(p.is_body_empty());
                assert_eq!(p.cmd, Command::PullResp);
            }
            PullReply::Suspended => panic!("should not suspend"),
        }
    }

    #[tokio::test]
    async fn suspended_pull_resolves_on_put_message() {
        let engine = engine();
        engine.start().unwrap();

        let (req, rx) = request(5);
        assert!(matches!(engine.pull(req, true), PullReply::Suspended));
        assert_eq!(engine.depths().2, 1);

        engine.put_message(record("t", 2, 7)).await.unwrap();

        let packet = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("suspended pull never resolved")
            .unwrap();
        assert_eq!(packet.msg_id, 5);
        assert_eq!(decode_offsets(packet.body), vec![7]);
        engine.close();
    }

    #[tokio::test]
    async fn suspended_pull_times_out_with_empty_body() {
        let mut cfg = PullConfig::default();
        cfg.suspend_timeout_secs = 0; // expires on the first re-evaluation
        cfg.hold_poll_interval_ms = 10;
        let engine = engine_with(cfg);
        engine.start().unwrap();

        let (req, rx) = request(6);
        assert!(matches!(engine.pull(req, true), PullReply::Suspended));

        let packet = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("timed-out pull never resolved")
            .unwrap();
        assert!(packet.is_body_empty());
        engine.close();
    }

    #[tokio::test]
    async fn close_releases_parked_requests() {
        let engine = engine();
        engine.start().unwrap();

        let (req, rx) = request(7);
        assert!(matches!(engine.pull(req, true), PullReply::Suspended));

        engine.close();
        let packet = tokio::time::timeout(Duration::from_millis(500), rx)
            .await
            .expect("close did not release parked request")
            .unwrap();
        assert!(packet.is_body_empty());
        assert_eq!(engine.depths().2, 0);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let engine = engine();
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));
        engine.close();
    }

    #[tokio::test]
    async fn every_record_is_observed_exactly_once() {
        let engine = engine();
        for offset in 0..25 {
            engine.put_message(record("t", 0, offset)).await.unwrap();
        }

        let mut seen = Vec::new();
        loop {
            let (req, _rx) = request(1);
            match engine.pull(req, false) {
                PullReply::Ready(p) if p.is_body_empty() => break,
                PullReply::Ready(p) => seen.extend(decode_offsets(p.body)),
                PullReply::Suspended => panic!("should not suspend"),
            }
        }
        assert_eq!(seen, (0..25).collect::<Vec<_>>());
    }
}
