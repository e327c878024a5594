//! Push dispatch engine — a single worker drains the retry queue ahead
//! of fresh records, gates every send on flow control, selects a
//! connection round-robin under a bounded retry policy, and re-enqueues
//! on failure. At-least-once: every failure path re-queues or retries.
//!
//! Admission and selection are poll loops with a short sleep between
//! iterations. Under a sustained total outage the worker keeps cycling
//! through those sleeps — a known CPU cost, bounded by the backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use portage_core::config::PushConfig;
use portage_core::record::{Record, RecordHeader};
use portage_core::wire::{self, Command, Packet};

use crate::balance::{LoadBalance, RoundRobinLoadBalance};
use crate::connection::{Connection, ConnectionRegistry};
use crate::error::EngineError;
use crate::flow::FlowController;
use crate::id::IdGenerator;
use crate::ledger::InFlightLedger;
use crate::queue::{BoundedQueue, QueueError};
use crate::retry::RetryPolicy;

/// Bounded wait when the worker returns a failed packet to a full retry
/// queue, before falling back to an immediate synchronous re-send.
const REQUEUE_WAIT: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct PushEngine {
    inner: Arc<PushInner>,
}

struct PushInner {
    cfg: PushConfig,
    retry_queue: BoundedQueue<Packet>,
    record_queue: BoundedQueue<Record>,
    balance: RoundRobinLoadBalance,
    retry_policy: RetryPolicy,
    flow: Arc<dyn FlowController>,
    ids: Arc<IdGenerator>,
    registry: ConnectionRegistry,
    ledger: InFlightLedger,
    running: AtomicBool,
    shutdown: Notify,
}

impl PushEngine {
    pub fn new(
        cfg: PushConfig,
        ids: Arc<IdGenerator>,
        registry: ConnectionRegistry,
        flow: Arc<dyn FlowController>,
        ledger: InFlightLedger,
    ) -> Self {
        Self {
            inner: Arc::new(PushInner {
                retry_queue: BoundedQueue::new(cfg.retry_capacity),
                record_queue: BoundedQueue::new(cfg.queue_capacity),
                balance: RoundRobinLoadBalance::new(),
                retry_policy: RetryPolicy::new(cfg.select_attempts),
                cfg,
                flow,
                ids,
                registry,
                ledger,
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Spawn the dispatch worker and the repush ticker. Double start is
    /// rejected — the atomic transition guards engine state.
    pub fn start(&self) -> Result<(), EngineError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyStarted);
        }
        tokio::spawn(self.inner.clone().run());
        tokio::spawn(self.inner.clone().repush_loop());
        tracing::info!("push engine started");
        Ok(())
    }

    /// Send one packet through the full dispatch path. Producer-facing:
    /// a stopped engine is an immediate error; a failed selection is
    /// recovered by re-queueing, invisible to the caller.
    pub async fn push(&self, packet: Packet) -> Result<(), EngineError> {
        self.ensure_running()?;
        match self.inner.send_one(&packet).await {
            Ok(()) => Ok(()),
            Err(EngineError::ConnectionUnavailable { attempts }) => {
                tracing::warn!(msg_id = packet.msg_id, attempts, "no usable connection, re-queueing");
                self.inner.requeue(packet).await;
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Enqueue a fresh record for the worker, blocking while the queue is
    /// full — backpressure to the upstream source.
    pub async fn push_record(&self, record: Record) -> Result<(), EngineError> {
        self.ensure_running()?;
        match self.inner.record_queue.put(record).await {
            Ok(()) => Ok(()),
            Err(_) => Err(EngineError::QueueClosed),
        }
    }

    /// Put a packet straight onto the retry queue (redelivery path, used
    /// by the ack sweeper).
    pub async fn requeue(&self, packet: Packet) -> Result<(), EngineError> {
        self.ensure_running()?;
        match self.inner.retry_queue.put(packet).await {
            Ok(()) => Ok(()),
            Err(_) => Err(EngineError::QueueClosed),
        }
    }

    /// Stop the engine: flip the running flag, wake the worker and the
    /// repush ticker, unblock every queue wait. In-flight sends are not
    /// cancelled; their completions still run.
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
        tracing::info!("push engine closed");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// (records queued, retry packets queued)
    pub fn depths(&self) -> (usize, usize) {
        (self.inner.record_queue.len(), self.inner.retry_queue.len())
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(EngineError::NotRunning)
        }
    }
}

impl PushInner {
    async fn run(self: Arc<Self>) {
        tracing::debug!("push worker running");
        while self.running.load(Ordering::Acquire) {
            // A closed queue wakes us with None; the loop condition is
            // the re-check of run state.
            let Some(packet) = self.take().await else {
                continue;
            };
            if let Err(error) = self.send_one(&packet).await {
                tracing::warn!(%error, msg_id = packet.msg_id, "dispatch failed, re-queueing");
                self.put_or_resend(packet).await;
            }
        }
        tracing::info!("push worker stopped");
    }

    /// Next unit of work: retry queue first (non-blocking), then a
    /// blocking take on the record queue. Failed packets are always
    /// retried before new data is sent.
    async fn take(&self) -> Option<Packet> {
        if let Some(packet) = self.retry_queue.try_take() {
            return Some(packet);
        }
        let record = tokio::select! {
            _ = self.shutdown.notified() => return None,
            record = self.record_queue.take() => record?,
        };
        self.wrap_record(record)
    }

    fn wrap_record(&self, record: Record) -> Option<Packet> {
        let msg_id = self.ids.next_id();
        let header = RecordHeader::new(record.topic.clone(), record.partition, record.offset, msg_id);
        match header.to_bytes() {
            Ok(header_bytes) => Some(Packet::with_parts(
                Command::Push,
                msg_id,
                header_bytes,
                wire::encode_key_value(&record.key, &record.value),
            )),
            Err(error) => {
                tracing::error!(%error, topic = %record.topic, "header serialization failed, record skipped");
                None
            }
        }
    }

    /// One full send cycle: flow-control admission, bounded connection
    /// acquisition, async send with completion handling.
    async fn send_one(self: &Arc<Self>, packet: &Packet) -> Result<(), EngineError> {
        self.await_admission(packet).await?;
        let connection = self.acquire_connection().await?;

        let inner = Arc::clone(self);
        let connection = Arc::clone(&connection);
        let packet = packet.clone();
        tokio::spawn(async move {
            match connection.send(packet.clone()).await {
                Ok(()) => {
                    tracing::trace!(msg_id = packet.msg_id, "delivered");
                    inner.ledger.record(packet);
                }
                Err(error) => {
                    tracing::warn!(%error, msg_id = packet.msg_id, "send failed, re-queueing");
                    inner.requeue(packet).await;
                }
            }
        });
        Ok(())
    }

    /// Poll the flow controller until admission, sleeping between polls.
    async fn await_admission(&self, packet: &Packet) -> Result<(), EngineError> {
        loop {
            if !self.running.load(Ordering::Acquire) {
                return Err(EngineError::NotRunning);
            }
            if self.flow.flow_control(packet).allowed {
                return Ok(());
            }
            tokio::time::sleep(self.cfg.poll_backoff()).await;
        }
    }

    /// Select a usable connection, re-snapshotting the registry each
    /// attempt, bounded by the retry policy.
    async fn acquire_connection(&self) -> Result<Arc<dyn Connection>, EngineError> {
        self.retry_policy.reset();
        loop {
            let snapshot = self.registry.snapshot();
            if let Some(connection) = self.balance.select(&snapshot) {
                if connection.is_active() && connection.is_writable() {
                    return Ok(Arc::clone(connection));
                }
            }
            if !self.retry_policy.allow_retry() {
                return Err(EngineError::ConnectionUnavailable {
                    attempts: self.cfg.select_attempts,
                });
            }
            if !self.running.load(Ordering::Acquire) {
                return Err(EngineError::NotRunning);
            }
            tokio::time::sleep(self.cfg.poll_backoff()).await;
        }
    }

    /// Worker-context recovery: bounded wait for retry-queue space, then
    /// an immediate synchronous re-send — the worker must never deadlock
    /// against its own queue.
    async fn put_or_resend(self: &Arc<Self>, packet: Packet) {
        let mut packet = packet;
        loop {
            match self.retry_queue.offer(packet, REQUEUE_WAIT).await {
                Ok(()) => return,
                Err(QueueError::Closed(p)) => {
                    tracing::warn!(msg_id = p.msg_id, "engine closed, packet not re-queued");
                    return;
                }
                Err(QueueError::Full(p)) => match self.send_one(&p).await {
                    Ok(()) => return,
                    Err(error) => {
                        tracing::debug!(%error, msg_id = p.msg_id, "synchronous re-send failed, retrying");
                        packet = p;
                    }
                },
            }
        }
    }

    /// Completion/producer-context recovery: blocking put.
    async fn requeue(&self, packet: Packet) {
        if let Err(QueueError::Closed(p)) | Err(QueueError::Full(p)) =
            self.retry_queue.put(packet).await
        {
            tracing::warn!(msg_id = p.msg_id, "engine closed, packet not re-queued");
        }
    }

    /// Periodically re-drives packets sitting in the retry queue, so a
    /// failed packet gets another chance even with no new arrivals.
    async fn repush_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.cfg.repush_interval());
        interval.tick().await; // the first tick is immediate
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = interval.tick() => {}
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.repush_tick().await;
        }
        tracing::debug!("repush policy stopped");
    }

    async fn repush_tick(self: &Arc<Self>) {
        while let Some(packet) = self.retry_queue.try_take() {
            if !self.running.load(Ordering::Acquire) {
                self.requeue(packet).await;
                return;
            }
            if let Err(error) = self.send_one(&packet).await {
                tracing::debug!(%error, msg_id = packet.msg_id, "repush failed, waiting for next tick");
                self.requeue(packet).await;
                return;
            }
        }
    }
}
