//! Bounded FIFO queue — the only mutable state shared between producer
//! tasks and engine workers.
//!
//! A `parking_lot` mutex guards the deque; a pair of tokio semaphores
//! (free slots / ready items) makes `put` and `take` awaitable without
//! holding the lock across suspension points. `close` closes both
//! semaphores, which wakes every blocked producer and consumer promptly —
//! the shutdown contract both engines rely on.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};

/// Why an enqueue did not happen. The item is handed back in both cases.
#[derive(Debug)]
pub enum QueueError<T> {
    /// The queue was closed by shutdown.
    Closed(T),
    /// No capacity within the allowed wait.
    Full(T),
}

pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// Permits for free slots; producers acquire, consumers release.
    slots: Semaphore,
    /// Permits for queued items; consumers acquire, producers release.
    ready: Semaphore,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            ready: Semaphore::new(0),
            capacity,
        }
    }

    /// Enqueue, waiting for capacity. Applies backpressure to producers.
    pub async fn put(&self, item: T) -> Result<(), QueueError<T>> {
        match self.slots.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.items.lock().push_back(item);
                self.ready.add_permits(1);
                Ok(())
            }
            Err(_) => Err(QueueError::Closed(item)),
        }
    }

    /// Enqueue with a bounded wait for capacity.
    pub async fn offer(&self, item: T, wait: Duration) -> Result<(), QueueError<T>> {
        match tokio::time::timeout(wait, self.slots.acquire()).await {
            Err(_elapsed) => Err(QueueError::Full(item)),
            Ok(Err(_closed)) => Err(QueueError::Closed(item)),
            Ok(Ok(permit)) => {
                permit.forget();
                self.items.lock().push_back(item);
                self.ready.add_permits(1);
                Ok(())
            }
        }
    }

    /// Enqueue only if capacity is immediately available.
    pub fn try_put(&self, item: T) -> Result<(), QueueError<T>> {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.items.lock().push_back(item);
                self.ready.add_permits(1);
                Ok(())
            }
            Err(TryAcquireError::Closed) => Err(QueueError::Closed(item)),
            Err(TryAcquireError::NoPermits) => Err(QueueError::Full(item)),
        }
    }

    /// Dequeue, waiting for an item. Returns `None` once the queue is
    /// closed — callers re-check their running flag and exit.
    pub async fn take(&self) -> Option<T> {
        match self.ready.acquire().await {
            Ok(permit) => {
                permit.forget();
                let item = self.items.lock().pop_front();
                debug_assert!(item.is_some(), "ready permit without queued item");
                self.slots.add_permits(1);
                item
            }
            Err(_) => None,
        }
    }

    /// Dequeue only if an item is immediately available.
    pub fn try_take(&self) -> Option<T> {
        match self.ready.try_acquire() {
            Ok(permit) => {
                permit.forget();
                let item = self.items.lock().pop_front();
                debug_assert!(item.is_some(), "ready permit without queued item");
                self.slots.add_permits(1);
                item
            }
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the queue: wake every blocked `put` and `take`. Items already
    /// queued stay in place; they are unreachable through the queue API
    /// after close and are dropped with it.
    pub fn close(&self) {
        self.slots.close();
        self.ready.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}
