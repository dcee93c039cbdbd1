// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded FIFO queue with backpressure
//!
//! Producers that find the queue full wait for room instead of being rejected
//! or running their work inline. Free and filled slots are tracked with two
//! fair semaphores, so one removal admits exactly one waiting producer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Why an element could not be inserted. The element is always handed back.
#[derive(Error)]
pub enum QueueError<T> {
    /// Queue at capacity (non-waiting insert only)
    #[error("queue is full")]
    Full(T),
    /// Queue was closed before or while waiting
    #[error("queue is closed")]
    Closed(T),
    /// The caller's cancellation token fired while waiting for room
    #[error("wait for queue capacity was interrupted")]
    Interrupted(T),
}

impl<T> QueueError<T> {
    /// Recover the element that was not inserted
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Full(item) | QueueError::Closed(item) | QueueError::Interrupted(item) => {
                item
            }
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, QueueError::Interrupted(_))
    }
}

impl<T> fmt::Debug for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full(_) => f.write_str("Full(..)"),
            QueueError::Closed(_) => f.write_str("Closed(..)"),
            QueueError::Interrupted(_) => f.write_str("Interrupted(..)"),
        }
    }
}

struct Slots<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Capacity-bounded FIFO whose insert waits for room
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<Slots<T>>,
    /// Free slots; producers wait here
    free: Semaphore,
    /// Filled slots; consumers wait here
    filled: Semaphore,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` elements (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Insert, waiting as long as it takes for room.
    ///
    /// Fails only if the queue is closed.
    pub async fn push(&self, item: T) -> Result<(), QueueError<T>> {
        match self.free.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.enqueue(item)
            }
            Err(_) => Err(QueueError::Closed(item)),
        }
    }

    /// Insert, waiting for room until `cancel` fires.
    ///
    /// On interruption the element is handed back and the token stays
    /// cancelled, so the caller can tell "cancelled" apart from "full".
    pub async fn push_cancellable(
        &self,
        item: T,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError<T>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(queued = self.len(), "push interrupted while waiting for capacity");
                Err(QueueError::Interrupted(item))
            }
            permit = self.free.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    self.enqueue(item)
                }
                Err(_) => Err(QueueError::Closed(item)),
            },
        }
    }

    /// Insert without waiting
    pub fn try_push(&self, item: T) -> Result<(), QueueError<T>> {
        match self.free.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.enqueue(item)
            }
            Err(TryAcquireError::NoPermits) => Err(QueueError::Full(item)),
            Err(TryAcquireError::Closed) => Err(QueueError::Closed(item)),
        }
    }

    /// Remove the head, waiting for one to arrive.
    ///
    /// Returns `None` only once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        match self.filled.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.dequeue()
            }
            Err(_) => self.lock().items.pop_front(),
        }
    }

    /// Remove the head without waiting
    pub fn try_pop(&self) -> Option<T> {
        match self.filled.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.dequeue()
            }
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => self.lock().items.pop_front(),
        }
    }

    /// Remove the head, waiting at most `timeout`
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.pop()).await.ok().flatten()
    }

    /// Refuse further inserts and wake every waiter.
    ///
    /// Blocked producers fail with `Closed`; consumers drain what is left.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            tracing::debug!(remaining = inner.items.len(), "queue closed");
        }
        self.free.close();
        self.filled.close();
    }

    fn enqueue(&self, item: T) -> Result<(), QueueError<T>> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(QueueError::Closed(item));
            }
            inner.items.push_back(item);
        }
        self.filled.add_permits(1);
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.free.add_permits(1);
        }
        item
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
