// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer facility for delayed work
//!
//! [`DelayQueue`] is the pure deadline heap; [`TimerService`] drives one on a
//! tokio task and hands due items to a delivery callback.

use crate::clock::{Clock, SystemClock};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Entry<T> {
    fire_at: Instant,
    seq: u64,
    item: T,
}

impl<T> Entry<T> {
    fn key(&self) -> Reverse<(Instant, u64)> {
        Reverse((self.fire_at, self.seq))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest first, insertion order among equal deadlines
        self.key().cmp(&other.key())
    }
}

/// Identifies one scheduled item in a [`DelayQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Items ordered by the instant they become due
pub struct DelayQueue<T> {
    entries: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DelayQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, fire_at: Instant, item: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { fire_at, seq, item });
        TimerId(seq)
    }

    /// Remove a scheduled item before it becomes due
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let mut entries = std::mem::take(&mut self.entries).into_vec();
        let removed = entries
            .iter()
            .position(|e| e.seq == id.0)
            .map(|pos| entries.swap_remove(pos).item);
        self.entries = BinaryHeap::from(entries);
        removed
    }

    /// Remove every item due at or before `now`, earliest first
    pub fn poll(&mut self, now: Instant) -> Vec<T> {
        let mut ready = Vec::new();
        while self.entries.peek().is_some_and(|e| e.fire_at <= now) {
            let Some(entry) = self.entries.pop() else {
                break;
            };
            ready.push(entry.item);
        }
        ready
    }

    pub fn next_fire_time(&self) -> Option<Instant> {
        self.entries.peek().map(|e| e.fire_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drives a [`DelayQueue`] on a background tokio task.
///
/// The driver sleeps on the service's [`Clock`], so a [`FakeClock`] moves it
/// forward in tests. Items still waiting when the service shuts down are
/// dropped undelivered.
///
/// [`FakeClock`]: crate::clock::FakeClock
pub struct TimerService<T, C: Clock = SystemClock> {
    clock: C,
    shared: Arc<TimerShared<T>>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct TimerShared<T> {
    queue: Mutex<DelayQueue<T>>,
    /// Woken when an entry is added
    changed: Notify,
}

impl<T> TimerShared<T> {
    fn queue(&self) -> MutexGuard<'_, DelayQueue<T>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn discard(&self) -> usize {
        let dropped = std::mem::take(&mut *self.queue());
        dropped.len()
    }
}

impl<T: Send + 'static> TimerService<T> {
    /// Start on the current runtime with the system clock
    pub fn start<F>(deliver: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        Self::with_clock(SystemClock, deliver)
    }
}

impl<T: Send + 'static, C: Clock> TimerService<T, C> {
    pub fn with_clock<F>(clock: C, deliver: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(DelayQueue::new()),
            changed: Notify::new(),
        });
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive(
            clock.clone(),
            Arc::clone(&shared),
            cancel.clone(),
            deliver,
        ));
        Self {
            clock,
            shared,
            cancel,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Deliver `item` once `delay` has elapsed. Hands the item back if the
    /// service has shut down.
    pub fn schedule(&self, delay: Duration, item: T) -> Result<TimerId, T> {
        let fire_at = self.clock.now() + delay;
        let id = {
            let mut queue = self.shared.queue();
            if self.cancel.is_cancelled() {
                return Err(item);
            }
            queue.schedule(fire_at, item)
        };
        self.shared.changed.notify_waiters();
        Ok(id)
    }

    /// Withdraw an item that has not been delivered yet
    pub fn cancel(&self, id: TimerId) -> Option<T> {
        self.shared.queue().cancel(id)
    }

    /// Items waiting for their deadline
    pub fn len(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the driver and drop the undelivered items
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let driver = self.driver.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "timer driver exited abnormally");
            }
        }
        self.shared.discard();
    }
}

impl<T, C: Clock> Drop for TimerService<T, C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive<T, C, F>(
    clock: C,
    shared: Arc<TimerShared<T>>,
    cancel: CancellationToken,
    mut deliver: F,
) where
    C: Clock,
    F: FnMut(T),
{
    loop {
        let changed = shared.changed.notified();
        tokio::pin!(changed);
        changed.as_mut().enable();

        let (due, next) = {
            let mut queue = shared.queue();
            (queue.poll(clock.now()), queue.next_fire_time())
        };
        for item in due {
            deliver(item);
        }

        let sleep = async {
            match next {
                Some(at) => clock.sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = changed.as_mut() => {}
            _ = sleep => {}
        }
    }
    let undelivered = shared.discard();
    tracing::debug!(undelivered, "timer stopped");
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
