// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so timer deadlines can be tested without real sleeps

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Time left until `deadline`, zero if it already passed
    fn until(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }

    /// Resolve once this clock reads `deadline` or later
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;
}

/// Real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        tokio::time::sleep_until(deadline.into()).boxed()
    }
}

/// Manually driven clock shared between clones.
///
/// Sleepers wake only when [`advance`](FakeClock::advance) moves the clock
/// past their deadline.
#[derive(Clone, Debug)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    advanced: Arc<Notify>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            advanced: Arc::new(Notify::new()),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            *current += duration;
        }
        self.advanced.notify_waiters();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        let clock = self.clone();
        async move {
            loop {
                let advanced = clock.advanced.notified();
                tokio::pin!(advanced);
                advanced.as_mut().enable();
                if clock.now() >= deadline {
                    return;
                }
                advanced.await;
            }
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
