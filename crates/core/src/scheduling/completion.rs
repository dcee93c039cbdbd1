// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion-ordered scheduler
//!
//! Submitted units run on an executor, immediately or after a delay, and
//! their handles are posted to a channel as each one finishes. Consumers
//! therefore drain results in finishing order, not submission order.

use crate::error::{BoxError, SubmitError};
use crate::pool::{Executor, Job, Rejected};
use crate::scheduling::timer::TimerService;
use crate::task::{self, TaskControl, TaskHandle};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A delayed unit waiting in the timer
struct Delayed {
    job: Job,
    control: Arc<dyn TaskControl>,
    /// Set once the timer hands the unit over
    fired: Arc<AtomicBool>,
}

/// Runs units on an executor and yields their handles in finishing order
pub struct CompletionService<T, E> {
    executor: Arc<E>,
    /// `None` once shut down; clones live in the finish hooks of outstanding units
    done_tx: Mutex<Option<mpsc::UnboundedSender<TaskHandle<T>>>>,
    done_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskHandle<T>>>,
    timer: Arc<TimerService<Delayed>>,
    outstanding: Arc<AtomicUsize>,
}

impl<T: Send + 'static, E: Executor> CompletionService<T, E> {
    /// Create the service. Starts its timer on the current tokio runtime.
    pub fn new(executor: E) -> Self {
        let executor = Arc::new(executor);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let timer = Arc::new(TimerService::start({
            let executor = Arc::clone(&executor);
            move |delayed: Delayed| dispatch_delayed(&executor, delayed)
        }));
        Self {
            executor,
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: tokio::sync::Mutex::new(done_rx),
            timer,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run `unit` now
    pub fn submit<Err, F>(&self, unit: F) -> Result<TaskHandle<T>, SubmitError>
    where
        Err: Into<BoxError> + Send + 'static,
        F: Future<Output = Result<T, Err>> + Send + 'static,
    {
        let done_tx = self.sender()?;
        let (handle, job) = task::prepare(unit);
        if let Err(rejected) = self.executor.execute(job) {
            handle.control().reject(rejected.reason);
            return Err(rejected.reason);
        }
        self.deliver_on_finish(&handle, done_tx, || {});
        Ok(handle)
    }

    /// Run `unit` once `delay` has elapsed.
    ///
    /// Until then the unit is held by the timer, and cancelling its handle
    /// withdraws it. A saturated executor delays the start further; only an
    /// executor that has shut down makes the handle finish as rejected.
    pub fn submit_after<Err, F>(&self, delay: Duration, unit: F) -> Result<TaskHandle<T>, SubmitError>
    where
        Err: Into<BoxError> + Send + 'static,
        F: Future<Output = Result<T, Err>> + Send + 'static,
    {
        let done_tx = self.sender()?;
        let (handle, job) = task::prepare(unit);
        let control = handle.control();
        let fired = Arc::new(AtomicBool::new(false));
        let delayed = Delayed {
            job,
            control: Arc::clone(&control),
            fired: Arc::clone(&fired),
        };
        let Ok(timer_id) = self.timer.schedule(delay, delayed) else {
            control.reject(SubmitError::Shutdown);
            return Err(SubmitError::Shutdown);
        };
        tracing::trace!(task = %handle.id(), ?delay, "unit held by timer");

        let timer = Arc::downgrade(&self.timer);
        let task_id = handle.id();
        self.deliver_on_finish(&handle, done_tx, move || {
            if fired.load(Ordering::SeqCst) {
                return;
            }
            // Finished while still waiting: drop it from the timer now
            if let Some(timer) = timer.upgrade() {
                if timer.cancel(timer_id).is_some() {
                    tracing::trace!(task = %task_id, "unit withdrawn from timer");
                }
            }
        });
        Ok(handle)
    }

    /// Wait for the next finished unit.
    ///
    /// Returns `None` only after shutdown once every outstanding unit has
    /// been retrieved; before shutdown it waits indefinitely.
    pub async fn take(&self) -> Option<TaskHandle<T>> {
        let handle = self.done_rx.lock().await.recv().await?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Some(handle)
    }

    /// The next finished unit, if one is ready now
    pub fn poll(&self) -> Option<TaskHandle<T>> {
        let handle = self.done_rx.try_lock().ok()?.try_recv().ok()?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Some(handle)
    }

    /// Wait at most `timeout` for the next finished unit
    pub async fn poll_timeout(&self, timeout: Duration) -> Option<TaskHandle<T>> {
        tokio::time::timeout(timeout, self.take()).await.ok().flatten()
    }

    /// Units submitted and not yet retrieved
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.done_tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Refuse further submissions and stop the timer.
    ///
    /// Units still waiting on their delay finish as cancelled and are
    /// delivered like any other unit. Running units are unaffected.
    pub async fn shutdown(&self) {
        let sender = self.done_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        self.timer.shutdown().await;
        tracing::info!(outstanding = self.outstanding(), "completion service shut down");
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<TaskHandle<T>>, SubmitError> {
        self.done_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SubmitError::Shutdown)
    }

    /// Post the handle once it finishes, after running `cleanup`
    fn deliver_on_finish(
        &self,
        handle: &TaskHandle<T>,
        done_tx: mpsc::UnboundedSender<TaskHandle<T>>,
        cleanup: impl FnOnce() + Send + 'static,
    ) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let delivered = handle.clone();
        handle.on_finish(move || {
            cleanup();
            if done_tx.send(delivered).is_err() {
                tracing::debug!("completion channel closed before delivery");
            }
        });
    }
}

/// Hand a unit whose delay elapsed to the executor, waiting for room on a
/// separate task if the executor is saturated
fn dispatch_delayed<E: Executor>(executor: &Arc<E>, delayed: Delayed) {
    let Delayed { job, control, fired } = delayed;
    fired.store(true, Ordering::SeqCst);
    let rejected = match executor.execute(job) {
        Ok(()) => return,
        Err(rejected) => rejected,
    };
    if rejected.reason != SubmitError::Saturated {
        refuse_delayed(rejected, control.as_ref());
        return;
    }
    tracing::debug!("executor saturated, delayed unit waiting for room");
    let executor = Arc::clone(executor);
    tokio::spawn(async move {
        if let Err(rejected) = executor.execute_when_ready(rejected.job).await {
            refuse_delayed(rejected, control.as_ref());
        }
    });
}

fn refuse_delayed(rejected: Rejected, control: &dyn TaskControl) {
    tracing::warn!(reason = %rejected.reason, "executor rejected delayed unit");
    control.reject(rejected.reason);
    drop(rejected.job);
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
