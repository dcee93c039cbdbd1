// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed serial scheduler
//!
//! Tasks sharing an ordering key run one at a time in submission order; tasks
//! with different keys run in parallel on the executor. The active-key set and
//! the pending queue live under one mutex that is never held while work runs
//! or while jobs are handed to the executor.

use crate::config::ShutdownPolicy;
use crate::error::{BoxError, SubmitError};
use crate::pool::{Executor, Job, Rejected};
use crate::task::{self, TaskControl, TaskHandle};
use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::Notify;

/// Bound for values usable as ordering keys
pub trait OrderingKey: Eq + Hash + Clone + Debug + Send + 'static {}

impl<K: Eq + Hash + Clone + Debug + Send + 'static> OrderingKey for K {}

/// A task waiting for its key to become free
struct Queued<K> {
    key: K,
    job: Job,
    control: Arc<dyn TaskControl>,
}

struct KeyedState<K> {
    /// Keys with a dispatched, unfinished task
    active: HashSet<K>,
    /// Submission order across all keys
    pending: VecDeque<Queued<K>>,
    /// Set once shut down
    shutdown: Option<ShutdownPolicy>,
}

impl<K: OrderingKey> KeyedState<K> {
    /// Remove every pending entry whose key is free, marking those keys
    /// active. Entries finished while queued (cancelled) are dropped.
    fn take_ready(&mut self) -> Vec<Queued<K>> {
        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        for entry in self.pending.drain(..) {
            if entry.control.is_finished() {
                tracing::trace!(key = ?entry.key, "dropping cancelled pending task");
                continue;
            }
            if self.active.insert(entry.key.clone()) {
                ready.push(entry);
            } else {
                waiting.push_back(entry);
            }
        }
        self.pending = waiting;
        ready
    }

    fn is_idle(&self) -> bool {
        self.active.is_empty() && self.pending.is_empty()
    }
}

struct Shared<K, E> {
    executor: E,
    state: Mutex<KeyedState<K>>,
    idle: Notify,
}

impl<K: OrderingKey, E: Executor> Shared<K, E> {
    fn lock(&self) -> MutexGuard<'_, KeyedState<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A dispatched task for `key` finished: free the key and dispatch
    /// whatever became eligible.
    fn complete(self: &Arc<Self>, key: &K) {
        let ready = self.release(key);
        self.dispatch(ready);
    }

    /// Free `key` and take the entries that became eligible
    fn release(&self, key: &K) -> Vec<Queued<K>> {
        let mut state = self.lock();
        state.active.remove(key);
        let ready = state.take_ready();
        if state.is_idle() {
            self.idle.notify_waiters();
        }
        tracing::trace!(key = ?key, dispatching = ready.len(), "key released");
        ready
    }

    /// Hand eligible entries to the executor. A refused entry frees its key
    /// here and the rescan continues in this loop.
    fn dispatch(self: &Arc<Self>, ready: Vec<Queued<K>>) {
        let mut ready = VecDeque::from(ready);
        while let Some(Queued { key, job, control }) = ready.pop_front() {
            tracing::debug!(key = ?key, "dispatching queued task");
            let (job, release) = self.track(key.clone(), job);
            match self.executor.execute(job) {
                Ok(()) => {}
                Err(Rejected {
                    reason: SubmitError::Saturated,
                    job,
                }) => ready.extend(self.dispatch_when_ready(key, job, control, release)),
                Err(rejected) => ready.extend(self.refuse(&key, rejected, &control, &release)),
            }
        }
    }

    /// The executor is full: wait for room on a separate task, keeping the
    /// key active so later tasks for it stay queued behind this one. Returns
    /// entries made eligible if the task had to be refused instead.
    fn dispatch_when_ready(
        self: &Arc<Self>,
        key: K,
        job: Job,
        control: Arc<dyn TaskControl>,
        release: ReleaseSwitch,
    ) -> Vec<Queued<K>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let rejected = Rejected {
                reason: SubmitError::Saturated,
                job,
            };
            return self.refuse(&key, rejected, &control, &release);
        };
        tracing::debug!(key = ?key, "executor saturated, waiting for room");
        let shared = Arc::clone(self);
        runtime.spawn(async move {
            if let Err(rejected) = shared.executor.execute_when_ready(job).await {
                let ready = shared.refuse(&key, rejected, &control, &release);
                shared.dispatch(ready);
            }
        });
        Vec::new()
    }

    /// Finish a refused task as rejected and free its key
    fn refuse(
        &self,
        key: &K,
        rejected: Rejected,
        control: &Arc<dyn TaskControl>,
        release: &ReleaseSwitch,
    ) -> Vec<Queued<K>> {
        tracing::warn!(key = ?key, reason = %rejected.reason, "executor rejected queued task");
        release.disarm();
        control.reject(rejected.reason);
        drop(rejected.job);
        self.release(key)
    }

    /// Wrap a job so its key is released once it finishes or is dropped.
    /// Disarming the returned switch leaves the release to the caller.
    fn track(self: &Arc<Self>, key: K, job: Job) -> (Job, ReleaseSwitch) {
        let switch = ReleaseSwitch(Arc::new(AtomicBool::new(true)));
        let release = KeyRelease {
            shared: Arc::downgrade(self),
            key: Some(key),
            armed: switch.clone(),
        };
        let job = async move {
            let _release = release;
            job.await;
        }
        .boxed();
        (job, switch)
    }
}

#[derive(Clone)]
struct ReleaseSwitch(Arc<AtomicBool>);

impl ReleaseSwitch {
    fn disarm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases a dispatched key on drop, whether the job ran or not
struct KeyRelease<K: OrderingKey, E: Executor> {
    shared: Weak<Shared<K, E>>,
    key: Option<K>,
    armed: ReleaseSwitch,
}

impl<K: OrderingKey, E: Executor> Drop for KeyRelease<K, E> {
    fn drop(&mut self) {
        if !self.armed.is_armed() {
            return;
        }
        if let (Some(shared), Some(key)) = (self.shared.upgrade(), self.key.take()) {
            shared.complete(&key);
        }
    }
}

/// Serializes tasks per ordering key while running distinct keys in parallel
pub struct KeyedScheduler<K, E> {
    shared: Arc<Shared<K, E>>,
}

impl<K, E> Clone for KeyedScheduler<K, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: OrderingKey, E: Executor> KeyedScheduler<K, E> {
    pub fn new(executor: E) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                state: Mutex::new(KeyedState {
                    active: HashSet::new(),
                    pending: VecDeque::new(),
                    shutdown: None,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Submit `task` under `key`. Never waits.
    ///
    /// Runs immediately if no task with the same key is in flight, otherwise
    /// queues behind it. A failure of the task is reported on its handle and
    /// does not stop later tasks from being dispatched.
    pub fn submit<T, Err, F>(&self, key: K, task: F) -> Result<TaskHandle<T>, SubmitError>
    where
        T: Send + 'static,
        Err: Into<BoxError> + Send + 'static,
        F: Future<Output = Result<T, Err>> + Send + 'static,
    {
        let (handle, job) = task::prepare(task);
        let control = handle.control();

        let job = {
            let mut state = self.shared.lock();
            if state.shutdown.is_some() {
                return Err(SubmitError::Shutdown);
            }
            if !state.active.insert(key.clone()) {
                tracing::trace!(key = ?key, task = %handle.id(), "queued behind active key");
                state.pending.push_back(Queued { key, job, control });
                return Ok(handle);
            }
            job
        };

        tracing::trace!(key = ?key, task = %handle.id(), "dispatching");
        let (job, release) = self.shared.track(key.clone(), job);
        if let Err(rejected) = self.shared.executor.execute(job) {
            let reason = rejected.reason;
            release.disarm();
            control.reject(reason);
            drop(rejected.job);
            let ready = self.shared.release(&key);
            self.shared.dispatch(ready);
            return Err(reason);
        }
        Ok(handle)
    }

    /// Stop accepting submissions.
    ///
    /// In-flight tasks always run to completion. With
    /// [`ShutdownPolicy::Drain`] queued tasks keep being dispatched as their
    /// predecessors finish; with [`ShutdownPolicy::Discard`] they are
    /// cancelled and never run.
    pub fn shutdown(&self, policy: ShutdownPolicy) {
        let discarded: Vec<Queued<K>> = {
            let mut state = self.shared.lock();
            if state.shutdown.is_some() {
                return;
            }
            state.shutdown = Some(policy);
            let discarded = match policy {
                ShutdownPolicy::Drain => Vec::new(),
                ShutdownPolicy::Discard => state.pending.drain(..).collect(),
            };
            if state.is_idle() {
                self.shared.idle.notify_waiters();
            }
            discarded
        };
        tracing::info!(?policy, discarded = discarded.len(), "keyed scheduler shut down");
        for entry in discarded {
            entry.control.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().shutdown.is_some()
    }

    /// Resolve once no task is active or pending
    pub async fn idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn active_keys(&self) -> Vec<K> {
        self.shared.lock().active.iter().cloned().collect()
    }

    /// Tasks waiting for their key, not counting ones cancelled meanwhile
    pub fn pending(&self) -> usize {
        self.shared
            .lock()
            .pending
            .iter()
            .filter(|entry| !entry.control.is_finished())
            .count()
    }

    pub fn executor(&self) -> &E {
        &self.shared.executor
    }
}

#[cfg(test)]
#[path = "keyed_tests.rs"]
mod tests;
