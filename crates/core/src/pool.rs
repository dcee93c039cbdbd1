// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-size worker pool backed by a [`BoundedQueue`]
//!
//! A full queue slows producers down instead of shedding or reordering work.
//! Schedulers dispatch through the [`Executor`] trait, which never waits.

use crate::config::{PoolConfig, StrandConfig};
use crate::error::SubmitError;
use crate::queue::{BoundedQueue, QueueError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

/// A unit of work ready to run on an executor
pub type Job = BoxFuture<'static, ()>;

/// A job the executor refused, handed back with the reason
#[derive(Error)]
#[error("job rejected: {reason}")]
pub struct Rejected {
    pub reason: SubmitError,
    pub job: Job,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Runs jobs.
///
/// `execute` must not wait for capacity. Schedulers fall back to
/// `execute_when_ready` for work they already accepted, so a saturated
/// executor slows them down instead of shedding that work.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, job: Job) -> Result<(), Rejected>;

    /// Hand over `job` once there is room. Fails only if the executor can
    /// never take it.
    fn execute_when_ready(&self, job: Job) -> BoxFuture<'_, Result<(), Rejected>> {
        let result = self.execute(job);
        async move { result }.boxed()
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) -> Result<(), Rejected> {
        (**self).execute(job)
    }

    fn execute_when_ready(&self, job: Job) -> BoxFuture<'_, Result<(), Rejected>> {
        (**self).execute_when_ready(job)
    }
}

/// Spawn straight onto a tokio runtime; never saturates
impl Executor for tokio::runtime::Handle {
    fn execute(&self, job: Job) -> Result<(), Rejected> {
        self.spawn(job);
        Ok(())
    }
}

/// Fixed set of workers draining a bounded job queue
pub struct WorkerPool {
    queue: Arc<BoundedQueue<Job>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn the workers on the current tokio runtime
    pub fn new(config: &PoolConfig) -> Self {
        let size = config.workers.max(1);
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let workers = (0..size)
            .map(|index| tokio::spawn(run_worker(index, Arc::clone(&queue))))
            .collect();
        tracing::debug!(
            workers = size,
            capacity = queue.capacity(),
            "worker pool started"
        );
        Self {
            queue,
            workers: Mutex::new(workers),
            size,
        }
    }

    pub fn from_config(config: &StrandConfig) -> Self {
        Self::new(&config.pool)
    }

    pub fn workers(&self) -> usize {
        self.size
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.is_closed()
    }

    /// Submit, waiting for queue room if the pool is saturated
    pub async fn spawn(&self, job: Job) -> Result<(), SubmitError> {
        self.queue.push(job).await.map_err(|_| SubmitError::Shutdown)
    }

    /// Stop accepting jobs. Already queued jobs still run.
    pub fn shutdown(&self) {
        tracing::info!(queued = self.queued(), "worker pool shutting down");
        self.queue.close();
    }

    /// Wait for every worker to exit (after [`shutdown`](Self::shutdown))
    pub async fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "worker exited abnormally");
            }
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) -> Result<(), Rejected> {
        self.queue.try_push(job).map_err(|err| match err {
            QueueError::Full(job) => Rejected {
                reason: SubmitError::Saturated,
                job,
            },
            QueueError::Closed(job) | QueueError::Interrupted(job) => Rejected {
                reason: SubmitError::Shutdown,
                job,
            },
        })
    }

    fn execute_when_ready(&self, job: Job) -> BoxFuture<'_, Result<(), Rejected>> {
        async move {
            self.queue.push(job).await.map_err(|err| Rejected {
                reason: SubmitError::Shutdown,
                job: err.into_inner(),
            })
        }
        .boxed()
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.size)
            .field("queue", &self.queue)
            .finish()
    }
}

async fn run_worker(index: usize, queue: Arc<BoundedQueue<Job>>) {
    while let Some(job) = queue.pop().await {
        job.await;
    }
    tracing::trace!(worker = index, "worker exiting");
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
