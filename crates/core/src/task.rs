// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task handles
//!
//! A task is a unit of work whose outcome is published through a
//! [`TaskHandle`]. The handle lets the caller wait for the outcome, inspect
//! progress without waiting, and cancel. The work itself runs in its own tokio
//! task so a panic is captured as an outcome and cancellation after start can
//! abort it at the next await point.

use crate::error::{BoxError, SubmitError, TaskError};
use crate::pool::Job;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Coarse progress of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Accepted but not started
    Pending,
    /// Work is executing
    Running,
    /// Outcome recorded (value, failure, panic, cancellation or rejection)
    Finished,
}

enum Stage<T> {
    Pending,
    Running {
        abort: Option<AbortHandle>,
        cancel_requested: bool,
    },
    /// `None` once a joiner has taken the outcome
    Finished(Option<Result<T, TaskError>>),
}

type FinishHook = Box<dyn FnOnce() + Send + 'static>;

struct Cell<T> {
    id: TaskId,
    stage: Mutex<Stage<T>>,
    finished: Notify,
    cancelled: AtomicBool,
    hook: Mutex<Option<FinishHook>>,
}

impl<T> Cell<T> {
    fn stage(&self) -> MutexGuard<'_, Stage<T>> {
        self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pending -> Running. False if the task was already finished.
    fn begin(&self) -> bool {
        let mut stage = self.stage();
        match *stage {
            Stage::Pending => {
                *stage = Stage::Running {
                    abort: None,
                    cancel_requested: false,
                };
                true
            }
            _ => false,
        }
    }

    fn attach(&self, handle: AbortHandle) {
        let mut stage = self.stage();
        if let Stage::Running {
            abort,
            cancel_requested,
        } = &mut *stage
        {
            if *cancel_requested {
                handle.abort();
            }
            *abort = Some(handle);
        }
    }

    /// Record the outcome. Only the first call has any effect.
    fn finish(&self, outcome: Result<T, TaskError>) -> bool {
        {
            let mut stage = self.stage();
            if matches!(*stage, Stage::Finished(_)) {
                return false;
            }
            *stage = Stage::Finished(Some(outcome));
        }
        self.publish();
        true
    }

    /// Finish with `outcome` only if the task has not started yet
    fn finish_pending(&self, outcome: Result<T, TaskError>) -> bool {
        {
            let mut stage = self.stage();
            if !matches!(*stage, Stage::Pending) {
                return false;
            }
            *stage = Stage::Finished(Some(outcome));
        }
        self.publish();
        true
    }

    fn publish(&self) {
        tracing::trace!(task = %self.id, "finished");
        self.finished.notify_waiters();
        let hook = self.hook.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn cancel(&self) -> bool {
        if self.finish_pending(Err(TaskError::Cancelled)) {
            self.cancelled.store(true, Ordering::SeqCst);
            return true;
        }
        let mut stage = self.stage();
        match *stage {
            Stage::Running {
                ref mut abort,
                ref mut cancel_requested,
            } if !*cancel_requested => {
                *cancel_requested = true;
                if let Some(abort) = abort {
                    abort.abort();
                }
                self.cancelled.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// The job driving this cell went away before recording an outcome
    fn abandon(&self) {
        let abort = match &mut *self.stage() {
            Stage::Finished(_) => return,
            Stage::Pending => None,
            Stage::Running { abort, .. } => abort.take(),
        };
        if let Some(abort) = abort {
            abort.abort();
        }
        tracing::debug!(task = %self.id, "job dropped before completion");
        self.finish(Err(TaskError::Cancelled));
    }

    fn status(&self) -> TaskStatus {
        match *self.stage() {
            Stage::Pending => TaskStatus::Pending,
            Stage::Running { .. } => TaskStatus::Running,
            Stage::Finished(_) => TaskStatus::Finished,
        }
    }

    fn take_outcome(&self) -> Option<Result<T, TaskError>> {
        match &mut *self.stage() {
            Stage::Finished(slot) => Some(slot.take().unwrap_or(Err(TaskError::Taken))),
            _ => None,
        }
    }
}

/// Type-erased control over a task, used by schedulers that hold tasks of
/// mixed output types.
pub(crate) trait TaskControl: Send + Sync {
    fn is_finished(&self) -> bool;
    fn cancel(&self) -> bool;
    /// Finish a not-yet-started task as rejected by its executor
    fn reject(&self, reason: SubmitError);
}

impl<T: Send + 'static> TaskControl for Cell<T> {
    fn is_finished(&self) -> bool {
        self.status() == TaskStatus::Finished
    }

    fn cancel(&self) -> bool {
        Cell::cancel(self)
    }

    fn reject(&self, reason: SubmitError) {
        self.finish_pending(Err(TaskError::Rejected(reason)));
    }
}

/// Handle to a submitted task.
///
/// Handles are cheap to clone and all clones observe the same task. The
/// outcome itself is moved out by the first join that sees it; joins on other
/// clones afterwards report [`TaskError::Taken`].
pub struct TaskHandle<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.cell.id)
            .field("status", &self.cell.status())
            .finish()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn status(&self) -> TaskStatus {
        self.cell.status()
    }

    pub fn is_finished(&self) -> bool {
        self.status() == TaskStatus::Finished
    }

    /// True once a call to [`cancel`](Self::cancel) was accepted
    pub fn is_cancelled(&self) -> bool {
        self.cell.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the task.
    ///
    /// Before it starts the task never runs and finishes as
    /// [`TaskError::Cancelled`]. Once running, the work is aborted at its next
    /// await point. Returns false if the task already finished or a
    /// cancellation was already accepted.
    pub fn cancel(&self) -> bool {
        let accepted = self.cell.cancel();
        if accepted {
            tracing::trace!(task = %self.cell.id, "cancel accepted");
        }
        accepted
    }

    /// Wait for the outcome
    pub async fn join(self) -> Result<T, TaskError> {
        self.finished().await;
        self.cell.take_outcome().unwrap_or(Err(TaskError::Taken))
    }

    /// Take the outcome if the task already finished
    pub fn try_join(&self) -> Option<Result<T, TaskError>> {
        self.cell.take_outcome()
    }

    /// Wait at most `timeout` for the outcome
    pub async fn join_timeout(&self, timeout: Duration) -> Option<Result<T, TaskError>> {
        tokio::time::timeout(timeout, self.finished()).await.ok()?;
        self.cell.take_outcome()
    }

    /// Resolve once the task has finished, without taking the outcome
    pub async fn finished(&self) {
        loop {
            let notified = self.cell.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }

    /// Run `hook` exactly once after the outcome is recorded (immediately if
    /// it already is).
    pub(crate) fn on_finish(&self, hook: impl FnOnce() + Send + 'static) {
        let mut slot = self.cell.hook.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_finished() {
            drop(slot);
            hook();
        } else {
            *slot = Some(Box::new(hook));
        }
    }

    pub(crate) fn control(&self) -> Arc<dyn TaskControl> {
        Arc::clone(&self.cell) as Arc<dyn TaskControl>
    }
}

/// Finishes the task as cancelled if its job is dropped early
struct RunGuard<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Drop for RunGuard<T> {
    fn drop(&mut self) {
        self.cell.abandon();
    }
}

/// Wrap `future` into a handle plus the job that drives it.
///
/// The job records the outcome exactly once: the value, the error, a panic,
/// or `Cancelled` if the task was cancelled or the job dropped before running.
pub(crate) fn prepare<T, E, F>(future: F) -> (TaskHandle<T>, Job)
where
    T: Send + 'static,
    E: Into<BoxError> + Send + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    let cell = Arc::new(Cell {
        id: TaskId::next(),
        stage: Mutex::new(Stage::Pending),
        finished: Notify::new(),
        cancelled: AtomicBool::new(false),
        hook: Mutex::new(None),
    });
    let handle = TaskHandle {
        cell: Arc::clone(&cell),
    };

    // Built outside the job so dropping an unpolled job still finishes the task
    let guard = RunGuard { cell };
    let job = async move {
        if !guard.cell.begin() {
            return;
        }
        tracing::trace!(task = %guard.cell.id, "started");

        let inner = tokio::spawn(future);
        guard.cell.attach(inner.abort_handle());
        let outcome = match inner.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(TaskError::Failed(err.into())),
            Err(err) if err.is_cancelled() => Err(TaskError::Cancelled),
            Err(err) => Err(TaskError::Panicked(panic_message(err))),
        };
        guard.cell.finish(outcome);
    }
    .boxed();

    (handle, job)
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                (*msg).to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
