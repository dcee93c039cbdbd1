// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared by the schedulers and task handles

use thiserror::Error;

/// Boxed failure produced by a unit of work
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reasons an executor refuses new work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("executor is shut down")]
    Shutdown,
    #[error("executor queue is saturated")]
    Saturated,
}

/// Outcome of a unit of work that did not produce a value
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(#[source] BoxError),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was cancelled")]
    Cancelled,
    #[error("task was rejected: {0}")]
    Rejected(#[from] SubmitError),
    #[error("task result was already taken by another handle")]
    Taken,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskError::Failed(_) | TaskError::Panicked(_))
    }
}
