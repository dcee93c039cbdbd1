// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

//! strand-core: keyed concurrency coordination
//!
//! This crate provides:
//! - A keyed serial scheduler (per-key FIFO, parallel across keys)
//! - Reentrant keyed locks with scoped, idempotent release
//! - A bounded queue whose inserts wait for room
//! - A completion-ordered service with delayed submission
//! - A fixed-size worker pool tying the queue to the schedulers

pub mod clock;
pub mod config;
pub mod error;

// Building blocks (order matters for dependencies)
pub mod queue;
pub mod pool;
pub mod task;

pub mod coordination;
pub mod scheduling;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    CompletionConfig, ConfigError, PoolConfig, SchedulerConfig, ShutdownPolicy, StrandConfig,
};
pub use error::{BoxError, SubmitError, TaskError};
pub use pool::{Executor, Job, Rejected, WorkerPool};
pub use queue::{BoundedQueue, QueueError};
pub use task::{TaskHandle, TaskId, TaskStatus};

pub use coordination::{HolderId, KeyedLockGuard, KeyedLocks, LockKey};
pub use scheduling::{
    CompletionService, DelayQueue, KeyedScheduler, OrderingKey, TimerId, TimerService,
};
