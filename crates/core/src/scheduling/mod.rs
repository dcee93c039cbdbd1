// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling primitives for ordered and time-driven execution
//!
//! This module provides:
//! - **KeyedScheduler**: Serial execution per ordering key, parallel across keys
//! - **CompletionService**: Results delivered in the order work finishes
//! - **TimerService**: Deadline-ordered delivery of delayed items

mod completion;
mod keyed;
mod timer;

pub use completion::CompletionService;
pub use keyed::{KeyedScheduler, OrderingKey};
pub use timer::{DelayQueue, TimerId, TimerService};
