// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination primitives for in-process resource access
//!
//! - **KeyedLocks** - Reentrant locks per composite key, evicted when unused

pub mod lock;

pub use lock::{HolderId, KeyedLockGuard, KeyedLocks, LockKey};
