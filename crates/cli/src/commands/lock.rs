// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed lock contention run

use crate::output::Report;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_core::{HolderId, KeyedLocks, LockKey};

#[derive(Args)]
pub struct LockArgs {
    /// Number of concurrent holders
    #[arg(long, default_value_t = 8)]
    pub holders: usize,
    /// Acquisitions per holder
    #[arg(long, default_value_t = 20)]
    pub rounds: usize,
}

#[derive(Serialize)]
pub struct LockReport {
    holders: usize,
    acquisitions: usize,
    overlaps: usize,
    /// Registry entries left once every guard is gone
    entries_after: usize,
}

impl fmt::Display for LockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lock run: {} holders", self.holders)?;
        writeln!(f, "  Acquisitions: {}", self.acquisitions)?;
        writeln!(f, "  Overlapping holds: {}", self.overlaps)?;
        write!(f, "  Entries after: {}", self.entries_after)
    }
}

impl Report for LockReport {
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.overlaps > 0 {
            violations.push(format!("{} overlapping holds", self.overlaps));
        }
        if self.entries_after > 0 {
            violations.push(format!("{} entries not evicted", self.entries_after));
        }
        violations
    }
}

pub async fn run(args: LockArgs) -> Result<LockReport> {
    let locks = KeyedLocks::new();
    let key = LockKey::new("cli", "shared");
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let acquisitions = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::with_capacity(args.holders);
    for _ in 0..args.holders {
        let locks = locks.clone();
        let key = key.clone();
        let inside = Arc::clone(&inside);
        let overlaps = Arc::clone(&overlaps);
        let acquisitions = Arc::clone(&acquisitions);
        let rounds = args.rounds;
        workers.push(tokio::spawn(async move {
            let holder = HolderId::generate();
            for _ in 0..rounds {
                let mut outer = locks.acquire_key(key.clone(), &holder).await;
                // Reenter once while held
                let inner = locks.acquire_key(key.clone(), &holder).await;
                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                acquisitions.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
                drop(inner);
                outer.release();
                // No-op: already released
                outer.release();
            }
        }));
    }
    for worker in workers {
        worker.await?;
    }

    Ok(LockReport {
        holders: args.holders,
        acquisitions: acquisitions.load(Ordering::SeqCst),
        overlaps: overlaps.load(Ordering::SeqCst),
        entries_after: locks.len(),
    })
}
