// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed scheduler run

use crate::output::Report;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strand_core::{KeyedScheduler, StrandConfig, SubmitError, WorkerPool};

#[derive(Args)]
pub struct KeyedArgs {
    /// Number of distinct ordering keys
    #[arg(long, default_value_t = 4)]
    pub keys: usize,
    /// Total tasks, spread round-robin over the keys
    #[arg(long, default_value_t = 32)]
    pub tasks: usize,
    /// Simulated work per task, in milliseconds
    #[arg(long, default_value_t = 10)]
    pub work_ms: u64,
}

#[derive(Serialize)]
pub struct KeyedReport {
    keys: usize,
    tasks: usize,
    elapsed_ms: u128,
    peak_concurrency: usize,
    /// Times a task started while another with its key was running
    key_overlaps: usize,
    /// Tasks that started ahead of an earlier submission with the same key
    out_of_order: usize,
    failed: usize,
    rejected: usize,
}

impl fmt::Display for KeyedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Keyed run: {} tasks over {} keys", self.tasks, self.keys)?;
        writeln!(f, "  Elapsed: {}ms", self.elapsed_ms)?;
        writeln!(f, "  Peak concurrency: {}", self.peak_concurrency)?;
        writeln!(f, "  Same-key overlaps: {}", self.key_overlaps)?;
        writeln!(f, "  Out of order: {}", self.out_of_order)?;
        write!(f, "  Failed: {}  Rejected: {}", self.failed, self.rejected)
    }
}

impl Report for KeyedReport {
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.key_overlaps > 0 {
            violations.push(format!("{} same-key overlaps", self.key_overlaps));
        }
        if self.out_of_order > 0 {
            violations.push(format!("{} tasks started out of order", self.out_of_order));
        }
        if self.failed > 0 {
            violations.push(format!("{} tasks failed", self.failed));
        }
        violations
    }
}

#[derive(Default)]
struct Observed {
    running: AtomicUsize,
    peak: AtomicUsize,
    overlaps: AtomicUsize,
    /// (key, sequence within key) in start order
    starts: Mutex<Vec<(usize, usize)>>,
    in_flight: Mutex<HashMap<usize, usize>>,
}

impl Observed {
    fn enter(&self, key: usize, seq: usize) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.starts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key, seq));
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let count = in_flight.entry(key).or_default();
        *count += 1;
        if *count > 1 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exit(&self, key: usize) {
        if let Some(count) = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&key)
        {
            *count -= 1;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn out_of_order(&self) -> usize {
        let starts = self.starts.lock().unwrap_or_else(|e| e.into_inner());
        let mut last: HashMap<usize, usize> = HashMap::new();
        let mut broken = 0;
        for &(key, seq) in starts.iter() {
            if last.get(&key).is_some_and(|&prev| prev > seq) {
                broken += 1;
            }
            last.insert(key, seq);
        }
        broken
    }
}

pub async fn run(args: KeyedArgs, config: &StrandConfig) -> Result<KeyedReport> {
    let keys = args.keys.max(1);
    let work = Duration::from_millis(args.work_ms);
    let scheduler = KeyedScheduler::new(WorkerPool::new(&config.pool));
    let observed = Arc::new(Observed::default());

    let started = Instant::now();
    let mut handles = Vec::with_capacity(args.tasks);
    let mut rejected = 0;
    for i in 0..args.tasks {
        let (key, seq) = (i % keys, i / keys);
        let observed = Arc::clone(&observed);
        let task = async move {
            observed.enter(key, seq);
            tokio::time::sleep(work).await;
            observed.exit(key);
            Ok::<_, Infallible>(())
        };
        match scheduler.submit(key, task) {
            Ok(handle) => handles.push(handle),
            Err(SubmitError::Saturated) => rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let mut failed = 0;
    for handle in handles {
        if let Err(e) = handle.join().await {
            tracing::warn!(error = %e, "task did not complete");
            failed += 1;
        }
    }
    let elapsed = started.elapsed();

    scheduler.shutdown(config.scheduler.shutdown_policy);
    scheduler.executor().shutdown();
    scheduler.executor().join().await;

    Ok(KeyedReport {
        keys,
        tasks: args.tasks,
        elapsed_ms: elapsed.as_millis(),
        peak_concurrency: observed.peak.load(Ordering::SeqCst),
        key_overlaps: observed.overlaps.load(Ordering::SeqCst),
        out_of_order: observed.out_of_order(),
        failed,
        rejected,
    })
}
