// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion-ordered service run

use crate::output::Report;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use strand_core::{CompletionService, StrandConfig, WorkerPool};

#[derive(Args)]
pub struct CompletionArgs {
    /// Number of units; earlier units run longer
    #[arg(long, default_value_t = 8)]
    pub units: usize,
    /// Duration step between consecutive units, in milliseconds
    #[arg(long, default_value_t = 10)]
    pub step_ms: u64,
}

#[derive(Serialize)]
pub struct CompletionReport {
    units: usize,
    /// Unit indices in the order they were retrieved
    finish_order: Vec<usize>,
    delayed: Vec<usize>,
    failed: usize,
    duplicates: usize,
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Completion run: {} units", self.units)?;
        let order: Vec<String> = self.finish_order.iter().map(|i| i.to_string()).collect();
        writeln!(f, "  Finish order: {}", order.join(" "))?;
        let delayed: Vec<String> = self.delayed.iter().map(|i| i.to_string()).collect();
        writeln!(f, "  Delayed: {}", delayed.join(" "))?;
        write!(f, "  Failed: {}  Duplicates: {}", self.failed, self.duplicates)
    }
}

impl Report for CompletionReport {
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.finish_order.len() + self.failed != self.units {
            violations.push(format!(
                "retrieved {} of {} units",
                self.finish_order.len() + self.failed,
                self.units
            ));
        }
        if self.duplicates > 0 {
            violations.push(format!("{} units delivered twice", self.duplicates));
        }
        violations
    }
}

pub async fn run(args: CompletionArgs, config: &StrandConfig) -> Result<CompletionReport> {
    let service = CompletionService::new(WorkerPool::new(&config.pool));
    let step = Duration::from_millis(args.step_ms);

    let mut delayed = Vec::new();
    for i in 0..args.units {
        let work = step * u32::try_from(args.units - i).unwrap_or(u32::MAX);
        let unit = async move {
            tokio::time::sleep(work).await;
            Ok::<_, Infallible>(i)
        };
        if i % 3 == 2 {
            service.submit_after(step, unit)?;
            delayed.push(i);
        } else {
            service.submit(unit)?;
        }
    }

    let longest = step * u32::try_from(args.units + 1).unwrap_or(u32::MAX);
    let deadline = tokio::time::Instant::now() + longest * 2 + Duration::from_secs(5);
    let mut finish_order = Vec::with_capacity(args.units);
    let mut seen = HashSet::new();
    let mut failed = 0;
    let mut duplicates = 0;
    while service.outstanding() > 0 && tokio::time::Instant::now() < deadline {
        let Some(handle) = service.poll_timeout(config.completion.poll_interval).await else {
            continue;
        };
        if !seen.insert(handle.id()) {
            duplicates += 1;
            continue;
        }
        match handle.join().await {
            Ok(i) => finish_order.push(i),
            Err(e) => {
                tracing::warn!(error = %e, "unit did not complete");
                failed += 1;
            }
        }
    }

    service.shutdown().await;
    service.executor().shutdown();
    service.executor().join().await;

    Ok(CompletionReport {
        units: args.units,
        finish_order,
        delayed,
        failed,
        duplicates,
    })
}
