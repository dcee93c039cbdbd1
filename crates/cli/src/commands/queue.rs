// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded queue backpressure run

use crate::output::Report;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strand_core::{BoundedQueue, QueueError};

#[derive(Args)]
pub struct QueueArgs {
    /// Queue capacity
    #[arg(long, default_value_t = 4)]
    pub capacity: usize,
    /// Items to push through
    #[arg(long, default_value_t = 32)]
    pub items: usize,
    /// Consumer delay per item, in milliseconds
    #[arg(long, default_value_t = 2)]
    pub consume_ms: u64,
}

#[derive(Serialize)]
pub struct QueueReport {
    capacity: usize,
    items: usize,
    received: usize,
    /// Pushes that found the queue full and had to wait
    producer_stalls: usize,
    max_len: usize,
    in_order: bool,
}

impl fmt::Display for QueueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue run: {} items, capacity {}", self.items, self.capacity)?;
        writeln!(f, "  Received: {}", self.received)?;
        writeln!(f, "  Producer stalls: {}", self.producer_stalls)?;
        writeln!(f, "  Max length: {}", self.max_len)?;
        write!(f, "  FIFO: {}", if self.in_order { "yes" } else { "no" })
    }
}

impl Report for QueueReport {
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.received != self.items {
            violations.push(format!("received {} of {} items", self.received, self.items));
        }
        if self.max_len > self.capacity {
            violations.push(format!("length {} exceeded capacity", self.max_len));
        }
        if !self.in_order {
            violations.push("items left the queue out of order".to_string());
        }
        violations
    }
}

pub async fn run(args: QueueArgs) -> Result<QueueReport> {
    let queue = Arc::new(BoundedQueue::new(args.capacity));
    let delay = Duration::from_millis(args.consume_ms);

    let consumer = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            let mut received = Vec::new();
            while let Some(item) = queue.pop().await {
                received.push(item);
                tokio::time::sleep(delay).await;
            }
            received
        }
    });

    let mut stalls = 0;
    let mut max_len = 0;
    for item in 0..args.items {
        match queue.try_push(item) {
            Ok(()) => {}
            Err(QueueError::Full(item)) => {
                stalls += 1;
                queue.push(item).await.map_err(|e| anyhow::anyhow!("{e}"))?;
            }
            Err(e) => anyhow::bail!("{e}"),
        }
        max_len = max_len.max(queue.len());
    }
    queue.close();

    let received = consumer.await?;
    let in_order = received.windows(2).all(|w| w[0] < w[1]);
    tracing::debug!(stalls, received = received.len(), "queue run finished");

    Ok(QueueReport {
        capacity: queue.capacity(),
        items: args.items,
        received: received.len(),
        producer_stalls: stalls,
        max_len,
        in_order,
    })
}
