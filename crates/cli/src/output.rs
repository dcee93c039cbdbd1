// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Result of one command run
pub trait Report: Serialize + fmt::Display {
    /// Invariants the run observed being broken
    fn violations(&self) -> Vec<String>;
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print the report, failing if it recorded any violation
pub fn finish<R: Report>(report: &R, format: OutputFormat) -> anyhow::Result<()> {
    print(report, format);
    let violations = report.violations();
    if violations.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("invariant violated: {}", violations.join("; "))
    }
}
