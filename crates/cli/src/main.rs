// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! strand - exercise the keyed coordination primitives from the command line

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{completion, keyed, lock, queue};
use output::OutputFormat;
use std::path::PathBuf;
use strand_core::StrandConfig;

#[derive(Parser)]
#[command(
    name = "strand",
    version,
    about = "Strand - keyed scheduling, locks and backpressure"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks through the keyed serial scheduler
    Keyed(keyed::KeyedArgs),
    /// Run units through the completion-ordered service
    Completion(completion::CompletionArgs),
    /// Contend on one keyed lock from several holders
    Lock(lock::LockArgs),
    /// Push through a bounded queue against a slow consumer
    Queue(queue::QueueArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StrandConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StrandConfig::default(),
    };
    setup_logging(&config.log_level);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Keyed(args) => output::finish(&keyed::run(args, &config).await?, format),
        Commands::Completion(args) => {
            output::finish(&completion::run(args, &config).await?, format)
        }
        Commands::Lock(args) => output::finish(&lock::run(args).await?, format),
        Commands::Queue(args) => output::finish(&queue::run(args).await?, format),
    }
}

fn setup_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
