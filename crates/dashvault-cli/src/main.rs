// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
// Allow clippy warnings for CLI application
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{check, migrate, status};

/// Dashvault CLI - operational tooling for versioned checkpoint stores
///
/// **Schema chain**:
///   check - validate a schema specification's migration chain
///
/// **Store inspection**:
///   status - schema-version inventory of a checkpoint store
///
/// **Migration**:
///   migrate - batch-upgrade a checkpoint store (supports dry runs and
///   resumable, cancellable runs)
#[derive(Parser)]
#[command(name = "dashvault")]
#[command(author = "Andrew Yates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dashvault CLI - checkpoint schema migration tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schema specification's migration chain
    Check(check::CheckArgs),

    /// Show the schema-version inventory of a checkpoint store
    Status(status::StatusArgs),

    /// Batch-migrate every record in a checkpoint store
    Migrate(migrate::MigrateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => check::run(args),
        Commands::Status(args) => status::run(args).await,
        Commands::Migrate(args) => migrate::run(args).await,
    }
}
