// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Batch-migrate every record in a checkpoint store.
//!
//! Wraps [`BatchMigrator::run`] with ctrl-c handling: the first interrupt
//! requests cooperative cancellation, the run finishes its in-flight
//! batch, and the printed report carries the cursor to resume from.
//!
//! Custom transforms cannot be registered from the command line; a store
//! whose chain declares them must be migrated by the hosting process (or
//! its records will be reported as failed here).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use dashvault::{
    BatchMigrator, BatchOptions, CancelHandle, CustomTransforms, FileCheckpointStore,
    MigrationReport, SchemaSpec, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY,
};

use crate::output::{
    create_table, print_error, print_info, print_success, print_warning, OutputFormat,
};

/// Batch-migrate every record in a checkpoint store
#[derive(Args)]
pub struct MigrateArgs {
    /// Path to the schema specification (JSON or YAML)
    #[arg(long = "spec", env = "DASHVAULT_SPEC")]
    spec_path: String,

    /// Directory of the file-based checkpoint store
    #[arg(long = "store", env = "DASHVAULT_STORE")]
    store_path: String,

    /// Compute and report changes without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Records fetched per scan page
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Cursor from a previous run's report to continue from
    #[arg(long = "resume-from")]
    resume_cursor: Option<String>,

    /// Records migrated concurrently within a batch
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// Write the JSON report to this path as well
    #[arg(long = "report")]
    report_path: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

pub async fn run(args: MigrateArgs) -> Result<()> {
    let spec = SchemaSpec::from_file(&args.spec_path)
        .with_context(|| format!("failed to load schema specification '{}'", args.spec_path))?;
    let registry = Arc::new(spec.build_registry().context("invalid migration chain")?);
    let store = Arc::new(
        FileCheckpointStore::new(&args.store_path)
            .with_context(|| format!("failed to open checkpoint store '{}'", args.store_path))?,
    );

    let custom_ids: Vec<&str> = spec.custom_ids().collect();
    if !custom_ids.is_empty() {
        print_warning(&format!(
            "chain declares custom transforms ({}) that the CLI cannot register; \
             records needing them will be reported as failed",
            custom_ids.join(", ")
        ));
    }

    let migrator = BatchMigrator::new(store, registry, Arc::new(CustomTransforms::new()));

    let cancel = CancelHandle::new();
    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("interrupt received; finishing the in-flight batch");
            ctrlc_cancel.cancel();
        }
    });

    if args.dry_run {
        print_info("dry run: no records will be written");
    }
    print_info(&format!(
        "migrating '{}' (batch size {}, concurrency {})",
        args.store_path, args.batch_size, args.max_concurrency
    ));

    let report = migrator
        .run(
            BatchOptions {
                dry_run: args.dry_run,
                batch_size: args.batch_size,
                resume_cursor: args.resume_cursor.clone(),
                max_concurrency: args.max_concurrency,
            },
            &cancel,
        )
        .await
        .context("batch migration aborted on a store scan failure")?;

    if let Some(path) = &args.report_path {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)
            .with_context(|| format!("failed to write report to '{path}'"))?;
        print_info(&format!("report written to {path}"));
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    if !report.failed.is_empty() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    let mut table = create_table(vec!["Processed", "Migrated", "Skipped", "Failed"]);
    table.add_row(vec![
        report.processed.to_string(),
        report.migrated.to_string(),
        report.skipped.to_string(),
        report.failed.len().to_string(),
    ]);
    println!("{table}");

    if report.dry_run && !report.changes.is_empty() {
        let mut changes = create_table(vec!["Key", "From", "Would change"]);
        for record in &report.changes {
            let summary: Vec<String> = record
                .changes
                .iter()
                .map(|c| match serde_json::to_value(c) {
                    Ok(v) => v.to_string(),
                    Err(_) => "?".to_string(),
                })
                .collect();
            changes.add_row(vec![
                record.key.clone(),
                record.from_version.to_string(),
                summary.join(", "),
            ]);
        }
        println!("{changes}");
    }

    for failed in &report.failed {
        print_error(&format!("{}: {}", failed.key, failed.error));
    }

    if report.cancelled {
        match &report.resume_cursor {
            Some(cursor) => print_warning(&format!(
                "run cancelled; resume with --resume-from '{cursor}'"
            )),
            None => print_warning("run cancelled before the first batch"),
        }
    } else if report.failed.is_empty() {
        print_success("store is fully migrated");
    } else {
        print_warning(&format!(
            "{} record(s) failed; the failed-keys list is suitable for retry",
            report.failed.len()
        ));
    }
}
