// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Schema-version inventory of a checkpoint store.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use dashvault::{BatchMigrator, CustomTransforms, FileCheckpointStore, SchemaSpec};

use crate::output::{create_table, print_info, print_success, print_warning, OutputFormat};

/// Show the schema-version inventory of a checkpoint store
#[derive(Args)]
pub struct StatusArgs {
    /// Path to the schema specification (JSON or YAML)
    #[arg(long = "spec", env = "DASHVAULT_SPEC")]
    spec_path: String,

    /// Directory of the file-based checkpoint store
    #[arg(long = "store", env = "DASHVAULT_STORE")]
    store_path: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let spec = SchemaSpec::from_file(&args.spec_path)
        .with_context(|| format!("failed to load schema specification '{}'", args.spec_path))?;
    let registry = Arc::new(spec.build_registry().context("invalid migration chain")?);
    let store = Arc::new(
        FileCheckpointStore::new(&args.store_path)
            .with_context(|| format!("failed to open checkpoint store '{}'", args.store_path))?,
    );

    let migrator = BatchMigrator::new(store, registry, Arc::new(CustomTransforms::new()));
    let survey = migrator.survey().await.context("store scan failed")?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&survey)?);
        }
        OutputFormat::Table => {
            print_info(&format!(
                "{} record(s), current version {}",
                survey.total, survey.current_version
            ));

            let mut table = create_table(vec!["Schema version", "Records", ""]);
            for (version, count) in &survey.by_version {
                let marker = if *version == survey.current_version {
                    "current".green().to_string()
                } else if *version > survey.current_version {
                    "future".red().to_string()
                } else {
                    "stale".yellow().to_string()
                };
                table.add_row(vec![version.to_string(), count.to_string(), marker]);
            }
            println!("{table}");

            if survey.future > 0 {
                print_warning(&format!(
                    "{} record(s) were written by newer code and cannot be loaded here",
                    survey.future
                ));
            }
            if survey.stale == 0 {
                print_success("store is fully migrated");
            } else {
                print_info(&format!(
                    "{} stale record(s); run `dashvault migrate` to upgrade",
                    survey.stale
                ));
            }
        }
    }

    Ok(())
}
