// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Validate a schema specification's migration chain.
//!
//! Loads the document, builds the registry (which runs full chain
//! validation), and lists the custom transform ids the hosting process
//! must register. Exits non-zero on an invalid chain so deploy pipelines
//! can gate on it.

use anyhow::{Context, Result};
use clap::Args;

use dashvault::SchemaSpec;

use crate::output::{create_table, print_error, print_info, print_success, print_warning};

/// Validate a schema specification's migration chain
#[derive(Args)]
pub struct CheckArgs {
    /// Path to the schema specification (JSON or YAML)
    #[arg(long = "spec", env = "DASHVAULT_SPEC")]
    spec_path: String,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let spec = SchemaSpec::from_file(&args.spec_path)
        .with_context(|| format!("failed to load schema specification '{}'", args.spec_path))?;

    print_info(&format!(
        "schema specification: current version {}, minimum version {}, {} migration(s)",
        spec.current_version,
        spec.min_version,
        spec.migrations.len()
    ));

    let registry = match spec.build_registry() {
        Ok(registry) => registry,
        Err(e) => {
            print_error(&format!("migration chain is invalid: {e}"));
            std::process::exit(1);
        }
    };

    let mut table = create_table(vec!["From", "To", "Description", "Operations"]);
    for version in registry.min_version()..registry.current_version() {
        if let Some(step) = registry.step(version) {
            table.add_row(vec![
                step.from_version.to_string(),
                step.to_version.to_string(),
                step.description.clone(),
                step.transforms.len().to_string(),
            ]);
        }
    }
    println!("{table}");

    let custom_ids: Vec<&str> = spec.custom_ids().collect();
    if custom_ids.is_empty() {
        print_success("chain is contiguous; no custom transforms to register");
    } else {
        print_success("chain is contiguous");
        print_warning(&format!(
            "custom transforms that must be registered in code: {}",
            custom_ids.join(", ")
        ));
    }

    Ok(())
}
