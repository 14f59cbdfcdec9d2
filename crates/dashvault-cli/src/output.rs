// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Colored console output helpers shared by all commands.

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

/// Output format for CLI commands.
///
/// Defaults to human-readable table output; `json` emits the underlying
/// report structures for scripting and alerting.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table output with colors
    #[default]
    Table,
    /// Machine-readable JSON output
    Json,
}

/// Create a table with the house preset.
pub fn create_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(headers);
    table
}

/// Print an informational message.
pub fn print_info(message: &str) {
    println!("{} {}", "info:".bright_blue().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "ok:".green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}
