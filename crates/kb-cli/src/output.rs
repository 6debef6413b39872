//! Dual JSON/human output, following the teacher's `dsl_cli` convention:
//! `--format json` emits one `serde_json::to_string_pretty` document,
//! `text`/`pretty` print colored, human-scannable lines. CLI chrome is
//! explicitly out of scope for the engine itself (spec.md §1); this
//! module is the one place that chrome lives.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
    Pretty,
}

/// Prints `value` as pretty JSON when `format == Json`, otherwise hands
/// off to `render` for the human-readable rendering.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, render: impl FnOnce(&T)) -> Result<(), String> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))?
            );
        }
        OutputFormat::Text | OutputFormat::Pretty => render(value),
    }
    Ok(())
}

pub fn ok_line(message: impl AsRef<str>) {
    println!("{} {}", "OK".green().bold(), message.as_ref());
}

pub fn warn_line(message: impl AsRef<str>) {
    println!("{} {}", "WARN".yellow().bold(), message.as_ref());
}

pub fn error_line(message: impl AsRef<str>) {
    eprintln!("{} {}", "error".red().bold(), message.as_ref());
}

pub fn field(name: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", name.dimmed(), value);
}
