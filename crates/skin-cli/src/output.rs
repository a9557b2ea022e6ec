//! Shared output helpers for text and JSON modes.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a result value. JSON mode emits it pretty-printed on stdout; text
/// mode leaves formatting to the caller.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    if let OutputFormat::Json = format {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{}: failed to encode JSON: {e}", "Error".red().bold()),
        }
    }
}

pub fn success(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    println!("{} {}", "✓".green().bold(), message);
}

/// Status line on stderr so it never mixes with JSON on stdout.
pub fn info(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    eprintln!("{} {}", "→".cyan(), message);
}

pub fn warning(message: &str, quiet: bool) {
    if quiet {
        return;
    }
    eprintln!("{}: {}", "Warning".yellow().bold(), message);
}
