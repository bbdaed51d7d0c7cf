//! Report printing shared by the commands.

use serde::Serialize;

use crate::OutputFormat;

/// Print a report as pretty JSON. Text output is written by each command.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    if let OutputFormat::Json = format {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }
    }
}

/// Format a point or vector with two decimals.
pub fn fmt3(v: [f64; 3]) -> String {
    format!("({:.2}, {:.2}, {:.2})", v[0], v[1], v[2])
}
