//! overhang: inspect overhang analysis results from the command line.
//!
//! A debugging harness around `mesh-overhang`: it loads an STL, a JSON mesh
//! dump or a zip archive holding either, runs the analysis, prints a report
//! and can write regions and support volumes out as STL for a visual check
//! in any mesh viewer.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_overhang=info` - Per-call summaries
//! - `RUST_LOG=mesh_overhang=debug` - Stage counts and seed resolution
//! - `RUST_LOG=mesh_overhang::timing=debug` - Stage timing
//!
//! # Example
//!
//! ```bash
//! overhang analyze part.stl --threshold 50 --extend plate --export-boxes boxes.stl
//! overhang --format json analyze part.stl --seed-point 12,4,30
//! overhang analyze mesh.json.zip --ignore-picked --top 5 --dangling
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod input;
mod output;

use commands::{analyze, info};

/// overhang - find overhangs and fit support volumes to them.
#[derive(Parser)]
#[command(name = "overhang")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh statistics and input diagnostics
    Info {
        /// Input STL file, JSON mesh dump or zip archive
        input: PathBuf,
    },

    /// Find overhang regions and fit support volumes
    Analyze(analyze::AnalyzeArgs),
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_overhang=info",
            2 => "mesh_overhang=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Info { input } => info::run(input, &cli),
        Commands::Analyze(args) => analyze::run(args, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(err) = e.downcast_ref::<mesh_overhang::OverhangError>() {
                eprintln!("{}: {}", "Error".red().bold(), err);
                eprintln!("  {}: {}", "Code".cyan(), err.code());
                eprintln!("  {}: {}", "Suggestion".green(), err.recovery_suggestion());
                if let Some(location) = err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
