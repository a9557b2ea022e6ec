//! skin: command-line host for the skin reconstruction pipeline.
//!
//! Reads a text point cloud, reconstructs a colored surface mesh and
//! writes it as Wavefront OBJ. Suitable for scripting: every command can
//! report as JSON.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=skin_recon=info` - Stage summaries
//! - `RUST_LOG=skin_recon=debug` - Per-stage detail
//! - `RUST_LOG=skin_recon::timing=info` - Stage timing only
//!
//! # Example
//!
//! ```bash
//! skin reconstruct scan.xyz -o skin.obj --preset body-scan
//! skin info scan.xyz --detailed
//! skin config --preset self-occluding > occluding.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod io;
mod output;

use commands::{config, info, reconstruct};

/// skin - reconstruct a colored surface mesh from a noisy point cloud.
#[derive(Parser)]
#[command(name = "skin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

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

/// Named parameter sets.
#[derive(Clone, Copy, ValueEnum)]
pub enum Preset {
    /// Library defaults
    Default,
    /// Adaptive grid, outlier filtering, normalized output
    BodyScan,
    /// Front-most binning and heavier smoothing
    SelfOccluding,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Mean height and color per cell
    Average,
    /// Highest sample per cell
    NearestFront,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BoundaryArg {
    /// Angular sort with corner cutting
    Angular,
    /// Contour tracing along the region edge
    Trace,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MeshModeArg {
    /// Two triangles per fully grown grid quad
    Grid,
    /// Ear-clipped silhouette
    Boundary,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct a mesh from a point file
    Reconstruct(reconstruct::ReconstructArgs),

    /// Display point cloud statistics and normalization
    Info {
        /// Input point file (x y z [r g b] per line)
        input: PathBuf,

        /// Diagonal the normalization maps the bounding box to
        #[arg(long, default_value = "2.0")]
        target_size: f64,

        /// Show per-stage cost estimates for the body-scan preset
        #[arg(long)]
        detailed: bool,
    },

    /// Print or save a parameter file
    Config {
        /// Parameter set to print
        #[arg(long, default_value = "default")]
        preset: Preset,

        /// Emit JSON instead of TOML
        #[arg(long)]
        json: bool,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "skin_recon=info,skin=info",
            2 => "skin_recon=debug,skin=debug",
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
        Commands::Reconstruct(args) => reconstruct::run(args, &cli),
        Commands::Info {
            input,
            target_size,
            detailed,
        } => info::run(input, *target_size, *detailed, &cli),
        Commands::Config {
            preset,
            json,
            output,
        } => config::run(*preset, *json, output.as_deref(), &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(skin_err) = e.downcast_ref::<skin_recon::SkinError>() {
                eprintln!("{}: {}", "Error".red().bold(), skin_err);
                eprintln!("  {}: {}", "Code".cyan(), skin_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    skin_err.recovery_suggestion()
                );
                if let Some(location) = skin_err.location() {
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
