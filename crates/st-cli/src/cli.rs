//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Hierarchical section timer.
///
/// Times nested, numbered sections of a run (e.g. `1`, `2`, `2.1`) and
/// reports elapsed time per section in chronological and tree order.
#[derive(Debug, Parser)]
#[command(name = "st", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a timing script.
    ///
    /// One step per line: `start [SECTION] [LABEL...]`, `end [SECTION]`,
    /// `sleep SECONDS`, `show [LEVEL] [VERBOSITY]`, `save [NAME]`, `reset`.
    /// Blank lines and lines starting with `#` are ignored.
    Run {
        /// Script file to read; stdin when omitted or `-`.
        script: Option<PathBuf>,

        /// Advance a simulated clock on `sleep` instead of sleeping.
        #[arg(long)]
        dry_run: bool,

        /// Print the full report table as JSON when the script finishes.
        #[arg(long)]
        json: bool,

        /// Section event log level (0 = off, 1-3 = increasing detail).
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
        log_verbosity: Option<u8>,

        /// Directory CSV reports are saved to.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print a duration in seconds the way reports show it.
    FormatDuration {
        /// Duration in seconds.
        #[arg(allow_negative_numbers = true)]
        seconds: f64,
    },
}
