use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use st_cli::commands::{duration, run};
use st_cli::{Cli, Commands, Config};
use st_core::WriterEventLog;

/// Reads the script from a file, or from stdin when no file (or `-`) is given.
fn read_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        _ => {
            let mut script = String::new();
            io::stdin()
                .read_to_string(&mut script)
                .context("failed to read script from stdin")?;
            Ok(script)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Diagnostics go to stderr so reports on stdout stay clean
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Run {
            script,
            dry_run,
            json,
            log_verbosity,
            output_dir,
        }) => {
            let config =
                Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
            tracing::debug!(?config, "loaded configuration");

            let mut options = run::RunOptions::from_config(&config);
            options.dry_run = *dry_run;
            options.json = *json;
            if let Some(level) = log_verbosity {
                options.log_verbosity = *level;
            }
            if let Some(dir) = output_dir {
                options.output_dir.clone_from(dir);
            }

            let input = read_script(script.as_deref())?;
            run::run(
                &mut io::stdout(),
                WriterEventLog::new(io::stdout()),
                &input,
                &options,
            )?;
        }
        Some(Commands::FormatDuration { seconds }) => {
            duration::run(&mut io::stdout(), *seconds)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
