//! Implementation of the `st run` command.
//!
//! Reads a timing script and drives a single [`Timer`] through it. Script
//! syntax errors abort before anything runs; timer errors (unknown or
//! invalid sections, reports before any start) are printed and the script
//! carries on.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use st_core::{
    Clock, DEFAULT_LABEL, EventLog, ManualClock, ROOT_SECTION, SystemClock, Timer, TimerError,
    report::MAX_VERBOSITY,
};

use crate::Config;

/// One line of a timing script.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Start { section: String, label: String },
    End { section: String },
    Sleep(Duration),
    Show {
        max_depth: Option<usize>,
        verbosity: Option<u8>,
    },
    Save { name: Option<String> },
    Reset,
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(command) = words.next() else {
            bail!("empty step");
        };

        let step = match command {
            "start" => {
                let section = words.next().unwrap_or(ROOT_SECTION).to_string();
                let label = words.by_ref().collect::<Vec<_>>().join(" ");
                let label = if label.is_empty() {
                    DEFAULT_LABEL.to_string()
                } else {
                    label
                };
                Self::Start { section, label }
            }
            "end" => Self::End {
                section: words.next().unwrap_or(ROOT_SECTION).to_string(),
            },
            "sleep" => {
                let Some(secs) = words.next() else {
                    bail!("sleep needs a number of seconds");
                };
                let secs: f64 = secs
                    .parse()
                    .with_context(|| format!("invalid sleep duration: {secs}"))?;
                Self::Sleep(
                    Duration::try_from_secs_f64(secs)
                        .with_context(|| format!("invalid sleep duration: {secs}"))?,
                )
            }
            "show" => {
                let max_depth = match words.next() {
                    None | Some("all") => None,
                    Some(level) => Some(
                        level
                            .parse()
                            .with_context(|| format!("invalid show level: {level}"))?,
                    ),
                };
                let verbosity = words
                    .next()
                    .map(|v| match v.parse::<u8>() {
                        Ok(v) if v <= MAX_VERBOSITY => Ok(v),
                        _ => Err(anyhow::anyhow!(
                            "invalid show verbosity: {v} (expected 0-{MAX_VERBOSITY})"
                        )),
                    })
                    .transpose()?;
                Self::Show {
                    max_depth,
                    verbosity,
                }
            }
            "save" => Self::Save {
                name: words.next().map(str::to_string),
            },
            "reset" => Self::Reset,
            other => bail!("unknown step: {other}"),
        };

        if !matches!(step, Self::Start { .. }) && words.next().is_some() {
            bail!("too many arguments for {command}");
        }
        Ok(step)
    }
}

/// Parses a whole script, reporting the first bad line.
pub fn parse_script(input: &str) -> Result<Vec<Step>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            line.parse()
                .with_context(|| format!("invalid step on line {}: {}", idx + 1, line.trim()))
        })
        .collect()
}

/// Settings for one script run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub json: bool,
    pub log_verbosity: u8,
    pub report_verbosity: u8,
    pub output_name: String,
    pub output_dir: PathBuf,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dry_run: false,
            json: false,
            log_verbosity: config.log_verbosity,
            report_verbosity: config.report_verbosity,
            output_name: config.output_name.clone(),
            output_dir: config.output_dir.clone(),
        }
    }
}

/// How `sleep` steps pass time.
enum Pacer {
    Real,
    Simulated(ManualClock),
}

impl Pacer {
    fn sleep(&self, duration: Duration) -> Result<()> {
        match self {
            Self::Real => std::thread::sleep(duration),
            Self::Simulated(clock) => {
                clock.advance(
                    chrono::Duration::from_std(duration).context("sleep duration out of range")?,
                );
            }
        }
        Ok(())
    }
}

/// Runs `script`, writing reports and diagnostics to `writer` and section
/// events to `log`.
pub fn run<W: Write, L: EventLog + 'static>(
    writer: &mut W,
    log: L,
    script: &str,
    options: &RunOptions,
) -> Result<()> {
    let steps = parse_script(script)?;

    let (pacer, clock): (Pacer, Box<dyn Clock>) = if options.dry_run {
        let clock = ManualClock::new(Utc::now());
        (Pacer::Simulated(clock.clone()), Box::new(clock))
    } else {
        (Pacer::Real, Box::new(SystemClock::new()))
    };
    let mut timer = Timer::with_clock(clock)
        .with_event_log(log)
        .with_log_level(options.log_verbosity);

    tracing::debug!(steps = steps.len(), dry_run = options.dry_run, "running script");
    for step in steps {
        match step {
            Step::Start { section, label } => {
                report_error(writer, timer.start(&section, &label))?;
            }
            Step::End { section } => report_error(writer, timer.end(&section))?,
            Step::Sleep(duration) => pacer.sleep(duration)?,
            Step::Show {
                max_depth,
                verbosity,
            } => {
                let verbosity = verbosity.unwrap_or(options.report_verbosity);
                match timer.report(max_depth, verbosity) {
                    Ok(view) => writeln!(writer, "{view}")?,
                    Err(e) => writeln!(writer, "error: {e}")?,
                }
            }
            Step::Save { name } => {
                let name = name.unwrap_or_else(|| options.output_name.clone());
                match timer.save(options.output_dir.join(name)) {
                    Ok(path) => writeln!(writer, "Saved to: {}", path.display())?,
                    Err(e) => writeln!(writer, "error: {e}")?,
                }
            }
            Step::Reset => timer.reset(),
        }
    }

    if options.json {
        let json = timer.table().to_json().context("failed to serialize report")?;
        writeln!(writer, "{json}")?;
    }

    Ok(())
}

fn report_error<W: Write>(writer: &mut W, result: Result<(), TimerError>) -> Result<()> {
    if let Err(e) = result {
        writeln!(writer, "error: {e}")?;
    }
    Ok(())
}
