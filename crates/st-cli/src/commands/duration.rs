//! Format-duration command for previewing how reports render a duration.

use std::io::Write;

use anyhow::{Result, bail};
use st_core::format_duration;

/// Writes `seconds` in report form, e.g. `1.0169 Hrs`.
pub fn run<W: Write>(writer: &mut W, seconds: f64) -> Result<()> {
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("duration must be a non-negative number of seconds, got {seconds}");
    }
    writeln!(writer, "{}", format_duration(seconds))?;
    Ok(())
}
