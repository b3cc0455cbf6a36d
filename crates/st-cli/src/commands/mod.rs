//! CLI subcommand implementations.

pub mod duration;
pub mod run;
