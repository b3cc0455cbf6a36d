//! Section start/end notifications.
//!
//! The timer emits a [`SectionEvent`] whenever a section starts or ends and
//! its log level is above zero. Where the line ends up is the [`EventLog`]'s
//! business.

use std::fmt;
use std::io::Write;

use chrono::NaiveDateTime;

use crate::clock::Timestamp;
use crate::path::SectionPath;

/// Whether a section started or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Ended,
}

impl EventKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Started => "Started : ",
            Self::Ended => "Ended   : ",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// A section crossing one of its boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEvent {
    pub kind: EventKind,
    pub path: SectionPath,
    pub label: String,
    /// The node's start time for `Started`, its end time for `Ended`.
    pub timestamp: Option<Timestamp>,
    /// `timestamp` converted to the clock's local calendar.
    pub local: Option<NaiveDateTime>,
}

impl SectionEvent {
    /// Renders the event as a single log line.
    ///
    /// - level 1: path and label
    /// - level 2: adds the local time
    /// - level 3 and above: adds the local date and time
    pub fn render(&self, level: u8) -> String {
        let prefix = self.kind.prefix();
        let (path, label) = (&self.path, &self.label);
        match level {
            0 | 1 => format!("{prefix}{path} {label}"),
            2 => {
                let time = self.local.map_or_else(
                    || "-".to_string(),
                    |dt| dt.format("%H:%M:%S").to_string(),
                );
                format!("{prefix}{path}\t {label}\t at {time}")
            }
            _ => {
                let when = self.local.map_or_else(
                    || "-".to_string(),
                    |dt| dt.format("%d-%m-%Y %H:%M:%S").to_string(),
                );
                format!("{prefix}{path}\t {label}\t at {when}")
            }
        }
    }
}

/// Destination for section events.
pub trait EventLog {
    fn emit(&mut self, event: &SectionEvent, level: u8);
}

/// Sends events to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn emit(&mut self, event: &SectionEvent, level: u8) {
        tracing::info!(
            kind = %event.kind,
            section = %event.path,
            "{}",
            event.render(level)
        );
    }
}

/// Prints one line per event to a writer, e.g. stdout.
#[derive(Debug)]
pub struct WriterEventLog<W> {
    writer: W,
}

impl<W: Write> WriterEventLog<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventLog for WriterEventLog<W> {
    fn emit(&mut self, event: &SectionEvent, level: u8) {
        if let Err(e) = writeln!(self.writer, "{}", event.render(level)) {
            tracing::debug!(error = %e, "failed to write section event");
        }
    }
}
