//! Tabular reports over a section tree.
//!
//! [`ReportTable::build`] flattens the tree and derives durations, the
//! chronological rank of each start and formatted dates. A [`ReportView`]
//! is a depth-filtered, column-projected window onto a table that renders
//! as aligned text.

use std::fmt;
use std::io::Write;

use serde::Serialize;

use crate::clock::{Clock, Timestamp};
use crate::path::SectionPath;
use crate::tree::SectionTree;

/// Shown instead of a duration while a section has no end time.
pub const STILL_RUNNING: &str = "Still Running";

/// Highest supported report verbosity.
pub const MAX_VERBOSITY: u8 = 4;

const SECS_PER_MIN: f64 = 60.0;
const MINS_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

// ========== Duration Formatting ==========

/// Formats a duration in seconds with a unit matched to its magnitude.
///
/// Seconds below a minute, minutes below an hour, hours below a day, days
/// beyond. The value is rounded to 4 decimal places and the unit is
/// singular only when the rounded value is exactly 1.
///
/// ```
/// use st_core::format_duration;
///
/// assert_eq!(format_duration(59.9999), "59.9999 Secs");
/// assert_eq!(format_duration(60.0), "1.0 Min");
/// assert_eq!(format_duration(3661.0), "1.0169 Hrs");
/// ```
pub fn format_duration(secs: f64) -> String {
    if secs < SECS_PER_MIN {
        return with_unit(secs, "Sec", "Secs");
    }
    let mins = secs / SECS_PER_MIN;
    if mins < MINS_PER_HOUR {
        return with_unit(mins, "Min", "Mins");
    }
    let hours = mins / MINS_PER_HOUR;
    if hours < HOURS_PER_DAY {
        return with_unit(hours, "Hr", "Hrs");
    }
    with_unit(hours / HOURS_PER_DAY, "Day", "Days")
}

fn with_unit(value: f64, singular: &str, plural: &str) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    let unit = if (rounded - 1.0).abs() < f64::EPSILON {
        singular
    } else {
        plural
    };
    format!("{} {unit}", decimal(rounded))
}

/// Shortest round-trip form, always with a fractional part (`1.0`, `2.5`).
fn decimal(value: f64) -> String {
    let s = value.to_string();
    if s.contains(['.', 'e', 'E']) || !value.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

/// Seconds since the Unix epoch, with microsecond precision.
#[allow(clippy::cast_precision_loss)]
fn epoch_seconds(ts: Timestamp) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_micros()) / 1_000_000.0
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_seconds(start: Timestamp, end: Timestamp) -> f64 {
    let delta = end - start;
    delta.num_microseconds().map_or_else(
        || delta.num_milliseconds() as f64 / 1_000.0,
        |us| us as f64 / 1_000_000.0,
    )
}

// ========== Columns ==========

/// A report column. `Section` is the index and is always shown first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Section,
    Label,
    Level,
    TimeTaken,
    Chronology,
    StartDate,
    StartTime,
    EndDate,
    EndTime,
    RawTime,
    RawStart,
    RawEnd,
}

impl Column {
    pub const fn header(self) -> &'static str {
        match self {
            Self::Section => "Section",
            Self::Label => "Label",
            Self::Level => "Level",
            Self::TimeTaken => "Time_Taken",
            Self::Chronology => "Chronology",
            Self::StartDate => "Start_Date",
            Self::StartTime => "Start_Time",
            Self::EndDate => "End_Date",
            Self::EndTime => "End_Time",
            Self::RawTime => "Raw_Time",
            Self::RawStart => "Raw_Start",
            Self::RawEnd => "Raw_End",
        }
    }

    /// Columns shown at a verbosity level; levels above 4 behave like 4.
    pub const fn for_verbosity(verbosity: u8) -> &'static [Self] {
        use Column::{
            Chronology, EndDate, EndTime, Label, RawEnd, RawStart, RawTime, StartDate, StartTime,
            TimeTaken,
        };
        match verbosity {
            0 => &[Label, TimeTaken],
            1 => &[Label, TimeTaken, Chronology],
            2 => &[Label, TimeTaken, Chronology, StartTime, EndTime],
            3 => &[
                Label, TimeTaken, Chronology, StartDate, StartTime, EndDate, EndTime,
            ],
            _ => &[
                Label, TimeTaken, Chronology, StartDate, StartTime, EndDate, EndTime, RawTime,
                RawStart, RawEnd,
            ],
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

// ========== Rows ==========

/// One section in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Section")]
    pub section: SectionPath,
    #[serde(rename = "Label")]
    pub label: String,
    /// Depth in the tree; the root is level 0.
    #[serde(rename = "Level")]
    pub level: usize,
    /// 1-based rank of the start time; `None` for sections never started.
    #[serde(rename = "Chronology")]
    pub chronology: Option<usize>,
    #[serde(rename = "Time_Taken")]
    pub time_taken: String,
    #[serde(rename = "Start_Date")]
    pub start_date: Option<String>,
    #[serde(rename = "Start_Time")]
    pub start_time: Option<String>,
    #[serde(rename = "End_Date")]
    pub end_date: Option<String>,
    #[serde(rename = "End_Time")]
    pub end_time: Option<String>,
    /// Duration in seconds.
    #[serde(rename = "Raw_Time")]
    pub raw_time: Option<f64>,
    /// Start as seconds since the Unix epoch.
    #[serde(rename = "Raw_Start")]
    pub raw_start: Option<f64>,
    /// End as seconds since the Unix epoch.
    #[serde(rename = "Raw_End")]
    pub raw_end: Option<f64>,
}

impl ReportRow {
    /// Text of one cell; absent values render as `-`.
    pub fn cell(&self, column: Column) -> String {
        fn or_dash<T: ToString>(value: Option<&T>) -> String {
            value.map_or_else(|| "-".to_string(), ToString::to_string)
        }

        match column {
            Column::Section => self.section.to_string(),
            Column::Label => self.label.clone(),
            Column::Level => self.level.to_string(),
            Column::TimeTaken => self.time_taken.clone(),
            Column::Chronology => or_dash(self.chronology.as_ref()),
            Column::StartDate => or_dash(self.start_date.as_ref()),
            Column::StartTime => or_dash(self.start_time.as_ref()),
            Column::EndDate => or_dash(self.end_date.as_ref()),
            Column::EndTime => or_dash(self.end_time.as_ref()),
            Column::RawTime => or_dash(self.raw_time.as_ref()),
            Column::RawStart => or_dash(self.raw_start.as_ref()),
            Column::RawEnd => or_dash(self.raw_end.as_ref()),
        }
    }
}

// ========== Tables ==========

/// Every section of a tree with its derived timing fields, in tree order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportTable {
    rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Flattens `tree` into report rows.
    pub fn build<C: Clock + ?Sized>(tree: &SectionTree, clock: &C) -> Self {
        let date = |ts: Timestamp| clock.local_date(ts).format("%d-%m-%Y").to_string();
        let time = |ts: Timestamp| clock.local_time(ts).format("%H:%M:%S").to_string();

        let mut rows: Vec<ReportRow> = tree
            .rows()
            .map(|row| {
                let raw_time = row.start.zip(row.end).map(|(s, e)| elapsed_seconds(s, e));
                ReportRow {
                    section: row.path.clone(),
                    label: row.label.to_string(),
                    level: row.depth,
                    chronology: None,
                    time_taken: raw_time
                        .map_or_else(|| STILL_RUNNING.to_string(), format_duration),
                    start_date: row.start.map(date),
                    start_time: row.start.map(time),
                    end_date: row.end.map(date),
                    end_time: row.end.map(time),
                    raw_time,
                    raw_start: row.start.map(epoch_seconds),
                    raw_end: row.end.map(epoch_seconds),
                }
            })
            .collect();

        // Stable sort keeps tree order among identical start times.
        let mut started: Vec<(usize, Timestamp)> = tree
            .rows()
            .enumerate()
            .filter_map(|(i, row)| row.start.map(|start| (i, start)))
            .collect();
        started.sort_by_key(|&(_, start)| start);
        for (rank, (i, _)) in started.into_iter().enumerate() {
            rows[i].chronology = Some(rank + 1);
        }

        Self { rows }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up the row for a section.
    pub fn get(&self, section: &SectionPath) -> Option<&ReportRow> {
        self.rows.iter().find(|row| &row.section == section)
    }

    /// Rows at or above `max_depth`, in tree order. `None` keeps every row.
    pub fn filter(&self, max_depth: Option<usize>) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(move |row| max_depth.is_none_or(|max| row.level <= max))
    }

    /// Depth-filtered rows projected onto the columns of `verbosity`.
    pub fn view(&self, max_depth: Option<usize>, verbosity: u8) -> ReportView<'_> {
        ReportView {
            rows: self.filter(max_depth).collect(),
            columns: Column::for_verbosity(verbosity),
        }
    }

    /// Writes the full table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A printable selection of report rows and columns.
#[derive(Debug, Clone)]
pub struct ReportView<'a> {
    rows: Vec<&'a ReportRow>,
    columns: &'static [Column],
}

impl<'a> ReportView<'a> {
    pub fn rows(&self) -> &[&'a ReportRow] {
        &self.rows
    }
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<Column> = std::iter::once(Column::Section)
            .chain(self.columns.iter().copied())
            .collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| columns.iter().map(|&c| row.cell(c)).collect())
            .collect();

        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|line| line[i].chars().count())
                    .chain(std::iter::once(c.header().len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let headers: Vec<String> = columns.iter().map(|c| c.header().to_string()).collect();
        for (n, line) in std::iter::once(&headers).chain(&cells).enumerate() {
            if n > 0 {
                writeln!(f)?;
            }
            let mut out = String::new();
            for (cell, width) in line.iter().zip(&widths) {
                out.push_str(&format!("{cell:<width$}  "));
            }
            f.write_str(out.trim_end())?;
        }
        Ok(())
    }
}
