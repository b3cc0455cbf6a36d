//! The timer engine.
//!
//! A [`Timer`] owns one section tree and tracks the most recently started
//! section. Starting a section that is not nested inside the open one closes
//! the open one first; ending a section that encloses the open one closes
//! the open one, which stamps the whole chain up to the root.
//!
//! Errors are returned to the caller and also reported as `tracing`
//! warnings. A failed call never changes the section tree.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::error::TimerError;
use crate::event::{EventKind, EventLog, SectionEvent, TracingEventLog};
use crate::path::SectionPath;
use crate::report::{ReportTable, ReportView};
use crate::tree::{PLACEHOLDER_LABEL, SectionTree};

/// Label used when a section is started without one.
pub const DEFAULT_LABEL: &str = "Start";

/// Default name of the CSV written by [`Timer::save`].
pub const DEFAULT_OUTPUT_NAME: &str = "Timer_Logs";

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    NotStarted,
    Running {
        /// Most recently started section, kept after it is closed.
        open: Option<SectionPath>,
        /// Whether `open` still needs closing.
        pending_close: bool,
    },
}

/// Hierarchical section timer.
pub struct Timer<C = SystemClock> {
    clock: C,
    tree: SectionTree,
    state: State,
    log: Box<dyn EventLog>,
    log_level: u8,
    /// Cached report; `None` when the tree changed since the last build.
    table: Option<ReportTable>,
}

impl Default for Timer<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer<SystemClock> {
    /// Creates a timer on the system clock with event logging off.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl<C: Clock> Timer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            tree: SectionTree::new(),
            state: State::NotStarted,
            log: Box::new(TracingEventLog),
            log_level: 0,
            table: None,
        }
    }

    /// Sets where section events go.
    #[must_use]
    pub fn with_event_log(mut self, log: impl EventLog + 'static) -> Self {
        self.log = Box::new(log);
        self
    }

    /// Sets the event log level; 0 disables section events.
    #[must_use]
    pub fn with_log_level(mut self, level: u8) -> Self {
        self.log_level = level;
        self
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub const fn tree(&self) -> &SectionTree {
        &self.tree
    }

    pub const fn log_level(&self) -> u8 {
        self.log_level
    }

    pub fn is_started(&self) -> bool {
        self.state != State::NotStarted
    }

    /// The most recently started section, if it has not been closed since.
    pub fn open_section(&self) -> Option<&SectionPath> {
        match &self.state {
            State::Running {
                open: Some(open),
                pending_close: true,
            } => Some(open),
            _ => None,
        }
    }

    /// Starts `section` (e.g. `"2.1"`) under `label`.
    ///
    /// `"0"` (or an empty string) starts the whole-run timer only. Any other
    /// section also starts the whole-run timer if needed, closes the open
    /// section unless the new one is nested inside it, and restarts the
    /// section from scratch if it already exists.
    pub fn start(&mut self, section: &str, label: &str) -> Result<(), TimerError> {
        reported(self.try_start(section, label))
    }

    /// Ends `section`; `"0"` ends the whole run.
    ///
    /// Ending a section that encloses the open section ends the open section
    /// and with it every section on the chain up to the root.
    pub fn end(&mut self, section: &str) -> Result<(), TimerError> {
        reported(self.try_end(section))
    }

    /// Returns the report rows up to `max_depth` (all when `None`) with the
    /// columns of `verbosity` (0 to 4).
    pub fn report(
        &mut self,
        max_depth: Option<usize>,
        verbosity: u8,
    ) -> Result<ReportView<'_>, TimerError> {
        if !self.is_started() {
            return reported(Err(TimerError::NotStarted));
        }
        Ok(self.table().view(max_depth, verbosity))
    }

    /// The full report table, rebuilt only if sections changed since the
    /// last call.
    pub fn table(&mut self) -> &ReportTable {
        if self.table.is_none() {
            tracing::debug!("rebuilding report table");
        }
        self.table
            .get_or_insert_with(|| ReportTable::build(&self.tree, &self.clock))
    }

    /// Writes the full table as CSV and returns the path written.
    ///
    /// `.csv` is appended when `name` has no extension.
    pub fn save(&mut self, name: impl AsRef<Path>) -> Result<PathBuf, TimerError> {
        let name = name.as_ref();
        let path = if name.extension().is_some() {
            name.to_path_buf()
        } else {
            name.with_extension("csv")
        };

        let result = File::create(&path)
            .map_err(TimerError::from)
            .and_then(|file| {
                self.table()
                    .write_csv(BufWriter::new(file))
                    .map_err(TimerError::from)
            });
        reported(result)?;
        tracing::debug!(path = %path.display(), "saved report");
        Ok(path)
    }

    /// Discards every section and returns to the not-started state.
    pub fn reset(&mut self) {
        self.tree.reset();
        self.state = State::NotStarted;
        self.table = None;
    }

    fn try_start(&mut self, section: &str, label: &str) -> Result<(), TimerError> {
        let path: SectionPath = section.parse()?;
        let now = self.clock.now();
        self.tree.start_root(now);
        self.table = None;

        let (open, pending_close) = match &self.state {
            State::NotStarted => (None, false),
            State::Running {
                open,
                pending_close,
            } => (open.clone(), *pending_close),
        };

        if path.is_root() {
            self.state = State::Running {
                open,
                pending_close,
            };
            return Ok(());
        }

        if let Some(open) = open.filter(|open| pending_close && !open.is_prefix_of(&path)) {
            tracing::debug!(closing = %open, starting = %path, "auto-closing open section");
            self.close(&open, now)?;
        }

        // Ancestors that do not exist yet, outermost first.
        let mut placeholders: Vec<SectionPath> =
            std::iter::successors(path.parent(), SectionPath::parent)
                .take_while(|ancestor| !ancestor.is_root() && self.tree.get(ancestor).is_none())
                .collect();
        placeholders.reverse();

        let node = self.tree.insert(&path, label, now)?;
        let (label, start) = (node.label().to_string(), node.start());
        for placeholder in &placeholders {
            let event = self.event(EventKind::Started, placeholder, PLACEHOLDER_LABEL, None);
            self.emit(&event);
        }
        let event = self.event(EventKind::Started, &path, &label, start);
        self.emit(&event);

        self.state = State::Running {
            open: Some(path),
            pending_close: true,
        };
        Ok(())
    }

    fn try_end(&mut self, section: &str) -> Result<(), TimerError> {
        let path = section.parse::<SectionPath>();
        let State::Running {
            open,
            pending_close,
        } = &mut self.state
        else {
            let path = path?;
            return Err(if path.is_root() {
                TimerError::NotStarted
            } else {
                TimerError::not_found(path)
            });
        };
        // Any end attempt settles the open section, even one that fails.
        let open = open.clone();
        let pending_close = std::mem::take(pending_close);

        let path = path?;
        let now = self.clock.now();
        if path.is_root() {
            match open.as_ref().filter(|_| pending_close) {
                Some(open) => {
                    self.close(open, now)?;
                }
                None => self.tree.end_root(now),
            }
        } else {
            let target = match &open {
                Some(open) if path.is_prefix_of(open) => open,
                _ => &path,
            };
            self.close(target, now)?;
        }

        self.table = None;
        Ok(())
    }

    fn close(&mut self, path: &SectionPath, now: Timestamp) -> Result<Timestamp, TimerError> {
        let end = self.tree.close(path, now)?;
        if let Some(node) = self.tree.get(path) {
            let event = self.event(EventKind::Ended, path, node.label(), node.end());
            self.emit(&event);
        }
        Ok(end)
    }

    fn event(
        &self,
        kind: EventKind,
        path: &SectionPath,
        label: &str,
        timestamp: Option<Timestamp>,
    ) -> SectionEvent {
        SectionEvent {
            kind,
            path: path.clone(),
            label: label.to_string(),
            timestamp,
            local: timestamp.map(|ts| {
                self.clock
                    .local_date(ts)
                    .and_time(self.clock.local_time(ts))
            }),
        }
    }

    fn emit(&mut self, event: &SectionEvent) {
        if self.log_level > 0 {
            self.log.emit(event, self.log_level);
        }
    }
}

/// Logs a failed operation as a diagnostic before handing it back.
fn reported<T>(result: Result<T, TimerError>) -> Result<T, TimerError> {
    if let Err(e) = &result {
        tracing::warn!(error = %e, "timer operation failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{Duration, TimeZone, Utc};
    use insta::assert_snapshot;

    use super::*;
    use crate::clock::ManualClock;

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 29, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn timer() -> (Timer<ManualClock>, ManualClock) {
        let clock = ManualClock::new(t(0));
        (Timer::with_clock(clock.clone()), clock)
    }

    fn node<'a>(timer: &'a Timer<ManualClock>, section: &str) -> &'a crate::SectionNode {
        timer.tree().get(&section.parse().unwrap()).unwrap()
    }

    /// Collects rendered event lines for assertions.
    #[derive(Clone, Default)]
    struct RecordingLog(Rc<RefCell<Vec<String>>>);

    impl EventLog for RecordingLog {
        fn emit(&mut self, event: &SectionEvent, level: u8) {
            self.0.borrow_mut().push(event.render(level));
        }
    }

    #[test]
    fn start_then_end_gives_non_negative_duration() {
        let (mut timer, clock) = timer();
        for section in ["1", "2.1", "3.1.4"] {
            timer.start(section, "x").unwrap();
            clock.advance(Duration::milliseconds(250));
            timer.end(section).unwrap();
        }

        let table = timer.table();
        for section in ["1", "2.1", "3.1.4"] {
            let row = table.get(&section.parse().unwrap()).unwrap();
            assert!(row.raw_time.unwrap() >= 0.0, "{section}");
        }
    }

    #[test]
    fn ending_parent_closes_open_child() {
        let (mut timer, clock) = timer();
        timer.start("2", "Two").unwrap();
        clock.advance(Duration::seconds(1));
        timer.start("2.1", "TwoOne").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("2").unwrap();

        assert_eq!(node(&timer, "2.1").end(), Some(t(2)));
        assert_eq!(node(&timer, "2").end(), Some(t(2)));
        assert_eq!(node(&timer, "2").start(), Some(t(0)));
        assert_eq!(timer.open_section(), None);
    }

    #[test]
    fn starting_nested_section_keeps_parent_open() {
        let (mut timer, _clock) = timer();
        timer.start("2", "Two").unwrap();
        timer.start("2.1", "TwoOne").unwrap();
        assert_eq!(node(&timer, "2").end(), None);
        assert_eq!(timer.open_section().map(ToString::to_string).as_deref(), Some("2.1"));
    }

    #[test]
    fn starting_sibling_auto_closes_open_section() {
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(3));
        timer.start("2", "Two").unwrap();

        let one_end = node(&timer, "1").end().unwrap();
        let two_start = node(&timer, "2").start().unwrap();
        assert!(one_end <= two_start);
        assert_eq!(node(&timer, "2").end(), None);
    }

    #[test]
    fn prefix_match_is_per_component() {
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(1));
        // "12" is not nested in "1", so "1" is closed first.
        timer.start("12", "Twelve").unwrap();
        assert_eq!(node(&timer, "1").end(), Some(t(1)));
    }

    #[test]
    fn no_auto_close_after_explicit_end() {
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("1").unwrap();
        clock.advance(Duration::seconds(5));
        timer.start("2", "Two").unwrap();
        assert_eq!(node(&timer, "1").end(), Some(t(1)));
    }

    #[test]
    fn restart_discards_subtree() {
        let (mut timer, clock) = timer();
        timer.start("2.1", "Start").unwrap();
        timer.start("2.1.1", "Inner").unwrap();
        clock.advance(Duration::seconds(2));
        timer.start("2.1", "Data Cleaning").unwrap();

        let restarted = node(&timer, "2.1");
        assert_eq!(restarted.children().count(), 0);
        assert_eq!(restarted.start(), Some(t(2)));
        assert_eq!(restarted.end(), None);
        assert_eq!(restarted.label(), "Start");
    }

    #[test]
    fn root_start_is_idempotent_and_leaves_open_section() {
        let (mut timer, clock) = timer();
        timer.start("0", DEFAULT_LABEL).unwrap();
        clock.advance(Duration::seconds(1));
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(1));
        timer.start("0", DEFAULT_LABEL).unwrap();

        assert_eq!(timer.tree().root().start(), Some(t(0)));
        assert_eq!(timer.open_section().map(ToString::to_string).as_deref(), Some("1"));
        assert_eq!(node(&timer, "1").end(), None);
    }

    #[test]
    fn any_start_starts_the_whole_run() {
        let (mut timer, clock) = timer();
        clock.advance(Duration::seconds(4));
        timer.start("3.1", "Hypothesis").unwrap();
        assert_eq!(timer.tree().root().start(), Some(t(4)));
        assert!(timer.is_started());
    }

    #[test]
    fn end_root_closes_pending_section() {
        let (mut timer, clock) = timer();
        timer.start("3.1", "Hypothesis").unwrap();
        clock.advance(Duration::seconds(2));
        timer.end("0").unwrap();

        for section in ["0", "3", "3.1"] {
            assert_eq!(node(&timer, section).end(), Some(t(2)), "{section}");
        }
    }

    #[test]
    fn end_root_without_pending_section_sets_root_end() {
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("1").unwrap();
        clock.advance(Duration::seconds(4));
        timer.end("").unwrap();

        assert_eq!(timer.tree().root().end(), Some(t(5)));
        assert_eq!(node(&timer, "1").end(), Some(t(1)));
    }

    #[test]
    fn end_before_start_reports_not_started() {
        let (mut timer, _clock) = timer();
        let err = timer.end("0").unwrap_err();
        assert!(matches!(err, TimerError::NotStarted));
        assert!(!timer.is_started());
    }

    #[test]
    fn end_unknown_section_reports_not_found_and_settles_open_section() {
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(1));
        let before = timer.tree().clone();

        let err = timer.end("9").unwrap_err();
        assert!(matches!(err, TimerError::SectionNotFound { ref section } if section == "9"));
        assert_eq!(timer.tree(), &before);
        assert_eq!(timer.open_section(), None);

        // "1" is no longer pending, so starting "2" leaves it running.
        clock.advance(Duration::seconds(1));
        timer.start("2", "Two").unwrap();
        assert_eq!(node(&timer, "1").end(), None);
        assert_eq!(node(&timer, "2").start(), Some(t(2)));
    }

    #[test]
    fn end_unknown_section_before_any_start() {
        let (mut timer, _clock) = timer();
        let err = timer.end("9").unwrap_err();
        assert!(matches!(err, TimerError::SectionNotFound { .. }));
    }

    #[test]
    fn invalid_sections_are_rejected_without_mutation() {
        let (mut timer, _clock) = timer();
        timer.start("1", "One").unwrap();
        let before = timer.tree().clone();

        for bad in ["2.0", "-3", "x"] {
            let err = timer.start(bad, "bad").unwrap_err();
            assert!(matches!(err, TimerError::InvalidSection { .. }), "{bad}");
        }
        assert_eq!(timer.tree(), &before);
        assert_eq!(timer.open_section().map(ToString::to_string).as_deref(), Some("1"));

        for bad in ["2.0", "-3", "x"] {
            let err = timer.end(bad).unwrap_err();
            assert!(matches!(err, TimerError::InvalidSection { .. }), "{bad}");
        }
        assert_eq!(timer.tree(), &before);
        assert_eq!(timer.open_section(), None);
    }

    #[test]
    fn ending_ancestor_closes_only_the_open_chain() {
        let (mut timer, clock) = timer();
        timer.start("2.1", "a").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("2.1").unwrap();
        timer.start("2.2", "b").unwrap();
        timer.start("2.2.1", "c").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("2").unwrap();

        assert_eq!(node(&timer, "2.2.1").end(), Some(t(2)));
        assert_eq!(node(&timer, "2.2").end(), Some(t(2)));
        assert_eq!(node(&timer, "2").end(), Some(t(2)));
        assert_eq!(node(&timer, "2.1").end(), Some(t(1)));
    }

    #[test]
    fn report_before_start_is_not_started() {
        let (mut timer, _clock) = timer();
        assert!(matches!(timer.report(None, 0), Err(TimerError::NotStarted)));
    }

    #[test]
    fn scenario_two_sections_and_root() {
        let (mut timer, clock) = timer();
        timer.start("0", DEFAULT_LABEL).unwrap();
        clock.advance(Duration::seconds(1));
        timer.start("1", "A").unwrap();
        clock.advance(Duration::seconds(2));
        timer.end("1").unwrap();
        clock.advance(Duration::seconds(1));
        timer.start("2", "B").unwrap();
        clock.advance(Duration::seconds(3));
        timer.end("0").unwrap();

        let view = timer.report(None, 0).unwrap();
        let levels: Vec<usize> = view.rows().iter().map(|row| row.level).collect();
        assert_eq!(levels, [0, 1, 1]);
        assert_snapshot!(view.to_string(), @r"
        Section  Label          Time_Taken
        0        Entire Script  7.0 Secs
        1        A              2.0 Secs
        2        B              3.0 Secs
        ");

        let table = timer.table();
        let root = table.get(&SectionPath::root()).unwrap().raw_time.unwrap();
        let one = table.get(&"1".parse().unwrap()).unwrap().raw_time.unwrap();
        let two = table.get(&"2".parse().unwrap()).unwrap().raw_time.unwrap();
        assert!((root - (one + two + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn chronology_increases_with_start_time() {
        let (mut timer, clock) = timer();
        timer.start("0", DEFAULT_LABEL).unwrap();
        for section in ["3", "1", "2.2", "2.1"] {
            clock.advance(Duration::seconds(1));
            timer.start(section, section).unwrap();
        }
        let table = timer.table();
        let mut rows: Vec<_> = table.rows().iter().filter(|r| r.chronology.is_some()).collect();
        rows.sort_by_key(|r| r.chronology);
        let starts: Vec<f64> = rows.iter().map(|r| r.raw_start.unwrap()).collect();
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn table_is_cached_until_sections_change() {
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        assert_eq!(timer.table().get(&"1".parse().unwrap()).unwrap().time_taken, "Still Running");

        clock.advance(Duration::seconds(1));
        // Unchanged tree: cached rows are served as-is.
        assert_eq!(timer.table().len(), 2);

        timer.end("1").unwrap();
        assert_eq!(timer.table().get(&"1".parse().unwrap()).unwrap().time_taken, "1.0 Sec");
    }

    #[test]
    fn reset_returns_to_not_started() {
        let (mut timer, _clock) = timer();
        timer.start("1", "One").unwrap();
        timer.reset();

        assert!(!timer.is_started());
        assert_eq!(timer.tree(), &SectionTree::new());
        assert_eq!(timer.open_section(), None);
        assert_eq!(timer.table().len(), 1);
        timer.start("1", "Again").unwrap();
        assert_eq!(node(&timer, "1").label(), "Again");
    }

    #[test]
    fn independent_timers_do_not_share_state() {
        let (mut a, _) = timer();
        let (mut b, _) = timer();
        a.start("1", "A").unwrap();
        assert!(a.is_started());
        assert!(!b.is_started());
        b.start("5", "B").unwrap();
        assert!(a.tree().get(&"5".parse().unwrap()).is_none());
    }

    #[test]
    fn events_are_emitted_above_level_zero() {
        let clock = ManualClock::new(t(0));
        let log = RecordingLog::default();
        let mut timer = Timer::with_clock(clock.clone())
            .with_event_log(log.clone())
            .with_log_level(2);

        timer.start("1", "Data Fetching").unwrap();
        clock.advance(Duration::seconds(1));
        timer.start("2", "Augmentation").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("0").unwrap();

        assert_eq!(
            *log.0.borrow(),
            [
                "Started : 1\t Data Fetching\t at 12:00:00",
                "Ended   : 1\t Data Fetching\t at 12:00:01",
                "Started : 2\t Augmentation\t at 12:00:01",
                "Ended   : 2\t Augmentation\t at 12:00:02",
            ]
        );
    }

    #[test]
    fn placeholder_ancestors_log_started_without_time() {
        let clock = ManualClock::new(t(0));
        let log = RecordingLog::default();
        let mut timer = Timer::with_clock(clock)
            .with_event_log(log.clone())
            .with_log_level(2);

        timer.start("3.1.2", "Deep").unwrap();
        timer.start("3.4", "Sibling").unwrap();

        assert_eq!(
            *log.0.borrow(),
            [
                "Started : 3\t -No Label-\t at -",
                "Started : 3.1\t -No Label-\t at -",
                "Started : 3.1.2\t Deep\t at 12:00:00",
                "Ended   : 3.1.2\t Deep\t at 12:00:00",
                "Started : 3.4\t Sibling\t at 12:00:00",
            ]
        );
    }

    #[test]
    fn events_are_silent_at_level_zero() {
        let log = RecordingLog::default();
        let mut timer = Timer::with_clock(ManualClock::new(t(0))).with_event_log(log.clone());
        timer.start("1", "x").unwrap();
        timer.end("1").unwrap();
        assert!(log.0.borrow().is_empty());
    }

    #[test]
    fn save_writes_csv_with_extension() {
        let temp = tempfile::tempdir().unwrap();
        let (mut timer, clock) = timer();
        timer.start("1", "One").unwrap();
        clock.advance(Duration::seconds(1));
        timer.end("0").unwrap();

        let written = timer.save(temp.path().join(DEFAULT_OUTPUT_NAME)).unwrap();
        assert_eq!(written, temp.path().join("Timer_Logs.csv"));
        let csv = std::fs::read_to_string(&written).unwrap();
        assert!(csv.starts_with("Section,Label,Level,Chronology,Time_Taken,"));
        assert_eq!(csv.lines().count(), 3);

        let named = timer.save(temp.path().join("run.txt")).unwrap();
        assert_eq!(named, temp.path().join("run.txt"));
    }

    #[test]
    fn save_to_missing_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let (mut timer, _clock) = timer();
        timer.start("1", "One").unwrap();
        let err = timer.save(temp.path().join("nope").join("out")).unwrap_err();
        assert!(matches!(err, TimerError::Io(_)));
    }
}
