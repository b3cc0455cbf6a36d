//! Time sources for the timer.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};

/// A point in time recorded against a section.
pub type Timestamp = DateTime<Utc>;

/// Supplies the current time and its calendar form.
///
/// The timer only ever compares timestamps it obtained from the same clock,
/// so any totally ordered source works.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;

    /// Calendar date of `ts` in the clock's local timezone.
    fn local_date(&self, ts: Timestamp) -> NaiveDate {
        ts.with_timezone(&Local).date_naive()
    }

    /// Wall-clock time of `ts` in the clock's local timezone.
    fn local_time(&self, ts: Timestamp) -> NaiveTime {
        ts.with_timezone(&Local).time()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn local_date(&self, ts: Timestamp) -> NaiveDate {
        (**self).local_date(ts)
    }

    fn local_time(&self, ts: Timestamp) -> NaiveTime {
        (**self).local_time(ts)
    }
}

/// The system clock, formatted in the host's local timezone.
///
/// Reads the wall clock once at construction and then advances by a
/// monotonic [`Instant`], so later readings never go backwards even if the
/// system time is adjusted mid-run.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor: Timestamp,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: Utc::now(),
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Duration::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.anchor.checked_add_signed(elapsed))
            .unwrap_or_else(Utc::now)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same current time, so a caller can keep a handle and
/// advance a clock that has been moved into a timer. Local time is UTC.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Moves the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Timestamp) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }

    fn local_date(&self, ts: Timestamp) -> NaiveDate {
        ts.date_naive()
    }

    fn local_time(&self, ts: Timestamp) -> NaiveTime {
        ts.time()
    }
}
