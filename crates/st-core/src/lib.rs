//! Hierarchical section timer.
//!
//! This crate contains the fundamental types and logic for:
//! - Section paths: dotted addresses like `2.1` naming nested sections
//! - The section tree: start/close bookkeeping with end-time propagation
//! - The timer engine: the open-section state machine callers drive
//! - Reports: flattened, ranked and formatted rows, rendered as text or CSV

mod clock;
mod error;
pub mod event;
mod path;
pub mod report;
mod timer;
pub mod tree;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use error::TimerError;
pub use event::{EventKind, EventLog, SectionEvent, TracingEventLog, WriterEventLog};
pub use path::{ROOT_SECTION, SectionPath};
pub use report::{Column, ReportRow, ReportTable, ReportView, format_duration};
pub use timer::{DEFAULT_LABEL, DEFAULT_OUTPUT_NAME, Timer};
pub use tree::{SectionNode, SectionTree};
