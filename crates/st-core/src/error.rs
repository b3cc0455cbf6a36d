//! Error type shared by the section tree, the timer engine and report output.

use thiserror::Error;

/// Errors reported by timer operations.
///
/// None of these leave the engine in a broken state: a failed call performs
/// no mutation and the timer stays usable afterwards.
#[derive(Debug, Error)]
pub enum TimerError {
    /// A section path component was not a positive integer.
    #[error("invalid section {section:?}: section numbers start at 1")]
    InvalidSection { section: String },

    /// The section (or one of its ancestors) was never started.
    #[error("no such section: {section}")]
    SectionNotFound { section: String },

    /// The timer has not been started yet.
    #[error("timer has not been started yet")]
    NotStarted,

    /// Failed to write the report as CSV.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to serialize the report as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to create the output file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimerError {
    pub(crate) fn invalid(section: impl Into<String>) -> Self {
        Self::InvalidSection {
            section: section.into(),
        }
    }

    pub(crate) fn not_found(section: impl ToString) -> Self {
        Self::SectionNotFound {
            section: section.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_section() {
        assert_eq!(
            TimerError::invalid("2.0").to_string(),
            "invalid section \"2.0\": section numbers start at 1"
        );
        assert_eq!(
            TimerError::not_found("9").to_string(),
            "no such section: 9"
        );
        assert_eq!(
            TimerError::NotStarted.to_string(),
            "timer has not been started yet"
        );
    }
}
