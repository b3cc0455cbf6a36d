//! Dotted section paths such as `2.1.3`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TimerError;

/// String form of the root path.
pub const ROOT_SECTION: &str = "0";

/// Hierarchical address of a section.
///
/// A path is a sequence of positive integers. The empty sequence is the
/// implicit root ("Entire Script"), written `0`. Paths order
/// lexicographically by component, so `2 < 2.1 < 2.2 < 3`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionPath(Vec<u32>);

impl SectionPath {
    /// The root path.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Number of components; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last component, or 0 for the root.
    pub fn id(&self) -> u32 {
        self.0.last().copied().unwrap_or(0)
    }

    /// Returns the path one level down.
    #[must_use]
    pub fn child(&self, id: u32) -> Self {
        let mut components = self.0.clone();
        components.push(id);
        Self(components)
    }

    /// Returns the enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, ancestors)| Self(ancestors.to_vec()))
    }

    /// True when `self` is an ancestor of `other` or equal to it.
    ///
    /// Matching is per component: `1` is a prefix of `1.2` but not of `12`.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((first, rest)) = self.0.split_first() else {
            return f.write_str(ROOT_SECTION);
        };
        write!(f, "{first}")?;
        for id in rest {
            write!(f, ".{id}")?;
        }
        Ok(())
    }
}

impl FromStr for SectionPath {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == ROOT_SECTION {
            return Ok(Self::root());
        }

        let components = trimmed
            .split('.')
            .map(|part| match part.parse::<u32>() {
                Ok(id) if id > 0 => Ok(id),
                _ => Err(TimerError::invalid(trimmed)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(components))
    }
}

impl TryFrom<String> for SectionPath {
    type Error = TimerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SectionPath> for String {
    fn from(path: SectionPath) -> Self {
        path.to_string()
    }
}
