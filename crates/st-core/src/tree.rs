//! The section tree.
//!
//! Every started section is a node keyed by its [`SectionPath`]. Nodes own
//! their children outright, so the tree is a plain ownership hierarchy with a
//! single root standing for the whole run.
//!
//! # Timing rules
//!
//! - Starting a path creates any missing ancestors as unlabelled
//!   placeholders with no start time.
//! - Starting a path that already exists reuses the node: its start time is
//!   reset and its previous children are discarded.
//! - Closing a path stamps the same end time on the node and on every
//!   ancestor up to the root. An ancestor's end therefore reflects the most
//!   recent close below it.

use std::collections::BTreeMap;

use crate::clock::Timestamp;
use crate::error::TimerError;
use crate::path::SectionPath;

/// Label of the root node.
pub const ROOT_LABEL: &str = "Entire Script";

/// Label of ancestors created implicitly by starting a deeper section.
pub const PLACEHOLDER_LABEL: &str = "-No Label-";

/// One timed section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    path: SectionPath,
    label: String,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    children: BTreeMap<u32, SectionNode>,
}

impl SectionNode {
    fn root() -> Self {
        Self::placeholder(SectionPath::root(), ROOT_LABEL)
    }

    fn placeholder(path: SectionPath, label: &str) -> Self {
        Self {
            path,
            label: label.to_string(),
            start: None,
            end: None,
            children: BTreeMap::new(),
        }
    }

    fn started(path: SectionPath, label: &str, now: Timestamp) -> Self {
        Self {
            start: Some(now),
            ..Self::placeholder(path, label)
        }
    }

    /// Reuses this node for a fresh run of the same section.
    fn restart(&mut self, now: Timestamp) {
        self.start = Some(now);
        self.end = None;
        self.children.clear();
    }

    /// Last component of the path; unique among siblings only.
    pub fn id(&self) -> u32 {
        self.path.id()
    }

    pub const fn path(&self) -> &SectionPath {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub const fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub const fn end(&self) -> Option<Timestamp> {
        self.end
    }

    /// Children in ascending id order.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.values()
    }

    pub fn child(&self, id: u32) -> Option<&Self> {
        self.children.get(&id)
    }
}

/// A flattened view of one node, produced by [`SectionTree::rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatRow<'a> {
    pub path: &'a SectionPath,
    pub label: &'a str,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    /// Number of path components; the root has depth 0.
    pub depth: usize,
}

/// Rooted tree of sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTree {
    root: SectionNode,
}

impl Default for SectionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionTree {
    /// Creates a tree holding only the unstarted root.
    pub fn new() -> Self {
        Self {
            root: SectionNode::root(),
        }
    }

    pub const fn root(&self) -> &SectionNode {
        &self.root
    }

    /// Discards every section and reallocates a fresh root.
    pub fn reset(&mut self) {
        self.root = SectionNode::root();
    }

    /// Looks up a node by path. The root path returns the root.
    pub fn get(&self, path: &SectionPath) -> Option<&SectionNode> {
        path.components()
            .iter()
            .try_fold(&self.root, |node, id| node.children.get(id))
    }

    /// Sets the root's start time unless it already has one.
    pub fn start_root(&mut self, now: Timestamp) {
        self.root.start.get_or_insert(now);
    }

    /// Sets the root's end time directly.
    pub fn end_root(&mut self, now: Timestamp) {
        self.root.end = Some(now);
    }

    /// Starts the section at `path`, creating placeholder ancestors as needed.
    ///
    /// An existing node is reused: it keeps its label, takes the new start
    /// time, and its end time and children are cleared. The root itself cannot be
    /// inserted; use [`SectionTree::start_root`].
    pub fn insert(
        &mut self,
        path: &SectionPath,
        label: &str,
        now: Timestamp,
    ) -> Result<&SectionNode, TimerError> {
        let Some((&last, ancestors)) = path.components().split_last() else {
            return Err(TimerError::invalid(path.to_string()));
        };

        let mut node = &mut self.root;
        for &id in ancestors {
            let child_path = node.path.child(id);
            node = node.children.entry(id).or_insert_with(|| {
                tracing::debug!(section = %child_path, "creating placeholder section");
                SectionNode::placeholder(child_path, PLACEHOLDER_LABEL)
            });
        }

        let child_path = node.path.child(last);
        let target = node
            .children
            .entry(last)
            .and_modify(|existing| existing.restart(now))
            .or_insert_with(|| SectionNode::started(child_path, label, now));
        Ok(target)
    }

    /// Closes the section at `path` and stamps `now` on all its ancestors.
    ///
    /// Fails without touching the tree if any node along the path is missing.
    pub fn close(&mut self, path: &SectionPath, now: Timestamp) -> Result<Timestamp, TimerError> {
        if path.is_root() || self.get(path).is_none() {
            return Err(TimerError::not_found(path));
        }

        let mut node = &mut self.root;
        node.end = Some(now);
        for id in path.components() {
            node = node
                .children
                .get_mut(id)
                .ok_or_else(|| TimerError::not_found(path))?;
            node.end = Some(now);
        }
        Ok(now)
    }

    /// Walks the tree depth-first, parents before children, children in
    /// ascending id order. Each call starts a fresh traversal.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            stack: vec![&self.root],
        }
    }
}

/// Pre-order iterator over a [`SectionTree`].
#[derive(Debug)]
pub struct Rows<'a> {
    stack: Vec<&'a SectionNode>,
}

impl<'a> Iterator for Rows<'a> {
    type Item = FlatRow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.values().rev());
        Some(FlatRow {
            path: &node.path,
            label: &node.label,
            start: node.start,
            end: node.end,
            depth: node.path.depth(),
        })
    }
}
