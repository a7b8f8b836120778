//! In-memory record of commits that already received a comment.
//!
//! Entries live for the lifetime of the process. A restart forgets them, so
//! a preview that is still ready after a restart is commented on again.

use std::collections::HashSet;

/// Commit identifiers whose preview comment was delivered
#[derive(Debug, Default)]
pub struct ProcessedSet {
    commits: HashSet<String>,
}

impl ProcessedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, commit: &str) -> bool {
        self.commits.contains(commit)
    }

    /// Record a delivered commit. Call only after the provider accepted the
    /// comment.
    pub fn mark_processed(&mut self, commit: impl Into<String>) {
        self.commits.insert(commit.into());
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}
