//! session::reflog
//!
//! Append-only log of HEAD movements, used for recovery and grading.
//!
//! Each entry records the previous HEAD (if any), an action, a free-form
//! description, and a timestamp. Listing is newest first; the line format
//! is `"<action>: <description>"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::Oid;

/// One reflog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflogEntry {
    /// HEAD before the operation, when it existed.
    pub previous: Option<Oid>,
    /// The verb that moved HEAD (`commit`, `merge`, `rebase`, ...).
    pub action: String,
    /// Human-readable description of what happened.
    pub description: String,
    pub when: DateTime<Utc>,
}

impl std::fmt::Display for ReflogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.action, self.description)
    }
}

/// The append-only reflog for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflog {
    entries: Vec<ReflogEntry>,
}

impl Reflog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current time.
    pub fn record(
        &mut self,
        previous: Option<Oid>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.entries.push(ReflogEntry {
            previous,
            action: action.into(),
            description: description.into(),
            when: Utc::now(),
        });
    }

    /// Entries newest first.
    pub fn entries(&self) -> impl Iterator<Item = &ReflogEntry> {
        self.entries.iter().rev()
    }

    /// Rendered lines, newest first.
    pub fn lines(&self) -> Vec<String> {
        self.entries().map(|e| e.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_is_newest_first() {
        let mut reflog = Reflog::new();
        reflog.record(None, "commit", "initial");
        reflog.record(None, "checkout", "moving to feature");
        assert_eq!(
            reflog.lines(),
            vec![
                "checkout: moving to feature".to_string(),
                "commit: initial".to_string(),
            ]
        );
        assert_eq!(reflog.len(), 2);
    }

    #[test]
    fn entry_records_previous_head() {
        let mut reflog = Reflog::new();
        let oid = Oid::hash_bytes(b"x");
        reflog.record(Some(oid.clone()), "reset", "hard reset");
        let entry = reflog.entries().next().unwrap();
        assert_eq!(entry.previous, Some(oid));
    }
}
