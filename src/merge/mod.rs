//! merge
//!
//! Three-way content reconciliation between a base, "ours", and "theirs"
//! commit. This engine backs merge, cherry-pick, rebase, revert, and stash
//! restore; every conflict any verb can produce is produced here.
//!
//! # Algorithm
//!
//! For each path touched by base→ours or base→theirs, classify by the 2×2
//! matrix of {unchanged, changed} per side:
//!
//! - unchanged/unchanged: no-op
//! - changed on one side only: take that side (content or deletion)
//! - changed identically on both sides: take either, no conflict
//! - changed differently on both sides: line-level [`diff3`] merge; an
//!   overlapping hunk leaves markers in the working tree and records the
//!   path as conflicted
//! - deleted on one side, modified on the other: conflict (the surviving
//!   content is kept in the working tree)
//! - deleted on both sides: no-op
//!
//! A clean merge leaves both the working tree and index at the merged
//! result. A conflicted merge stages the non-conflicted changes, writes
//! marker text for the conflicted paths, and returns
//! [`MergeOutcome::Conflict`], a value rather than an error: the caller must not
//! create a commit, but the workspace is left in a resolvable state.

pub mod diff3;

use thiserror::Error;

use crate::core::store::StoreError;
use crate::core::types::Oid;
use crate::core::worktree::{FileState, PathMap};
use crate::core::Repository;

pub use diff3::{diff3, Diff3Result, Hunk, OURS_MARKER_LABEL};

/// Errors from the merge engine.
///
/// Conflicts are not errors; only store-level failures surface here.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Working tree and index reflect the merged result; the caller may
    /// commit.
    Clean,
    /// One or more paths could not be auto-resolved. The working tree
    /// contains marker text for them; non-conflicted changes are staged.
    Conflict {
        /// Conflicted paths, in path order.
        paths: Vec<String>,
    },
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, MergeOutcome::Clean)
    }
}

/// Merge `theirs` into `ours` relative to `base`, materializing the result
/// into the repository's working tree and index.
///
/// With `base = None` (no common ancestor) every path present on a side is
/// treated as added by that side; the matrix rows for additions apply.
///
/// `theirs_label` names the right-hand side in conflict markers (branch
/// name, commit id, or `"stash"`).
pub fn merge3(
    repo: &mut Repository,
    base: Option<&Oid>,
    ours: &Oid,
    theirs: &Oid,
    theirs_label: &str,
) -> Result<MergeOutcome, MergeError> {
    let base_paths = match base {
        Some(oid) => repo.commit_paths(oid)?,
        None => PathMap::new(),
    };
    let ours_paths = repo.commit_paths(ours)?;
    let theirs_paths = repo.commit_paths(theirs)?;

    let outcome = merge_path_maps(&base_paths, &ours_paths, &theirs_paths, theirs_label);
    repo.worktree.replace_all(outcome.worktree);
    repo.index.replace_all(outcome.index);

    if outcome.conflicts.is_empty() {
        Ok(MergeOutcome::Clean)
    } else {
        Ok(MergeOutcome::Conflict {
            paths: outcome.conflicts,
        })
    }
}

/// Merge over flat path maps, for callers that hold snapshots rather than
/// commits (stash restore merges the flattened stash snapshot directly).
pub fn merge_snapshots(
    repo: &mut Repository,
    base: &PathMap,
    ours: &PathMap,
    theirs: &PathMap,
    theirs_label: &str,
) -> MergeOutcome {
    let outcome = merge_path_maps(base, ours, theirs, theirs_label);
    repo.worktree.replace_all(outcome.worktree);
    repo.index.replace_all(outcome.index);
    if outcome.conflicts.is_empty() {
        MergeOutcome::Clean
    } else {
        MergeOutcome::Conflict {
            paths: outcome.conflicts,
        }
    }
}

struct PathMergeOutcome {
    worktree: PathMap,
    index: PathMap,
    conflicts: Vec<String>,
}

fn merge_path_maps(
    base: &PathMap,
    ours: &PathMap,
    theirs: &PathMap,
    theirs_label: &str,
) -> PathMergeOutcome {
    // Untouched paths carry over from ours; only touched paths are visited.
    let mut worktree = ours.clone();
    let mut index = ours.clone();
    let mut conflicts = Vec::new();

    let mut touched: std::collections::BTreeSet<&String> = std::collections::BTreeSet::new();
    for path in base.keys().chain(ours.keys()).chain(theirs.keys()) {
        let b = base.get(path);
        let o = ours.get(path);
        let t = theirs.get(path);
        if o != b || t != b {
            touched.insert(path);
        }
    }

    for path in touched {
        let b = base.get(path);
        let o = ours.get(path);
        let t = theirs.get(path);

        let ours_changed = o != b;
        let theirs_changed = t != b;

        match (ours_changed, theirs_changed) {
            (false, false) => {}
            (true, false) => {} // ours already in place
            (false, true) => {
                apply(&mut worktree, path, t);
                apply(&mut index, path, t);
            }
            (true, true) => {
                if o == t {
                    // Same resulting content (including both deleted).
                    continue;
                }
                match (o, t) {
                    (Some(ours_state), Some(theirs_state)) => {
                        match text_merge(b, ours_state, theirs_state, theirs_label) {
                            TextMerge::Clean(state) => {
                                apply(&mut worktree, path, Some(&state));
                                apply(&mut index, path, Some(&state));
                            }
                            TextMerge::Conflict(marked) => {
                                apply(&mut worktree, path, Some(&marked));
                                // Index keeps ours for conflicted paths.
                                conflicts.push(path.clone());
                            }
                        }
                    }
                    (Some(surviving), None) | (None, Some(surviving)) => {
                        // Deletion vs. modification: keep the surviving
                        // content in the working tree, leave ours staged.
                        apply(&mut worktree, path, Some(surviving));
                        conflicts.push(path.clone());
                    }
                    (None, None) => unreachable!("o == t handled above"),
                }
            }
        }
    }

    conflicts.sort();
    PathMergeOutcome {
        worktree,
        index,
        conflicts,
    }
}

enum TextMerge {
    Clean(FileState),
    Conflict(FileState),
}

fn text_merge(
    base: Option<&FileState>,
    ours: &FileState,
    theirs: &FileState,
    theirs_label: &str,
) -> TextMerge {
    let (Some(ours_text), Some(theirs_text)) = (as_text(ours), as_text(theirs)) else {
        // Binary content cannot be line-merged; keep ours and conflict.
        return TextMerge::Conflict(ours.clone());
    };
    let base_text = base.and_then(as_text).unwrap_or("");

    let result = diff3(base_text, ours_text, theirs_text);
    // Mode changes ride along: a side that changed the mode wins when the
    // other side left it alone.
    let base_mode = base.map(|s| s.mode).unwrap_or(ours.mode);
    let mode = if ours.mode != base_mode {
        ours.mode
    } else {
        theirs.mode
    };

    if result.is_clean() {
        TextMerge::Clean(FileState {
            content: result.render(theirs_label).into_bytes(),
            mode,
        })
    } else {
        TextMerge::Conflict(FileState {
            content: result.render(theirs_label).into_bytes(),
            mode,
        })
    }
}

fn as_text(state: &FileState) -> Option<&str> {
    std::str::from_utf8(&state.content).ok()
}

fn apply(map: &mut PathMap, path: &str, state: Option<&FileState>) {
    match state {
        Some(s) => {
            map.insert(path.to_string(), s.clone());
        }
        None => {
            map.remove(path);
        }
    }
}
