//! replay
//!
//! One primitive behind cherry-pick, rebase, and revert: apply the effect
//! of a commit (relative to one of its parents) onto the current tree.
//!
//! All three verbs are a single [`merge3`] invocation with roles selected
//! by [`ReplayKind`], plus a new commit whose only parent is the current
//! `HEAD`, an *application* rather than a merge, even though the engine
//! used is the merge primitive:
//!
//! - cherry-pick / rebase-step: `base = target.parent(0)`, `ours = HEAD`,
//!   `theirs = target`
//! - revert: roles swapped (`base = target`, `ours = HEAD`,
//!   `theirs = target.parent(mainline)`), which applies the inverse diff
//!
//! Multi-commit rebase walks the first-parent range above the merge base,
//! hard-resets to the new base, and replays each commit in order, stopping
//! at the first conflict.

use thiserror::Error;

use crate::core::history::{first_parent_range, merge_base};
use crate::core::store::StoreError;
use crate::core::types::{Oid, Signature};
use crate::merge::{merge3, MergeError, MergeOutcome};
use crate::core::Repository;

/// Errors from replay operations.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// HEAD is unborn; there is nothing to apply onto.
    #[error("cannot replay onto an unborn branch")]
    UnbornHead,

    /// Reverting a merge commit without naming the mainline parent.
    #[error("commit {oid} is a merge: a mainline parent must be specified")]
    MainlineRequired { oid: Oid },

    /// The requested mainline parent does not exist (1-indexed).
    #[error("commit {oid} has no parent {mainline}")]
    InvalidMainline { oid: Oid, mainline: usize },

    /// Reverting a root commit is unsupported.
    #[error("cannot revert root commit {oid}")]
    RootRevert { oid: Oid },

    /// Rebase found no common ancestor and `--root` was not requested.
    #[error("no common ancestor between {upstream} and {head}")]
    NoCommonAncestor { upstream: Oid, head: Oid },

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which verb is driving the replay; selects the merge roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayKind {
    CherryPick,
    RebaseStep,
    /// Revert, with the 1-indexed mainline parent for merge commits.
    Revert { mainline: Option<usize> },
}

/// Result of applying one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The replay committed; HEAD advanced to the new commit.
    Committed(Oid),
    /// The merge step conflicted; the working tree holds marker text and
    /// no commit was created.
    Conflict { paths: Vec<String> },
    /// The target's changes are already contained in HEAD and
    /// `allow_empty` was not set; nothing was committed.
    WouldBeEmpty,
}

/// Apply the effect of `target` onto the current HEAD.
///
/// On success the new commit's only parent is the previous HEAD (linear
/// history) and HEAD advances to it. `allow_empty` permits committing a
/// replay that changes nothing.
pub fn replay(
    repo: &mut Repository,
    target: &Oid,
    kind: ReplayKind,
    author: Signature,
    allow_empty: bool,
) -> Result<ReplayOutcome, ReplayError> {
    let head = repo.head_oid().ok_or(ReplayError::UnbornHead)?;
    let target_commit = repo.store.get_commit(target)?.clone();

    let (base, theirs, message) = match kind {
        ReplayKind::CherryPick | ReplayKind::RebaseStep => (
            target_commit.parent(0).cloned(),
            target.clone(),
            target_commit.message.clone(),
        ),
        ReplayKind::Revert { mainline } => {
            let parent_idx = match (target_commit.parents.len(), mainline) {
                (0, _) => {
                    return Err(ReplayError::RootRevert { oid: target.clone() });
                }
                (1, None) => 0,
                (_, None) => {
                    return Err(ReplayError::MainlineRequired { oid: target.clone() });
                }
                (count, Some(m)) => {
                    if m == 0 || m > count {
                        return Err(ReplayError::InvalidMainline {
                            oid: target.clone(),
                            mainline: m,
                        });
                    }
                    m - 1
                }
            };
            let theirs = target_commit.parents[parent_idx].clone();
            (
                Some(target.clone()),
                theirs,
                format!("Revert \"{}\"", target_commit.summary()),
            )
        }
    };

    let label = match kind {
        ReplayKind::Revert { .. } => format!("parent of {}", target.short(7)),
        _ => target.short(7).to_string(),
    };

    let outcome = merge3(repo, base.as_ref(), &head, &theirs, &label)?;
    if let MergeOutcome::Conflict { paths } = outcome {
        return Ok(ReplayOutcome::Conflict { paths });
    }

    // An empty replay leaves the tree identical to HEAD's.
    let head_tree = repo.store.get_commit(&head)?.tree.clone();
    let merged_tree = repo.index.write_tree(&mut repo.store);
    if merged_tree == head_tree && !allow_empty {
        return Ok(ReplayOutcome::WouldBeEmpty);
    }

    let new_commit = repo.create_commit(message, author, vec![head]);
    repo.advance_head(new_commit.clone());
    Ok(ReplayOutcome::Committed(new_commit))
}

/// Cherry-pick the linear range `(from..to]`, oldest first.
///
/// Stops at the first conflict or empty replay, leaving earlier picks
/// committed.
pub fn cherry_pick_range(
    repo: &mut Repository,
    from: &Oid,
    to: &Oid,
    author: Signature,
    allow_empty: bool,
) -> Result<RangeOutcome, ReplayError> {
    let sequence = first_parent_range(&repo.store, to, Some(from))?;
    replay_sequence(repo, &sequence, ReplayKind::CherryPick, author, allow_empty)
}

/// Outcome of replaying a sequence of commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Every commit replayed; new commit ids, oldest first.
    Completed { new_commits: Vec<Oid> },
    /// Replay stopped at `stopped_at`; everything before it is committed.
    Conflict {
        stopped_at: Oid,
        paths: Vec<String>,
        committed: Vec<Oid>,
    },
    /// Replay stopped because `stopped_at` would commit no changes.
    Empty { stopped_at: Oid, committed: Vec<Oid> },
}

fn replay_sequence(
    repo: &mut Repository,
    sequence: &[Oid],
    kind: ReplayKind,
    author: Signature,
    allow_empty: bool,
) -> Result<RangeOutcome, ReplayError> {
    let mut committed = Vec::new();
    for target in sequence {
        match replay(repo, target, kind, author.clone(), allow_empty)? {
            ReplayOutcome::Committed(oid) => committed.push(oid),
            ReplayOutcome::Conflict { paths } => {
                return Ok(RangeOutcome::Conflict {
                    stopped_at: target.clone(),
                    paths,
                    committed,
                });
            }
            ReplayOutcome::WouldBeEmpty => {
                return Ok(RangeOutcome::Empty {
                    stopped_at: target.clone(),
                    committed,
                });
            }
        }
    }
    Ok(RangeOutcome::Completed {
        new_commits: committed,
    })
}

/// Options for a multi-commit rebase.
#[derive(Debug, Clone, Default)]
pub struct RebaseOptions {
    /// Replay onto this commit instead of `upstream`.
    pub onto: Option<Oid>,
    /// Replay the entire history down to the root.
    pub root: bool,
    /// Permit empty replays instead of skipping them.
    pub allow_empty: bool,
}

/// Outcome of a multi-commit rebase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// All commits replayed; HEAD is at `new_tip`.
    Completed { new_tip: Oid, replayed: usize },
    /// Replay stopped at `stopped_at` with conflicts; commits before it
    /// are already applied on the new base.
    Conflict {
        stopped_at: Oid,
        paths: Vec<String>,
    },
}

/// Rebase the current branch onto `upstream` (or `onto` when given).
///
/// Collects the first-parent range `(merge-base..HEAD]` (or the whole
/// chain with `root`), hard-resets the workspace to the new base, then
/// replays each commit via the cherry-pick primitive. Empty replays are
/// skipped unless `allow_empty` is set.
pub fn rebase(
    repo: &mut Repository,
    upstream: &Oid,
    author: Signature,
    options: RebaseOptions,
) -> Result<RebaseOutcome, ReplayError> {
    let head = repo.head_oid().ok_or(ReplayError::UnbornHead)?;

    let stop = if options.root {
        None
    } else {
        match merge_base(&repo.store, upstream, &head)? {
            Some(base) => Some(base),
            None => {
                return Err(ReplayError::NoCommonAncestor {
                    upstream: upstream.clone(),
                    head: head.clone(),
                });
            }
        }
    };
    let sequence = first_parent_range(&repo.store, &head, stop.as_ref())?;
    let new_base = options.onto.clone().unwrap_or_else(|| upstream.clone());

    // Hard reset onto the new base before replaying.
    repo.checkout_paths_of(&new_base)?;
    repo.advance_head(new_base.clone());

    let mut replayed = 0usize;
    for target in &sequence {
        match replay(repo, target, ReplayKind::RebaseStep, author.clone(), false)? {
            ReplayOutcome::Committed(_) => replayed += 1,
            ReplayOutcome::WouldBeEmpty => {
                if options.allow_empty {
                    // Re-run permitting the empty commit.
                    match replay(repo, target, ReplayKind::RebaseStep, author.clone(), true)? {
                        ReplayOutcome::Committed(_) => replayed += 1,
                        _ => {}
                    }
                }
                // Otherwise skip: the change is already contained upstream.
            }
            ReplayOutcome::Conflict { paths } => {
                return Ok(RebaseOutcome::Conflict {
                    stopped_at: target.clone(),
                    paths,
                });
            }
        }
    }

    let new_tip = repo.head_oid().ok_or(ReplayError::UnbornHead)?;
    Ok(RebaseOutcome::Completed { new_tip, replayed })
}
