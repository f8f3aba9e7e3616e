//! stash
//!
//! Uncommitted work encoded as a linked chain of commits behind one
//! mutable pointer.
//!
//! Each stash entry is a commit whose first parent is the HEAD at stash
//! time and whose second parent, when present, is the previous stash
//! entry, a singly linked list terminated by an entry with one parent.
//! Restoring an entry is a [`merge3`] call with the stash commit as
//! "theirs" and its first parent as the base.
//!
//! Staged and unstaged changes are flattened into one snapshot at push
//! time; pop restores everything as unstaged working-tree changes.

use thiserror::Error;

use crate::core::store::StoreError;
use crate::core::types::{Oid, RefName, Signature};
use crate::core::worktree::PathMap;
use crate::core::Repository;
use crate::merge::{merge3, MergeError, MergeOutcome};

/// Errors from stash operations.
#[derive(Debug, Error)]
pub enum StashError {
    /// Stashing requires a commit to hang the entry on.
    #[error("cannot stash on an unborn branch")]
    UnbornHead,

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a stash push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashPushOutcome {
    /// Work was stashed and the workspace reset to HEAD.
    Stashed(Oid),
    /// The workspace was clean; reported, not raised.
    NothingToStash,
}

/// Result of a stash pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashPopOutcome {
    /// The entry applied cleanly as unstaged working-tree changes and was
    /// dropped from the chain.
    Applied { dropped: Oid },
    /// No stash entries exist; reported, not raised.
    NoStashEntries,
    /// The restore conflicted; markers are in the working tree and the
    /// entry remains on the chain.
    Conflict { paths: Vec<String> },
}

/// One entry in a stash listing, index 0 = most recent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    pub index: usize,
    pub oid: Oid,
    pub message: String,
}

impl std::fmt::Display for StashEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stash@{{{}}}: {}", self.index, self.message)
    }
}

/// Stash all pending changes and reset the workspace to HEAD.
///
/// "Nothing to stash" means both the worktree and the index match HEAD;
/// fully staged changes still count as pending work.
pub fn push(repo: &mut Repository, author: Signature) -> Result<StashPushOutcome, StashError> {
    let head = repo.head_oid().ok_or(StashError::UnbornHead)?;
    if repo.is_clean()? {
        return Ok(StashPushOutcome::NothingToStash);
    }

    // Flatten index and working tree into one snapshot.
    let snapshot: PathMap = repo.worktree.snapshot();
    repo.index.replace_all(snapshot);

    let branch = repo
        .store
        .head_branch_ref()
        .and_then(|r| r.branch_name())
        .map(|b| b.as_str().to_string())
        .unwrap_or_else(|| "(detached)".to_string());
    let head_summary = repo.store.get_commit(&head)?.summary().to_string();
    let message = format!("WIP on {branch}: {} {head_summary}", head.short(7));

    let mut parents = vec![head.clone()];
    if let Ok(previous) = repo.store.resolve_ref(&RefName::stash()) {
        parents.push(previous);
    }

    let stash_commit = repo.create_commit(message, author, parents);
    repo.store.set_ref(RefName::stash(), stash_commit.clone());

    // Hard reset the workspace to HEAD.
    repo.checkout_paths_of(&head)?;
    Ok(StashPushOutcome::Stashed(stash_commit))
}

/// Restore the most recent stash entry.
///
/// On a clean restore the changes land in the working tree only (the index
/// is reset to HEAD's tree) and the pointer advances down the chain. On
/// conflict the pointer is untouched; the stash is not dropped.
pub fn pop(repo: &mut Repository, label: &str) -> Result<StashPopOutcome, StashError> {
    let Ok(stash_oid) = repo.store.resolve_ref(&RefName::stash()) else {
        return Ok(StashPopOutcome::NoStashEntries);
    };
    let head = repo.head_oid().ok_or(StashError::UnbornHead)?;
    let stash_commit = repo.store.get_commit(&stash_oid)?.clone();
    let base = stash_commit.parent(0).cloned();

    match merge3(repo, base.as_ref(), &head, &stash_oid, label)? {
        MergeOutcome::Conflict { paths } => Ok(StashPopOutcome::Conflict { paths }),
        MergeOutcome::Clean => {
            // Un-stage: the restored changes stay in the working tree.
            let head_tree = repo.store.get_commit(&head)?.tree.clone();
            repo.index.read_tree(&repo.store, &head_tree)?;

            match stash_commit.parent(1) {
                Some(previous) => {
                    let previous = previous.clone();
                    repo.store.set_ref(RefName::stash(), previous);
                }
                None => {
                    repo.store.delete_ref(&RefName::stash());
                }
            }
            Ok(StashPopOutcome::Applied { dropped: stash_oid })
        }
    }
}

/// Walk the stash chain, most recent first.
pub fn list(repo: &Repository) -> Result<Vec<StashEntry>, StashError> {
    let mut out = Vec::new();
    let mut current = repo.store.resolve_ref(&RefName::stash()).ok();
    while let Some(oid) = current {
        let commit = repo.store.get_commit(&oid)?;
        out.push(StashEntry {
            index: out.len(),
            oid: oid.clone(),
            message: commit.message.clone(),
        });
        current = commit.parent(1).cloned();
    }
    Ok(out)
}
