//! session::remotes
//!
//! Process-wide shared-remote registry and pull-request ledger.
//!
//! This models a central server: named repositories visible to every
//! session, plus the proposals between two refs of one of them. It is an
//! explicit service object handed to each session by `Arc`, never ambient
//! global state.
//!
//! # Locking
//!
//! One mutex guards the whole registry. Sessions always take it *after*
//! their own session lock, which fixes the lock order and rules out
//! deadlock between a session and the shared table.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::store::StoreError;
use crate::core::types::{BranchName, Oid, RefName, Signature};
use crate::core::Repository;

/// Errors from the shared-remote registry.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote not found: {name}")]
    RemoteNotFound { name: String },

    #[error("remote already exists: {name}")]
    RemoteExists { name: String },

    #[error("branch not found: {branch}")]
    BranchNotFound { branch: BranchName },

    #[error("pull request not found: #{id}")]
    PullRequestNotFound { id: u64 },

    #[error("pull request #{id} is {state}, not open")]
    PullRequestNotOpen { id: u64, state: PullRequestState },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PullRequestState::Open => "open",
            PullRequestState::Merged => "merged",
            PullRequestState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// One proposal between two refs of a shared repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub id: u64,
    pub title: String,
    pub head: BranchName,
    pub base: BranchName,
    pub author: String,
    pub state: PullRequestState,
    /// The merge commit produced when the request was accepted.
    pub merge_commit: Option<Oid>,
}

struct RemoteEntry {
    repo: Repository,
    pull_requests: Vec<PullRequest>,
}

impl Default for RemoteEntry {
    fn default() -> Self {
        // A fresh remote is born on an unborn main branch, so clones pick
        // main as the default branch rather than the first name in ref
        // order.
        Self {
            repo: Repository::new(),
            pull_requests: Vec::new(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    remotes: HashMap<String, RemoteEntry>,
    next_pr_id: u64,
}

/// The process-wide table of shared remotes.
#[derive(Default)]
pub struct SharedRemotes {
    state: Mutex<RegistryState>,
}

impl SharedRemotes {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        // A panic while holding the lock poisons it; the registry data is
        // still structurally sound, so recover the guard.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create an empty shared repository under `name`.
    pub fn create(&self, name: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        if state.remotes.contains_key(name) {
            return Err(RemoteError::RemoteExists { name: name.into() });
        }
        state.remotes.insert(name.to_string(), RemoteEntry::default());
        Ok(())
    }

    /// Whether a remote with this name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.lock().remotes.contains_key(name)
    }

    /// Run `f` with exclusive access to the named remote repository.
    ///
    /// The registry lock is held for the duration of `f`, covering the
    /// whole object-graph walk of a fetch or push.
    pub fn with_repo<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Repository) -> R,
    ) -> Result<R, RemoteError> {
        let mut state = self.lock();
        let entry = state
            .remotes
            .get_mut(name)
            .ok_or_else(|| RemoteError::RemoteNotFound { name: name.into() })?;
        Ok(f(&mut entry.repo))
    }

    /// Open a pull request from `head` into `base` on the named remote.
    ///
    /// Both branches must exist on the remote at open time.
    pub fn open_pull_request(
        &self,
        remote: &str,
        title: impl Into<String>,
        head: BranchName,
        base: BranchName,
        author: impl Into<String>,
    ) -> Result<u64, RemoteError> {
        let mut state = self.lock();
        let id = state.next_pr_id + 1;
        let entry = state
            .remotes
            .get_mut(remote)
            .ok_or_else(|| RemoteError::RemoteNotFound {
                name: remote.into(),
            })?;
        for branch in [&head, &base] {
            if entry
                .repo
                .store
                .get_ref(&RefName::for_branch(branch))
                .is_none()
            {
                return Err(RemoteError::BranchNotFound {
                    branch: branch.clone(),
                });
            }
        }
        entry.pull_requests.push(PullRequest {
            id,
            title: title.into(),
            head,
            base,
            author: author.into(),
            state: PullRequestState::Open,
            merge_commit: None,
        });
        state.next_pr_id = id;
        Ok(id)
    }

    /// Pull requests on a remote, in creation order.
    pub fn pull_requests(&self, remote: &str) -> Result<Vec<PullRequest>, RemoteError> {
        let state = self.lock();
        let entry = state
            .remotes
            .get(remote)
            .ok_or_else(|| RemoteError::RemoteNotFound {
                name: remote.into(),
            })?;
        Ok(entry.pull_requests.clone())
    }

    /// Close a pull request without merging.
    pub fn close_pull_request(&self, remote: &str, id: u64) -> Result<(), RemoteError> {
        let mut state = self.lock();
        let entry = state
            .remotes
            .get_mut(remote)
            .ok_or_else(|| RemoteError::RemoteNotFound {
                name: remote.into(),
            })?;
        let pr = entry
            .pull_requests
            .iter_mut()
            .find(|pr| pr.id == id)
            .ok_or(RemoteError::PullRequestNotFound { id })?;
        if pr.state != PullRequestState::Open {
            return Err(RemoteError::PullRequestNotOpen {
                id,
                state: pr.state,
            });
        }
        pr.state = PullRequestState::Closed;
        Ok(())
    }

    /// Accept a pull request.
    ///
    /// Builds a merge commit whose tree is the head ref's tree and whose
    /// parents are {base commit, head commit}, advances the base ref, and
    /// marks the request merged. Fails with "branch not found" if either
    /// named ref has since disappeared.
    pub fn merge_pull_request(
        &self,
        remote: &str,
        id: u64,
        merger: Signature,
    ) -> Result<Oid, RemoteError> {
        let mut state = self.lock();
        let entry = state
            .remotes
            .get_mut(remote)
            .ok_or_else(|| RemoteError::RemoteNotFound {
                name: remote.into(),
            })?;

        let pr_idx = entry
            .pull_requests
            .iter()
            .position(|pr| pr.id == id)
            .ok_or(RemoteError::PullRequestNotFound { id })?;
        let pr = &entry.pull_requests[pr_idx];
        if pr.state != PullRequestState::Open {
            return Err(RemoteError::PullRequestNotOpen {
                id,
                state: pr.state,
            });
        }
        let (head, base, title) = (pr.head.clone(), pr.base.clone(), pr.title.clone());

        let repo = &mut entry.repo;
        let head_ref = RefName::for_branch(&head);
        let base_ref = RefName::for_branch(&base);
        let head_oid = repo
            .store
            .resolve_ref(&head_ref)
            .map_err(|_| RemoteError::BranchNotFound {
                branch: head.clone(),
            })?;
        let base_oid = repo
            .store
            .resolve_ref(&base_ref)
            .map_err(|_| RemoteError::BranchNotFound {
                branch: base.clone(),
            })?;

        let head_tree = repo.store.get_commit(&head_oid)?.tree.clone();
        let merge_commit = repo.store.put(crate::core::object::Object::Commit(
            crate::core::object::Commit {
                parents: vec![base_oid, head_oid],
                tree: head_tree,
                author: merger.clone(),
                committer: merger,
                message: format!("Merge pull request #{id}: {title}"),
            },
        ));
        repo.store.set_ref(base_ref, merge_commit.clone());

        let pr = &mut entry.pull_requests[pr_idx];
        pr.state = PullRequestState::Merged;
        pr.merge_commit = Some(merge_commit.clone());
        Ok(merge_commit)
    }
}
