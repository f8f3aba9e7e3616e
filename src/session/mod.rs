//! session
//!
//! Per-user sessions, the workspace registry, and the command verbs.
//!
//! A session owns a map of named repositories, a current-directory cursor
//! selecting one of them, a reflog, and an ORIG_HEAD slot. Every mutating
//! verb holds the session's mutex for its entire duration, so one user's
//! history-changing operations are serialized while unrelated sessions run
//! in parallel. Verbs that touch a shared remote additionally take the
//! [`remotes::SharedRemotes`] lock, always after the session lock.
//!
//! # Modules
//!
//! - [`reflog`] - Append-only HEAD-movement log
//! - [`remotes`] - Process-wide shared-remote registry and pull requests

pub mod reflog;
pub mod remotes;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use thiserror::Error;
use uuid::Uuid;

use crate::core::history::{first_parent_log, is_fast_forward, merge_base};
use crate::core::store::StoreError;
use crate::core::types::{BranchName, Oid, RefName, Signature, TypeError};
use crate::core::worktree::FileState;
use crate::core::Repository;
use crate::merge::{merge3, MergeError, MergeOutcome};
use crate::replay::{
    cherry_pick_range, rebase, replay, RangeOutcome, RebaseOptions, RebaseOutcome, ReplayError,
    ReplayKind, ReplayOutcome,
};
use crate::replicate::{
    clone_repository, fetch, push, FetchOptions, ReplicateError, TransferReport,
};
use crate::resolve::{resolve, ResolveError};
use crate::stash::{self, StashError, StashPopOutcome, StashPushOutcome};
use reflog::Reflog;
use remotes::{PullRequest, RemoteError, SharedRemotes};

/// Errors from session verbs.
///
/// Conflicts and the expected no-op cases (nothing to stash, no stash
/// entries, already up to date) are values in the verb outcomes, not
/// variants here.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No repository is selected by the current-directory cursor.
    #[error("not inside a repository")]
    NoCurrentRepository,

    #[error("repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("repository already exists: {name}")]
    RepositoryExists { name: String },

    #[error("branch not found: {branch}")]
    BranchNotFound { branch: BranchName },

    #[error("branch already exists: {branch}")]
    BranchExists { branch: BranchName },

    /// Deleting a branch whose commits are not merged anywhere, without
    /// force.
    #[error("branch {branch} is not fully merged")]
    UnmergedBranch { branch: BranchName },

    /// Deleting the branch HEAD is on.
    #[error("cannot delete the current branch {branch}")]
    CurrentBranch { branch: BranchName },

    /// Remote-tracking branches cannot be deleted via branch-delete.
    #[error("cannot delete remote-tracking branch {name}")]
    RemoteTrackingDelete { name: String },

    /// The operation needs a clean working tree and index.
    #[error("working tree has uncommitted changes")]
    DirtyWorktree,

    /// The index matches HEAD; there is nothing to commit.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The current branch has no commits yet.
    #[error("current branch has no commits yet")]
    UnbornHead,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Replicate(#[from] ReplicateError),

    #[error(transparent)]
    Stash(#[from] StashError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Outcome of the merge verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeVerbOutcome {
    /// Theirs is already contained in HEAD.
    AlreadyUpToDate,
    /// HEAD was an ancestor of theirs; the ref moved with no new commit.
    FastForward(Oid),
    /// A merge commit was created.
    Merged(Oid),
    /// Clean squash merge: the combined changes are staged, no commit.
    Squashed,
    /// The merge conflicted; markers are in the working tree.
    Conflict { paths: Vec<String> },
}

/// One line of `log` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub oid: Oid,
    pub summary: String,
    pub author: String,
}

/// Summary of worktree/index/HEAD differences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Current branch, or `None` when HEAD is detached.
    pub branch: Option<BranchName>,
    /// Paths where the index differs from HEAD's tree.
    pub staged: Vec<String>,
    /// Paths where the working tree differs from the index.
    pub unstaged: Vec<String>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty()
    }
}

struct SessionState {
    repos: HashMap<String, Repository>,
    cwd: Option<String>,
    reflog: Reflog,
    author_name: String,
    author_email: String,
}

impl SessionState {
    fn current(&mut self) -> Result<&mut Repository, SessionError> {
        let name = self.cwd.clone().ok_or(SessionError::NoCurrentRepository)?;
        self.repos
            .get_mut(&name)
            .ok_or(SessionError::RepositoryNotFound { name })
    }

    fn author(&self) -> Signature {
        Signature::now(self.author_name.clone(), self.author_email.clone())
    }
}

/// One user's workspace: repositories, cursor, reflog, identity.
pub struct Session {
    id: Uuid,
    remotes: Arc<SharedRemotes>,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(remotes: Arc<SharedRemotes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remotes,
            state: Mutex::new(SessionState {
                repos: HashMap::new(),
                cwd: None,
                reflog: Reflog::new(),
                author_name: "student".into(),
                author_email: "student@example.com".into(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The shared-remote registry this session was created with.
    pub fn remotes(&self) -> &Arc<SharedRemotes> {
        &self.remotes
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Recover from poisoning: session state stays structurally valid
        // even if a verb panicked mid-flight.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the identity stamped on commits made through this session.
    pub fn set_author(&self, name: impl Into<String>, email: impl Into<String>) {
        let mut state = self.lock();
        state.author_name = name.into();
        state.author_email = email.into();
    }

    // ---- workspace registry ------------------------------------------

    /// Create an empty repository. The cursor moves to it if unset.
    pub fn create_repo(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.repos.contains_key(name) {
            return Err(SessionError::RepositoryExists { name: name.into() });
        }
        state.repos.insert(name.to_string(), Repository::new());
        if state.cwd.is_none() {
            state.cwd = Some(name.to_string());
        }
        Ok(())
    }

    /// Move the current-directory cursor to a repository.
    pub fn enter_repo(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.lock();
        if !state.repos.contains_key(name) {
            return Err(SessionError::RepositoryNotFound { name: name.into() });
        }
        state.cwd = Some(name.to_string());
        Ok(())
    }

    /// The cursor's current repository name.
    pub fn pwd(&self) -> Option<String> {
        self.lock().cwd.clone()
    }

    /// Names of this session's repositories, sorted.
    pub fn repo_names(&self) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state.repos.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a closure against the current repository (test and grading
    /// hook; verbs below are the normal surface).
    pub fn with_current_repo<R>(
        &self,
        f: impl FnOnce(&mut Repository) -> R,
    ) -> Result<R, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        Ok(f(repo))
    }

    // ---- files and staging -------------------------------------------

    /// Write a file in the current repository's working tree.
    pub fn write_file(&self, path: &str, content: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        repo.worktree.write(path, FileState::regular(content.into()));
        Ok(())
    }

    /// Read a file from the working tree.
    pub fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        Ok(repo.worktree.read(path).map(|s| s.content.clone()))
    }

    /// Remove a file from the working tree.
    pub fn remove_file(&self, path: &str) -> Result<bool, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        Ok(repo.worktree.remove(path))
    }

    /// Stage one path as it exists in the working tree (or its deletion).
    pub fn stage(&self, path: &str) -> Result<(), SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        match repo.worktree.read(path) {
            Some(file_state) => {
                let file_state = file_state.clone();
                repo.index.stage(path, file_state);
            }
            None => {
                repo.index.unstage(path);
            }
        }
        Ok(())
    }

    /// Stage every pending change: the index becomes the working tree.
    pub fn stage_all(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        let snapshot = repo.worktree.snapshot();
        repo.index.replace_all(snapshot);
        Ok(())
    }

    // ---- read-only verbs ---------------------------------------------

    /// Resolve a revision expression in the current repository.
    pub fn resolve(&self, expr: &str) -> Result<Oid, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        Ok(resolve(&repo.store, expr)?)
    }

    /// Worktree/index/HEAD difference summary.
    pub fn status(&self) -> Result<StatusReport, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        let head_paths = match repo.head_oid() {
            Some(oid) => repo.commit_paths(&oid)?,
            None => Default::default(),
        };
        let index = repo.index.snapshot();
        let worktree = repo.worktree.snapshot();

        let mut staged = Vec::new();
        for path in head_paths.keys().chain(index.keys()) {
            if head_paths.get(path) != index.get(path) && !staged.contains(path) {
                staged.push(path.clone());
            }
        }
        let mut unstaged = Vec::new();
        for path in index.keys().chain(worktree.keys()) {
            if index.get(path) != worktree.get(path) && !unstaged.contains(path) {
                unstaged.push(path.clone());
            }
        }
        staged.sort();
        unstaged.sort();

        Ok(StatusReport {
            branch: repo.store.head_branch_ref().and_then(|r| r.branch_name()),
            staged,
            unstaged,
        })
    }

    /// First-parent log from HEAD, newest first.
    pub fn log(&self, limit: usize) -> Result<Vec<LogEntry>, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        let Some(head) = repo.head_oid() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for oid in first_parent_log(&repo.store, &head, limit)? {
            let commit = repo.store.get_commit(&oid)?;
            out.push(LogEntry {
                summary: commit.summary().to_string(),
                author: commit.author.name.clone(),
                oid,
            });
        }
        Ok(out)
    }

    /// Reflog lines, newest first.
    pub fn reflog_lines(&self) -> Vec<String> {
        self.lock().reflog.lines()
    }

    /// The ORIG_HEAD snapshot of the current repository, if set.
    pub fn orig_head(&self) -> Result<Option<Oid>, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        Ok(repo.store.resolve_ref(&RefName::orig_head()).ok())
    }

    // ---- commit and branch verbs -------------------------------------

    /// Commit the index. The first commit on an unborn branch has no
    /// parents.
    pub fn commit(&self, message: &str) -> Result<Oid, SessionError> {
        let mut state = self.lock();
        let author = state.author();
        let repo = state.current()?;
        let head = repo.head_oid();
        let head_paths = match &head {
            Some(oid) => repo.commit_paths(oid)?,
            None => Default::default(),
        };
        if head_paths == repo.index.snapshot() {
            return Err(SessionError::NothingToCommit);
        }
        let parents: Vec<Oid> = head.clone().into_iter().collect();
        let oid = repo.create_commit(message, author, parents);
        repo.advance_head(oid.clone());
        state
            .reflog
            .record(head, "commit", first_line(message).to_string());
        Ok(oid)
    }

    /// Create a branch at an expression (default HEAD) without switching.
    pub fn branch_create(&self, name: &str, at: Option<&str>) -> Result<Oid, SessionError> {
        let branch = BranchName::new(name)?;
        let mut state = self.lock();
        let repo = state.current()?;
        let branch_ref = RefName::for_branch(&branch);
        if repo.store.get_ref(&branch_ref).is_some() {
            return Err(SessionError::BranchExists { branch });
        }
        let target = match at {
            Some(expr) => resolve(&repo.store, expr)?,
            None => repo.head_oid().ok_or(SessionError::UnbornHead)?,
        };
        repo.store.set_ref(branch_ref, target.clone());
        Ok(target)
    }

    /// Local branches and their tips, sorted by name.
    pub fn branch_list(&self) -> Result<Vec<(BranchName, Oid)>, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        let mut out = Vec::new();
        for (name, _) in repo.store.list_refs("refs/heads/") {
            if let Some(branch) = name.branch_name() {
                let oid = repo.store.resolve_ref(&name)?;
                out.push((branch, oid));
            }
        }
        Ok(out)
    }

    /// Delete a branch.
    ///
    /// Refuses the current branch, refuses remote-tracking names, and
    /// refuses an unmerged branch without `force`.
    pub fn branch_delete(&self, name: &str, force: bool) -> Result<(), SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;

        let branch = BranchName::new(name)?;
        let branch_ref = RefName::for_branch(&branch);
        if repo.store.get_ref(&branch_ref).is_none() {
            // Remote-tracking deletion is deliberately unsupported.
            let tracking = RefName::new(format!("refs/remotes/{name}"));
            if let Ok(tracking) = tracking {
                if repo.store.get_ref(&tracking).is_some() {
                    return Err(SessionError::RemoteTrackingDelete { name: name.into() });
                }
            }
            return Err(SessionError::BranchNotFound { branch });
        }

        if repo.store.head_branch_ref() == Some(branch_ref.clone()) {
            return Err(SessionError::CurrentBranch { branch });
        }

        if !force {
            let tip = repo.store.resolve_ref(&branch_ref)?;
            let merged = match repo.head_oid() {
                Some(head) => is_fast_forward(&repo.store, &tip, &head)?,
                None => false,
            };
            if !merged {
                return Err(SessionError::UnmergedBranch { branch });
            }
        }

        repo.store.delete_ref(&branch_ref);
        Ok(())
    }

    /// Check out a revision.
    ///
    /// A bare branch name attaches HEAD to that branch; anything else
    /// detaches at the resolved commit. Requires a clean workspace.
    pub fn checkout(&self, expr: &str) -> Result<Oid, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        if !repo.is_clean()? {
            return Err(SessionError::DirtyWorktree);
        }
        let previous = repo.head_oid();

        let branch_ref = BranchName::new(expr)
            .ok()
            .map(|b| RefName::for_branch(&b))
            .filter(|r| repo.store.get_ref(r).is_some());
        let target = match &branch_ref {
            Some(r) => repo.store.resolve_ref(r)?,
            None => resolve(&repo.store, expr)?,
        };

        repo.checkout_paths_of(&target)?;
        match branch_ref {
            Some(r) => repo.store.set_symbolic_ref(RefName::head(), r),
            None => repo.store.set_ref(RefName::head(), target.clone()),
        }
        state
            .reflog
            .record(previous, "checkout", format!("moving to {expr}"));
        Ok(target)
    }

    /// Create a branch at HEAD and switch to it.
    pub fn checkout_new_branch(&self, name: &str) -> Result<(), SessionError> {
        let branch = BranchName::new(name)?;
        let mut state = self.lock();
        let repo = state.current()?;
        let branch_ref = RefName::for_branch(&branch);
        if repo.store.get_ref(&branch_ref).is_some() {
            return Err(SessionError::BranchExists { branch });
        }
        let previous = repo.head_oid();
        if let Some(head) = &previous {
            repo.store.set_ref(branch_ref.clone(), head.clone());
        }
        // On an unborn branch this just re-points HEAD; the new branch is
        // born with the first commit.
        repo.store.set_symbolic_ref(RefName::head(), branch_ref);
        state
            .reflog
            .record(previous, "checkout", format!("creating branch {name}"));
        Ok(())
    }

    /// Hard reset: move the current branch and rewrite worktree and index.
    ///
    /// Snapshots ORIG_HEAD first.
    pub fn reset_hard(&self, expr: &str) -> Result<Oid, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        let previous = repo.head_oid();
        let target = resolve(&repo.store, expr)?;

        if let Some(prev) = &previous {
            repo.store.set_ref(RefName::orig_head(), prev.clone());
        }
        repo.advance_head(target.clone());
        repo.checkout_paths_of(&target)?;
        state
            .reflog
            .record(previous, "reset", format!("moving to {expr}"));
        Ok(target)
    }

    // ---- merge and replay verbs --------------------------------------

    /// Merge a revision into HEAD.
    ///
    /// Fast-forwards when possible (unless squashing); otherwise runs the
    /// three-way engine against the merge base and commits on success.
    pub fn merge(&self, expr: &str, squash: bool) -> Result<MergeVerbOutcome, SessionError> {
        let mut state = self.lock();
        self.merge_locked(&mut state, expr, squash)
    }

    fn merge_locked(
        &self,
        state: &mut SessionState,
        expr: &str,
        squash: bool,
    ) -> Result<MergeVerbOutcome, SessionError> {
        let author = state.author();
        let repo = state.current()?;
        if !repo.is_clean()? {
            return Err(SessionError::DirtyWorktree);
        }
        let head = repo.head_oid().ok_or(SessionError::UnbornHead)?;
        let theirs = resolve(&repo.store, expr)?;

        if is_fast_forward(&repo.store, &theirs, &head)? {
            return Ok(MergeVerbOutcome::AlreadyUpToDate);
        }
        if !squash && is_fast_forward(&repo.store, &head, &theirs)? {
            repo.store.set_ref(RefName::orig_head(), head.clone());
            repo.advance_head(theirs.clone());
            repo.checkout_paths_of(&theirs)?;
            state.reflog.record(
                Some(head),
                "merge",
                format!("fast-forward to {expr}"),
            );
            return Ok(MergeVerbOutcome::FastForward(theirs));
        }

        let base = merge_base(&repo.store, &head, &theirs)?;
        repo.store.set_ref(RefName::orig_head(), head.clone());
        match merge3(repo, base.as_ref(), &head, &theirs, expr)? {
            MergeOutcome::Conflict { paths } => Ok(MergeVerbOutcome::Conflict { paths }),
            MergeOutcome::Clean => {
                if squash {
                    // Combined changes stay staged; no commit, no merge
                    // parent.
                    return Ok(MergeVerbOutcome::Squashed);
                }
                let branch = repo
                    .store
                    .head_branch_ref()
                    .and_then(|r| r.branch_name())
                    .map(|b| b.as_str().to_string())
                    .unwrap_or_else(|| "HEAD".into());
                let message = format!("Merge {expr} into {branch}");
                let oid = repo.create_commit(message.as_str(), author, vec![head.clone(), theirs]);
                repo.advance_head(oid.clone());
                state.reflog.record(Some(head), "merge", message);
                Ok(MergeVerbOutcome::Merged(oid))
            }
        }
    }

    /// Cherry-pick a single revision onto HEAD.
    pub fn cherry_pick(&self, expr: &str, allow_empty: bool) -> Result<ReplayOutcome, SessionError> {
        let mut state = self.lock();
        let author = state.author();
        let repo = state.current()?;
        if !repo.is_clean()? {
            return Err(SessionError::DirtyWorktree);
        }
        let previous = repo.head_oid();
        let target = resolve(&repo.store, expr)?;
        let outcome = replay(repo, &target, ReplayKind::CherryPick, author, allow_empty)?;
        if matches!(outcome, ReplayOutcome::Committed(_)) {
            state.reflog.record(
                previous,
                "cherry-pick",
                format!("applied {}", target.short(7)),
            );
        }
        Ok(outcome)
    }

    /// Cherry-pick the range `(from..to]`, oldest first.
    pub fn cherry_pick_span(
        &self,
        from: &str,
        to: &str,
        allow_empty: bool,
    ) -> Result<RangeOutcome, SessionError> {
        let mut state = self.lock();
        let author = state.author();
        let repo = state.current()?;
        if !repo.is_clean()? {
            return Err(SessionError::DirtyWorktree);
        }
        let previous = repo.head_oid();
        let from = resolve(&repo.store, from)?;
        let to = resolve(&repo.store, to)?;
        let outcome = cherry_pick_range(repo, &from, &to, author, allow_empty)?;
        if let RangeOutcome::Completed { new_commits } = &outcome {
            state.reflog.record(
                previous,
                "cherry-pick",
                format!("applied {} commits", new_commits.len()),
            );
        }
        Ok(outcome)
    }

    /// Revert a revision on top of HEAD.
    ///
    /// `mainline` (1-indexed) is required when reverting a merge commit.
    pub fn revert(
        &self,
        expr: &str,
        mainline: Option<usize>,
    ) -> Result<ReplayOutcome, SessionError> {
        let mut state = self.lock();
        let author = state.author();
        let repo = state.current()?;
        if !repo.is_clean()? {
            return Err(SessionError::DirtyWorktree);
        }
        let previous = repo.head_oid();
        let target = resolve(&repo.store, expr)?;
        let outcome = replay(repo, &target, ReplayKind::Revert { mainline }, author, false)?;
        if matches!(outcome, ReplayOutcome::Committed(_)) {
            state.reflog.record(
                previous,
                "revert",
                format!("reverted {}", target.short(7)),
            );
        }
        Ok(outcome)
    }

    /// Rebase the current branch onto an upstream revision.
    ///
    /// Snapshots ORIG_HEAD before rewriting.
    pub fn rebase_onto(
        &self,
        upstream: &str,
        onto: Option<&str>,
        root: bool,
    ) -> Result<RebaseOutcome, SessionError> {
        let mut state = self.lock();
        let author = state.author();
        let repo = state.current()?;
        if !repo.is_clean()? {
            return Err(SessionError::DirtyWorktree);
        }
        let previous = repo.head_oid();
        let upstream_oid = resolve(&repo.store, upstream)?;
        let onto_oid = onto.map(|expr| resolve(&repo.store, expr)).transpose()?;

        if let Some(prev) = &previous {
            repo.store.set_ref(RefName::orig_head(), prev.clone());
        }
        let outcome = rebase(
            repo,
            &upstream_oid,
            author,
            RebaseOptions {
                onto: onto_oid,
                root,
                allow_empty: false,
            },
        )?;
        if let RebaseOutcome::Completed { replayed, .. } = &outcome {
            state.reflog.record(
                previous,
                "rebase",
                format!("replayed {replayed} commits onto {upstream}"),
            );
        }
        Ok(outcome)
    }

    // ---- stash verbs -------------------------------------------------

    /// Stash pending changes and reset the workspace to HEAD.
    pub fn stash_push(&self) -> Result<StashPushOutcome, SessionError> {
        let mut state = self.lock();
        let author = state.author();
        let repo = state.current()?;
        let previous = repo.head_oid();
        let outcome = stash::push(repo, author)?;
        if matches!(outcome, StashPushOutcome::Stashed(_)) {
            state
                .reflog
                .record(previous, "stash", "pushed working state".to_string());
        }
        Ok(outcome)
    }

    /// Restore the most recent stash entry.
    pub fn stash_pop(&self) -> Result<StashPopOutcome, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        let previous = repo.head_oid();
        let outcome = stash::pop(repo, "stash")?;
        if matches!(outcome, StashPopOutcome::Applied { .. }) {
            state
                .reflog
                .record(previous, "stash", "popped most recent entry".to_string());
        }
        Ok(outcome)
    }

    /// List stash entries, newest first.
    pub fn stash_list(&self) -> Result<Vec<stash::StashEntry>, SessionError> {
        let mut state = self.lock();
        let repo = state.current()?;
        Ok(stash::list(repo)?)
    }

    // ---- remote verbs ------------------------------------------------

    /// Fetch from a shared remote into the current repository.
    pub fn fetch(
        &self,
        remote_name: &str,
        options: &FetchOptions,
    ) -> Result<TransferReport, SessionError> {
        let mut state = self.lock();
        self.fetch_locked(&mut state, remote_name, options)
    }

    fn fetch_locked(
        &self,
        state: &mut SessionState,
        remote_name: &str,
        options: &FetchOptions,
    ) -> Result<TransferReport, SessionError> {
        let repo = state.current()?;
        let report = self
            .remotes
            .with_repo(remote_name, |remote| fetch(repo, remote, remote_name, options))??;
        Ok(report)
    }

    /// Push a local branch to a shared remote.
    pub fn push(
        &self,
        remote_name: &str,
        branch: &str,
        force: bool,
    ) -> Result<TransferReport, SessionError> {
        let branch = BranchName::new(branch)?;
        let mut state = self.lock();
        let repo = state.current()?;
        let report = self
            .remotes
            .with_repo(remote_name, |remote| {
                push(repo, remote, remote_name, &branch, force)
            })??;
        Ok(report)
    }

    /// Clone a shared remote into a new session repository and move the
    /// cursor to it.
    pub fn clone_remote(&self, remote_name: &str, as_name: &str) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.repos.contains_key(as_name) {
            return Err(SessionError::RepositoryExists {
                name: as_name.into(),
            });
        }
        let (repo, _report) = self
            .remotes
            .with_repo(remote_name, |remote| clone_repository(remote, remote_name))??;
        state.repos.insert(as_name.to_string(), repo);
        state.cwd = Some(as_name.to_string());
        Ok(())
    }

    /// Pull: fetch the current branch from a remote, then merge its
    /// tracking ref.
    ///
    /// Both halves run under one session lock acquisition, so no other
    /// verb can move the cursor or HEAD between the fetch and the merge.
    pub fn pull(&self, remote_name: &str) -> Result<MergeVerbOutcome, SessionError> {
        let mut state = self.lock();
        let branch = state
            .current()?
            .store
            .head_branch_ref()
            .and_then(|r| r.branch_name())
            .ok_or(SessionError::UnbornHead)?;
        self.fetch_locked(
            &mut state,
            remote_name,
            &FetchOptions {
                branch: Some(branch.clone()),
                ..Default::default()
            },
        )?;
        self.merge_locked(&mut state, &format!("{remote_name}/{branch}"), false)
    }

    // ---- pull requests -----------------------------------------------

    /// Open a pull request on a shared remote.
    pub fn open_pull_request(
        &self,
        remote_name: &str,
        title: &str,
        head: &str,
        base: &str,
    ) -> Result<u64, SessionError> {
        let author = self.lock().author_name.clone();
        let id = self.remotes.open_pull_request(
            remote_name,
            title,
            BranchName::new(head)?,
            BranchName::new(base)?,
            author,
        )?;
        Ok(id)
    }

    /// Accept a pull request, producing a merge commit on the remote.
    pub fn merge_pull_request(&self, remote_name: &str, id: u64) -> Result<Oid, SessionError> {
        let merger = self.lock().author();
        Ok(self.remotes.merge_pull_request(remote_name, id, merger)?)
    }

    /// Close a pull request without merging it.
    pub fn close_pull_request(&self, remote_name: &str, id: u64) -> Result<(), SessionError> {
        Ok(self.remotes.close_pull_request(remote_name, id)?)
    }

    /// Pull requests on a remote, in creation order.
    pub fn pull_requests(&self, remote_name: &str) -> Result<Vec<PullRequest>, SessionError> {
        Ok(self.remotes.pull_requests(remote_name)?)
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

/// Process-wide registry of sessions plus the shared-remote service.
///
/// Sessions are created on demand and destroyed when the user's activity
/// ends.
pub struct SessionRegistry {
    remotes: Arc<SharedRemotes>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            remotes: Arc::new(SharedRemotes::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The shared-remote service handle.
    pub fn remotes(&self) -> &Arc<SharedRemotes> {
        &self.remotes
    }

    /// Get or create the session for a user.
    pub fn session(&self, user: &str) -> Arc<Session> {
        if let Some(session) = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user)
        {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            sessions
                .entry(user.to_string())
                .or_insert_with(|| Arc::new(Session::new(Arc::clone(&self.remotes)))),
        )
    }

    /// Drop a user's session and all its repositories.
    pub fn end_session(&self, user: &str) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user);
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_repo() -> (SessionRegistry, Arc<Session>) {
        let registry = SessionRegistry::new();
        let session = registry.session("ada");
        session.create_repo("work").unwrap();
        (registry, session)
    }

    #[test]
    fn sessions_are_created_on_demand_and_destroyed() {
        let registry = SessionRegistry::new();
        let a = registry.session("ada");
        let same = registry.session("ada");
        assert_eq!(a.id(), same.id());
        let b = registry.session("bob");
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.session_count(), 2);
        registry.end_session("ada");
        assert_eq!(registry.session_count(), 1);
        // A new session under the same user is fresh.
        let fresh = registry.session("ada");
        assert_ne!(fresh.id(), a.id());
    }

    #[test]
    fn cursor_selects_the_repository() {
        let (_registry, session) = session_with_repo();
        assert_eq!(session.pwd(), Some("work".to_string()));
        session.create_repo("other").unwrap();
        session.enter_repo("other").unwrap();
        assert_eq!(session.pwd(), Some("other".to_string()));
        assert_eq!(session.repo_names(), vec!["other", "work"]);
        assert!(matches!(
            session.enter_repo("missing"),
            Err(SessionError::RepositoryNotFound { .. })
        ));
        assert!(matches!(
            session.create_repo("work"),
            Err(SessionError::RepositoryExists { .. })
        ));
    }

    #[test]
    fn commit_and_log_and_status() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "hello\n").unwrap();
        let status = session.status().unwrap();
        assert_eq!(status.unstaged, vec!["a.txt".to_string()]);

        session.stage_all().unwrap();
        let status = session.status().unwrap();
        assert_eq!(status.staged, vec!["a.txt".to_string()]);
        assert!(status.unstaged.is_empty());

        let oid = session.commit("initial").unwrap();
        assert!(session.status().unwrap().is_clean());
        assert_eq!(session.resolve("HEAD").unwrap(), oid);

        let log = session.log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].summary, "initial");
        assert!(matches!(
            session.commit("empty"),
            Err(SessionError::NothingToCommit)
        ));
        assert_eq!(session.reflog_lines(), vec!["commit: initial".to_string()]);
    }

    #[test]
    fn branch_create_checkout_delete() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        session.commit("one").unwrap();

        session.checkout_new_branch("feature").unwrap();
        session.write_file("f.txt", "f\n").unwrap();
        session.stage_all().unwrap();
        let feature_tip = session.commit("feature work").unwrap();

        session.checkout("main").unwrap();
        assert!(session.read_file("f.txt").unwrap().is_none());

        // feature is unmerged: delete requires force.
        assert!(matches!(
            session.branch_delete("feature", false),
            Err(SessionError::UnmergedBranch { .. })
        ));
        session.branch_delete("feature", true).unwrap();
        assert!(session
            .branch_list()
            .unwrap()
            .iter()
            .all(|(b, _)| b.as_str() != "feature"));
        let _ = feature_tip;
    }

    #[test]
    fn deleting_current_branch_is_rejected() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        session.commit("one").unwrap();
        assert!(matches!(
            session.branch_delete("main", true),
            Err(SessionError::CurrentBranch { .. })
        ));
    }

    #[test]
    fn deleting_remote_tracking_branch_is_rejected() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        let tip = session.commit("one").unwrap();
        session
            .with_current_repo(|repo| {
                repo.store.set_ref(
                    RefName::new("refs/remotes/origin/main").unwrap(),
                    tip.clone(),
                );
            })
            .unwrap();
        assert!(matches!(
            session.branch_delete("origin/main", true),
            Err(SessionError::RemoteTrackingDelete { .. })
        ));
    }

    #[test]
    fn reset_hard_records_orig_head() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        let first = session.commit("one").unwrap();
        session.write_file("a.txt", "2\n").unwrap();
        session.stage_all().unwrap();
        let second = session.commit("two").unwrap();

        session.reset_hard("HEAD~1").unwrap();
        assert_eq!(session.resolve("HEAD").unwrap(), first);
        assert_eq!(session.orig_head().unwrap(), Some(second));
        assert_eq!(
            session.read_file("a.txt").unwrap().unwrap(),
            b"1\n".to_vec()
        );
    }

    #[test]
    fn checkout_requires_clean_worktree() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        session.commit("one").unwrap();
        session.write_file("a.txt", "dirty\n").unwrap();
        assert!(matches!(
            session.checkout("main"),
            Err(SessionError::DirtyWorktree)
        ));
    }

    #[test]
    fn fast_forward_merge_moves_ref_without_commit() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        let base = session.commit("base").unwrap();

        session.checkout_new_branch("feature").unwrap();
        session.write_file("b.txt", "2\n").unwrap();
        session.stage_all().unwrap();
        let tip = session.commit("ahead").unwrap();

        session.checkout("main").unwrap();
        let outcome = session.merge("feature", false).unwrap();
        assert_eq!(outcome, MergeVerbOutcome::FastForward(tip.clone()));
        assert_eq!(session.resolve("main").unwrap(), tip);
        // No merge commit: HEAD is exactly the feature tip.
        assert_eq!(session.log(10).unwrap().len(), 2);
        let _ = base;
    }

    #[test]
    fn already_up_to_date_merge() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        session.commit("base").unwrap();
        session.branch_create("old", Some("HEAD")).unwrap();
        session.write_file("a.txt", "2\n").unwrap();
        session.stage_all().unwrap();
        session.commit("newer").unwrap();
        assert_eq!(
            session.merge("old", false).unwrap(),
            MergeVerbOutcome::AlreadyUpToDate
        );
    }

    #[test]
    fn squash_merge_stages_without_committing() {
        let (_registry, session) = session_with_repo();
        session.write_file("a.txt", "1\n").unwrap();
        session.stage_all().unwrap();
        session.commit("base").unwrap();

        session.checkout_new_branch("feature").unwrap();
        session.write_file("b.txt", "2\n").unwrap();
        session.stage_all().unwrap();
        session.commit("feature work").unwrap();

        session.checkout("main").unwrap();
        // Diverge main so no fast-forward is possible.
        session.write_file("c.txt", "3\n").unwrap();
        session.stage_all().unwrap();
        session.commit("mainline work").unwrap();

        let outcome = session.merge("feature", true).unwrap();
        assert_eq!(outcome, MergeVerbOutcome::Squashed);
        let status = session.status().unwrap();
        assert_eq!(status.staged, vec!["b.txt".to_string()]);
        // Committing the squash produces a single-parent commit.
        let oid = session.commit("squashed feature").unwrap();
        let parents = session
            .with_current_repo(|repo| repo.store.get_commit(&oid).unwrap().parents.clone())
            .unwrap();
        assert_eq!(parents.len(), 1);
    }
}
