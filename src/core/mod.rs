//! core
//!
//! Domain types and the repository primitive everything else builds on.
//!
//! # Modules
//!
//! - [`types`] - Validated newtypes (`Oid`, `BranchName`, `RefName`)
//! - [`object`] - Immutable commit/tree/blob records and content addressing
//! - [`store`] - In-memory object store and reference table
//! - [`worktree`] - Virtual working tree and index snapshot
//! - [`history`] - Commit-graph traversal (ancestry, merge base, log)

pub mod history;
pub mod object;
pub mod store;
pub mod types;
pub mod worktree;

use object::{Commit, Object};
use store::{ObjectStore, StoreError};
use types::{BranchName, Oid, RefName, Signature};
use worktree::{flatten_tree, Index, PathMap, Worktree};

/// One named workspace: objects, refs, index, and working tree.
///
/// A freshly created repository is on an unborn `main` branch: `HEAD` is
/// symbolic to `refs/heads/main`, which does not exist until the first
/// commit.
#[derive(Debug, Default)]
pub struct Repository {
    pub store: ObjectStore,
    pub worktree: Worktree,
    pub index: Index,
}

impl Repository {
    /// Create an empty repository on an unborn `main` branch.
    pub fn new() -> Self {
        let mut repo = Self {
            store: ObjectStore::new(),
            worktree: Worktree::new(),
            index: Index::new(),
        };
        let main = BranchName::new("main").expect("static branch name is valid");
        repo.store
            .set_symbolic_ref(RefName::head(), RefName::for_branch(&main));
        repo
    }

    /// The commit `HEAD` resolves to, or `None` on an unborn branch.
    pub fn head_oid(&self) -> Option<Oid> {
        self.store.resolve_ref(&RefName::head()).ok()
    }

    /// Flatten a commit's tree into a path map.
    pub fn commit_paths(&self, commit: &Oid) -> Result<PathMap, StoreError> {
        let tree = self.store.get_commit(commit)?.tree.clone();
        flatten_tree(&self.store, &tree)
    }

    /// Snapshot the index into a tree and store a commit on top of `parents`.
    ///
    /// This is the single commit-creation path; merge, replay, stash and the
    /// plain commit verb all end here.
    pub fn create_commit(
        &mut self,
        message: impl Into<String>,
        author: Signature,
        parents: Vec<Oid>,
    ) -> Oid {
        let tree = self.index.write_tree(&mut self.store);
        self.store.put(Object::Commit(Commit {
            parents,
            tree,
            author: author.clone(),
            committer: author,
            message: message.into(),
        }))
    }

    /// Move the current branch (or detached `HEAD`) to `oid`.
    ///
    /// On a branch, the branch ref moves and `HEAD` stays symbolic; when
    /// detached, `HEAD` itself moves.
    pub fn advance_head(&mut self, oid: Oid) {
        match self.store.head_branch_ref() {
            Some(branch_ref) => self.store.set_ref(branch_ref, oid),
            None => self.store.set_ref(RefName::head(), oid),
        }
    }

    /// Materialize a commit's tree into both the working tree and index.
    ///
    /// Does not move `HEAD`; callers decide how the ref should change.
    pub fn checkout_paths_of(&mut self, commit: &Oid) -> Result<(), StoreError> {
        let paths = self.commit_paths(commit)?;
        self.worktree.replace_all(paths.clone());
        self.index.replace_all(paths);
        Ok(())
    }

    /// True when neither the index nor the working tree differs from HEAD.
    ///
    /// On an unborn branch this means both are empty.
    pub fn is_clean(&self) -> Result<bool, StoreError> {
        let head_paths = match self.head_oid() {
            Some(oid) => self.commit_paths(&oid)?,
            None => PathMap::new(),
        };
        Ok(head_paths == self.index.snapshot() && head_paths == self.worktree.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worktree::FileState;

    fn sig() -> Signature {
        Signature::now("Test", "test@example.com")
    }

    #[test]
    fn new_repository_is_on_unborn_main() {
        let repo = Repository::new();
        assert!(repo.head_oid().is_none());
        assert_eq!(
            repo.store.head_branch_ref().unwrap().as_str(),
            "refs/heads/main"
        );
        assert!(repo.is_clean().unwrap());
    }

    #[test]
    fn first_commit_births_the_branch() {
        let mut repo = Repository::new();
        repo.worktree.write("a.txt", FileState::regular("1"));
        repo.index.stage("a.txt", FileState::regular("1"));
        let oid = repo.create_commit("initial", sig(), vec![]);
        repo.advance_head(oid.clone());
        assert_eq!(repo.head_oid(), Some(oid.clone()));
        assert!(repo.is_clean().unwrap());
        assert_eq!(
            repo.commit_paths(&oid).unwrap().get("a.txt").unwrap().content,
            b"1"
        );
    }

    #[test]
    fn advance_head_moves_detached_head_directly() {
        let mut repo = Repository::new();
        repo.index.stage("a.txt", FileState::regular("1"));
        repo.worktree.write("a.txt", FileState::regular("1"));
        let first = repo.create_commit("initial", sig(), vec![]);
        repo.advance_head(first.clone());

        // Detach, then advance; the branch must not move.
        repo.store.set_ref(RefName::head(), first.clone());
        repo.index.stage("b.txt", FileState::regular("2"));
        repo.worktree.write("b.txt", FileState::regular("2"));
        let second = repo.create_commit("detached", sig(), vec![first.clone()]);
        repo.advance_head(second.clone());

        assert_eq!(repo.head_oid(), Some(second));
        let main = RefName::new("refs/heads/main").unwrap();
        assert_eq!(repo.store.resolve_ref(&main).unwrap(), first);
    }

    #[test]
    fn checkout_paths_materializes_worktree_and_index() {
        let mut repo = Repository::new();
        repo.index.stage("x.txt", FileState::regular("x"));
        repo.worktree.write("x.txt", FileState::regular("x"));
        let oid = repo.create_commit("one", sig(), vec![]);
        repo.advance_head(oid.clone());

        repo.worktree.write("dirty.txt", FileState::regular("junk"));
        repo.checkout_paths_of(&oid).unwrap();
        assert!(repo.worktree.read("dirty.txt").is_none());
        assert!(repo.is_clean().unwrap());
    }
}
