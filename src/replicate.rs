//! replicate
//!
//! Object-graph replication between isolated stores: the engine behind
//! fetch, push, and clone. There is no transport; "bandwidth" is modeled
//! by copying only the objects missing from the destination.
//!
//! # Algorithm
//!
//! [`copy_reachable`] walks from a commit with an explicit worklist and a
//! visited set. Every object is existence-checked against the destination
//! before copying; an object already present short-circuits its whole
//! subgraph, which is what makes repeated fetches incremental. Objects are
//! always written before the reference that points at them, so an
//! interrupted replication can leave a partial prefix of the graph but
//! never a ref to a missing object.

use thiserror::Error;

use crate::core::history::is_fast_forward;
use crate::core::object::{Object, TreeEntry};
use crate::core::store::{ObjectStore, StoreError};
use crate::core::types::{BranchName, Oid, RefName};
use crate::core::Repository;

/// Errors from replication operations.
#[derive(Debug, Error)]
pub enum ReplicateError {
    /// The requested branch does not exist on the source.
    #[error("remote branch not found: {branch}")]
    BranchNotFound { branch: BranchName },

    /// A push would overwrite history on the remote.
    #[error("push to {refname} rejected: not a fast-forward")]
    NonFastForward { refname: RefName },

    /// The source repository has no branches to clone.
    #[error("cannot clone: source repository has no branches")]
    EmptySource,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Copy every object reachable from `from` that `dst` is missing.
///
/// Returns the number of objects copied. For a commit the record is copied,
/// then its parents and its tree are visited; for a tree, each entry's
/// sub-tree or blob (entries whose mode marks a nested-repository link are
/// skipped); for a blob, just the content record.
pub fn copy_reachable(
    src: &ObjectStore,
    dst: &mut ObjectStore,
    from: &Oid,
) -> Result<usize, StoreError> {
    let mut copied = 0usize;
    let mut visited = std::collections::HashSet::new();
    let mut work = vec![from.clone()];

    while let Some(oid) = work.pop() {
        if !visited.insert(oid.clone()) {
            continue;
        }
        // The existence check is the incremental short-circuit: a present
        // object implies its entire reachable subgraph is present.
        if dst.contains(&oid) {
            continue;
        }
        let object = src.get(&oid)?.clone();
        match &object {
            Object::Commit(commit) => {
                work.extend(commit.parents.iter().cloned());
                work.push(commit.tree.clone());
            }
            Object::Tree(tree) => {
                for entry in tree.entries.values() {
                    match entry {
                        TreeEntry::Blob { mode, oid } => {
                            if *mode == crate::core::object::FileMode::RepoLink {
                                continue;
                            }
                            work.push(oid.clone());
                        }
                        TreeEntry::Subtree { oid } => work.push(oid.clone()),
                    }
                }
            }
            Object::Blob(_) => {}
        }
        dst.put(object);
        copied += 1;
    }
    Ok(copied)
}

/// Options for a fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Fetch only this branch instead of every branch.
    pub branch: Option<BranchName>,
    /// Also copy every tag ref's target and objects.
    pub tags: bool,
    /// Delete local remote-tracking refs whose branch no longer exists
    /// on the source.
    pub prune: bool,
    /// Report planned ref updates without copying objects or writing refs.
    pub dry_run: bool,
}

/// One planned or applied reference change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: RefName,
    pub old: Option<Oid>,
    /// `None` means the ref is deleted (prune).
    pub new: Option<Oid>,
}

/// What a fetch or push did (or, under `dry_run`, would do).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub updates: Vec<RefUpdate>,
    pub objects_copied: usize,
    pub dry_run: bool,
}

impl TransferReport {
    /// True when nothing changed or would change.
    pub fn is_up_to_date(&self) -> bool {
        self.updates.is_empty() && self.objects_copied == 0
    }
}

/// Fetch from `remote` into `local`, updating `refs/remotes/<name>/*`.
///
/// Refs are written strictly after all constituent objects.
pub fn fetch(
    local: &mut Repository,
    remote: &Repository,
    remote_name: &str,
    options: &FetchOptions,
) -> Result<TransferReport, ReplicateError> {
    let mut planned: Vec<RefUpdate> = Vec::new();

    // Which remote branches participate.
    let remote_branches: Vec<(BranchName, Oid)> = {
        let mut out = Vec::new();
        for (name, _) in remote.store.list_refs("refs/heads/") {
            let Some(branch) = name.branch_name() else {
                continue;
            };
            if let Some(only) = &options.branch {
                if &branch != only {
                    continue;
                }
            }
            let oid = remote.store.resolve_ref(&name)?;
            out.push((branch, oid));
        }
        if let Some(only) = &options.branch {
            if out.is_empty() {
                return Err(ReplicateError::BranchNotFound {
                    branch: only.clone(),
                });
            }
        }
        out
    };

    for (branch, new) in &remote_branches {
        let tracking = RefName::for_remote_branch(remote_name, branch);
        let old = local.store.resolve_ref(&tracking).ok();
        if old.as_ref() != Some(new) {
            planned.push(RefUpdate {
                name: tracking,
                old,
                new: Some(new.clone()),
            });
        }
    }

    if options.tags {
        for (name, _) in remote.store.list_refs("refs/tags/") {
            let new = remote.store.resolve_ref(&name)?;
            let old = local.store.resolve_ref(&name).ok();
            if old.as_ref() != Some(&new) {
                planned.push(RefUpdate {
                    name,
                    old,
                    new: Some(new),
                });
            }
        }
    }

    if options.prune {
        let prefix = format!("refs/remotes/{remote_name}/");
        for (name, _) in local.store.list_refs(&prefix) {
            let branch_part = name
                .as_str()
                .strip_prefix(&prefix)
                .and_then(|n| BranchName::new(n).ok());
            let still_exists = branch_part
                .map(|b| {
                    remote
                        .store
                        .get_ref(&RefName::for_branch(&b))
                        .is_some()
                })
                .unwrap_or(false);
            if !still_exists {
                let old = local.store.resolve_ref(&name).ok();
                planned.push(RefUpdate {
                    name,
                    old,
                    new: None,
                });
            }
        }
    }

    if options.dry_run {
        return Ok(TransferReport {
            updates: planned,
            objects_copied: 0,
            dry_run: true,
        });
    }

    let mut objects_copied = 0usize;
    for update in &planned {
        if let Some(new) = &update.new {
            objects_copied += copy_reachable(&remote.store, &mut local.store, new)?;
        }
    }
    for update in &planned {
        match &update.new {
            Some(new) => local.store.set_ref(update.name.clone(), new.clone()),
            None => {
                local.store.delete_ref(&update.name);
            }
        }
    }

    Ok(TransferReport {
        updates: planned,
        objects_copied,
        dry_run: false,
    })
}

/// Push a local branch to `remote`.
///
/// A non-fast-forward update is rejected unless `force`; the check runs
/// against the local store, which must already contain the remote's old
/// tip (a tip unknown locally means the histories diverged). On success
/// the local remote-tracking ref advances too.
pub fn push(
    local: &mut Repository,
    remote: &mut Repository,
    remote_name: &str,
    branch: &BranchName,
    force: bool,
) -> Result<TransferReport, ReplicateError> {
    let branch_ref = RefName::for_branch(branch);
    let new = local
        .store
        .resolve_ref(&branch_ref)
        .map_err(|_| ReplicateError::BranchNotFound {
            branch: branch.clone(),
        })?;

    let old = remote.store.resolve_ref(&branch_ref).ok();
    if let Some(old_oid) = &old {
        if old_oid != &new && !force {
            let known = local.store.contains(old_oid)
                && is_fast_forward(&local.store, old_oid, &new)?;
            if !known {
                return Err(ReplicateError::NonFastForward {
                    refname: branch_ref,
                });
            }
        }
    }

    if old.as_ref() == Some(&new) {
        return Ok(TransferReport::default());
    }

    let objects_copied = copy_reachable(&local.store, &mut remote.store, &new)?;
    remote.store.set_ref(branch_ref.clone(), new.clone());
    local
        .store
        .set_ref(RefName::for_remote_branch(remote_name, branch), new.clone());

    Ok(TransferReport {
        updates: vec![RefUpdate {
            name: branch_ref,
            old,
            new: Some(new),
        }],
        objects_copied,
        dry_run: false,
    })
}

/// Clone `remote` into a fresh repository.
///
/// Every branch is fetched, remote-tracking refs are written, a local
/// branch is created for the source's current branch (falling back to the
/// first branch), and its tree is checked out.
pub fn clone_repository(
    remote: &Repository,
    remote_name: &str,
) -> Result<(Repository, TransferReport), ReplicateError> {
    let mut local = Repository::new();
    let report = fetch(&mut local, remote, remote_name, &FetchOptions::default())?;
    if report.updates.is_empty() {
        return Err(ReplicateError::EmptySource);
    }

    let default_branch = remote
        .store
        .head_branch_ref()
        .and_then(|r| r.branch_name())
        .filter(|b| remote.store.get_ref(&RefName::for_branch(b)).is_some())
        .or_else(|| {
            remote
                .store
                .list_refs("refs/heads/")
                .first()
                .and_then(|(name, _)| name.branch_name())
        })
        .ok_or(ReplicateError::EmptySource)?;

    let tip = local
        .store
        .resolve_ref(&RefName::for_remote_branch(remote_name, &default_branch))?;
    let branch_ref = RefName::for_branch(&default_branch);
    local.store.set_ref(branch_ref.clone(), tip.clone());
    local.store.set_symbolic_ref(RefName::head(), branch_ref);
    local.checkout_paths_of(&tip)?;

    Ok((local, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Signature;
    use crate::core::worktree::{FileState, PathMap};

    fn sig() -> Signature {
        Signature::now("T", "t@example.com")
    }

    fn commit_files(repo: &mut Repository, files: &[(&str, &str)], msg: &str) -> Oid {
        let mut map = PathMap::new();
        for (path, content) in files {
            map.insert(path.to_string(), FileState::regular(*content));
        }
        repo.index.replace_all(map.clone());
        repo.worktree.replace_all(map);
        let parents = repo.head_oid().into_iter().collect();
        let oid = repo.create_commit(msg, sig(), parents);
        repo.advance_head(oid.clone());
        oid
    }

    #[test]
    fn copy_reachable_copies_full_graph_once() {
        let mut src = Repository::new();
        let _a = commit_files(&mut src, &[("a.txt", "a\n")], "a");
        let tip = commit_files(&mut src, &[("a.txt", "a\n"), ("dir/b.txt", "b\n")], "b");

        let mut dst = ObjectStore::new();
        let first = copy_reachable(&src.store, &mut dst, &tip).unwrap();
        // 2 commits, 3 trees (root x2 + dir), 2 blobs.
        assert_eq!(first, 7);
        let second = copy_reachable(&src.store, &mut dst, &tip).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn fetch_updates_tracking_refs_and_is_incremental() {
        let mut remote = Repository::new();
        let tip = commit_files(&mut remote, &[("a.txt", "a\n")], "initial");

        let mut local = Repository::new();
        let report = fetch(&mut local, &remote, "origin", &FetchOptions::default()).unwrap();
        assert_eq!(report.updates.len(), 1);
        assert!(report.objects_copied > 0);
        let tracking = RefName::new("refs/remotes/origin/main").unwrap();
        assert_eq!(local.store.resolve_ref(&tracking).unwrap(), tip);

        // Unchanged remote: second fetch copies zero additional objects.
        let again = fetch(&mut local, &remote, "origin", &FetchOptions::default()).unwrap();
        assert!(again.is_up_to_date());
    }

    #[test]
    fn fetch_single_branch_and_missing_branch() {
        let mut remote = Repository::new();
        let _main = commit_files(&mut remote, &[("a.txt", "a\n")], "on main");
        let dev = BranchName::new("dev").unwrap();
        remote.store.set_ref(
            RefName::for_branch(&dev),
            remote.head_oid().unwrap(),
        );

        let mut local = Repository::new();
        let options = FetchOptions {
            branch: Some(dev.clone()),
            ..Default::default()
        };
        let report = fetch(&mut local, &remote, "origin", &options).unwrap();
        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].name.as_str(), "refs/remotes/origin/dev");

        let missing = FetchOptions {
            branch: Some(BranchName::new("ghost").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            fetch(&mut local, &remote, "origin", &missing),
            Err(ReplicateError::BranchNotFound { .. })
        ));
    }

    #[test]
    fn fetch_dry_run_writes_nothing() {
        let mut remote = Repository::new();
        commit_files(&mut remote, &[("a.txt", "a\n")], "initial");

        let mut local = Repository::new();
        let options = FetchOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = fetch(&mut local, &remote, "origin", &options).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.objects_copied, 0);
        assert_eq!(local.store.object_count(), 0);
        assert!(local.store.list_refs("refs/remotes/").is_empty());
    }

    #[test]
    fn fetch_tags_and_prune() {
        let mut remote = Repository::new();
        let tip = commit_files(&mut remote, &[("a.txt", "a\n")], "initial");
        remote.store.set_ref(RefName::for_tag("v1"), tip.clone());

        let mut local = Repository::new();
        // A stale tracking ref for a branch the remote no longer has.
        local.store.set_ref(
            RefName::new("refs/remotes/origin/gone").unwrap(),
            tip.clone(),
        );
        // The stale ref needs a backing object locally for resolve_ref use.
        copy_reachable(&remote.store, &mut local.store, &tip).unwrap();

        let options = FetchOptions {
            tags: true,
            prune: true,
            ..Default::default()
        };
        let report = fetch(&mut local, &remote, "origin", &options).unwrap();
        assert_eq!(
            local.store.resolve_ref(&RefName::for_tag("v1")).unwrap(),
            tip
        );
        assert!(local
            .store
            .get_ref(&RefName::new("refs/remotes/origin/gone").unwrap())
            .is_none());
        assert!(report
            .updates
            .iter()
            .any(|u| u.new.is_none() && u.name.as_str() == "refs/remotes/origin/gone"));
    }

    #[test]
    fn push_fast_forwards_and_rejects_divergence() {
        let mut remote = Repository::new();
        let shared = commit_files(&mut remote, &[("a.txt", "a\n")], "shared");

        // Local clone advances main.
        let (mut local, _) = clone_repository(&remote, "origin").unwrap();
        let ahead = commit_files(&mut local, &[("a.txt", "a\n"), ("b.txt", "b\n")], "ahead");

        let main = BranchName::new("main").unwrap();
        let report = push(&mut local, &mut remote, "origin", &main, false).unwrap();
        assert_eq!(report.updates.len(), 1);
        assert_eq!(
            remote
                .store
                .resolve_ref(&RefName::for_branch(&main))
                .unwrap(),
            ahead
        );

        // Remote moves on independently; a stale push is rejected.
        let mut other = Repository::new();
        let _unrelated = commit_files(&mut other, &[("z.txt", "z\n")], "unrelated");
        let err = push(&mut other, &mut remote, "origin", &main, false).unwrap_err();
        assert!(matches!(err, ReplicateError::NonFastForward { .. }));

        // Force overrides.
        let forced = push(&mut other, &mut remote, "origin", &main, true).unwrap();
        assert_eq!(forced.updates.len(), 1);
        let _ = shared;
    }

    #[test]
    fn push_up_to_date_is_a_no_op() {
        let mut remote = Repository::new();
        commit_files(&mut remote, &[("a.txt", "a\n")], "initial");
        let (mut local, _) = clone_repository(&remote, "origin").unwrap();
        let main = BranchName::new("main").unwrap();
        let report = push(&mut local, &mut remote, "origin", &main, false).unwrap();
        assert!(report.is_up_to_date());
    }

    #[test]
    fn clone_checks_out_default_branch() {
        let mut remote = Repository::new();
        let tip = commit_files(&mut remote, &[("a.txt", "hello\n")], "initial");

        let (local, report) = clone_repository(&remote, "origin").unwrap();
        assert!(!report.is_up_to_date());
        assert_eq!(local.head_oid(), Some(tip));
        assert_eq!(local.worktree.read("a.txt").unwrap().content, b"hello\n");
        assert_eq!(
            local.store.head_branch_ref().unwrap().as_str(),
            "refs/heads/main"
        );
        assert!(local.is_clean().unwrap());
    }

    #[test]
    fn clone_of_empty_source_fails() {
        let remote = Repository::new();
        assert!(matches!(
            clone_repository(&remote, "origin"),
            Err(ReplicateError::EmptySource)
        ));
    }
}
