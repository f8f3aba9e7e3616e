//! core::history
//!
//! Commit-graph traversal helpers: ancestry tests, merge-base search,
//! first-parent walks.
//!
//! All traversals are iterative with explicit worklists and visited sets,
//! so long histories never risk recursion depth.

use std::collections::{HashSet, VecDeque};

use super::store::{ObjectStore, StoreError};
use super::types::Oid;

/// All ancestors of `from` (inclusive), breadth-first over every parent.
pub fn ancestors(store: &ObjectStore, from: &Oid) -> Result<HashSet<Oid>, StoreError> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([from.clone()]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid.clone()) {
            continue;
        }
        let commit = store.get_commit(&oid)?;
        for parent in &commit.parents {
            if !seen.contains(parent) {
                queue.push_back(parent.clone());
            }
        }
    }
    Ok(seen)
}

/// True if `ancestor` is reachable from `descendant` (inclusive).
pub fn is_ancestor(
    store: &ObjectStore,
    ancestor: &Oid,
    descendant: &Oid,
) -> Result<bool, StoreError> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([descendant.clone()]);
    while let Some(oid) = queue.pop_front() {
        if oid == *ancestor {
            return Ok(true);
        }
        if !seen.insert(oid.clone()) {
            continue;
        }
        let commit = store.get_commit(&oid)?;
        for parent in &commit.parents {
            queue.push_back(parent.clone());
        }
    }
    Ok(false)
}

/// A ref update from `base` to `tip` is a fast-forward when `base` is a
/// strict-or-equal ancestor of `tip`.
pub fn is_fast_forward(store: &ObjectStore, base: &Oid, tip: &Oid) -> Result<bool, StoreError> {
    is_ancestor(store, base, tip)
}

/// The most recent common ancestor of `a` and `b`, if any.
///
/// Breadth-first from `b` through the ancestor set of `a`; the first hit is
/// the closest common ancestor by generation distance from `b`.
pub fn merge_base(store: &ObjectStore, a: &Oid, b: &Oid) -> Result<Option<Oid>, StoreError> {
    let reachable_from_a = ancestors(store, a)?;
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b.clone()]);
    while let Some(oid) = queue.pop_front() {
        if reachable_from_a.contains(&oid) {
            return Ok(Some(oid));
        }
        if !seen.insert(oid.clone()) {
            continue;
        }
        let commit = store.get_commit(&oid)?;
        for parent in &commit.parents {
            queue.push_back(parent.clone());
        }
    }
    Ok(None)
}

/// First-parent chain from `tip` down to (excluding) `stop`, oldest first.
///
/// With `stop = None` the walk continues to the root. This is the commit
/// sequence rebase replays.
pub fn first_parent_range(
    store: &ObjectStore,
    tip: &Oid,
    stop: Option<&Oid>,
) -> Result<Vec<Oid>, StoreError> {
    let mut chain = Vec::new();
    let mut current = Some(tip.clone());
    while let Some(oid) = current {
        if stop == Some(&oid) {
            break;
        }
        let commit = store.get_commit(&oid)?;
        chain.push(oid);
        current = commit.parent(0).cloned();
    }
    chain.reverse();
    Ok(chain)
}

/// First-parent log from `tip`, newest first, capped at `limit`.
pub fn first_parent_log(
    store: &ObjectStore,
    tip: &Oid,
    limit: usize,
) -> Result<Vec<Oid>, StoreError> {
    let mut out = Vec::new();
    let mut current = Some(tip.clone());
    while let Some(oid) = current {
        if out.len() == limit {
            break;
        }
        let commit = store.get_commit(&oid)?;
        out.push(oid);
        current = commit.parent(0).cloned();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::{Commit, Object, Tree};
    use crate::core::types::Signature;
    use chrono::TimeZone;

    fn sig(n: u32) -> Signature {
        Signature {
            name: "T".into(),
            email: "t@example.com".into(),
            when: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, n).unwrap(),
        }
    }

    fn commit(store: &mut ObjectStore, parents: Vec<Oid>, n: u32) -> Oid {
        let tree = store.put(Object::Tree(Tree::new()));
        store.put(Object::Commit(Commit {
            parents,
            tree,
            author: sig(n),
            committer: sig(n),
            message: format!("c{n}"),
        }))
    }

    /// root -> a -> b -> c, plus side branch root -> d.
    fn linear_with_branch(store: &mut ObjectStore) -> (Oid, Oid, Oid, Oid, Oid) {
        let root = commit(store, vec![], 0);
        let a = commit(store, vec![root.clone()], 1);
        let b = commit(store, vec![a.clone()], 2);
        let c = commit(store, vec![b.clone()], 3);
        let d = commit(store, vec![root.clone()], 4);
        (root, a, b, c, d)
    }

    #[test]
    fn ancestry_and_fast_forward() {
        let mut store = ObjectStore::new();
        let (root, a, _b, c, d) = linear_with_branch(&mut store);
        assert!(is_ancestor(&store, &root, &c).unwrap());
        assert!(is_ancestor(&store, &a, &c).unwrap());
        assert!(!is_ancestor(&store, &c, &a).unwrap());
        assert!(!is_ancestor(&store, &d, &c).unwrap());
        assert!(is_fast_forward(&store, &a, &c).unwrap());
        assert!(is_fast_forward(&store, &c, &c).unwrap());
    }

    #[test]
    fn merge_base_of_forked_branches_is_fork_point() {
        let mut store = ObjectStore::new();
        let (root, _a, _b, c, d) = linear_with_branch(&mut store);
        assert_eq!(merge_base(&store, &c, &d).unwrap(), Some(root));
    }

    #[test]
    fn merge_base_of_ancestor_is_the_ancestor() {
        let mut store = ObjectStore::new();
        let (_root, a, _b, c, _d) = linear_with_branch(&mut store);
        assert_eq!(merge_base(&store, &a, &c).unwrap(), Some(a));
    }

    #[test]
    fn merge_base_of_unrelated_roots_is_none() {
        let mut store = ObjectStore::new();
        let x = commit(&mut store, vec![], 10);
        let y = commit(&mut store, vec![], 11);
        assert_eq!(merge_base(&store, &x, &y).unwrap(), None);
    }

    #[test]
    fn first_parent_range_is_oldest_first_and_exclusive() {
        let mut store = ObjectStore::new();
        let (root, a, b, c, _d) = linear_with_branch(&mut store);
        let range = first_parent_range(&store, &c, Some(&root)).unwrap();
        assert_eq!(range, vec![a.clone(), b.clone(), c.clone()]);
        let full = first_parent_range(&store, &c, None).unwrap();
        assert_eq!(full, vec![root, a, b, c]);
    }

    #[test]
    fn log_is_newest_first_and_capped() {
        let mut store = ObjectStore::new();
        let (_root, _a, b, c, _d) = linear_with_branch(&mut store);
        let log = first_parent_log(&store, &c, 2).unwrap();
        assert_eq!(log, vec![c, b]);
    }
}
