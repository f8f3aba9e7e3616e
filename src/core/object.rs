//! core::object
//!
//! Immutable object records: commits, trees, and blobs.
//!
//! # Content addressing
//!
//! Every object has a canonical byte encoding; its identity is the hash of
//! those bytes (see [`Object::compute_oid`]). Two records with the same
//! content always share an id, which is what makes replication incremental:
//! an object already present in a destination store never needs copying.
//!
//! # Invariants
//!
//! - Records are never mutated after storage.
//! - A commit's first parent is the mainline.
//! - Tree entries are kept in a `BTreeMap` so the canonical encoding is
//!   independent of insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Oid, Signature};

/// The kind of an object record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
        };
        write!(f, "{s}")
    }
}

/// File mode recorded in a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileMode {
    /// Regular file (100644).
    Regular,
    /// Executable file (100755).
    Executable,
    /// Nested-repository link (160000). Replication skips these.
    RepoLink,
}

impl FileMode {
    /// The octal mode string used in the canonical tree encoding.
    pub fn octal(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::RepoLink => "160000",
        }
    }
}

/// Immutable file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub content: Vec<u8>,
}

impl Blob {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Interpret the content as UTF-8 text, if it is.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// One entry in a tree: a blob with a mode, or a nested sub-tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEntry {
    Blob { oid: Oid, mode: FileMode },
    Subtree { oid: Oid },
}

impl TreeEntry {
    /// The id of the referenced object.
    pub fn oid(&self) -> &Oid {
        match self {
            TreeEntry::Blob { oid, .. } | TreeEntry::Subtree { oid } => oid,
        }
    }
}

/// One directory level: name → entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Immutable commit record.
///
/// The first parent is the mainline; merge commits carry more than one
/// parent and the stash chain uses the second parent slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub parents: Vec<Oid>,
    pub tree: Oid,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    /// Parent by index, if present.
    pub fn parent(&self, n: usize) -> Option<&Oid> {
        self.parents.get(n)
    }

    /// True for commits with no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// True for commits with more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message, for one-line listings.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Any storable object record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Blob(_) => ObjectKind::Blob,
        }
    }

    /// Canonical byte encoding, the input to content addressing.
    ///
    /// The encoding is deliberately simple and line-oriented; it is not
    /// the on-disk git format (a stated non-goal), only a deterministic
    /// serialization that two identical records always share.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Object::Blob(blob) => {
                let mut out = Vec::with_capacity(blob.content.len() + 5);
                out.extend_from_slice(b"blob\n");
                out.extend_from_slice(&blob.content);
                out
            }
            Object::Tree(tree) => {
                let mut out = String::from("tree\n");
                for (name, entry) in &tree.entries {
                    match entry {
                        TreeEntry::Blob { oid, mode } => {
                            out.push_str(&format!("blob {} {oid}\t{name}\n", mode.octal()));
                        }
                        TreeEntry::Subtree { oid } => {
                            out.push_str(&format!("tree 040000 {oid}\t{name}\n"));
                        }
                    }
                }
                out.into_bytes()
            }
            Object::Commit(commit) => {
                let mut out = String::from("commit\n");
                out.push_str(&format!("tree {}\n", commit.tree));
                for parent in &commit.parents {
                    out.push_str(&format!("parent {parent}\n"));
                }
                out.push_str(&format!("author {}\n", commit.author));
                out.push_str(&format!("committer {}\n", commit.committer));
                out.push('\n');
                out.push_str(&commit.message);
                out.into_bytes()
            }
        }
    }

    /// Compute this record's content address.
    pub fn compute_oid(&self) -> Oid {
        Oid::hash_bytes(&self.canonical_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Signature;
    use chrono::TimeZone;

    fn sig() -> Signature {
        Signature {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            when: chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn blob_oid_depends_only_on_content() {
        let a = Object::Blob(Blob::new("hello\n")).compute_oid();
        let b = Object::Blob(Blob::new("hello\n")).compute_oid();
        let c = Object::Blob(Blob::new("world\n")).compute_oid();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tree_oid_is_order_independent() {
        let blob = Object::Blob(Blob::new("x")).compute_oid();
        let mut t1 = Tree::new();
        t1.entries.insert(
            "b.txt".into(),
            TreeEntry::Blob {
                oid: blob.clone(),
                mode: FileMode::Regular,
            },
        );
        t1.entries.insert(
            "a.txt".into(),
            TreeEntry::Blob {
                oid: blob.clone(),
                mode: FileMode::Regular,
            },
        );
        let mut t2 = Tree::new();
        t2.entries.insert(
            "a.txt".into(),
            TreeEntry::Blob {
                oid: blob.clone(),
                mode: FileMode::Regular,
            },
        );
        t2.entries.insert(
            "b.txt".into(),
            TreeEntry::Blob {
                oid: blob,
                mode: FileMode::Regular,
            },
        );
        assert_eq!(Object::Tree(t1).compute_oid(), Object::Tree(t2).compute_oid());
    }

    #[test]
    fn commit_oid_covers_parents_and_message() {
        let tree = Object::Tree(Tree::new()).compute_oid();
        let base = Commit {
            parents: vec![],
            tree: tree.clone(),
            author: sig(),
            committer: sig(),
            message: "initial".into(),
        };
        let mut reworded = base.clone();
        reworded.message = "reworded".into();
        let mut child = base.clone();
        child.parents = vec![Object::Commit(base.clone()).compute_oid()];

        let base_oid = Object::Commit(base).compute_oid();
        assert_ne!(base_oid, Object::Commit(reworded).compute_oid());
        assert_ne!(base_oid, Object::Commit(child).compute_oid());
    }

    #[test]
    fn commit_helpers() {
        let tree = Object::Tree(Tree::new()).compute_oid();
        let c = Commit {
            parents: vec![],
            tree,
            author: sig(),
            committer: sig(),
            message: "first line\nbody".into(),
        };
        assert!(c.is_root());
        assert!(!c.is_merge());
        assert_eq!(c.summary(), "first line");
        assert!(c.parent(0).is_none());
    }
}
