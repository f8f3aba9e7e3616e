//! core::worktree
//!
//! Virtual working tree and index snapshot.
//!
//! The working tree is a flat map of slash-separated paths to byte content;
//! directories exist implicitly. The index is the tree-shaped overlay that
//! "the next commit will contain", distinct from both HEAD's tree and the
//! working tree. [`Index::write_tree`] builds the nested tree records
//! bottom-up, and [`flatten_tree`] is the inverse used by diffing and
//! checkout.

use std::collections::BTreeMap;

use super::object::{FileMode, Object, Tree, TreeEntry};
use super::store::{ObjectStore, StoreError};
use super::types::Oid;

/// A file snapshot: content plus mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub content: Vec<u8>,
    pub mode: FileMode,
}

impl FileState {
    pub fn regular(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            mode: FileMode::Regular,
        }
    }
}

/// Flat path → file-state map, the common currency of the merge engine.
pub type PathMap = BTreeMap<String, FileState>;

/// The virtual working tree: user-visible files for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worktree {
    files: PathMap,
}

impl Worktree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a file's content, if present.
    pub fn read(&self, path: &str) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Write (create or replace) a file.
    pub fn write(&mut self, path: impl Into<String>, state: FileState) {
        self.files.insert(path.into(), state);
    }

    /// Remove a file. Returns whether it existed.
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    /// All paths and states, in path order.
    pub fn files(&self) -> &PathMap {
        &self.files
    }

    /// Immediate children of a directory (`""` for the root), like `ls`.
    ///
    /// Directories are reported once, with a trailing `/`.
    pub fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };
        let mut seen = std::collections::BTreeSet::new();
        for path in self.files.keys() {
            if let Some(rest) = path.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((first, _)) => seen.insert(format!("{first}/")),
                    None => seen.insert(rest.to_string()),
                };
            }
        }
        seen.into_iter().collect()
    }

    /// Replace the whole working tree with `state`.
    pub fn replace_all(&mut self, state: PathMap) {
        self.files = state;
    }

    /// Clone the current file map.
    pub fn snapshot(&self) -> PathMap {
        self.files.clone()
    }
}

/// The staging area: what the next commit will contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: PathMap,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a file state at a path.
    pub fn stage(&mut self, path: impl Into<String>, state: FileState) {
        self.entries.insert(path.into(), state);
    }

    /// Remove a path from the index (stages a deletion).
    pub fn unstage(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    /// All staged entries, in path order.
    pub fn entries(&self) -> &PathMap {
        &self.entries
    }

    /// True when the working tree matches the index exactly.
    pub fn matches_worktree(&self, worktree: &Worktree) -> bool {
        &self.entries == worktree.files()
    }

    /// Replace the whole index with `state`.
    pub fn replace_all(&mut self, state: PathMap) {
        self.entries = state;
    }

    /// Clone the current entry map.
    pub fn snapshot(&self) -> PathMap {
        self.entries.clone()
    }

    /// Build tree (and blob) records for the staged content, bottom-up.
    ///
    /// Returns the root tree id. An empty index yields the empty tree.
    pub fn write_tree(&self, store: &mut ObjectStore) -> Oid {
        build_tree(store, &self.entries)
    }

    /// Replace the index with the contents of a stored tree.
    pub fn read_tree(&mut self, store: &ObjectStore, tree: &Oid) -> Result<(), StoreError> {
        self.entries = flatten_tree(store, tree)?;
        Ok(())
    }
}

/// Build nested tree records from a flat path map, returning the root id.
pub fn build_tree(store: &mut ObjectStore, files: &PathMap) -> Oid {
    // Group this level's direct files and the subtrees below them.
    let mut tree = Tree::new();
    let mut subdirs: BTreeMap<String, PathMap> = BTreeMap::new();

    for (path, state) in files {
        match path.split_once('/') {
            None => {
                let blob = store.put(Object::Blob(super::object::Blob::new(
                    state.content.clone(),
                )));
                tree.entries.insert(
                    path.clone(),
                    TreeEntry::Blob {
                        oid: blob,
                        mode: state.mode,
                    },
                );
            }
            Some((dir, rest)) => {
                subdirs
                    .entry(dir.to_string())
                    .or_default()
                    .insert(rest.to_string(), state.clone());
            }
        }
    }

    for (dir, children) in subdirs {
        let sub = build_tree(store, &children);
        tree.entries.insert(dir, TreeEntry::Subtree { oid: sub });
    }

    store.put(Object::Tree(tree))
}

/// Flatten a stored tree into a path map.
pub fn flatten_tree(store: &ObjectStore, tree: &Oid) -> Result<PathMap, StoreError> {
    let mut out = PathMap::new();
    // Worklist of (prefix, tree id); avoids recursion on deep hierarchies.
    let mut work: Vec<(String, Oid)> = vec![(String::new(), tree.clone())];
    while let Some((prefix, oid)) = work.pop() {
        let tree = store.get_tree(&oid)?;
        for (name, entry) in &tree.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match entry {
                TreeEntry::Blob { oid, mode } => {
                    let blob = store.get_blob(oid)?;
                    out.insert(
                        path,
                        FileState {
                            content: blob.content.clone(),
                            mode: *mode,
                        },
                    );
                }
                TreeEntry::Subtree { oid } => work.push((path, oid.clone())),
            }
        }
    }
    Ok(out)
}
