//! core::store
//!
//! In-memory content-addressable object store and reference table.
//!
//! This module is the **single doorway** to stored objects and refs. All
//! higher layers (resolver, merge engine, replicator, sessions) go through
//! the [`ObjectStore`] API; none of them hold raw maps of objects.
//!
//! # References
//!
//! A reference is either *direct* (points at a commit id) or *symbolic*
//! (points at another reference name). `HEAD` is symbolic while on a
//! branch (including an unborn branch whose ref does not exist yet) and
//! direct when detached. Symbolic resolution is capped at a fixed depth so
//! a cycle fails fast instead of looping.
//!
//! # Error handling
//!
//! Store errors are categorized into typed variants; expected conditions
//! like an unborn branch surface as [`StoreError::RefNotFound`] so callers
//! can distinguish them from real corruption.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use super::object::{Blob, Commit, Object, ObjectKind, Tree};
use super::types::{Oid, RefName};

/// Maximum symbolic-ref chain length before resolution fails.
const MAX_SYMBOLIC_DEPTH: usize = 10;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object not found in this store.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The id that was not found
        oid: Oid,
    },

    /// Object exists but has the wrong kind.
    #[error("object {oid} is a {actual}, expected {expected}")]
    WrongKind {
        oid: Oid,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: RefName,
    },

    /// Symbolic-ref chain exceeded the depth cap (probable cycle).
    #[error("symbolic ref chain too deep starting at {refname}")]
    SymbolicDepthExceeded { refname: RefName },
}

/// Target of a reference: a commit id, or another reference name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(Oid),
    Symbolic(RefName),
}

/// One repository's objects and references.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: HashMap<Oid, Object>,
    refs: BTreeMap<RefName, RefTarget>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object record, returning its content address.
    ///
    /// Storing an identical record twice is a no-op that returns the same id.
    pub fn put(&mut self, object: Object) -> Oid {
        let oid = object.compute_oid();
        self.objects.entry(oid.clone()).or_insert(object);
        oid
    }

    /// True if an object with this id is present.
    pub fn contains(&self, oid: &Oid) -> bool {
        self.objects.contains_key(oid)
    }

    /// Fetch any object by id.
    pub fn get(&self, oid: &Oid) -> Result<&Object, StoreError> {
        self.objects.get(oid).ok_or_else(|| StoreError::ObjectNotFound {
            oid: oid.clone(),
        })
    }

    /// Fetch a commit by id.
    pub fn get_commit(&self, oid: &Oid) -> Result<&Commit, StoreError> {
        match self.get(oid)? {
            Object::Commit(c) => Ok(c),
            other => Err(StoreError::WrongKind {
                oid: oid.clone(),
                expected: ObjectKind::Commit,
                actual: other.kind(),
            }),
        }
    }

    /// Fetch a tree by id.
    pub fn get_tree(&self, oid: &Oid) -> Result<&Tree, StoreError> {
        match self.get(oid)? {
            Object::Tree(t) => Ok(t),
            other => Err(StoreError::WrongKind {
                oid: oid.clone(),
                expected: ObjectKind::Tree,
                actual: other.kind(),
            }),
        }
    }

    /// Fetch a blob by id.
    pub fn get_blob(&self, oid: &Oid) -> Result<&Blob, StoreError> {
        match self.get(oid)? {
            Object::Blob(b) => Ok(b),
            other => Err(StoreError::WrongKind {
                oid: oid.clone(),
                expected: ObjectKind::Blob,
                actual: other.kind(),
            }),
        }
    }

    /// All object ids whose hex form starts with `prefix`.
    ///
    /// Used by the revision resolver for short-hash lookup.
    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<Oid> {
        self.objects
            .keys()
            .filter(|oid| oid.as_str().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Point `name` directly at a commit id.
    pub fn set_ref(&mut self, name: RefName, oid: Oid) {
        self.refs.insert(name, RefTarget::Direct(oid));
    }

    /// Point `name` at another reference.
    pub fn set_symbolic_ref(&mut self, name: RefName, target: RefName) {
        self.refs.insert(name, RefTarget::Symbolic(target));
    }

    /// Raw ref target, without following symbolic links.
    pub fn get_ref(&self, name: &RefName) -> Option<&RefTarget> {
        self.refs.get(name)
    }

    /// Delete a reference. Returns whether it existed.
    pub fn delete_ref(&mut self, name: &RefName) -> bool {
        self.refs.remove(name).is_some()
    }

    /// All refs whose name starts with `prefix`, in name order.
    pub fn list_refs(&self, prefix: &str) -> Vec<(RefName, RefTarget)> {
        self.refs
            .iter()
            .filter(|(name, _)| name.as_str().starts_with(prefix))
            .map(|(name, target)| (name.clone(), target.clone()))
            .collect()
    }

    /// Resolve a reference to a commit id, following symbolic links.
    ///
    /// An unborn branch (`HEAD` → missing branch ref) reports the missing
    /// branch ref, not `HEAD` itself.
    ///
    /// # Errors
    ///
    /// - `RefNotFound` if the name (or a link target) does not exist
    /// - `SymbolicDepthExceeded` if the chain exceeds the depth cap
    pub fn resolve_ref(&self, name: &RefName) -> Result<Oid, StoreError> {
        let mut current = name.clone();
        for _ in 0..MAX_SYMBOLIC_DEPTH {
            match self.refs.get(&current) {
                Some(RefTarget::Direct(oid)) => return Ok(oid.clone()),
                Some(RefTarget::Symbolic(next)) => current = next.clone(),
                None => return Err(StoreError::RefNotFound { refname: current }),
            }
        }
        Err(StoreError::SymbolicDepthExceeded {
            refname: name.clone(),
        })
    }

    /// The branch ref `HEAD` points at, if HEAD is symbolic.
    pub fn head_branch_ref(&self) -> Option<RefName> {
        match self.refs.get(&RefName::head()) {
            Some(RefTarget::Symbolic(target)) => Some(target.clone()),
            _ => None,
        }
    }

    /// Total number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}
