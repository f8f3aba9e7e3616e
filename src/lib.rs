//! Gitdojo - An in-process simulated git core
//!
//! Gitdojo implements version-control semantics entirely in memory for
//! teaching and grading environments: a content-addressable object graph,
//! branches and revision expressions, three-way merges, commit replay
//! (cherry-pick, rebase, revert), object-graph replication between
//! repositories, stashes, and per-user sessions sharing a remote registry
//! with a pull-request ledger. No processes are spawned and no filesystem
//! is touched.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`core`] - Domain types, object graph, store, worktree, history walks
//! - [`resolve`] - Revision-expression resolver (`HEAD~2`, prefixes, refs)
//! - [`merge`] - Three-way merge engine and line-level diff3
//! - [`replay`] - One replay primitive behind cherry-pick, rebase, revert
//! - [`replicate`] - Object-graph copier behind fetch, push, clone
//! - [`stash`] - Uncommitted-work ledger as a chain of commits
//! - [`session`] - Per-user workspaces, verbs, and the shared-remote registry
//!
//! # Correctness Invariants
//!
//! Gitdojo maintains the following invariants:
//!
//! 1. Objects are immutable and identified by the hash of their content
//! 2. Identical content always produces identical ids, in any repository
//! 3. Conflicts and no-op outcomes are reported as values, never as errors
//! 4. Replication never leaves a ref pointing at an object that was not
//!    copied first
//! 5. Every commit is created through one code path, whatever verb asked
//!    for it

pub mod core;
pub mod merge;
pub mod replay;
pub mod replicate;
pub mod resolve;
pub mod session;
pub mod stash;
