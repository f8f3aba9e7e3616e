//! resolve
//!
//! Revision-expression resolution against one object store.
//!
//! # Grammar
//!
//! A revision expression is a base selector followed by zero or more
//! suffix modifiers, evaluated left to right:
//!
//! - base: a hex prefix (40 digits or fewer) uniquely matching a stored
//!   object id; else a name tried as `refs/heads/<name>`, `refs/tags/<name>`,
//!   `refs/remotes/<name>` in that priority order; else a literal ref name
//!   (`HEAD`, `ORIG_HEAD`, `STASH`, or a full `refs/...` path).
//! - `~N`: walk N generations via the first parent (`~` alone means `~1`).
//! - `^N`: select the Nth parent, 1-indexed (`^` alone means `^1`).
//!
//! Walking past a parentless commit, or asking for a parent index a commit
//! does not have, is `NotFound`. A hex prefix matching more than one stored
//! object is `Ambiguous`.
//!
//! # Example
//!
//! ```ignore
//! let tip = resolve(&repo.store, "main")?;
//! let grandparent = resolve(&repo.store, "HEAD~2")?;
//! let second_parent = resolve(&repo.store, "main^2")?;
//! ```

use thiserror::Error;

use crate::core::store::{ObjectStore, StoreError};
use crate::core::types::{Oid, RefName};

/// Errors from revision resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Expression did not name any commit.
    #[error("revision not found: {expr}")]
    NotFound {
        /// The expression (or sub-expression) that failed
        expr: String,
    },

    /// Short hash prefix matched more than one stored object.
    #[error("ambiguous short hash {prefix}: {count} objects match")]
    Ambiguous { prefix: String, count: usize },

    /// A modifier was applied to a non-commit object.
    #[error("object {oid} is not a commit")]
    NotACommit { oid: Oid },

    /// Malformed modifier suffix (e.g. `HEAD~x`).
    #[error("malformed revision expression: {expr}")]
    Malformed { expr: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve a revision expression to an object id.
///
/// The result is usually a commit id; a bare hex prefix may name a tree or
/// blob, in which case applying any `~`/`^` modifier fails with
/// [`ResolveError::NotACommit`].
pub fn resolve(store: &ObjectStore, expr: &str) -> Result<Oid, ResolveError> {
    let (base, modifiers) = split_expr(expr);
    if base.is_empty() {
        return Err(ResolveError::Malformed { expr: expr.into() });
    }

    let mut current = resolve_base(store, base)?;

    for modifier in parse_modifiers(expr, modifiers)? {
        current = apply_modifier(store, &current, modifier, expr)?;
    }
    Ok(current)
}

/// One parsed suffix modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    /// `~N`: N first-parent generations.
    Generations(usize),
    /// `^N`: the Nth parent, 1-indexed.
    Parent(usize),
}

/// Split an expression into base selector and modifier suffix.
///
/// `~` and `^` cannot appear in ref names or hex ids, so the first
/// occurrence of either starts the modifier chain.
fn split_expr(expr: &str) -> (&str, &str) {
    match expr.find(['~', '^']) {
        Some(idx) => (&expr[..idx], &expr[idx..]),
        None => (expr, ""),
    }
}

fn parse_modifiers(expr: &str, mut rest: &str) -> Result<Vec<Modifier>, ResolveError> {
    let mut out = Vec::new();
    while !rest.is_empty() {
        let op = rest.as_bytes()[0];
        rest = &rest[1..];
        let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let n = if digits_len == 0 {
            1
        } else {
            rest[..digits_len]
                .parse::<usize>()
                .map_err(|_| ResolveError::Malformed { expr: expr.into() })?
        };
        rest = &rest[digits_len..];
        match op {
            b'~' => out.push(Modifier::Generations(n)),
            b'^' => out.push(Modifier::Parent(n)),
            _ => return Err(ResolveError::Malformed { expr: expr.into() }),
        }
    }
    Ok(out)
}

fn resolve_base(store: &ObjectStore, base: &str) -> Result<Oid, ResolveError> {
    // 1. Hex prefix against stored object ids.
    if base.len() <= Oid::HEX_LEN && base.chars().all(|c| c.is_ascii_hexdigit()) {
        let prefix = base.to_ascii_lowercase();
        let matches = store.ids_with_prefix(&prefix);
        if matches.len() > 1 {
            return Err(ResolveError::Ambiguous {
                prefix,
                count: matches.len(),
            });
        }
        if let Some(oid) = matches.into_iter().next() {
            return Ok(oid);
        }
        // No object match: fall through to ref lookup.
    }

    // 2. Ref name under the priority prefixes.
    for candidate in [
        format!("refs/heads/{base}"),
        format!("refs/tags/{base}"),
        format!("refs/remotes/{base}"),
    ] {
        if let Ok(name) = RefName::new(candidate) {
            match store.resolve_ref(&name) {
                Ok(oid) => return Ok(oid),
                Err(StoreError::RefNotFound { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
    }

    // 3. A literal ref name: HEAD, ORIG_HEAD, STASH, or a full refs/ path.
    if let Ok(name) = RefName::new(base) {
        match store.resolve_ref(&name) {
            Ok(oid) => return Ok(oid),
            Err(StoreError::RefNotFound { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }

    Err(ResolveError::NotFound { expr: base.into() })
}

fn apply_modifier(
    store: &ObjectStore,
    current: &Oid,
    modifier: Modifier,
    expr: &str,
) -> Result<Oid, ResolveError> {
    let commit_parent = |oid: &Oid, n: usize| -> Result<Oid, ResolveError> {
        let commit = match store.get(oid)? {
            crate::core::object::Object::Commit(c) => c,
            _ => return Err(ResolveError::NotACommit { oid: oid.clone() }),
        };
        commit
            .parent(n)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound { expr: expr.into() })
    };

    match modifier {
        Modifier::Generations(n) => {
            let mut oid = current.clone();
            for _ in 0..n {
                oid = commit_parent(&oid, 0)?;
            }
            Ok(oid)
        }
        Modifier::Parent(n) => {
            if n == 0 {
                // ^0 selects the commit itself, matching git.
                return Ok(current.clone());
            }
            commit_parent(current, n - 1)
        }
    }
}
