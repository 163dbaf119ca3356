//! Structural queries over the graph store.
//!
//! Traversals load neighbor lists from SQLite on demand instead of
//! materializing the full graph. `DEPENDS_ON` and `EXTENDS` neighbors come
//! back ordered by the declaration ordinal, so closures and chains reproduce
//! source order deterministically.
//!
//! Every entry point returns `Ok(None)` when the root node is absent, which
//! callers turn into their own not-found error.

use std::collections::{HashSet, VecDeque};

use anyhow::{Context, Result};
use rusqlite::params;

use crate::model::{EdgeKind, NodeKind};
use crate::store::GraphStore;

/// One package in a dependency closure, with its BFS depth from the root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClosureEntry {
    pub identity: String,
    pub depth: usize,
}

/// Outgoing neighbors of `(kind, identity)` over `edge`, in ordinal order.
fn neighbors_out(
    store: &GraphStore,
    kind: NodeKind,
    identity: &str,
    edge: EdgeKind,
) -> Result<Vec<String>> {
    let mut stmt = store
        .conn()
        .prepare_cached(
            "SELECT dst_identity FROM edges
             WHERE src_kind = ?1 AND src_identity = ?2 AND kind = ?3
             ORDER BY ordinal, dst_identity",
        )
        .context("prepare outgoing neighbor query")?;
    let rows = stmt
        .query_map(params![kind.as_str(), identity, edge.as_str()], |row| {
            row.get::<_, String>(0)
        })
        .context("query outgoing neighbors")?;
    rows.collect::<rusqlite::Result<_>>()
        .context("read outgoing neighbors")
}

/// Incoming neighbors, ordered by source identity.
fn neighbors_in(
    store: &GraphStore,
    kind: NodeKind,
    identity: &str,
    edge: EdgeKind,
) -> Result<Vec<String>> {
    let mut stmt = store
        .conn()
        .prepare_cached(
            "SELECT src_identity FROM edges
             WHERE dst_kind = ?1 AND dst_identity = ?2 AND kind = ?3
             ORDER BY src_identity",
        )
        .context("prepare incoming neighbor query")?;
    let rows = stmt
        .query_map(params![kind.as_str(), identity, edge.as_str()], |row| {
            row.get::<_, String>(0)
        })
        .context("query incoming neighbors")?;
    rows.collect::<rusqlite::Result<_>>()
        .context("read incoming neighbors")
}

/// Transitive dependency closure of a package, breadth-first, excluding the
/// root itself. Each package appears once, at its minimum depth. `None` when
/// the package is unknown.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn dependency_closure(
    store: &GraphStore,
    package: &str,
    max_depth: Option<usize>,
) -> Result<Option<Vec<ClosureEntry>>> {
    if store.descriptor(NodeKind::Package, package)?.is_none() {
        return Ok(None);
    }

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::from([package.to_string()]);
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(package.to_string(), 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|limit| depth >= limit) {
            continue;
        }
        for dep in neighbors_out(store, NodeKind::Package, &current, EdgeKind::DependsOn)? {
            if seen.insert(dep.clone()) {
                out.push(ClosureEntry {
                    identity: dep.clone(),
                    depth: depth + 1,
                });
                queue.push_back((dep, depth + 1));
            }
        }
    }
    Ok(Some(out))
}

/// Packages that depend on `package`, breadth-first over reversed
/// `DEPENDS_ON` edges. Placeholder-only packages count: a dependency edge
/// into a package is evidence of a dependent even before the package's own
/// manifest is indexed.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn dependents_of(
    store: &GraphStore,
    package: &str,
    max_depth: Option<usize>,
) -> Result<Option<Vec<ClosureEntry>>> {
    if store.descriptor(NodeKind::Package, package)?.is_none() {
        return Ok(None);
    }

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::from([package.to_string()]);
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(package.to_string(), 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|limit| depth >= limit) {
            continue;
        }
        for dependent in neighbors_in(store, NodeKind::Package, &current, EdgeKind::DependsOn)? {
            if seen.insert(dependent.clone()) {
                out.push(ClosureEntry {
                    identity: dependent.clone(),
                    depth: depth + 1,
                });
                queue.push_back((dependent, depth + 1));
            }
        }
    }
    Ok(Some(out))
}

/// Identities of a given kind owned by `package`, sorted. `None` when the
/// package is unknown.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn owned_by_package(
    store: &GraphStore,
    package: &str,
    kind: NodeKind,
) -> Result<Option<Vec<String>>> {
    if store.descriptor(NodeKind::Package, package)?.is_none() {
        return Ok(None);
    }

    let mut stmt = store
        .conn()
        .prepare_cached(
            "SELECT src_identity FROM edges
             WHERE dst_kind = 'package' AND dst_identity = ?1
               AND kind = ?2 AND src_kind = ?3
             ORDER BY src_identity",
        )
        .context("prepare ownership query")?;
    let rows = stmt
        .query_map(
            params![package, EdgeKind::OwnedBy.as_str(), kind.as_str()],
            |row| row.get::<_, String>(0),
        )
        .context("query owned identities")?;
    let out = rows
        .collect::<rusqlite::Result<_>>()
        .context("read owned identities")?;
    Ok(Some(out))
}

/// Entities defined in a package.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn entities_in_package(store: &GraphStore, package: &str) -> Result<Option<Vec<String>>> {
    owned_by_package(store, package, NodeKind::Entity)
}

/// Templates defined in a package.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn templates_in_package(store: &GraphStore, package: &str) -> Result<Option<Vec<String>>> {
    owned_by_package(store, package, NodeKind::Template)
}

/// Linearized inheritance chain of an entity: the entity itself, then its
/// `EXTENDS` parents preorder depth-first in declaration order, then any
/// `DELEGATES` targets the same way. Revisits are suppressed, so diamond
/// hierarchies list each ancestor once and a cyclic hierarchy terminates.
/// `None` when the entity is unknown.
///
/// # Errors
///
/// Returns an error if a store query fails.
pub fn inheritance_chain(store: &GraphStore, entity: &str) -> Result<Option<Vec<String>>> {
    if store.descriptor(NodeKind::Entity, entity)?.is_none() {
        return Ok(None);
    }

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    walk_ancestors(store, entity, &mut seen, &mut chain)?;
    Ok(Some(chain))
}

fn walk_ancestors(
    store: &GraphStore,
    entity: &str,
    seen: &mut HashSet<String>,
    chain: &mut Vec<String>,
) -> Result<()> {
    if !seen.insert(entity.to_string()) {
        return Ok(());
    }
    chain.push(entity.to_string());
    for parent in neighbors_out(store, NodeKind::Entity, entity, EdgeKind::Extends)? {
        walk_ancestors(store, &parent, seen, chain)?;
    }
    for delegate in neighbors_out(store, NodeKind::Entity, entity, EdgeKind::Delegates)? {
        walk_ancestors(store, &delegate, seen, chain)?;
    }
    Ok(())
}
