//! In-memory relation graphs materialized from the store.
//!
//! Whole-graph analyses (cycle detection) walk the full edge set repeatedly,
//! so they run over an adjacency-list snapshot instead of per-node SQL
//! queries. Two snapshots matter:
//!
//! - **dependencies**: `DEPENDS_ON` edges between packages
//! - **inheritance**: `EXTENDS` and `DELEGATES` edges between entities
//!
//! A snapshot is immutable once built. Rebuild it after a write pass.

pub mod cycles;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::params;

use crate::model::{EdgeKind, NodeKind};
use crate::store::GraphStore;

/// Adjacency-list snapshot of one relation family.
#[derive(Debug, Clone)]
pub struct RelationGraph {
    label: &'static str,
    // BTreeMap keeps traversal order deterministic across runs.
    out: BTreeMap<String, Vec<String>>,
}

impl RelationGraph {
    /// Snapshot of `DEPENDS_ON` edges between packages.
    ///
    /// # Errors
    ///
    /// Returns an error if loading edges from the store fails.
    pub fn dependencies(store: &GraphStore) -> Result<Self> {
        Self::load(store, "dependency", NodeKind::Package, &[EdgeKind::DependsOn])
    }

    /// Snapshot of `EXTENDS` and `DELEGATES` edges between entities. Both
    /// relations pull ancestor state into the child, so a loop through
    /// either is unresolvable.
    ///
    /// # Errors
    ///
    /// Returns an error if loading edges from the store fails.
    pub fn inheritance(store: &GraphStore) -> Result<Self> {
        Self::load(
            store,
            "inheritance",
            NodeKind::Entity,
            &[EdgeKind::Extends, EdgeKind::Delegates],
        )
    }

    fn load(
        store: &GraphStore,
        label: &'static str,
        node_kind: NodeKind,
        edge_kinds: &[EdgeKind],
    ) -> Result<Self> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut stmt = store
            .conn()
            .prepare(
                "SELECT src_identity, dst_identity FROM edges
                 WHERE src_kind = ?1 AND kind = ?2
                 ORDER BY src_identity, ordinal, dst_identity",
            )
            .context("prepare relation snapshot query")?;
        for edge_kind in edge_kinds {
            let rows = stmt
                .query_map(params![node_kind.as_str(), edge_kind.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .context("query relation edges")?;
            for row in rows {
                let (src, dst) = row.context("read relation edge")?;
                out.entry(dst.clone()).or_default();
                out.entry(src).or_default().push(dst);
            }
        }
        Ok(Self { label, out })
    }

    /// Relation family name, used in findings and log lines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// All node identities, sorted.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.out.keys().map(String::as_str)
    }

    /// Outgoing neighbors in declaration order.
    #[must_use]
    pub fn neighbors(&self, id: &str) -> &[String] {
        self.out.get(id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.out.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.out.values().map(Vec::len).sum()
    }

    /// Whether the graph contains `id` (as source or target of any edge).
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.out.contains_key(id)
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(label: &'static str, pairs: &[(&str, &str)]) -> Self {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (src, dst) in pairs {
            out.entry((*dst).to_string()).or_default();
            out.entry((*src).to_string())
                .or_default()
                .push((*dst).to_string());
        }
        Self { label, out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_str;
    use crate::model::{CanonicalEdge, CanonicalNode, NodeRef};
    use crate::store::writer::{BatchWriter, UnitWrite};

    #[test]
    fn snapshot_keeps_declaration_order() {
        let mut store = GraphStore::open_in_memory().expect("open");
        let nodes = ["sale", "zz_first", "aa_second"]
            .map(NodeRef::package)
            .into_iter()
            .map(|node| CanonicalNode {
                attrs: serde_json::json!({}),
                fingerprint: fingerprint_str(&node.identity),
                excluded_from_load: false,
                node,
            })
            .collect();
        let edges = vec![
            CanonicalEdge {
                src: NodeRef::package("sale"),
                dst: NodeRef::package("zz_first"),
                kind: EdgeKind::DependsOn,
                ordinal: 0,
                excluded_from_load: false,
            },
            CanonicalEdge {
                src: NodeRef::package("sale"),
                dst: NodeRef::package("aa_second"),
                kind: EdgeKind::DependsOn,
                ordinal: 1,
                excluded_from_load: false,
            },
        ];
        BatchWriter::new(100, 0)
            .write_units(
                &mut store,
                &[UnitWrite {
                    unit_path: "seed".into(),
                    fingerprint: fingerprint_str("seed"),
                    summary: String::new(),
                    nodes,
                    edges,
                }],
                1,
                |_| {},
            )
            .expect("seed");

        let graph = RelationGraph::dependencies(&store).expect("snapshot");
        assert_eq!(graph.neighbors("sale"), ["zz_first", "aa_second"]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }
}
