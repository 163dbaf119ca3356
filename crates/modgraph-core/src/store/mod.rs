//! Embedded graph store.
//!
//! The store is consumed through two narrow surfaces: MERGE-style upserts
//! (this module and [`writer`]) and traversal queries ([`crate::query`],
//! [`crate::graph`]). Everything else — storage engine, file format — is
//! SQLite's business.
//!
//! # Merge semantics
//!
//! `merge_node` is upsert-by-`(kind, identity)`: mutable attributes and the
//! fingerprint are overwritten, creation is implicit, and the `pending`
//! placeholder marker clears because the real write reuses the same row.
//! `merge_edge` merges on `(src, dst, kind)`, so rewriting an unchanged
//! batch creates no duplicate edges.

pub mod schema;
pub mod writer;

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::model::{CanonicalEdge, CanonicalNode, FullNode, NodeDescriptor, NodeKind, NodeRef};

/// Node/edge tallies for stats reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    /// Node counts per kind label.
    pub nodes: Vec<(String, i64)>,
    /// Edge counts per kind label.
    pub edges: Vec<(String, i64)>,
    /// Placeholder nodes still awaiting their real definition.
    pub pending: i64,
}

impl StoreStats {
    /// Total node count across kinds.
    #[must_use]
    pub fn total_nodes(&self) -> i64 {
        self.nodes.iter().map(|(_, n)| n).sum()
    }

    /// Total edge count across kinds.
    #[must_use]
    pub fn total_edges(&self) -> i64 {
        self.edges.iter().map(|(_, n)| n).sum()
    }
}

/// Handle on the graph database.
#[derive(Debug)]
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open (or create) the graph store at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open graph store {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory graph store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .context("enable foreign keys")?;
        migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Read access to the underlying connection for query modules and tests.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction. The batch writer commits one per group.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot begin the transaction.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn.transaction().context("begin graph transaction")
    }

    /// Fetch the fully populated node, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_node(&self, kind: NodeKind, identity: &str) -> Result<Option<FullNode>> {
        self.conn
            .query_row(
                "SELECT attrs, fingerprint, pending, last_indexed_us
                 FROM nodes WHERE kind = ?1 AND identity = ?2",
                params![kind.as_str(), identity],
                |row| {
                    let attrs: String = row.get(0)?;
                    Ok(FullNode {
                        descriptor: NodeDescriptor {
                            kind,
                            identity: identity.to_string(),
                            pending: row.get(2)?,
                        },
                        attrs: serde_json::from_str(&attrs)
                            .unwrap_or(serde_json::Value::Null),
                        fingerprint: row.get(1)?,
                        last_indexed_us: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("find node by identity")
    }

    /// Lightweight existence/pending probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn descriptor(&self, kind: NodeKind, identity: &str) -> Result<Option<NodeDescriptor>> {
        self.conn
            .query_row(
                "SELECT pending FROM nodes WHERE kind = ?1 AND identity = ?2",
                params![kind.as_str(), identity],
                |row| {
                    Ok(NodeDescriptor {
                        kind,
                        identity: identity.to_string(),
                        pending: row.get(0)?,
                    })
                },
            )
            .optional()
            .context("probe node descriptor")
    }

    /// Every placeholder node still awaiting its real definition. These are
    /// the dangling references surfaced at end of run.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_nodes(&self) -> Result<Vec<NodeDescriptor>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT kind, identity FROM nodes WHERE pending = 1
                 ORDER BY kind, identity",
            )
            .context("prepare pending query")?;
        let rows = stmt
            .query_map([], |row| {
                let kind: String = row.get(0)?;
                let identity: String = row.get(1)?;
                Ok((kind, identity))
            })
            .context("query pending nodes")?;

        let mut out = Vec::new();
        for row in rows {
            let (kind, identity) = row.context("read pending row")?;
            if let Some(kind) = NodeKind::parse(&kind) {
                out.push(NodeDescriptor {
                    kind,
                    identity,
                    pending: true,
                });
            }
        }
        Ok(out)
    }

    /// Node and edge tallies per kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a count query fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM nodes WHERE pending = 0 GROUP BY kind ORDER BY kind")
            .context("prepare node counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("query node counts")?;
        for row in rows {
            stats.nodes.push(row.context("read node count")?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM edges GROUP BY kind ORDER BY kind")
            .context("prepare edge counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("query edge counts")?;
        for row in rows {
            stats.edges.push(row.context("read edge count")?);
        }

        stats.pending = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes WHERE pending = 1", [], |row| {
                row.get(0)
            })
            .context("count pending nodes")?;

        Ok(stats)
    }

    /// Record run completion time in store metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn record_run(&self, now_us: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE store_meta SET last_run_us = ?1 WHERE id = 1",
                params![now_us],
            )
            .context("record run completion")?;
        Ok(())
    }

    /// Completion time of the last run in microseconds, 0 when no run has
    /// completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata query fails.
    pub fn last_run_us(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT last_run_us FROM store_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .context("read last run time")
    }

    /// Explicit administrative wipe of all graph data. Never invoked by
    /// ordinary re-indexing.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM edges", [])
            .context("clear edges")?;
        self.conn
            .execute("DELETE FROM nodes", [])
            .context("clear nodes")?;
        Ok(())
    }
}

/// Apply pending migrations, tracked via `user_version`.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("read user_version")?;

    if version < 1 {
        conn.execute_batch(schema::MIGRATION_V1_SQL)
            .context("apply graph schema v1")?;
    }
    if version < 2 {
        conn.execute_batch(schema::MIGRATION_V2_SQL)
            .context("apply graph schema v2")?;
    }
    if version < schema::LATEST_SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", schema::LATEST_SCHEMA_VERSION)
            .context("bump user_version")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge primitives (shared by the writer's transactional path and tests)
// ---------------------------------------------------------------------------

/// Upsert one node by `(kind, identity)`. Overwrites mutable attributes and
/// fingerprint; clears the `pending` marker because the real definition has
/// arrived.
pub(crate) fn merge_node(
    conn: &Connection,
    node: &CanonicalNode,
    now_us: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO nodes (kind, identity, attrs, fingerprint, pending, last_indexed_us)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)
         ON CONFLICT(kind, identity) DO UPDATE SET
            attrs = excluded.attrs,
            fingerprint = excluded.fingerprint,
            pending = 0,
            last_indexed_us = excluded.last_indexed_us",
        params![
            node.node.kind.as_str(),
            node.node.identity,
            node.attrs.to_string(),
            node.fingerprint,
            now_us
        ],
    )?;
    Ok(())
}

/// Ensure an edge target exists, creating a `pending` placeholder carrying
/// only the identity when it does not. An existing row — real or
/// placeholder — is left untouched.
pub(crate) fn merge_placeholder(conn: &Connection, node: &NodeRef) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO nodes (kind, identity, pending, last_indexed_us)
         VALUES (?1, ?2, 1, 0)
         ON CONFLICT(kind, identity) DO NOTHING",
        params![node.kind.as_str(), node.identity],
    )?;
    Ok(())
}

/// Upsert one edge by `(src, dst, kind)`, refreshing the ordinal.
pub(crate) fn merge_edge(conn: &Connection, edge: &CanonicalEdge) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO edges (src_kind, src_identity, dst_kind, dst_identity, kind, ordinal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(src_kind, src_identity, dst_kind, dst_identity, kind) DO UPDATE SET
            ordinal = excluded.ordinal",
        params![
            edge.src.kind.as_str(),
            edge.src.identity,
            edge.dst.kind.as_str(),
            edge.dst.identity,
            edge.kind.as_str(),
            edge.ordinal
        ],
    )?;
    Ok(())
}
