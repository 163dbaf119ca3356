//! Labeled-property graph schema over SQLite.
//!
//! Two tables model the graph:
//! - `nodes` keys every node by `(kind, identity)` — identity strings, not
//!   row ids — with attributes as a JSON blob and a `pending` marker for
//!   forward-reference placeholders
//! - `edges` keys every relationship by `(src, dst, kind)` so re-running an
//!   unchanged batch merges instead of duplicating
//! - `store_meta` tracks schema version and the last completed run

/// Migration v1: node and edge tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    kind            TEXT NOT NULL CHECK (kind IN ('package', 'entity', 'template')),
    identity        TEXT NOT NULL CHECK (length(trim(identity)) > 0),
    attrs           TEXT NOT NULL DEFAULT '{}',
    fingerprint     TEXT,
    pending         INTEGER NOT NULL DEFAULT 0 CHECK (pending IN (0, 1)),
    last_indexed_us INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (kind, identity)
);

CREATE TABLE IF NOT EXISTS edges (
    src_kind     TEXT NOT NULL,
    src_identity TEXT NOT NULL,
    dst_kind     TEXT NOT NULL,
    dst_identity TEXT NOT NULL,
    kind         TEXT NOT NULL CHECK (length(trim(kind)) > 0),
    ordinal      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (src_kind, src_identity, dst_kind, dst_identity, kind),
    FOREIGN KEY (src_kind, src_identity) REFERENCES nodes(kind, identity),
    FOREIGN KEY (dst_kind, dst_identity) REFERENCES nodes(kind, identity)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version  INTEGER NOT NULL,
    last_run_us     INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, last_run_us)
VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes for traversal queries.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_edges_src
    ON edges(src_kind, src_identity, kind, ordinal);

CREATE INDEX IF NOT EXISTS idx_edges_dst
    ON edges(dst_kind, dst_identity, kind);

CREATE INDEX IF NOT EXISTS idx_nodes_pending
    ON nodes(pending) WHERE pending = 1;

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Latest schema version written by the migrations above.
pub const LATEST_SCHEMA_VERSION: i64 = 2;

/// Indexes expected by the traversal query paths.
pub const REQUIRED_INDEXES: &[&str] = &["idx_edges_src", "idx_edges_dst", "idx_nodes_pending"];

#[cfg(test)]
mod tests {
    use crate::store::GraphStore;

    fn query_plan_details(
        conn: &rusqlite::Connection,
        sql: &str,
    ) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}"))?;
        stmt.query_map([], |row| row.get::<_, String>(3))?
            .collect::<Result<Vec<_>, _>>()
    }

    #[test]
    fn query_plan_uses_outgoing_edge_index() {
        let store = GraphStore::open_in_memory().expect("open store");
        let details = query_plan_details(
            store.conn(),
            "SELECT dst_identity
             FROM edges
             WHERE src_kind = 'package' AND src_identity = 'sale' AND kind = 'DEPENDS_ON'
             ORDER BY ordinal",
        )
        .expect("explain");

        assert!(
            details.iter().any(|d| d.contains("idx_edges_src")),
            "expected outgoing edge index in plan, got: {details:?}"
        );
    }

    #[test]
    fn query_plan_uses_incoming_edge_index() {
        let store = GraphStore::open_in_memory().expect("open store");
        let details = query_plan_details(
            store.conn(),
            "SELECT src_identity
             FROM edges
             WHERE dst_kind = 'package' AND dst_identity = 'sale' AND kind = 'DEPENDS_ON'",
        )
        .expect("explain");

        assert!(
            details.iter().any(|d| d.contains("idx_edges_dst")),
            "expected incoming edge index in plan, got: {details:?}"
        );
    }
}
