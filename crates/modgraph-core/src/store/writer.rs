//! Batched two-phase graph writes.
//!
//! Writes are grouped into bounded transactions. Each group runs in two
//! phases: nodes are merged first, then every edge endpoint is guaranteed to
//! exist (as a `pending` placeholder if its real definition has not been
//! written yet), then edges are merged. A later group's real node write
//! reconciles the placeholder in place, so groups can reference nodes in any
//! order without the run-wide ordering constraints a single transaction
//! would impose.
//!
//! A unit's fingerprint must only advance once everything it produced is
//! durable. The writer tracks how many groups each unit still has in flight
//! and fires the commit callback when the last one lands, so a failed group
//! leaves its units eligible for reparse on the next run.

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::model::{CanonicalEdge, CanonicalNode};
use crate::store::{GraphStore, merge_edge, merge_node, merge_placeholder};

/// Everything one source unit contributed to the graph, plus the bookkeeping
/// needed to advance its fingerprint after commit.
#[derive(Debug, Clone)]
pub struct UnitWrite {
    pub unit_path: String,
    pub fingerprint: String,
    pub summary: String,
    pub nodes: Vec<CanonicalNode>,
    pub edges: Vec<CanonicalEdge>,
}

/// Outcome of one write pass.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub nodes_written: usize,
    pub edges_written: usize,
    pub groups_committed: usize,
    /// Units whose group failed after retry. Their fingerprints were not
    /// advanced, so the next run reparses them.
    pub failed_units: Vec<String>,
}

enum Item<'a> {
    Node(&'a CanonicalNode),
    Edge(&'a CanonicalEdge),
}

/// Groups unit output into bounded transactions and commits them.
pub struct BatchWriter {
    batch_size: usize,
    write_retries: u32,
}

impl BatchWriter {
    #[must_use]
    pub const fn new(batch_size: usize, write_retries: u32) -> Self {
        Self {
            batch_size: if batch_size == 0 { 1 } else { batch_size },
            write_retries,
        }
    }

    /// Write all units, invoking `on_unit_committed` for each unit once its
    /// last group has committed.
    ///
    /// # Errors
    ///
    /// Returns an error only for non-write failures (transaction setup).
    /// Write failures are retried, then recorded per unit in the report.
    pub fn write_units(
        &self,
        store: &mut GraphStore,
        units: &[UnitWrite],
        now_us: i64,
        mut on_unit_committed: impl FnMut(&UnitWrite),
    ) -> Result<WriteReport> {
        let mut report = WriteReport::default();

        // Flatten loadable items, tagged with their owning unit.
        let mut items: Vec<(usize, Item<'_>)> = Vec::new();
        for (idx, unit) in units.iter().enumerate() {
            for node in &unit.nodes {
                if !node.excluded_from_load {
                    items.push((idx, Item::Node(node)));
                }
            }
            for edge in &unit.edges {
                if !edge.excluded_from_load {
                    items.push((idx, Item::Edge(edge)));
                }
            }
        }

        // Count groups per unit so fingerprints advance only after the last
        // group carrying the unit's output commits.
        let mut remaining_groups = vec![0_usize; units.len()];
        for group in items.chunks(self.batch_size) {
            let mut last: Option<usize> = None;
            for &(idx, _) in group {
                if last != Some(idx) {
                    remaining_groups[idx] += 1;
                    last = Some(idx);
                }
            }
        }

        // Units whose entire output was excluded still commit trivially.
        let mut failed = vec![false; units.len()];
        for (idx, unit) in units.iter().enumerate() {
            if remaining_groups[idx] == 0 {
                on_unit_committed(unit);
            }
        }

        for group in items.chunks(self.batch_size) {
            let group_ok = self.commit_group(store, group, now_us)?;
            if group_ok {
                report.groups_committed += 1;
                for &(_, ref item) in group {
                    match item {
                        Item::Node(_) => report.nodes_written += 1,
                        Item::Edge(_) => report.edges_written += 1,
                    }
                }
                let mut last: Option<usize> = None;
                for &(idx, _) in group {
                    if last == Some(idx) {
                        continue;
                    }
                    last = Some(idx);
                    remaining_groups[idx] -= 1;
                    if remaining_groups[idx] == 0 && !failed[idx] {
                        on_unit_committed(&units[idx]);
                    }
                }
            } else {
                for &(idx, _) in group {
                    failed[idx] = true;
                }
            }
        }

        for (idx, unit) in units.iter().enumerate() {
            if failed[idx] {
                report.failed_units.push(unit.unit_path.clone());
            }
        }
        Ok(report)
    }

    /// Commit one group, retrying on write failure. Returns whether the
    /// group landed.
    fn commit_group(
        &self,
        store: &mut GraphStore,
        group: &[(usize, Item<'_>)],
        now_us: i64,
    ) -> Result<bool> {
        let mut attempts = 0;
        loop {
            match Self::try_commit_group(store, group, now_us) {
                Ok(()) => {
                    debug!(items = group.len(), "write group committed");
                    return Ok(true);
                }
                Err(err) if attempts < self.write_retries => {
                    attempts += 1;
                    warn!(%err, attempt = attempts, "write group failed, retrying");
                }
                Err(err) => {
                    warn!(%err, "write group failed after retry, skipping");
                    return Ok(false);
                }
            }
        }
    }

    fn try_commit_group(
        store: &mut GraphStore,
        group: &[(usize, Item<'_>)],
        now_us: i64,
    ) -> Result<()> {
        let tx = store.transaction()?;

        // Phase one: real node definitions.
        for (_, item) in group {
            if let Item::Node(node) = item {
                merge_node(&tx, node, now_us).context("merge node")?;
            }
        }
        // Endpoints of every edge in the group must exist before the edge
        // row can be inserted. Placeholders stand in for definitions that
        // live in a later group or another unit.
        for (_, item) in group {
            if let Item::Edge(edge) = item {
                ensure_endpoints(&tx, edge)?;
            }
        }
        // Phase two: edges.
        for (_, item) in group {
            if let Item::Edge(edge) = item {
                merge_edge(&tx, edge).context("merge edge")?;
            }
        }

        tx.commit().context("commit write group")
    }
}

fn ensure_endpoints(conn: &Connection, edge: &CanonicalEdge) -> Result<()> {
    merge_placeholder(conn, &edge.src).context("merge src placeholder")?;
    merge_placeholder(conn, &edge.dst).context("merge dst placeholder")?;
    Ok(())
}
