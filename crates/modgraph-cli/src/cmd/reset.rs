//! `mg reset` — wipe graph and change-tracking state.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use modgraph_core::RunLock;
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{OutputMode, render};

#[derive(Args, Debug, Default)]
pub struct ResetArgs {
    /// Confirm the wipe. Without this flag the command refuses to run.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct ResetOutput {
    nodes_removed: i64,
    edges_removed: i64,
    units_forgotten: usize,
}

/// Execute `mg reset`. The next `mg index` run rebuilds everything from
/// scratch.
///
/// # Errors
///
/// Returns an error without `--yes`, when the project is not initialized,
/// or when another run holds the lock.
pub fn run_reset(args: &ResetArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    if !args.yes {
        anyhow::bail!("this deletes all indexed state; pass --yes to confirm");
    }

    let project = require_project(output, project_root)?;
    let _lock = RunLock::acquire(&project.index_dir, Duration::from_secs(10))?;

    let graph = project.open_graph()?;
    let changes = project.open_changes()?;

    let stats = graph.stats()?;
    let payload = ResetOutput {
        nodes_removed: stats.total_nodes() + stats.pending,
        edges_removed: stats.total_edges(),
        units_forgotten: changes.len()?,
    };

    graph.clear()?;
    changes.clear()?;

    render(output, &payload, |out, w| {
        writeln!(
            w,
            "removed {} nodes, {} edges; forgot {} unit fingerprints",
            out.nodes_removed, out.edges_removed, out.units_forgotten
        )
    })
}
