//! `mg cycles` — cycles in the dependency and inheritance relations.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::{Args, ValueEnum};
use modgraph_core::graph::RelationGraph;
use modgraph_core::graph::cycles::find_all_cycles;
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{OutputMode, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CycleScope {
    /// Both relations.
    #[default]
    All,
    /// `DEPENDS_ON` edges between packages.
    Deps,
    /// `EXTENDS` and `DELEGATES` edges between entities.
    Inheritance,
}

#[derive(Args, Debug, Default)]
pub struct CyclesArgs {
    /// Which relation to check.
    #[arg(long, value_enum, default_value_t)]
    pub scope: CycleScope,

    /// Only report cycles involving this identity.
    #[arg(long)]
    pub involving: Option<String>,
}

#[derive(Debug, Serialize)]
struct CycleRecord {
    relation: &'static str,
    path: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CyclesOutput {
    cycles: Vec<CycleRecord>,
}

/// Execute `mg cycles`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or the store cannot
/// be read.
pub fn run_cycles(args: &CyclesArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;
    let graph = project.open_graph()?;

    let mut findings = Vec::new();
    if matches!(args.scope, CycleScope::All | CycleScope::Deps) {
        findings.extend(find_all_cycles(&RelationGraph::dependencies(&graph)?));
    }
    if matches!(args.scope, CycleScope::All | CycleScope::Inheritance) {
        findings.extend(find_all_cycles(&RelationGraph::inheritance(&graph)?));
    }

    if let Some(identity) = &args.involving {
        findings.retain(|finding| finding.involves(identity));
    }

    let payload = CyclesOutput {
        cycles: findings
            .into_iter()
            .map(|finding| CycleRecord {
                relation: finding.relation,
                path: finding.path,
            })
            .collect(),
    };

    render(output, &payload, |payload, w| {
        if payload.cycles.is_empty() {
            writeln!(w, "No cycles found.")?;
            return Ok(());
        }
        writeln!(w, "Cycles ({})", payload.cycles.len())?;
        for (idx, cycle) in payload.cycles.iter().enumerate() {
            writeln!(
                w,
                "\nCycle {} [{}]: {}",
                idx + 1,
                cycle.relation,
                cycle.path.join(" -> ")
            )?;
        }
        Ok(())
    })
}
