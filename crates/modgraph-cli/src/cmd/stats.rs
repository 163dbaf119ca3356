//! `mg stats` — store totals and last run time.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{OutputMode, pretty_kv, pretty_rule, render_mode};

#[derive(Args, Debug, Default)]
pub struct StatsArgs {}

#[derive(Debug, Serialize)]
struct StatsOutput {
    nodes: Vec<(String, i64)>,
    edges: Vec<(String, i64)>,
    pending: i64,
    tracked_units: usize,
    /// Units still tracked whose source has vanished.
    stale_units: usize,
    last_run: Option<String>,
}

/// Execute `mg stats`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or a store cannot
/// be read.
pub fn run_stats(_args: &StatsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;
    let graph = project.open_graph()?;
    let changes = project.open_changes()?;

    let stats = graph.stats()?;
    let last_run_us = graph.last_run_us()?;
    let payload = StatsOutput {
        nodes: stats.nodes,
        edges: stats.edges,
        pending: stats.pending,
        tracked_units: changes.len()?,
        stale_units: changes.stale_count()?,
        last_run: (last_run_us > 0)
            .then(|| DateTime::<Utc>::from_timestamp_micros(last_run_us))
            .flatten()
            .map(|t| t.to_rfc3339()),
    };

    render_mode(output, &payload, render_text, render_pretty)
}

fn render_text(payload: &StatsOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for (kind, count) in &payload.nodes {
        writeln!(w, "nodes.{kind}\t{count}")?;
    }
    for (kind, count) in &payload.edges {
        writeln!(w, "edges.{kind}\t{count}")?;
    }
    writeln!(w, "pending\t{}", payload.pending)?;
    writeln!(w, "tracked_units\t{}", payload.tracked_units)?;
    writeln!(w, "stale_units\t{}", payload.stale_units)?;
    writeln!(w, "last_run\t{}", payload.last_run.as_deref().unwrap_or("-"))
}

fn render_pretty(payload: &StatsOutput, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "Graph store")?;
    pretty_rule(w)?;
    for (kind, count) in &payload.nodes {
        pretty_kv(w, &format!("{kind} nodes"), count.to_string())?;
    }
    for (kind, count) in &payload.edges {
        pretty_kv(w, &format!("{kind} edges"), count.to_string())?;
    }
    pretty_kv(w, "pending", payload.pending.to_string())?;
    pretty_kv(w, "tracked units", payload.tracked_units.to_string())?;
    pretty_kv(w, "stale units", payload.stale_units.to_string())?;
    pretty_kv(w, "last run", payload.last_run.as_deref().unwrap_or("never"))?;
    Ok(())
}
