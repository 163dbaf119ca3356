//! `mg index` — run the indexing pipeline over a fact file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use modgraph_core::lock::LockError;
use modgraph_core::{ErrorCode, IndexPipeline, JsonlFactSource, RunLock, RunReport};
use tracing::warn;

use crate::cmd::require_project;
use crate::output::{CliError, OutputMode, fail, pretty_kv, pretty_rule, render_mode};

/// How long `mg index` waits for a concurrent run to finish.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Fact file to index (newline-delimited JSON records).
    pub facts: PathBuf,

    /// Reindex every unit, ignoring recorded fingerprints.
    #[arg(long)]
    pub full: bool,
}

/// Execute `mg index`.
///
/// # Errors
///
/// Returns an error when the project is not initialized, the run lock
/// cannot be acquired, or the fact file cannot be read. Per-unit problems
/// are diagnostics on the rendered report; a run that ends with failed
/// units still renders the report, then exits non-zero.
pub fn run_index(args: &IndexArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;

    let _lock = match RunLock::acquire(&project.index_dir, LOCK_TIMEOUT) {
        Ok(lock) => lock,
        Err(err @ LockError::Timeout { .. }) => {
            return fail(output, &CliError::new(err.code(), err.to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let mut graph = project.open_graph()?;
    let changes = project.open_changes()?;
    if changes.recovered() {
        warn!("change store was corrupt and has been recreated; full reindex follows");
    }

    let source = Arc::new(JsonlFactSource::from_file(&args.facts)?);
    let report = IndexPipeline::new(&mut graph, &changes, &project.config.index)
        .force_full(args.full)
        .run(&source)?;

    render_mode(output, &report, render_text, render_pretty)?;
    if report.has_failures() {
        return fail(
            output,
            &CliError::new(
                run_failure_code(&report),
                format!(
                    "{} of {} units failed to index",
                    report.units_failed, report.units_seen
                ),
            ),
        );
    }
    Ok(())
}

/// Code for the run-level error when failed units remain, picked from the
/// failure-class diagnostics present on the report.
fn run_failure_code(report: &RunReport) -> ErrorCode {
    [
        ErrorCode::ExtractTimeout,
        ErrorCode::WriteFailure,
        ErrorCode::ParseError,
    ]
    .into_iter()
    .find(|code| report.diagnostics.iter().any(|d| d.code == code.code()))
    .unwrap_or(ErrorCode::WriteFailure)
}

fn render_text(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "indexed {} of {} units ({} skipped, {} failed) in {}ms: +{} nodes +{} edges",
        report.units_indexed,
        report.units_seen,
        report.units_skipped,
        report.units_failed,
        report.duration_ms,
        report.nodes_written,
        report.edges_written,
    )?;
    for diag in &report.diagnostics {
        writeln!(w, "{diag}")?;
    }
    Ok(())
}

fn render_pretty(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "Index run")?;
    pretty_rule(w)?;
    pretty_kv(w, "units", format!("{} seen", report.units_seen))?;
    pretty_kv(w, "indexed", report.units_indexed.to_string())?;
    pretty_kv(w, "skipped", report.units_skipped.to_string())?;
    pretty_kv(w, "failed", report.units_failed.to_string())?;
    pretty_kv(w, "nodes", report.nodes_written.to_string())?;
    pretty_kv(w, "edges", report.edges_written.to_string())?;
    pretty_kv(w, "dangling", report.dangling.to_string())?;
    pretty_kv(w, "stale", report.stale_units.len().to_string())?;
    pretty_kv(w, "duration", format!("{}ms", report.duration_ms))?;

    if !report.diagnostics.is_empty() {
        writeln!(w)?;
        writeln!(w, "Diagnostics ({})", report.diagnostics.len())?;
        pretty_rule(w)?;
        for diag in &report.diagnostics {
            writeln!(w, "  {diag}")?;
        }
    }
    Ok(())
}
