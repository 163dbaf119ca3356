//! `mg deps` — dependency closure of a package.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use modgraph_core::ErrorCode;
use modgraph_core::query::{ClosureEntry, dependency_closure};
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{CliError, OutputMode, fail, render};

#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Package to query.
    pub package: String,

    /// Follow dependencies transitively instead of listing direct ones.
    #[arg(short, long)]
    pub recursive: bool,

    /// Depth limit for recursive traversal (unlimited by default).
    #[arg(long, requires = "recursive")]
    pub depth: Option<usize>,
}

#[derive(Debug, Serialize)]
struct DepsOutput {
    package: String,
    recursive: bool,
    dependencies: Vec<ClosureEntry>,
}

/// Execute `mg deps`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or the package is
/// unknown.
pub fn run_deps(args: &DepsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;
    let graph = project.open_graph()?;

    let max_depth = if args.recursive { args.depth } else { Some(1) };
    let Some(dependencies) = dependency_closure(&graph, &args.package, max_depth)? else {
        return fail(
            output,
            &CliError::new(
                ErrorCode::PackageNotFound,
                format!("package '{}' is not in the graph", args.package),
            ),
        );
    };

    let payload = DepsOutput {
        package: args.package.clone(),
        recursive: args.recursive,
        dependencies,
    };
    render(output, &payload, render_human)
}

fn render_human(payload: &DepsOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if payload.dependencies.is_empty() {
        writeln!(w, "{} has no dependencies", payload.package)?;
        return Ok(());
    }
    for entry in &payload.dependencies {
        if payload.recursive {
            writeln!(w, "{}{}", "  ".repeat(entry.depth - 1), entry.identity)?;
        } else {
            writeln!(w, "{}", entry.identity)?;
        }
    }
    Ok(())
}
