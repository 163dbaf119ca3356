//! `mg rdeps` — packages that depend on a package.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use modgraph_core::ErrorCode;
use modgraph_core::query::{ClosureEntry, dependents_of};
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{CliError, OutputMode, fail, render};

#[derive(Args, Debug)]
pub struct RdepsArgs {
    /// Package to query.
    pub package: String,

    /// Follow dependents transitively instead of listing direct ones.
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Debug, Serialize)]
struct RdepsOutput {
    package: String,
    recursive: bool,
    dependents: Vec<ClosureEntry>,
}

/// Execute `mg rdeps`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or the package is
/// unknown.
pub fn run_rdeps(args: &RdepsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;
    let graph = project.open_graph()?;

    let max_depth = if args.recursive { None } else { Some(1) };
    let Some(dependents) = dependents_of(&graph, &args.package, max_depth)? else {
        return fail(
            output,
            &CliError::new(
                ErrorCode::PackageNotFound,
                format!("package '{}' is not in the graph", args.package),
            ),
        );
    };

    let payload = RdepsOutput {
        package: args.package.clone(),
        recursive: args.recursive,
        dependents,
    };
    render(output, &payload, |payload, w| {
        if payload.dependents.is_empty() {
            writeln!(w, "nothing depends on {}", payload.package)
        } else {
            for entry in &payload.dependents {
                writeln!(w, "{}", entry.identity)?;
            }
            Ok(())
        }
    })
}
