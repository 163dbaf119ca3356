//! Command handlers for the `mg` binary.
//!
//! Each command lives in its own module with a clap `Args` struct, a
//! `run_*` entry point taking `(args, output, project_root)`, and a
//! serializable payload rendered through [`crate::output`].

pub mod chain;
pub mod cycles;
pub mod deps;
pub mod index;
pub mod init;
pub mod rdeps;
pub mod reset;
pub mod show;
pub mod stats;

use std::path::Path;

use modgraph_core::ErrorCode;

use crate::output::{CliError, OutputMode, fail};
use crate::project::Project;

/// Discover the project or render a not-initialized error.
pub fn require_project(output: OutputMode, project_root: &Path) -> anyhow::Result<Project> {
    match Project::discover(project_root)? {
        Some(project) => Ok(project),
        None => fail(
            output,
            &CliError::new(ErrorCode::NotInitialized, "no .modgraph/ directory found"),
        ),
    }
}
