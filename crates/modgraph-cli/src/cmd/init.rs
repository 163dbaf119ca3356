//! `mg init` — create the `.modgraph/` index directory.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use modgraph_core::ProjectConfig;
use serde::Serialize;

use crate::output::{OutputMode, render};
use crate::project::INDEX_DIR;

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Reinitialize even if `.modgraph/` already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    index_dir: String,
    reinitialized: bool,
}

const GITIGNORE: &str = "graph.db\nstate.db\nindex.lock\n";

/// Execute `mg init`. Creates:
///
/// ```text
/// .modgraph/
///   modgraph.toml   (default config)
///   .gitignore      (graph.db, state.db, index.lock)
/// ```
///
/// The databases themselves are created lazily by the first `mg index`.
///
/// # Errors
///
/// Returns an error if `.modgraph/` already exists without `--force`, or if
/// a filesystem operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let index_dir = project_root.join(INDEX_DIR);
    let existed = index_dir.exists();

    if existed && !args.force {
        anyhow::bail!(".modgraph/ already exists. Use `mg init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&index_dir)
        .with_context(|| format!("create index directory {}", index_dir.display()))?;
    ProjectConfig::default().save(&index_dir)?;
    std::fs::write(index_dir.join(".gitignore"), GITIGNORE).context("write .gitignore")?;

    let payload = InitOutput {
        index_dir: index_dir.display().to_string(),
        reinitialized: existed,
    };
    render(output, &payload, |out, w| {
        if out.reinitialized {
            writeln!(w, "Reinitialized {}", out.index_dir)
        } else {
            writeln!(w, "Initialized {}", out.index_dir)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_config_and_gitignore() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        run_init(&InitArgs::default(), OutputMode::Text, dir.path()).expect("init");

        let index_dir = dir.path().join(INDEX_DIR);
        assert!(index_dir.join("modgraph.toml").is_file());
        assert!(index_dir.join(".gitignore").is_file());
    }

    #[test]
    fn second_init_requires_force() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        run_init(&InitArgs::default(), OutputMode::Text, dir.path()).expect("first init");
        assert!(run_init(&InitArgs::default(), OutputMode::Text, dir.path()).is_err());
        run_init(&InitArgs { force: true }, OutputMode::Text, dir.path())
            .expect("forced reinit");
    }
}
