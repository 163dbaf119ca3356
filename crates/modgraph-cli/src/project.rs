//! Project discovery: the `.modgraph/` index directory and its stores.

use std::path::{Path, PathBuf};

use anyhow::Result;
use modgraph_core::{ChangeStore, GraphStore, ProjectConfig};

/// Index directory created by `mg init` at the project root.
pub const INDEX_DIR: &str = ".modgraph";

/// An initialized project: the index directory plus its loaded config.
pub struct Project {
    pub index_dir: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Look for `.modgraph/` under `root`. `Ok(None)` when the project is
    /// not initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn discover(root: &Path) -> Result<Option<Self>> {
        let index_dir = root.join(INDEX_DIR);
        if !index_dir.is_dir() {
            return Ok(None);
        }
        let config = ProjectConfig::load(&index_dir)?;
        Ok(Some(Self { index_dir, config }))
    }

    #[must_use]
    pub fn graph_db_path(&self) -> PathBuf {
        self.index_dir.join(&self.config.store.graph_db)
    }

    #[must_use]
    pub fn state_db_path(&self) -> PathBuf {
        self.index_dir.join(&self.config.store.state_db)
    }

    /// Open the graph store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_graph(&self) -> Result<GraphStore> {
        GraphStore::open(&self.graph_db_path())
    }

    /// Open the change-tracking store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened (a corrupt file is
    /// recovered, not an error).
    pub fn open_changes(&self) -> Result<ChangeStore> {
        ChangeStore::open(&self.state_db_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_returns_none_without_index_dir() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        assert!(Project::discover(dir.path()).expect("discover").is_none());
    }

    #[test]
    fn discover_loads_defaults_when_config_missing() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::create_dir(dir.path().join(INDEX_DIR)).expect("mkdir");
        let project = Project::discover(dir.path())
            .expect("discover")
            .expect("initialized");
        assert_eq!(project.config.index.batch_size, 500);
        assert!(project.graph_db_path().ends_with(".modgraph/graph.db"));
    }
}
