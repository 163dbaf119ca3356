use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the config file looked up in the index directory.
pub const CONFIG_FILE: &str = "modgraph.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Tuning knobs for the indexing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum nodes + edges per write transaction. Bounds transaction size
    /// even when one unit yields many relations.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-unit extraction time budget in milliseconds. Overrun marks the
    /// unit `Failed: timeout` without stalling the batch.
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,

    /// Number of retries for a failed write group before its units are
    /// marked failed.
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parse_timeout_ms: default_parse_timeout_ms(),
            write_retries: default_write_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File name of the graph store inside the index directory.
    #[serde(default = "default_graph_db")]
    pub graph_db: String,

    /// File name of the change-detection store inside the index directory.
    #[serde(default = "default_state_db")]
    pub state_db: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            graph_db: default_graph_db(),
            state_db: default_state_db(),
        }
    }
}

const fn default_batch_size() -> usize {
    500
}

const fn default_parse_timeout_ms() -> u64 {
    10_000
}

const fn default_write_retries() -> u32 {
    1
}

fn default_graph_db() -> String {
    "graph.db".to_string()
}

fn default_state_db() -> String {
    "state.db".to_string()
}

impl ProjectConfig {
    /// Load config from `<index_dir>/modgraph.toml`, falling back to defaults
    /// when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Serialize and write the config to `<index_dir>/modgraph.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        let path = index_dir.join(CONFIG_FILE);
        let raw = toml::to_string_pretty(self).context("serialize config")?;
        std::fs::write(&path, raw).with_context(|| format!("write config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ProjectConfig::default();
        assert_eq!(cfg.index.batch_size, 500);
        assert_eq!(cfg.index.write_retries, 1);
        assert_eq!(cfg.store.graph_db, "graph.db");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        let cfg = ProjectConfig::load(dir.path()).expect("load defaults");
        assert_eq!(cfg.index.batch_size, 500);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[index]\nbatch_size = 64\n",
        )
        .expect("write config");

        let cfg = ProjectConfig::load(dir.path()).expect("load config");
        assert_eq!(cfg.index.batch_size, 64);
        assert_eq!(cfg.index.parse_timeout_ms, 10_000);
        assert_eq!(cfg.store.state_db, "state.db");
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        let mut cfg = ProjectConfig::default();
        cfg.index.batch_size = 128;
        cfg.save(dir.path()).expect("save config");

        let loaded = ProjectConfig::load(dir.path()).expect("load config");
        assert_eq!(loaded.index.batch_size, 128);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE), "[index\nbatch_size").expect("write");
        assert!(ProjectConfig::load(dir.path()).is_err());
    }
}
