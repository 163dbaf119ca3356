//! Change-Detection Store: durable `unit path → fingerprint` mapping.
//!
//! A flat SQLite table persisted between runs decides skip-vs-reparse per
//! unit. On the first run no rows exist, so every unit is considered
//! changed. Fingerprints are recorded only after the unit's graph batch
//! committed, which ties durability of the skip decision to durability of
//! the graph write.
//!
//! # Fail-safe
//!
//! If the store file is unreadable or corrupt it is moved aside and
//! recreated empty; the caller sees `recovered() == true` and the run
//! degrades to a full reindex. Corruption never causes silent skipping.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::ErrorCode;

const SCHEMA_VERSION: i64 = 2;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS unit_state (
    path         TEXT PRIMARY KEY,
    fingerprint  TEXT NOT NULL,
    summary      TEXT NOT NULL DEFAULT '',
    last_seen_us INTEGER NOT NULL,
    stale        INTEGER NOT NULL DEFAULT 0
);
";

/// V1 → V2: per-unit stale marker for units that vanished from the source.
const MIGRATE_V1_SQL: &str = "
ALTER TABLE unit_state ADD COLUMN stale INTEGER NOT NULL DEFAULT 0;
";

/// Persistent record of the last-seen fingerprint per source unit.
#[derive(Debug)]
pub struct ChangeStore {
    conn: Connection,
    recovered: bool,
}

impl ChangeStore {
    /// Open (or create) the store at `path`.
    ///
    /// A corrupt or unreadable database is moved to `<path>.corrupt` and a
    /// fresh one is created in its place.
    ///
    /// # Errors
    ///
    /// Returns an error only when even a fresh database cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        match Self::try_open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                tracing::warn!(
                    code = ErrorCode::CorruptChangeStore.code(),
                    path = %path.display(),
                    error = %e,
                    "change store unreadable; recreating and forcing full reindex"
                );
                let aside = path.with_extension("corrupt");
                std::fs::rename(path, &aside)
                    .with_context(|| format!("move corrupt change store to {}", aside.display()))?;
                let mut store = Self::try_open(path).context("recreate change store")?;
                store.recovered = true;
                Ok(store)
            }
        }
    }

    /// In-memory store for tests and one-shot full runs.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory change store")?;
        Self::init(conn)
    }

    fn try_open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        // A corrupt file typically fails here, on first real statement.
        let store = Self::init(conn)?;
        store
            .conn
            .query_row("SELECT COUNT(*) FROM unit_state", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("probe unit_state")?;
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self> {
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("read schema version")?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(SCHEMA_SQL).context("create unit_state")?;
            if version == 1 {
                conn.execute_batch(MIGRATE_V1_SQL)
                    .context("add stale column")?;
            }
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("set schema version")?;
        }
        Ok(Self {
            conn,
            recovered: false,
        })
    }

    /// True when the on-disk store had to be recreated after corruption.
    /// The current run must then treat every unit as changed.
    #[must_use]
    pub const fn recovered(&self) -> bool {
        self.recovered
    }

    /// Decide whether `unit_path` needs re-parsing given its current
    /// fingerprint. Unknown units and changed fingerprints both reparse.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup query fails.
    pub fn should_reparse(&self, unit_path: &str, fingerprint: &str) -> Result<bool> {
        if self.recovered {
            return Ok(true);
        }
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT fingerprint FROM unit_state WHERE path = ?1",
                params![unit_path],
                |row| row.get(0),
            )
            .optional()
            .context("look up unit fingerprint")?;
        Ok(stored.as_deref() != Some(fingerprint))
    }

    /// Record the fingerprint and extraction summary for a unit. Called only
    /// after the unit's graph batch has durably committed.
    ///
    /// Upsert is atomic per unit; concurrent writers for distinct units need
    /// no coordination beyond SQLite's own serialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn record_fingerprint(
        &self,
        unit_path: &str,
        fingerprint: &str,
        summary: &str,
        now_us: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO unit_state (path, fingerprint, summary, last_seen_us)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(path) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    summary = excluded.summary,
                    last_seen_us = excluded.last_seen_us,
                    stale = 0",
                params![unit_path, fingerprint, summary, now_us],
            )
            .context("record unit fingerprint")?;
        Ok(())
    }

    /// Last recorded extraction summary for a unit, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup query fails.
    pub fn summary_of(&self, unit_path: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT summary FROM unit_state WHERE path = ?1",
                params![unit_path],
                |row| row.get(0),
            )
            .optional()
            .context("look up unit summary")
    }

    /// Paths of every tracked unit, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tracked_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM unit_state ORDER BY path")
            .context("prepare tracked paths")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query tracked paths")?;
        rows.collect::<rusqlite::Result<_>>()
            .context("read tracked paths")
    }

    /// Replace the stale markers so that exactly `paths` are flagged.
    ///
    /// A unit is stale when an earlier run tracked it but the current source
    /// enumeration no longer contains it. Its graph records are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if an update fails.
    pub fn set_stale(&self, paths: &[String]) -> Result<()> {
        self.conn
            .execute("UPDATE unit_state SET stale = 0 WHERE stale != 0", [])
            .context("clear stale flags")?;
        let mut stmt = self
            .conn
            .prepare("UPDATE unit_state SET stale = 1 WHERE path = ?1")
            .context("prepare stale update")?;
        for path in paths {
            stmt.execute(params![path]).context("flag stale unit")?;
        }
        Ok(())
    }

    /// Paths currently flagged stale, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stale_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM unit_state WHERE stale = 1 ORDER BY path")
            .context("prepare stale paths")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query stale paths")?;
        rows.collect::<rusqlite::Result<_>>().context("read stale paths")
    }

    /// Number of tracked units currently flagged stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn stale_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM unit_state WHERE stale = 1",
                [],
                |row| row.get(0),
            )
            .context("count stale units")?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Number of tracked units.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM unit_state", [], |row| row.get(0))
            .context("count unit_state")?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// True when no units are tracked yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every tracked fingerprint (explicit full-reindex request).
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM unit_state", [])
            .context("clear unit_state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_str;

    #[test]
    fn first_run_reparses_everything() {
        let store = ChangeStore::open_in_memory().expect("open");
        assert!(
            store
                .should_reparse("sale/manifest.toml", &fingerprint_str("v1"))
                .expect("query")
        );
    }

    #[test]
    fn unchanged_fingerprint_skips() {
        let store = ChangeStore::open_in_memory().expect("open");
        let fp = fingerprint_str("v1");
        store
            .record_fingerprint("sale/manifest.toml", &fp, "1 package", 100)
            .expect("record");

        assert!(!store.should_reparse("sale/manifest.toml", &fp).expect("query"));
        assert!(
            store
                .should_reparse("sale/manifest.toml", &fingerprint_str("v2"))
                .expect("query")
        );
    }

    #[test]
    fn record_is_an_upsert() {
        let store = ChangeStore::open_in_memory().expect("open");
        store
            .record_fingerprint("a", &fingerprint_str("v1"), "", 1)
            .expect("record v1");
        store
            .record_fingerprint("a", &fingerprint_str("v2"), "2 entities", 2)
            .expect("record v2");

        assert_eq!(store.len().expect("len"), 1);
        assert_eq!(
            store.summary_of("a").expect("summary").as_deref(),
            Some("2 entities")
        );
        assert!(!store.should_reparse("a", &fingerprint_str("v2")).expect("query"));
    }

    #[test]
    fn clear_forgets_all_units() {
        let store = ChangeStore::open_in_memory().expect("open");
        store
            .record_fingerprint("a", &fingerprint_str("v1"), "", 1)
            .expect("record");
        store.clear().expect("clear");
        assert!(store.is_empty().expect("is_empty"));
        assert!(store.should_reparse("a", &fingerprint_str("v1")).expect("query"));
    }

    #[test]
    fn stale_flags_track_the_current_enumeration() {
        let store = ChangeStore::open_in_memory().expect("open");
        store
            .record_fingerprint("a", &fingerprint_str("v1"), "", 1)
            .expect("record a");
        store
            .record_fingerprint("b", &fingerprint_str("v1"), "", 1)
            .expect("record b");

        store.set_stale(&["b".to_string()]).expect("flag b");
        assert_eq!(store.stale_paths().expect("stale"), vec!["b".to_string()]);
        assert_eq!(store.stale_count().expect("count"), 1);
        assert_eq!(
            store.tracked_paths().expect("tracked"),
            vec!["a".to_string(), "b".to_string()]
        );

        // b reappears in the next enumeration.
        store.set_stale(&[]).expect("clear");
        assert_eq!(store.stale_count().expect("count"), 0);
    }

    #[test]
    fn reindexing_a_stale_unit_clears_its_flag() {
        let store = ChangeStore::open_in_memory().expect("open");
        store
            .record_fingerprint("a", &fingerprint_str("v1"), "", 1)
            .expect("record");
        store.set_stale(&["a".to_string()]).expect("flag");

        store
            .record_fingerprint("a", &fingerprint_str("v2"), "", 2)
            .expect("re-record");
        assert_eq!(store.stale_count().expect("count"), 0);
    }

    #[test]
    fn v1_store_gains_stale_column_on_open() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        let path = dir.path().join("state.db");
        {
            let conn = Connection::open(&path).expect("open raw");
            conn.execute_batch(
                "CREATE TABLE unit_state (
                     path         TEXT PRIMARY KEY,
                     fingerprint  TEXT NOT NULL,
                     summary      TEXT NOT NULL DEFAULT '',
                     last_seen_us INTEGER NOT NULL
                 );
                 INSERT INTO unit_state VALUES ('a', 'b3:old', '', 1);",
            )
            .expect("create v1 schema");
            conn.pragma_update(None, "user_version", 1).expect("set v1");
        }

        let store = ChangeStore::open(&path).expect("migrate");
        assert!(!store.recovered());
        assert_eq!(store.len().expect("len"), 1);
        assert_eq!(store.stale_count().expect("count"), 0);
        store.set_stale(&["a".to_string()]).expect("flag");
        assert_eq!(store.stale_paths().expect("stale"), vec!["a".to_string()]);
    }

    #[test]
    fn corrupt_file_is_moved_aside_and_recreated() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        let path = dir.path().join("state.db");
        std::fs::write(&path, b"this is not a sqlite database at all........")
            .expect("write garbage");

        let store = ChangeStore::open(&path).expect("recover");
        assert!(store.recovered());
        assert!(path.with_extension("corrupt").exists());
        // Recovered store fails safe: everything reparses.
        assert!(store.should_reparse("a", &fingerprint_str("v1")).expect("query"));
    }

    #[test]
    fn reopen_preserves_durable_entries() {
        let dir = tempfile::TempDir::new().expect("create tempdir");
        let path = dir.path().join("state.db");
        let fp = fingerprint_str("v1");

        {
            let store = ChangeStore::open(&path).expect("open");
            store
                .record_fingerprint("sale/manifest.toml", &fp, "", 10)
                .expect("record");
        }

        let store = ChangeStore::open(&path).expect("reopen");
        assert!(!store.recovered());
        assert!(!store.should_reparse("sale/manifest.toml", &fp).expect("query"));
    }
}
