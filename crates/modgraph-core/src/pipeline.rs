//! End-to-end indexing run: change detection, extraction, normalization,
//! batched write.
//!
//! The pipeline never aborts on a bad unit. Failures become diagnostics on
//! the run report and the offending unit's fingerprint is left alone, so the
//! next run picks it up again.
//!
//! # Run shape
//!
//! 1. Enumerate source units, manifests first so package nodes usually land
//!    before the edges that reference them (placeholders cover the rest).
//!    Units tracked by earlier runs that are absent now are flagged stale,
//!    never purged.
//! 2. Extract raw facts for every unit and seed the resolver context from
//!    all of them. Extraction runs on a worker thread under a per-unit time
//!    budget; what the change store skips is normalization and writing.
//! 3. Normalize and write only units whose fingerprint changed (or all of
//!    them under a full rebuild).
//! 4. Advance fingerprints as units commit, then sweep placeholders that
//!    never received a definition into dangling-reference diagnostics.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::changes::ChangeStore;
use crate::config::IndexConfig;
use crate::error::{Diagnostic, ErrorCode, IndexError};
use crate::facts::{RawFact, parse_fact_lines};
use crate::fingerprint::fingerprint_str;
use crate::normalize::Normalizer;
use crate::store::GraphStore;
use crate::store::writer::{BatchWriter, UnitWrite};

/// Current wall clock in microseconds since the epoch.
#[must_use]
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Fact sources
// ---------------------------------------------------------------------------

/// One indexable source unit as reported by a fact source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Project-relative path identifying the unit.
    pub path: String,
    /// Content fingerprint of the unit's current facts.
    pub fingerprint: String,
    /// Whether the unit carries a package manifest. Manifest units are
    /// indexed first.
    pub manifest: bool,
}

/// Supplier of raw facts for a run. The pipeline stays agnostic of where
/// facts come from; extractors for real source trees and the fact-file
/// format used in tests both sit behind this.
pub trait FactSource {
    /// All units the source knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be enumerated.
    fn units(&self) -> Result<Vec<SourceUnit>>;

    /// Raw facts for one unit.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] when the unit cannot be extracted.
    fn extract(&self, unit: &SourceUnit) -> Result<Vec<RawFact>, IndexError>;

    /// Source-level findings (for example malformed lines) discovered while
    /// the source was loaded.
    fn source_diagnostics(&self) -> &[Diagnostic] {
        &[]
    }
}

struct UnitEntry {
    facts: Vec<RawFact>,
    fingerprint: String,
    manifest: bool,
}

/// Fact source backed by a newline-delimited JSON fact file.
///
/// Each line is one fact record. Facts are grouped by their `unit_path`; a
/// unit's fingerprint covers the canonical serialization of its own facts,
/// so edits to one unit leave every other unit's fingerprint untouched.
pub struct JsonlFactSource {
    units: BTreeMap<String, UnitEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl JsonlFactSource {
    /// Parse fact-file content. `origin` names the file in line-level
    /// diagnostics.
    #[must_use]
    pub fn parse(origin: &str, content: &str) -> Self {
        let (facts, line_errors) = parse_fact_lines(content);

        let diagnostics = line_errors
            .into_iter()
            .map(|(line, reason)| {
                Diagnostic::new(ErrorCode::ParseError, format!("{origin}:{line}"), reason)
            })
            .collect();

        let mut units: BTreeMap<String, UnitEntry> = BTreeMap::new();
        for fact in facts {
            let entry = units
                .entry(fact.unit_path().to_string())
                .or_insert_with(|| UnitEntry {
                    facts: Vec::new(),
                    fingerprint: String::new(),
                    manifest: false,
                });
            entry.manifest = entry.manifest || fact.is_manifest();
            entry.facts.push(fact);
        }

        for entry in units.values_mut() {
            let mut canonical = String::new();
            for fact in &entry.facts {
                canonical.push_str(&serde_json::to_string(fact).unwrap_or_default());
                canonical.push('\n');
            }
            entry.fingerprint = fingerprint_str(&canonical);
        }

        Self { units, diagnostics }
    }

    /// Load a fact file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read fact file {}", path.display()))?;
        Ok(Self::parse(&path.display().to_string(), &content))
    }
}

impl FactSource for JsonlFactSource {
    fn units(&self) -> Result<Vec<SourceUnit>> {
        Ok(self
            .units
            .iter()
            .map(|(path, entry)| SourceUnit {
                path: path.clone(),
                fingerprint: entry.fingerprint.clone(),
                manifest: entry.manifest,
            })
            .collect())
    }

    fn extract(&self, unit: &SourceUnit) -> Result<Vec<RawFact>, IndexError> {
        self.units
            .get(&unit.path)
            .map(|entry| entry.facts.clone())
            .ok_or_else(|| IndexError::Parse {
                unit: unit.path.clone(),
                reason: "unit disappeared from fact source".to_string(),
            })
    }

    fn source_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

// ---------------------------------------------------------------------------
// Extraction worker
// ---------------------------------------------------------------------------

type ExtractResult = Result<Vec<RawFact>, IndexError>;

/// Runs `FactSource::extract` on a dedicated thread so each unit's wait is
/// bounded by the configured budget. A worker that overruns is abandoned and
/// replaced; the abandoned thread's result send fails once the replacement's
/// receiver is in place, letting it exit when the extractor returns.
struct ExtractWorker<S> {
    source: Arc<S>,
    work_tx: mpsc::Sender<SourceUnit>,
    results: mpsc::Receiver<ExtractResult>,
}

impl<S: FactSource + Send + Sync + 'static> ExtractWorker<S> {
    fn spawn(source: Arc<S>) -> Self {
        let (work_tx, results) = Self::spawn_thread(&source);
        Self {
            source,
            work_tx,
            results,
        }
    }

    fn spawn_thread(
        source: &Arc<S>,
    ) -> (mpsc::Sender<SourceUnit>, mpsc::Receiver<ExtractResult>) {
        let (work_tx, work_rx) = mpsc::channel::<SourceUnit>();
        let (result_tx, result_rx) = mpsc::channel();
        let source = Arc::clone(source);
        thread::spawn(move || {
            while let Ok(unit) = work_rx.recv() {
                if result_tx.send(source.extract(&unit)).is_err() {
                    break;
                }
            }
        });
        (work_tx, result_rx)
    }

    fn extract(&mut self, unit: &SourceUnit, budget_ms: u64) -> ExtractResult {
        if self.work_tx.send(unit.clone()).is_err() {
            // Worker gone (extractor panicked); a fresh one can take the job.
            self.replace();
            let _ = self.work_tx.send(unit.clone());
        }
        match self.results.recv_timeout(Duration::from_millis(budget_ms)) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.replace();
                Err(IndexError::Timeout {
                    unit: unit.path.clone(),
                    budget_ms,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.replace();
                Err(IndexError::Parse {
                    unit: unit.path.clone(),
                    reason: "extraction worker terminated unexpectedly".to_string(),
                })
            }
        }
    }

    fn replace(&mut self) {
        let (work_tx, results) = Self::spawn_thread(&self.source);
        self.work_tx = work_tx;
        self.results = results;
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Outcome of one indexing run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RunReport {
    pub units_seen: usize,
    /// Units left alone because their fingerprint matched the change store.
    pub units_skipped: usize,
    pub units_indexed: usize,
    pub units_failed: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub groups_committed: usize,
    /// Placeholder nodes still unreconciled after the run.
    pub dangling: usize,
    /// Tracked units that vanished from the source this run. Flagged, not
    /// purged: their graph records survive until an explicit reset.
    pub stale_units: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether any unit failed outright (as opposed to producing warnings).
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.units_failed > 0
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives one indexing run over a fact source.
pub struct IndexPipeline<'a> {
    graph: &'a mut GraphStore,
    changes: &'a ChangeStore,
    config: &'a IndexConfig,
    /// Reindex every unit regardless of fingerprints.
    pub force_full: bool,
}

impl<'a> IndexPipeline<'a> {
    pub fn new(
        graph: &'a mut GraphStore,
        changes: &'a ChangeStore,
        config: &'a IndexConfig,
    ) -> Self {
        Self {
            graph,
            changes,
            config,
            force_full: false,
        }
    }

    #[must_use]
    pub const fn force_full(mut self, force: bool) -> Self {
        self.force_full = force;
        self
    }

    /// Run the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures (source
    /// enumeration, change store access). Per-unit problems become
    /// diagnostics on the report.
    pub fn run<S>(self, source: &Arc<S>) -> Result<RunReport>
    where
        S: FactSource + Send + Sync + 'static,
    {
        let started = Instant::now();
        let run_us = now_us();
        let mut report = RunReport {
            diagnostics: source.source_diagnostics().to_vec(),
            ..RunReport::default()
        };

        let mut units = source.units().context("enumerate source units")?;
        // Stable sort: manifests first, source order preserved within each
        // half.
        units.sort_by_key(|unit| !unit.manifest);
        report.units_seen = units.len();

        // Tracked units absent from this enumeration are flagged stale.
        // Their graph records are kept until an explicit reset.
        let present: HashSet<&str> = units.iter().map(|u| u.path.as_str()).collect();
        let vanished: Vec<String> = self
            .changes
            .tracked_paths()?
            .into_iter()
            .filter(|path| !present.contains(path.as_str()))
            .collect();
        self.changes.set_stale(&vanished)?;
        for path in &vanished {
            warn!(unit = path.as_str(), "tracked unit vanished from the source");
            report.diagnostics.push(Diagnostic::new(
                ErrorCode::StaleUnit,
                path,
                "unit no longer present in the source; its graph records are kept",
            ));
        }
        report.stale_units = vanished;

        // Extract everything up front. The resolver context has to see every
        // unit's facts, changed or not, or bare references and ephemeral
        // markers would resolve differently on incremental runs.
        let budget_ms = self.config.parse_timeout_ms;
        let mut worker = ExtractWorker::spawn(Arc::clone(source));
        let mut extracted: Vec<Option<Vec<RawFact>>> = Vec::with_capacity(units.len());
        let mut normalizer = Normalizer::new();
        for unit in &units {
            match worker.extract(unit, budget_ms) {
                Ok(facts) => {
                    for fact in &facts {
                        normalizer.observe(fact);
                    }
                    extracted.push(Some(facts));
                }
                Err(err) => {
                    warn!(unit = unit.path, "{err}");
                    report
                        .diagnostics
                        .push(Diagnostic::new(err.code(), &unit.path, err.to_string()));
                    report.units_failed += 1;
                    extracted.push(None);
                }
            }
        }

        // Normalize the units that need (re)indexing.
        let mut writes: Vec<UnitWrite> = Vec::new();
        for (unit, facts) in units.iter().zip(&extracted) {
            let Some(facts) = facts else { continue };

            if !self.force_full && !self.changes.should_reparse(&unit.path, &unit.fingerprint)? {
                debug!(unit = unit.path, "fingerprint unchanged, skipping");
                report.units_skipped += 1;
                continue;
            }

            let mut write = UnitWrite {
                unit_path: unit.path.clone(),
                fingerprint: unit.fingerprint.clone(),
                summary: String::new(),
                nodes: Vec::new(),
                edges: Vec::new(),
            };
            let mut summaries = Vec::new();
            for fact in facts {
                let normalized = normalizer.normalize(fact, &unit.fingerprint);
                report.diagnostics.extend(normalized.diagnostics);
                if !normalized.summary.is_empty() {
                    summaries.push(normalized.summary);
                }
                write.nodes.extend(normalized.nodes);
                write.edges.extend(normalized.edges);
            }
            write.summary = summaries.join("; ");
            writes.push(write);
        }
        report.units_indexed = writes.len();

        // Write, advancing each unit's fingerprint only after its last
        // group commits.
        let writer = BatchWriter::new(self.config.batch_size, self.config.write_retries);
        let mut record_errors: Vec<Diagnostic> = Vec::new();
        let changes = self.changes;
        let write_report = writer.write_units(self.graph, &writes, run_us, |unit| {
            if let Err(err) =
                changes.record_fingerprint(&unit.unit_path, &unit.fingerprint, &unit.summary, run_us)
            {
                record_errors.push(Diagnostic::new(
                    ErrorCode::CorruptChangeStore,
                    &unit.unit_path,
                    format!("failed to record fingerprint: {err}"),
                ));
            }
        })?;
        report.diagnostics.append(&mut record_errors);
        report.nodes_written = write_report.nodes_written;
        report.edges_written = write_report.edges_written;
        report.groups_committed = write_report.groups_committed;
        for unit_path in &write_report.failed_units {
            report.diagnostics.push(Diagnostic::new(
                ErrorCode::WriteFailure,
                unit_path,
                "write group failed after retry; unit will be reindexed next run",
            ));
        }
        report.units_failed += write_report.failed_units.len();

        // Placeholders that never received a definition are references to
        // things no unit declared.
        for pending in self.graph.pending_nodes()? {
            report.dangling += 1;
            report.diagnostics.push(Diagnostic::new(
                ErrorCode::DanglingReference,
                "-",
                format!(
                    "{} '{}' is referenced but never defined",
                    pending.kind, pending.identity
                ),
            ));
        }

        self.graph.record_run(run_us)?;
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            seen = report.units_seen,
            skipped = report.units_skipped,
            indexed = report.units_indexed,
            failed = report.units_failed,
            nodes = report.nodes_written,
            edges = report.edges_written,
            dangling = report.dangling,
            stale = report.stale_units.len(),
            "index run complete"
        );
        Ok(report)
    }
}
