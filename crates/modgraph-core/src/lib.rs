//! modgraph-core: incremental graph indexing engine.
//!
//! Turns per-unit extraction facts into a queryable labeled-property graph,
//! reindexing only what changed between runs.
//!
//! - [`pipeline`] drives a run: change detection, normalization, batched
//!   writes.
//! - [`store`] is the embedded graph database; [`changes`] tracks unit
//!   fingerprints between runs.
//! - [`query`] and [`graph`] answer structural questions (dependency
//!   closures, inheritance chains, cycles).
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at module boundaries; typed errors
//!   ([`error::IndexError`], [`lock::LockError`]) where callers branch on
//!   the failure.
//! - **Logging**: `tracing` macros throughout; no direct stderr writes.

pub mod changes;
pub mod config;
pub mod error;
pub mod facts;
pub mod fingerprint;
pub mod graph;
pub mod lock;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod store;

pub use changes::ChangeStore;
pub use config::ProjectConfig;
pub use error::{Diagnostic, ErrorCode, IndexError};
pub use lock::RunLock;
pub use pipeline::{FactSource, IndexPipeline, JsonlFactSource, RunReport, SourceUnit};
pub use store::GraphStore;
