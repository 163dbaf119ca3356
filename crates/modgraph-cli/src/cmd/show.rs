//! `mg show` — one node with its attributes.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use modgraph_core::ErrorCode;
use modgraph_core::model::{FullNode, NodeKind};
use modgraph_core::query::{entities_in_package, templates_in_package};
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{CliError, OutputMode, fail, pretty_kv, pretty_rule, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Package,
    Entity,
    Template,
}

impl From<KindArg> for NodeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Package => Self::Package,
            KindArg::Entity => Self::Entity,
            KindArg::Template => Self::Template,
        }
    }
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Node kind.
    #[arg(value_enum)]
    pub kind: KindArg,

    /// Node identity (for example `sale` or `sale.order`).
    pub identity: String,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    node: FullNode,
    /// Entities owned by the package, when showing one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entities: Vec<String>,
    /// Templates owned by the package, when showing one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    templates: Vec<String>,
}

/// Execute `mg show`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or the node is
/// unknown.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;
    let graph = project.open_graph()?;
    let kind = NodeKind::from(args.kind);

    let Some(node) = graph.find_node(kind, &args.identity)? else {
        let code = match kind {
            NodeKind::Package => ErrorCode::PackageNotFound,
            NodeKind::Entity | NodeKind::Template => ErrorCode::EntityNotFound,
        };
        return fail(
            output,
            &CliError::new(
                code,
                format!("{kind} '{}' is not in the graph", args.identity),
            ),
        );
    };

    let (entities, templates) = if kind == NodeKind::Package && !node.descriptor.pending {
        (
            entities_in_package(&graph, &args.identity)?.unwrap_or_default(),
            templates_in_package(&graph, &args.identity)?.unwrap_or_default(),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    let payload = ShowOutput {
        node,
        entities,
        templates,
    };
    render(output, &payload, render_human)
}

fn render_human(payload: &ShowOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let node = &payload.node;
    writeln!(w, "{} {}", node.descriptor.kind, node.descriptor.identity)?;
    pretty_rule(w)?;
    if node.descriptor.pending {
        pretty_kv(w, "status", "pending (referenced but never defined)")?;
        return Ok(());
    }
    if let Some(fingerprint) = &node.fingerprint {
        pretty_kv(w, "fingerprint", fingerprint)?;
    }
    let indexed = DateTime::<Utc>::from_timestamp_micros(node.last_indexed_us)
        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
    pretty_kv(w, "indexed", indexed)?;
    if let Some(attrs) = node.attrs.as_object() {
        for (key, value) in attrs {
            pretty_kv(w, key, serde_json::to_string(value).unwrap_or_default())?;
        }
    }
    if !payload.entities.is_empty() {
        pretty_kv(w, "entities", payload.entities.join(", "))?;
    }
    if !payload.templates.is_empty() {
        pretty_kv(w, "templates", payload.templates.join(", "))?;
    }
    Ok(())
}
