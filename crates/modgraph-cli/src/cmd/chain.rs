//! `mg chain` — linearized inheritance chain of an entity.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use modgraph_core::ErrorCode;
use modgraph_core::query::inheritance_chain;
use serde::Serialize;

use crate::cmd::require_project;
use crate::output::{CliError, OutputMode, fail, render};

#[derive(Args, Debug)]
pub struct ChainArgs {
    /// Entity identity (for example `sale.order`).
    pub entity: String,
}

#[derive(Debug, Serialize)]
struct ChainOutput {
    entity: String,
    chain: Vec<String>,
}

/// Execute `mg chain`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or the entity is
/// unknown.
pub fn run_chain(args: &ChainArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = require_project(output, project_root)?;
    let graph = project.open_graph()?;

    let Some(chain) = inheritance_chain(&graph, &args.entity)? else {
        return fail(
            output,
            &CliError::new(
                ErrorCode::EntityNotFound,
                format!("entity '{}' is not in the graph", args.entity),
            ),
        );
    };

    let payload = ChainOutput {
        entity: args.entity.clone(),
        chain,
    };
    render(output, &payload, |payload, w| {
        writeln!(w, "{}", payload.chain.join(" -> "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_args_parse() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: ChainArgs,
        }

        let parsed = Wrapper::parse_from(["test", "sale.order"]);
        assert_eq!(parsed.args.entity, "sale.order");
    }
}
