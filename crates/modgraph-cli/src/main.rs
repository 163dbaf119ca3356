#![forbid(unsafe_code)]

mod cmd;
mod output;
mod project;

use std::env;

use clap::{Parser, Subcommand};
use output::OutputMode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mg: incremental dependency and inheritance graph indexer",
    long_about = None
)]
struct Cli {
    /// Output format (default: pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (shorthand for --format json).
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize a modgraph project",
        long_about = "Create the .modgraph/ index directory in the current directory.",
        after_help = "EXAMPLES:\n    mg init\n    mg init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Index a fact file incrementally",
        long_about = "Run the indexing pipeline over a fact file, reindexing only units \
                      whose content fingerprint changed since the last run.",
        after_help = "EXAMPLES:\n    mg index facts.jsonl\n    mg index facts.jsonl --full\n    mg index facts.jsonl --json"
    )]
    Index(cmd::index::IndexArgs),

    #[command(
        about = "List a package's dependencies",
        after_help = "EXAMPLES:\n    mg deps sale\n    mg deps sale --recursive\n    mg deps sale --recursive --depth 2"
    )]
    Deps(cmd::deps::DepsArgs),

    #[command(
        about = "List packages that depend on a package",
        after_help = "EXAMPLES:\n    mg rdeps uom\n    mg rdeps uom --recursive"
    )]
    Rdeps(cmd::rdeps::RdepsArgs),

    #[command(
        about = "Show an entity's inheritance chain",
        after_help = "EXAMPLES:\n    mg chain sale.order"
    )]
    Chain(cmd::chain::ChainArgs),

    #[command(
        about = "Find dependency and inheritance cycles",
        after_help = "EXAMPLES:\n    mg cycles\n    mg cycles --scope deps\n    mg cycles --involving sale"
    )]
    Cycles(cmd::cycles::CyclesArgs),

    #[command(
        about = "Show one node with its attributes",
        after_help = "EXAMPLES:\n    mg show package sale\n    mg show entity sale.order --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        about = "Show store totals and last run time",
        after_help = "EXAMPLES:\n    mg stats\n    mg stats --json"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        about = "Wipe graph and change-tracking state",
        after_help = "EXAMPLES:\n    mg reset --yes"
    )]
    Reset(cmd::reset::ResetArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MODGRAPH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "modgraph_core=debug,modgraph_cli=debug,info"
        } else {
            "modgraph_core=info,modgraph_cli=info,warn"
        })
    });

    let format = env::var("MODGRAPH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json().with_ansi(false)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = output::resolve_output_mode(cli.format, cli.json);
    let project_root = std::env::current_dir()?;

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Index(ref args) => cmd::index::run_index(args, output, &project_root),
        Commands::Deps(ref args) => cmd::deps::run_deps(args, output, &project_root),
        Commands::Rdeps(ref args) => cmd::rdeps::run_rdeps(args, output, &project_root),
        Commands::Chain(ref args) => cmd::chain::run_chain(args, output, &project_root),
        Commands::Cycles(ref args) => cmd::cycles::run_cycles(args, output, &project_root),
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root),
        Commands::Stats(ref args) => cmd::stats::run_stats(args, output, &project_root),
        Commands::Reset(ref args) => cmd::reset::run_reset(args, output, &project_root),
    }
}
