//! # cflow-cli
//!
//! CLI entry point for inspecting and running control-flow graphs defined
//! as DOT files.
//!
//! This binary only registers the node types it knows about at compile
//! time (none, by default), so `run` against a realistic graph will report
//! `UnknownNodeType` for every node unless the caller embeds this crate's
//! `run_command` in a binary that has registered its own node types first.
//! `validate`/`check` need no registry at all: they only confirm the DOT
//! source itself is well-formed.

mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dot_structures::{Graph as DotGraph, Stmt};
use tracing::{info, Level};

use error::CliError;

#[derive(Parser)]
#[command(name = "cflow")]
#[command(about = "Inspect and run control-flow graphs defined as DOT files", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Confirm a DOT file parses as valid Graphviz source
    Validate {
        /// Path to the .gv/.dot file
        file: PathBuf,
    },

    /// Parse a DOT file and summarize its node and edge structure
    Check {
        /// Path to the .gv/.dot file
        file: PathBuf,
    },

    /// Run a DOT-defined graph to completion
    Run {
        /// Path to the .gv/.dot file
        file: PathBuf,

        /// Name of the node to start execution at
        #[arg(short, long)]
        start: Option<String>,

        /// Path to a YAML run-config file (see `cflow_core::config::RunConfig`).
        /// Overrides `--start` when both are given.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Validate { file } => validate_command(&file)?,
        Commands::Check { file } => check_command(&file)?,
        Commands::Run { file, start, config } => run_command(&file, start.as_deref(), config.as_deref())?,
    }

    Ok(())
}

fn read_dot(path: &PathBuf) -> error::Result<DotGraph> {
    let source = std::fs::read_to_string(path)
        .map_err(|source| CliError::ReadGraphFile { path: path.clone(), source })?;
    graphviz_rust::parse(&source)
        .map_err(|reason| CliError::InvalidDot { path: path.clone(), reason })
}

fn validate_command(file: &PathBuf) -> error::Result<()> {
    read_dot(file)?;
    println!("{} is valid DOT source", file.display());
    Ok(())
}

fn check_command(file: &PathBuf) -> error::Result<()> {
    let graph = read_dot(file)?;
    let stmts: &[Stmt] = match &graph {
        DotGraph::Graph { stmts, .. } => stmts,
        DotGraph::DiGraph { stmts, .. } => stmts,
    };

    let node_count = stmts.iter().filter(|s| matches!(s, Stmt::Node(_))).count();
    let edge_count = stmts.iter().filter(|s| matches!(s, Stmt::Edge(_))).count();

    println!("{}", file.display());
    println!("  nodes: {node_count}");
    println!("  edges: {edge_count}");
    Ok(())
}

fn run_command(file: &PathBuf, start: Option<&str>, config: Option<&PathBuf>) -> error::Result<()> {
    let result = if let Some(config_path) = config {
        let text = std::fs::read_to_string(config_path)
            .map_err(|source| CliError::ReadGraphFile { path: config_path.clone(), source })?;
        let run_config: cflow_core::config::RunConfig = serde_yaml::from_str(&text)
            .map_err(|e| CliError::InvalidConfig { path: config_path.clone(), reason: e.to_string() })?;
        info!("running {} from \"{}\" (config: {})", file.display(), run_config.start_node, config_path.display());
        cflow_dot::run_with_config(file, &run_config)?
    } else {
        let start = start.ok_or_else(|| CliError::MissingStart)?;
        info!("running {} from \"{start}\"", file.display());
        cflow_dot::run(file, start)?
    };
    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()));
    Ok(())
}
