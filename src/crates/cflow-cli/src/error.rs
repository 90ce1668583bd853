//! CLI-specific error taxonomy. A `cflow_dot::DotError` (which itself wraps
//! `cflow_core::FlowError`) is passed through rather than flattened, so a
//! user reading a CLI failure can tell which layer it came from.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("couldn't read graph file {path}: {source}")]
    ReadGraphFile { path: PathBuf, source: std::io::Error },

    #[error("invalid DOT source in {path}: {reason}")]
    InvalidDot { path: PathBuf, reason: String },

    #[error("invalid run-config YAML in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("`run` requires either --start or --config")]
    MissingStart,

    #[error(transparent)]
    Graph(#[from] cflow_dot::DotError),
}
