//! CLI command implementations.

pub mod dump;
pub mod segments;
pub mod verify;

use redolog_core::{CoreError, LogDir};
use std::path::Path;
use thiserror::Error;

/// Output format shared by listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// A command needs `--path`.
    #[error("log directory path required for {0}")]
    PathRequired(&'static str),

    /// The log could not be read.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Output could not be serialized.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    /// `verify` found a problem.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens `path` without taking the writer lock.
pub fn open_log(path: &Path) -> CliResult<LogDir> {
    Ok(LogDir::open_read_only(path)?)
}
