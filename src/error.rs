// src/error.rs

use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Only fatal and per-record conditions live here. Lookup misses, missing
/// segment files and resume skips are counted in the stage outcomes instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A fixed-width header line is shorter than the layout or has a
    /// non-numeric record-sequence id.
    #[error("malformed header record at line {line}: {reason}")]
    Format { line: u64, reason: String },

    #[error("{} is missing or empty; rerun after restoring it", path.display())]
    EmptyInput { path: PathBuf },

    #[error("store error: {0}; check the database and rerun")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read metadata {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("archive {}: {reason}; rerun to fetch a fresh copy", path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<duckdb::Error> for PipelineError {
    fn from(e: duckdb::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}

impl PipelineError {
    pub fn format(line: u64, reason: impl Into<String>) -> Self {
        PipelineError::Format {
            line,
            reason: reason.into(),
        }
    }

    /// True for errors that describe a single bad input record.
    pub fn is_per_record(&self) -> bool {
        matches!(self, PipelineError::Format { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
