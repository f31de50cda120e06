//! Analysis and fault-catalog error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::fault::FaultKind;

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors raised while building, loading, or applying analysis data.
///
/// All of these are configuration errors: they surface before an
/// iteration starts, or abort the iteration that hit them.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required builder field was not set.
    #[error("analysis configuration is missing `{field}`")]
    MissingField { field: &'static str },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("analysis configuration {0:?} is defined twice")]
    DuplicateConfiguration(String),

    #[error("invalid analysis file: {0}")]
    InvalidAnalysisFile(#[source] serde_json::Error),

    /// A counterexample was expected but no path was configured.
    #[error("counterexample path is not configured")]
    CounterexampleNotConfigured,

    #[error("file does not exist: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid counterexample at {path}: {source}")]
    InvalidCounterexample {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A failure record's payload is not a recognised fault shape.
    #[error("unrecognised fault payload: {0}")]
    InvalidFault(#[source] serde_json::Error),

    #[error("failure record names two faults, {first:?} and {second:?}")]
    ConflictingFaults { first: String, second: String },

    #[error("invalid failure record {index} in {path}: {source}")]
    InvalidFailureRecord {
        path: PathBuf,
        index: String,
        source: Box<AnalysisError>,
    },

    #[error("no transformer registered under {0:?}")]
    UnknownTransformer(String),

    #[error("no constructor registered for fault kind {0}")]
    UnregisteredFaultKind(FaultKind),

    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}
