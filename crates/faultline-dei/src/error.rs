//! Error types for indices, clocks, scopes, and callsites.

use std::path::PathBuf;

use faultline_types::RequestId;
use thiserror::Error;

/// Result type for execution-index and scope operations.
pub type DeiResult<T> = Result<T, DeiError>;

/// Structural errors raised by the index, clock, and scope registry.
///
/// Every variant indicates a bookkeeping bug on the caller's side and is
/// never recovered from silently.
#[derive(Debug, Error)]
pub enum DeiError {
    /// `pop` on an index with no segments.
    #[error("cannot pop an empty execution index")]
    IndexBounds,

    /// An index was required but none was supplied.
    #[error("execution index is missing")]
    MissingIndex,

    /// The textual index could not be decoded.
    #[error("malformed execution index {input:?}: {source}")]
    MalformedIndex {
        input: String,
        source: serde_json::Error,
    },

    /// A decoded segment carried an occurrence count below 1.
    #[error("segment {key:?} has invalid occurrence count {count}")]
    InvalidOccurrence { key: String, count: u32 },

    /// The textual vector clock could not be decoded.
    #[error("malformed vector clock {input:?}: {source}")]
    MalformedClock {
        input: String,
        source: serde_json::Error,
    },

    /// A scope with this id is already registered.
    #[error("request scope {0} already exists")]
    ScopeExists(RequestId),

    /// No scope is registered under this id.
    #[error("request scope {0} does not exist")]
    UnknownScope(RequestId),
}

/// Result type for callsite extraction.
pub type CallsiteResult<T> = Result<T, CallsiteError>;

/// Errors raised while determining where a remote call originated.
#[derive(Debug, Error)]
pub enum CallsiteError {
    /// Every captured frame belonged to infrastructure or imported code.
    #[error("unknown callsite: no user frames remain after filtering {captured} frames")]
    UnknownCallsite { captured: usize },

    /// A frame did not have the `symbol (file:line)` shape.
    #[error("malformed stack frame {frame:?}: {reason}")]
    MalformedFrame { frame: String, reason: &'static str },

    #[error("failed to read dependency manifest at {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse dependency manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
