//! Server error types.

use std::net::SocketAddr;

use faultline_orchestrator::{OrchestratorError, ServiceErrorKind};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The request could not be parsed or its body is invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Service(#[from] OrchestratorError),
}

impl ServerError {
    /// Kind reported to clients alongside the message.
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            ServerError::Service(e) => e.kind(),
            _ => ServiceErrorKind::Protocol,
        }
    }

    /// HTTP status reported for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) | ServerError::Json(_) => 400,
            ServerError::RouteNotFound { .. } => 404,
            ServerError::Service(e) => match e.kind() {
                ServiceErrorKind::State => 409,
                ServiceErrorKind::Configuration => 400,
                ServiceErrorKind::Unavailable => 503,
                ServiceErrorKind::Protocol => 500,
            },
            _ => 500,
        }
    }
}
