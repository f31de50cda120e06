//! Orchestrator error types.

use faultline_analysis::AnalysisError;
use faultline_dei::{DeiError, ExecutionIndex};
use faultline_types::Iteration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for orchestrator and decision-service operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Teardown confirmed out of order.
    #[error("teardown for iteration {got} confirmed, expected iteration {expected}")]
    BarrierViolation { expected: Iteration, got: Iteration },

    /// An iteration was queried before the previous one was torn down.
    #[error("iteration {iteration} has not been torn down")]
    TeardownMissing { iteration: Iteration },

    #[error("iteration {got} reported complete, but iteration {expected} is running")]
    IterationMismatch { expected: Iteration, got: Iteration },

    #[error("no execution is running for iteration {iteration}")]
    NoActiveExecution { iteration: Iteration },

    /// A response arrived for a call that never began.
    #[error("no invocation recorded for {index}")]
    UnknownInvocation { index: ExecutionIndex },

    #[error("invalid orchestrator options: {reason}")]
    InvalidOptions { reason: &'static str },

    #[error("decision service unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },

    /// The remote binding could not complete a request.
    #[error("decision service transport failed: {reason}")]
    Transport { reason: String },

    /// The remote binding answered with something other than the protocol.
    #[error("decision service protocol error: {reason}")]
    Protocol { reason: String },

    /// A remote service rejected the request with an error of `kind`.
    #[error("decision service rejected the request ({kind}): {message}")]
    Rejected {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error(transparent)]
    Index(#[from] DeiError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Category of a decision-service error. Bindings carry it so that a remote
/// error classifies the same as the in-process one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Out-of-order protocol use or corrupt bookkeeping.
    State,
    /// Invalid analysis file or options.
    Configuration,
    /// The service could not be reached.
    Unavailable,
    /// Malformed exchange with a remote service.
    Protocol,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ServiceErrorKind::State => "state",
            ServiceErrorKind::Configuration => "configuration",
            ServiceErrorKind::Unavailable => "unavailable",
            ServiceErrorKind::Protocol => "protocol",
        })
    }
}

impl OrchestratorError {
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            OrchestratorError::BarrierViolation { .. }
            | OrchestratorError::TeardownMissing { .. }
            | OrchestratorError::IterationMismatch { .. }
            | OrchestratorError::NoActiveExecution { .. }
            | OrchestratorError::UnknownInvocation { .. }
            | OrchestratorError::Index(_) => ServiceErrorKind::State,
            OrchestratorError::InvalidOptions { .. } | OrchestratorError::Analysis(_) => {
                ServiceErrorKind::Configuration
            }
            OrchestratorError::ServiceUnavailable { .. } | OrchestratorError::Transport { .. } => {
                ServiceErrorKind::Unavailable
            }
            OrchestratorError::Protocol { .. } => ServiceErrorKind::Protocol,
            OrchestratorError::Rejected { kind, .. } => *kind,
        }
    }

    /// Errors that mean the service could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        self.kind() == ServiceErrorKind::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_errors_keep_their_kind() {
        let err = OrchestratorError::Rejected {
            kind: ServiceErrorKind::Unavailable,
            message: "draining".into(),
        };
        assert!(err.is_unavailable());
        assert_eq!(
            serde_json::to_value(ServiceErrorKind::Configuration).unwrap(),
            serde_json::json!("configuration")
        );
        assert_eq!(
            OrchestratorError::Analysis(AnalysisError::UnknownTransformer("x".into())).kind(),
            ServiceErrorKind::Configuration
        );
        assert_eq!(
            OrchestratorError::TeardownMissing { iteration: Iteration::new(2) }.kind(),
            ServiceErrorKind::State
        );
    }
}
