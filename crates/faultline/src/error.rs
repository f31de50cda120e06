//! Harness errors and their classification.

use faultline_analysis::AnalysisError;
use faultline_config::ConfigError;
use faultline_dei::{CallsiteError, DeiError};
use faultline_orchestrator::{OrchestratorError, ServiceErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Why the harness could not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Index or bookkeeping corruption. Fatal to the operation.
    Structural,
    /// No callsite could be determined for a call.
    Provenance,
    /// The decision service could not be reached.
    Availability,
    /// Missing or invalid analysis, counterexample or settings.
    Configuration,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Index(#[from] DeiError),

    #[error(transparent)]
    Callsite(#[from] CallsiteError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A call was ended for a request whose index had moved on.
    #[error("call {expected} ended out of order, index top was {found}")]
    UnbalancedCall { expected: String, found: String },
}

impl HarnessError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HarnessError::Index(_) | HarnessError::UnbalancedCall { .. } => ErrorClass::Structural,
            HarnessError::Callsite(e) => match e {
                CallsiteError::UnknownCallsite { .. } | CallsiteError::MalformedFrame { .. } => {
                    ErrorClass::Provenance
                }
                _ => ErrorClass::Configuration,
            },
            HarnessError::Analysis(_) | HarnessError::Config(_) => ErrorClass::Configuration,
            HarnessError::Orchestrator(e) => match e.kind() {
                ServiceErrorKind::Unavailable => ErrorClass::Availability,
                ServiceErrorKind::Configuration => ErrorClass::Configuration,
                ServiceErrorKind::State | ServiceErrorKind::Protocol => ErrorClass::Structural,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_types::Iteration;
    use test_case::test_case;

    #[test_case(HarnessError::Index(DeiError::IndexBounds), ErrorClass::Structural ; "double pop")]
    #[test_case(
        HarnessError::Callsite(CallsiteError::UnknownCallsite { captured: 4 }),
        ErrorClass::Provenance ;
        "unknown callsite"
    )]
    #[test_case(
        HarnessError::Orchestrator(OrchestratorError::ServiceUnavailable { attempts: 3 }),
        ErrorClass::Availability ;
        "unavailable"
    )]
    #[test_case(
        HarnessError::Orchestrator(OrchestratorError::Transport { reason: "refused".into() }),
        ErrorClass::Availability ;
        "transport"
    )]
    #[test_case(
        HarnessError::Orchestrator(OrchestratorError::TeardownMissing { iteration: Iteration::new(2) }),
        ErrorClass::Structural ;
        "barrier"
    )]
    #[test_case(
        HarnessError::Orchestrator(OrchestratorError::Rejected {
            kind: ServiceErrorKind::Configuration,
            message: "no transformer registered".into(),
        }),
        ErrorClass::Configuration ;
        "remote configuration"
    )]
    #[test_case(
        HarnessError::Orchestrator(OrchestratorError::Rejected {
            kind: ServiceErrorKind::Unavailable,
            message: "draining".into(),
        }),
        ErrorClass::Availability ;
        "remote unavailable"
    )]
    #[test_case(
        HarnessError::Analysis(AnalysisError::CounterexampleNotConfigured),
        ErrorClass::Configuration ;
        "no counterexample"
    )]
    #[test_case(
        HarnessError::Config(ConfigError::ValidationError("x".into())),
        ErrorClass::Configuration ;
        "invalid settings"
    )]
    fn classifies(error: HarnessError, expected: ErrorClass) {
        assert_eq!(error.class(), expected);
    }
}
