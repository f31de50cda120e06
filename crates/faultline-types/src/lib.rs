//! # faultline-types: Core types for `Faultline`
//!
//! Shared identifiers used across the harness:
//! - Request scoping ([`RequestId`])
//! - Campaign progress ([`Iteration`])
//! - Lifecycle callers ([`CallerPhase`])

use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Request Scoping
// ============================================================================

/// Correlation id of one logical request scope.
///
/// Every piece of per-request state (execution index, vector clock) is
/// looked up by this id. Two concurrent requests never share an id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random request id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Campaign Progress
// ============================================================================

/// One-based iteration number within a fault-injection campaign.
///
/// Iteration 1 is always the fault-free reference execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iteration(u32);

impl Iteration {
    /// The reference (fault-free) iteration.
    pub const REFERENCE: Iteration = Iteration(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_reference(&self) -> bool {
        *self == Self::REFERENCE
    }

    /// Returns the next iteration (incremented by 1).
    pub fn next(&self) -> Self {
        Iteration(self.0.saturating_add(1))
    }

    /// Returns the previous iteration, or `None` for the reference iteration.
    pub fn previous(&self) -> Option<Self> {
        (self.0 > 1).then(|| Iteration(self.0 - 1))
    }
}

impl Display for Iteration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Iteration {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Iteration> for u32 {
    fn from(iteration: Iteration) -> Self {
        iteration.0
    }
}

// ============================================================================
// Lifecycle Callers
// ============================================================================

/// Which part of the test lifecycle is asking the orchestrator a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallerPhase {
    BeforeEach,
    TestBody,
    AfterEach,
}

impl CallerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerPhase::BeforeEach => "before-each",
            CallerPhase::TestBody => "test-body",
            CallerPhase::AfterEach => "after-each",
        }
    }
}

impl Display for CallerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`CallerPhase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCallerPhase(pub String);

impl Display for UnknownCallerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown caller phase: {}", self.0)
    }
}

impl std::error::Error for UnknownCallerPhase {}

impl FromStr for CallerPhase {
    type Err = UnknownCallerPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before-each" => Ok(CallerPhase::BeforeEach),
            "test-body" => Ok(CallerPhase::TestBody),
            "after-each" => Ok(CallerPhase::AfterEach),
            other => Err(UnknownCallerPhase(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn reference_iteration_has_no_previous() {
        assert!(Iteration::REFERENCE.is_reference());
        assert_eq!(Iteration::REFERENCE.previous(), None);
        assert_eq!(Iteration::new(3).previous(), Some(Iteration::new(2)));
        assert_eq!(Iteration::REFERENCE.next(), Iteration::new(2));
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }

    #[test]
    fn request_id_serializes_transparently() {
        let id = RequestId::from("req-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-1\"");
    }

    #[test_case(CallerPhase::BeforeEach)]
    #[test_case(CallerPhase::TestBody)]
    #[test_case(CallerPhase::AfterEach)]
    fn caller_phase_parses_its_display(phase: CallerPhase) {
        assert_eq!(phase.to_string().parse::<CallerPhase>().unwrap(), phase);
    }

    #[test]
    fn unknown_caller_phase_is_rejected() {
        assert!("invocation".parse::<CallerPhase>().is_err());
    }

    proptest::proptest! {
        #[test]
        fn iteration_next_then_previous_is_identity(n in 1u32..u32::MAX) {
            let iteration = Iteration::new(n);
            proptest::prop_assert_eq!(iteration.next().previous(), Some(iteration));
        }
    }
}
