//! Waiting for a decision service to come online.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::service::DecisionService;

/// Bounded polling: fixed attempts, fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

/// Polls `health_check` until it answers true.
///
/// Transport errors and negative answers both count as failed attempts.
pub fn wait_until_available(
    service: &dyn DecisionService,
    policy: RetryPolicy,
) -> OrchestratorResult<()> {
    for attempt in 1..=policy.attempts {
        match service.health_check() {
            Ok(true) => {
                tracing::debug!(attempt, "decision service available");
                return Ok(());
            }
            Ok(false) => tracing::debug!(attempt, "decision service not ready"),
            Err(e) => tracing::debug!(attempt, error = %e, "decision service unreachable"),
        }
        if attempt < policy.attempts {
            thread::sleep(policy.backoff);
        }
    }

    tracing::warn!(attempts = policy.attempts, "decision service unavailable");
    Err(OrchestratorError::ServiceUnavailable {
        attempts: policy.attempts,
    })
}
