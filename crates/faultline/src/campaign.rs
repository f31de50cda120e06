//! Campaign driver: runs a workflow once per iteration until the decision
//! service has nothing left to try.
//!
//! Per iteration `n`:
//!
//! 1. `has_next_iteration(n)` (iteration 1 always runs)
//! 2. [`Workflow::run`]; an `Err` is the system under test failing
//! 3. `record_iteration_complete(n, failed)`
//! 4. [`Workflow::after_each`]
//! 5. `teardowns_completed(n)`, exactly once
//!
//! The first iteration for which `has_next_iteration` is false still gets
//! steps 4 and 5, with the body skipped.

use std::fmt::Display;
use std::sync::Arc;

use faultline_analysis::{AnalysisFile, Fault};
use faultline_dei::ExecutionIndex;
use faultline_orchestrator::{
    CampaignSummary, DecisionService, ExplorationStatus, RetryPolicy, wait_until_available,
};
use faultline_types::{CallerPhase, Iteration};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::HarnessResult;
use crate::settings::Settings;

/// Where a workflow body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    pub iteration: Iteration,
    /// The decision service is unreachable; the body runs fault-free.
    pub degraded: bool,
}

/// The system-under-test scenario a campaign explores.
pub trait Workflow {
    type Error: Display;

    fn run(&mut self, context: IterationContext) -> Result<(), Self::Error>;

    /// Cleanup after the body, before teardown is confirmed.
    fn after_each(&mut self, _context: IterationContext) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum IterationOutcome {
    Passed,
    /// The body failed; under an injected fault this is usually expected.
    Failed(String),
}

impl IterationOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, IterationOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationRecord {
    pub iteration: Iteration,
    /// Faults injected during the iteration, in invocation order.
    pub faults: Vec<(ExecutionIndex, Fault)>,
    pub outcome: IterationOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Explored(ExplorationStatus),
    /// The service was unavailable; only the reference iteration ran.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignOutcome {
    pub status: CampaignStatus,
    pub records: Vec<IterationRecord>,
    /// `None` in degraded campaigns.
    pub summary: Option<CampaignSummary>,
}

impl CampaignOutcome {
    /// True when exploration ended by exhaustion.
    pub fn is_complete(&self) -> bool {
        matches!(self.status, CampaignStatus::Explored(status) if status.is_complete())
    }

    pub fn failures(&self) -> impl Iterator<Item = &IterationRecord> {
        self.records.iter().filter(|r| !r.outcome.is_passed())
    }
}

pub struct Campaign {
    service: Arc<dyn DecisionService>,
    analysis: AnalysisFile,
    retry: RetryPolicy,
    degrade_when_unavailable: bool,
}

impl Campaign {
    pub fn new(service: Arc<dyn DecisionService>, analysis: AnalysisFile) -> Self {
        Self {
            service,
            analysis,
            retry: RetryPolicy::default(),
            degrade_when_unavailable: false,
        }
    }

    /// A campaign over the configured service and analysis file.
    pub fn from_settings(settings: &Settings) -> HarnessResult<Self> {
        Ok(Self::new(settings.decision_service()?, settings.load_analysis()?)
            .with_retry_policy(settings.retry)
            .with_degrade_when_unavailable(settings.degrade_when_unavailable))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_degrade_when_unavailable(mut self, enabled: bool) -> Self {
        self.degrade_when_unavailable = enabled;
        self
    }

    pub fn service(&self) -> &Arc<dyn DecisionService> {
        &self.service
    }

    pub fn run<W: Workflow>(&self, workflow: &mut W) -> HarnessResult<CampaignOutcome> {
        if let Err(e) = wait_until_available(self.service.as_ref(), self.retry) {
            if !self.degrade_when_unavailable {
                return Err(e.into());
            }
            warn!(error = %e, "decision service unavailable, running the reference iteration only");
            return Ok(self.run_degraded(workflow));
        }

        let service = self.service.as_ref();
        service.analysis_file(&self.analysis)?;

        let mut outcomes = Vec::new();
        let mut iteration = Iteration::REFERENCE;
        while service.has_next_iteration(iteration, CallerPhase::BeforeEach)? {
            info!(%iteration, "iteration starting");
            let context = IterationContext {
                iteration,
                degraded: false,
            };
            let outcome = run_body(workflow, context);
            service.record_iteration_complete(iteration, !outcome.is_passed())?;
            workflow.after_each(context);
            service.teardowns_completed(iteration)?;
            outcomes.push((iteration, outcome));
            iteration = iteration.next();
        }
        info!(%iteration, "iteration skipped, tearing down");
        workflow.after_each(IterationContext {
            iteration,
            degraded: false,
        });
        service.teardowns_completed(iteration)?;

        let summary = service.terminate()?;
        let records = outcomes
            .into_iter()
            .map(|(iteration, outcome)| IterationRecord {
                iteration,
                faults: summary
                    .reports
                    .iter()
                    .find(|report| report.iteration == iteration)
                    .map(|report| {
                        report
                            .faults()
                            .map(|(dei, fault)| (dei.clone(), fault.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
                outcome,
            })
            .collect();

        match summary.exploration {
            ExplorationStatus::Exhausted => info!(iterations = summary.iterations, "exploration exhausted"),
            status => warn!(
                iterations = summary.iterations,
                remaining = status.remaining(),
                "exploration incomplete"
            ),
        }

        Ok(CampaignOutcome {
            status: CampaignStatus::Explored(summary.exploration),
            records,
            summary: Some(summary),
        })
    }

    fn run_degraded<W: Workflow>(&self, workflow: &mut W) -> CampaignOutcome {
        let context = IterationContext {
            iteration: Iteration::REFERENCE,
            degraded: true,
        };
        let outcome = run_body(workflow, context);
        workflow.after_each(context);
        CampaignOutcome {
            status: CampaignStatus::Degraded,
            records: vec![IterationRecord {
                iteration: Iteration::REFERENCE,
                faults: Vec::new(),
                outcome,
            }],
            summary: None,
        }
    }
}

fn run_body<W: Workflow>(workflow: &mut W, context: IterationContext) -> IterationOutcome {
    match workflow.run(context) {
        Ok(()) => IterationOutcome::Passed,
        Err(e) => {
            info!(iteration = %context.iteration, error = %e, "workflow failed");
            IterationOutcome::Failed(e.to_string())
        }
    }
}

impl std::fmt::Debug for Campaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Campaign")
            .field("analysis", &self.analysis)
            .field("retry", &self.retry)
            .field("degrade_when_unavailable", &self.degrade_when_unavailable)
            .finish_non_exhaustive()
    }
}
