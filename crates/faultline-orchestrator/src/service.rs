//! The decision service: the protocol between a campaign and its
//! orchestrator.
//!
//! Campaigns and interceptors only ever talk to a [`DecisionService`]. The
//! in-process binding wraps an [`IterationOrchestrator`] behind a mutex; the
//! HTTP binding in `faultline-server` speaks the same protocol remotely.

use std::sync::{Mutex, MutexGuard, PoisonError};

use faultline_analysis::AnalysisFile;
use faultline_types::{CallerPhase, Iteration};

use crate::core::IterationOrchestrator;
use crate::error::OrchestratorResult;
use crate::execution::{Completion, Invocation, InvocationDecision};
use crate::report::CampaignSummary;

pub trait DecisionService: Send + Sync {
    fn analysis_file(&self, analysis: &AnalysisFile) -> OrchestratorResult<()>;

    fn has_next_iteration(
        &self,
        iteration: Iteration,
        caller: CallerPhase,
    ) -> OrchestratorResult<bool>;

    fn record_iteration_complete(
        &self,
        iteration: Iteration,
        exception_occurred: bool,
    ) -> OrchestratorResult<()>;

    fn teardowns_completed(&self, iteration: Iteration) -> OrchestratorResult<()>;

    fn terminate(&self) -> OrchestratorResult<CampaignSummary>;

    fn health_check(&self) -> OrchestratorResult<bool>;

    fn begin_invocation(&self, invocation: &Invocation) -> OrchestratorResult<InvocationDecision>;

    fn end_invocation(&self, completion: &Completion) -> OrchestratorResult<()>;

    fn was_fault_injected(&self) -> OrchestratorResult<bool>;

    fn was_fault_injected_on_service(&self, service: &str) -> OrchestratorResult<bool>;

    fn was_fault_injected_on_method(&self, module: &str, method: &str)
    -> OrchestratorResult<bool>;
}

/// Direct-call binding.
#[derive(Debug)]
pub struct InProcessService {
    orchestrator: Mutex<IterationOrchestrator>,
}

impl InProcessService {
    pub fn new(orchestrator: IterationOrchestrator) -> Self {
        Self {
            orchestrator: Mutex::new(orchestrator),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IterationOrchestrator> {
        self.orchestrator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the orchestrator, for inspection in tests and tools.
    pub fn inspect<R>(&self, f: impl FnOnce(&IterationOrchestrator) -> R) -> R {
        f(&self.lock())
    }

    pub fn into_inner(self) -> IterationOrchestrator {
        self.orchestrator
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DecisionService for InProcessService {
    fn analysis_file(&self, analysis: &AnalysisFile) -> OrchestratorResult<()> {
        self.lock().set_analysis_file(analysis.clone())
    }

    fn has_next_iteration(
        &self,
        iteration: Iteration,
        caller: CallerPhase,
    ) -> OrchestratorResult<bool> {
        self.lock().has_next_iteration(iteration, caller)
    }

    fn record_iteration_complete(
        &self,
        iteration: Iteration,
        exception_occurred: bool,
    ) -> OrchestratorResult<()> {
        self.lock()
            .record_iteration_complete(iteration, exception_occurred)
    }

    fn teardowns_completed(&self, iteration: Iteration) -> OrchestratorResult<()> {
        self.lock().teardowns_completed(iteration)
    }

    fn terminate(&self) -> OrchestratorResult<CampaignSummary> {
        Ok(self.lock().terminate())
    }

    fn health_check(&self) -> OrchestratorResult<bool> {
        Ok(true)
    }

    fn begin_invocation(&self, invocation: &Invocation) -> OrchestratorResult<InvocationDecision> {
        Ok(self.lock().begin_invocation(invocation))
    }

    fn end_invocation(&self, completion: &Completion) -> OrchestratorResult<()> {
        self.lock().end_invocation(completion)
    }

    fn was_fault_injected(&self) -> OrchestratorResult<bool> {
        Ok(self.lock().was_fault_injected())
    }

    fn was_fault_injected_on_service(&self, service: &str) -> OrchestratorResult<bool> {
        Ok(self.lock().was_fault_injected_on_service(service))
    }

    fn was_fault_injected_on_method(
        &self,
        module: &str,
        method: &str,
    ) -> OrchestratorResult<bool> {
        Ok(self.lock().was_fault_injected_on_method(module, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OrchestratorOptions;
    use std::sync::Arc;

    #[test]
    fn in_process_binding_is_shareable() {
        let service: Arc<dyn DecisionService> = Arc::new(InProcessService::new(
            IterationOrchestrator::new(OrchestratorOptions::default()).unwrap(),
        ));
        assert!(service.health_check().unwrap());
        assert!(
            service
                .has_next_iteration(Iteration::REFERENCE, CallerPhase::BeforeEach)
                .unwrap()
        );
        service
            .record_iteration_complete(Iteration::REFERENCE, false)
            .unwrap();
        service.teardowns_completed(Iteration::REFERENCE).unwrap();
        assert!(
            !service
                .has_next_iteration(Iteration::new(2), CallerPhase::BeforeEach)
                .unwrap()
        );
        let summary = service.terminate().unwrap();
        assert!(summary.exploration.is_complete());
        assert_eq!(summary.iterations, 1);
    }
}
