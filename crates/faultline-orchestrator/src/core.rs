//! The iteration orchestrator.
//!
//! Drives a campaign of executions of one workflow. Iteration 1 runs
//! fault-free and discovers the call graph; every call it makes offers a
//! fault menu, and each (call, fault) becomes a [`FaultPlan`] to try in a
//! later iteration. Executions under a plan discover further calls, whose
//! menus extend that plan, so the search runs over a growing frontier.
//!
//! ```text
//!  AwaitingReference ──teardown(1)──► Exploring ──cap or exhausted──► Finalizing
//!                                        │  ▲                              │
//!                                        └──┘ teardown(n)            terminate()
//!                                                                          ▼
//!                                                                         Done
//! ```
//!
//! Plans found during iteration `n` are buffered and reach the frontier only
//! at `teardowns_completed(n)`, the barrier between iterations.

use std::collections::{HashMap, HashSet};
use std::fmt;

use faultline_analysis::{
    AnalysisConfiguration, AnalysisFile, Fault, TransformerFault, TransformerRegistry,
};
use faultline_dei::ExecutionIndex;
use faultline_types::{CallerPhase, Iteration};
use serde_json::Value;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::execution::{Completion, Execution, Invocation, InvocationDecision};
use crate::frontier::Frontier;
use crate::options::OrchestratorOptions;
use crate::plan::FaultPlan;
use crate::report::{CampaignSummary, ExplorationStatus, InjectionStats, TestExecutionReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Iteration 1, fault-free.
    AwaitingReference,
    Exploring,
    /// No further bodies run; only teardown remains.
    Finalizing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::AwaitingReference => "awaiting-reference",
            Phase::Exploring => "exploring",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

pub struct IterationOrchestrator {
    options: OrchestratorOptions,
    analysis: AnalysisFile,
    transformers: TransformerRegistry,
    frontier: Box<dyn Frontier>,
    /// Plans found by the running execution, merged at its teardown.
    pending: Vec<FaultPlan>,
    /// Fingerprints of every plan run, running, or queued.
    seen: HashSet<String>,
    /// (signature, arguments, fault) already scheduled.
    injection_keys: HashSet<String>,
    /// Unfaulted responses, the input of transformer faults.
    reference_values: HashMap<ExecutionIndex, Value>,
    active: Option<Execution>,
    phase: Phase,
    last_teardown: Option<Iteration>,
    cap_reached: bool,
    reports: Vec<TestExecutionReport>,
    stats: InjectionStats,
}

impl IterationOrchestrator {
    pub fn new(options: OrchestratorOptions) -> OrchestratorResult<Self> {
        options.validate()?;
        let reference = FaultPlan::empty();
        let mut seen = HashSet::new();
        seen.insert(reference.fingerprint());

        Ok(Self {
            options,
            analysis: AnalysisFile::new(),
            transformers: TransformerRegistry::builtin(),
            frontier: options.search_strategy.frontier(),
            pending: Vec::new(),
            seen,
            injection_keys: HashSet::new(),
            reference_values: HashMap::new(),
            active: Some(Execution::new(reference)),
            phase: Phase::AwaitingReference,
            last_teardown: None,
            cap_reached: false,
            reports: Vec::new(),
            stats: InjectionStats::default(),
        })
    }

    pub fn with_transformers(mut self, transformers: TransformerRegistry) -> Self {
        self.transformers = transformers;
        self
    }

    /// Installs the analysis file. Every transformer it names must exist.
    pub fn set_analysis_file(&mut self, analysis: AnalysisFile) -> OrchestratorResult<()> {
        for entry in analysis
            .configurations()
            .iter()
            .flat_map(AnalysisConfiguration::transformers)
        {
            self.transformers.get(&entry.transformer)?;
        }
        tracing::info!(
            configurations = analysis.configurations().len(),
            "analysis file installed"
        );
        self.analysis = analysis;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn analysis(&self) -> &AnalysisFile {
        &self.analysis
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The iteration whose teardown is awaited next.
    pub fn current_iteration(&self) -> Iteration {
        self.last_teardown.map_or(Iteration::REFERENCE, |n| n.next())
    }

    /// Plan of the execution being recorded, if any.
    pub fn active_plan(&self) -> Option<&FaultPlan> {
        self.active.as_ref().map(Execution::plan)
    }

    pub fn active_execution(&self) -> Option<&Execution> {
        self.active.as_ref()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Plans not yet run, including one selected but not started.
    pub fn remaining(&self) -> usize {
        self.frontier.len() + self.pending.len() + usize::from(self.active.is_some())
    }

    pub fn is_cap_reached(&self) -> bool {
        self.cap_reached
    }

    pub fn reports(&self) -> &[TestExecutionReport] {
        &self.reports
    }

    pub fn stats(&self) -> &InjectionStats {
        &self.stats
    }

    // ========================================================================
    // Iteration lifecycle
    // ========================================================================

    /// Whether the body of iteration `n` should run.
    ///
    /// Iteration 1 always runs. At `max_iterations` the answer is false even
    /// with work left; that case is recorded and reported by `terminate`.
    pub fn has_next_iteration(
        &mut self,
        iteration: Iteration,
        caller: CallerPhase,
    ) -> OrchestratorResult<bool> {
        if self.phase == Phase::Done {
            return Ok(false);
        }
        if iteration.is_reference() {
            return Ok(true);
        }

        let expected = self.current_iteration();
        if iteration > expected {
            return Err(OrchestratorError::TeardownMissing {
                iteration: expected,
            });
        }
        if iteration < expected {
            return Err(OrchestratorError::IterationMismatch {
                expected,
                got: iteration,
            });
        }

        if iteration.as_u32() >= self.options.max_iterations {
            if self.phase != Phase::Finalizing {
                let remaining = self.remaining();
                self.cap_reached = remaining > 0;
                self.phase = Phase::Finalizing;
                if self.cap_reached {
                    tracing::info!(
                        %iteration,
                        remaining,
                        "iteration cap reached, exploration incomplete"
                    );
                }
            }
            return Ok(false);
        }

        let run = self.phase != Phase::Finalizing && self.active.is_some();
        if !run && self.phase != Phase::Finalizing {
            tracing::info!(%iteration, caller = %caller, "exploration exhausted");
            self.phase = Phase::Finalizing;
        }
        Ok(run)
    }

    /// Records the outcome of iteration `n`'s body.
    pub fn record_iteration_complete(
        &mut self,
        iteration: Iteration,
        exception_occurred: bool,
    ) -> OrchestratorResult<()> {
        let expected = self.current_iteration();
        if iteration != expected {
            return Err(OrchestratorError::IterationMismatch {
                expected,
                got: iteration,
            });
        }
        let execution = self
            .active
            .as_ref()
            .ok_or(OrchestratorError::NoActiveExecution { iteration })?;

        let report =
            TestExecutionReport::from_execution(iteration, !exception_occurred, execution);
        tracing::info!(
            %iteration,
            passed = report.passed,
            calls = report.rpcs.len(),
            plan = %execution.plan(),
            "iteration complete"
        );

        match self.reports.last_mut() {
            Some(last) if last.iteration == iteration => *last = report,
            _ => self.reports.push(report),
        }
        Ok(())
    }

    /// Barrier between iteration `n` and `n + 1`.
    ///
    /// Retires the finished execution, merges the plans it discovered into
    /// the frontier, and selects the plan for the next iteration.
    pub fn teardowns_completed(&mut self, iteration: Iteration) -> OrchestratorResult<()> {
        let expected = self.current_iteration();
        if iteration != expected {
            return Err(OrchestratorError::BarrierViolation {
                expected,
                got: iteration,
            });
        }

        if matches!(self.phase, Phase::AwaitingReference | Phase::Exploring) {
            if let Some(execution) = self.active.take() {
                self.prune_unreached(&execution);
            }
            let batch = std::mem::take(&mut self.pending);
            let discovered = batch.len();
            self.frontier.schedule(batch);
            self.active = self.frontier.next().map(Execution::new);
            self.phase = Phase::Exploring;

            tracing::debug!(
                %iteration,
                discovered,
                queued = self.frontier.len(),
                next = %self.active_plan().map_or_else(|| "none".to_string(), ToString::to_string),
                "teardown complete"
            );
        }

        self.last_teardown = Some(iteration);
        Ok(())
    }

    /// Ends the campaign.
    pub fn terminate(&mut self) -> CampaignSummary {
        let remaining = self.remaining();
        let exploration = if self.cap_reached {
            ExplorationStatus::IterationCapReached { remaining }
        } else if remaining > 0 {
            ExplorationStatus::Stopped { remaining }
        } else {
            ExplorationStatus::Exhausted
        };
        self.phase = Phase::Done;

        tracing::info!(
            iterations = self.reports.len(),
            injected = self.stats.total_injected(),
            remaining,
            complete = exploration.is_complete(),
            "campaign terminated"
        );

        CampaignSummary {
            exploration,
            iterations: u32::try_from(self.reports.len()).unwrap_or(u32::MAX),
            reports: self.reports.clone(),
            stats: self.stats.clone(),
        }
    }

    // ========================================================================
    // Invocations
    // ========================================================================

    /// Records a call and decides whether to fault it.
    pub fn begin_invocation(&mut self, invocation: &Invocation) -> InvocationDecision {
        if !self.is_recording() {
            return InvocationDecision::default();
        }
        let Some(mut execution) = self.active.take() else {
            return InvocationDecision::default();
        };

        let decision = self.decide(&mut execution, invocation);
        self.active = Some(execution);
        decision
    }

    /// Records how a call ended.
    pub fn end_invocation(&mut self, completion: &Completion) -> OrchestratorResult<()> {
        if !self.is_recording() {
            return Ok(());
        }
        let Some(mut execution) = self.active.take() else {
            return Ok(());
        };

        let result = self.complete(&mut execution, completion);
        self.active = Some(execution);
        result
    }

    fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::AwaitingReference | Phase::Exploring)
    }

    fn decide(&mut self, execution: &mut Execution, invocation: &Invocation) -> InvocationDecision {
        let index = &invocation.execution_index;
        let position = execution.record_invocation(invocation.clone());
        let fault = execution.plan().get(index).cloned();

        if let Some(fault) = &fault {
            self.stats.inject(fault.kind());
            tracing::debug!(
                iteration = %self.current_iteration(),
                dei = %index,
                kind = %fault.kind(),
                "fault injected"
            );
        }

        let menu = self
            .analysis
            .fault_menu(&invocation.service, &invocation.signature());
        for candidate in menu {
            self.stats.observe(candidate.kind());
            self.consider(execution, invocation, candidate);
        }

        InvocationDecision {
            generated_id: Some(position),
            fault,
        }
    }

    fn complete(
        &mut self,
        execution: &mut Execution,
        completion: &Completion,
    ) -> OrchestratorResult<()> {
        let index = &completion.execution_index;
        if !execution.record_completion(completion.clone()) {
            return Err(OrchestratorError::UnknownInvocation {
                index: index.clone(),
            });
        }

        if execution.is_organic_failure(index) {
            tracing::debug!(dei = %index, "organic failure");
            if self.options.avoid_injections_on_organic_failures {
                self.withdraw(execution, index);
            }
            return Ok(());
        }
        if completion.failed {
            return Ok(());
        }

        let invocation = execution
            .get(index)
            .map(|rpc| rpc.invocation.clone())
            .ok_or_else(|| OrchestratorError::UnknownInvocation {
                index: index.clone(),
            })?;

        match execution.plan().get(index) {
            Some(Fault::Transformer(applied)) => {
                let applied = applied.clone();
                self.schedule_next_step(execution, &invocation, &applied)
            }
            Some(_) => Ok(()),
            None => self.schedule_first_steps(execution, &invocation, &completion.value),
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Schedules `execution.plan + {call: fault}` unless a rule excludes it.
    fn consider(&mut self, execution: &Execution, invocation: &Invocation, fault: Fault) {
        let index = &invocation.execution_index;
        let plan = execution.plan();

        if plan.contains(index) {
            return;
        }
        if self.options.suppress_combinations && !plan.is_empty() {
            return;
        }
        if self.options.avoid_injections_on_organic_failures && execution.is_organic_failure(index)
        {
            self.stats.organic_skipped += 1;
            return;
        }

        let candidate = plan.extended(index.clone(), fault.clone());
        if self.options.dynamic_reduction && candidate.has_nested_targets() {
            self.stats.pruned += 1;
            return;
        }
        self.enqueue(candidate, invocation, fault);
    }

    fn enqueue(&mut self, candidate: FaultPlan, invocation: &Invocation, fault: Fault) {
        let fingerprint = candidate.fingerprint();
        if self.seen.contains(&fingerprint) {
            return;
        }
        if self.options.avoid_redundant_injections
            && !self.injection_keys.insert(injection_key(invocation, &fault))
        {
            self.stats.redundant_skipped += 1;
            return;
        }

        self.seen.insert(fingerprint);
        self.stats.schedule(fault.kind());
        tracing::debug!(
            iteration = %self.current_iteration(),
            dei = %invocation.execution_index,
            kind = %fault.kind(),
            plan_size = candidate.len(),
            "fault scheduled"
        );
        self.pending.push(candidate);
    }

    /// Drops plans this execution scheduled at a call that failed on its own.
    fn withdraw(&mut self, execution: &Execution, index: &ExecutionIndex) {
        let invocation = execution.get(index).map(|rpc| rpc.invocation.clone());
        let mut withdrawn = Vec::new();
        self.pending.retain(|plan| match plan.get(index) {
            Some(fault) => {
                withdrawn.push((plan.fingerprint(), fault.clone()));
                false
            }
            None => true,
        });

        for (fingerprint, fault) in withdrawn {
            self.seen.remove(&fingerprint);
            self.stats.unschedule(fault.kind());
            self.stats.organic_skipped += 1;
            if let Some(invocation) = &invocation {
                self.injection_keys.remove(&injection_key(invocation, &fault));
            }
        }
    }

    fn schedule_first_steps(
        &mut self,
        execution: &Execution,
        invocation: &Invocation,
        response: &Value,
    ) -> OrchestratorResult<()> {
        let names = self.analysis.transformers_for(&invocation.signature());
        if names.is_empty() {
            return Ok(());
        }
        let index = &invocation.execution_index;
        let reference = self
            .reference_values
            .entry(index.clone())
            .or_insert_with(|| response.clone())
            .clone();

        for name in names {
            let transformer = self.transformers.get(&name)?;
            match transformer.transform(&reference, 0) {
                Some(value) => {
                    let fault = Fault::Transformer(TransformerFault {
                        transformer: name,
                        step: 0,
                        value,
                    });
                    self.stats.observe(fault.kind());
                    self.consider(execution, invocation, fault);
                }
                None => tracing::warn!(
                    dei = %index,
                    transformer = %name,
                    "response value cannot be transformed"
                ),
            }
        }
        Ok(())
    }

    fn schedule_next_step(
        &mut self,
        execution: &Execution,
        invocation: &Invocation,
        applied: &TransformerFault,
    ) -> OrchestratorResult<()> {
        let index = &invocation.execution_index;
        let Some(reference) = self.reference_values.get(index).cloned() else {
            tracing::warn!(dei = %index, "no reference value for transformer step");
            return Ok(());
        };
        let transformer = self.transformers.get(&applied.transformer)?;
        let step = applied.step + 1;

        if let Some(value) = transformer.transform(&reference, step) {
            let fault = Fault::Transformer(TransformerFault {
                transformer: applied.transformer.clone(),
                step,
                value,
            });
            let candidate = execution.plan().extended(index.clone(), fault.clone());
            self.stats.observe(fault.kind());
            self.enqueue(candidate, invocation, fault);
        }
        Ok(())
    }

    /// With dynamic reduction, an execution that never reached some of its
    /// plan's targets prunes every queued superset of that plan.
    fn prune_unreached(&mut self, execution: &Execution) {
        if !self.options.dynamic_reduction || execution.plan().is_empty() {
            return;
        }
        let unreached = execution.unreached_targets();
        if unreached.is_empty() {
            return;
        }

        let plan = execution.plan();
        let before = self.pending.len();
        self.pending.retain(|candidate| !plan.is_subset_of(candidate));
        let pruned = before - self.pending.len()
            + self
                .frontier
                .retain(&mut |candidate| !plan.is_subset_of(candidate));
        self.stats.pruned += pruned as u64;

        tracing::debug!(
            plan = %plan,
            unreached = unreached.len(),
            pruned,
            "pruned plans with unreachable targets"
        );
    }

    // ========================================================================
    // Assertion queries
    // ========================================================================

    pub fn was_fault_injected(&self) -> bool {
        self.injected_matching(|_| true)
    }

    pub fn was_fault_injected_on_service(&self, service: &str) -> bool {
        self.injected_matching(|invocation| invocation.service == service)
    }

    /// `module` is the invoked module, as in the call's signature.
    pub fn was_fault_injected_on_method(&self, module: &str, method: &str) -> bool {
        self.injected_matching(|invocation| invocation.module == module && invocation.method == method)
    }

    fn injected_matching(&self, predicate: impl Fn(&Invocation) -> bool) -> bool {
        self.active
            .as_ref()
            .is_some_and(|execution| execution.injected().any(|rpc| predicate(&rpc.invocation)))
    }
}

fn injection_key(invocation: &Invocation, fault: &Fault) -> String {
    serde_json::to_string(&(
        invocation.signature(),
        &invocation.arguments.rendered,
        fault.to_string(),
    ))
    .unwrap_or_default()
}

impl fmt::Debug for IterationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterationOrchestrator")
            .field("phase", &self.phase)
            .field("current_iteration", &self.current_iteration())
            .field("frontier", &self.frontier.len())
            .field("pending", &self.pending.len())
            .field("cap_reached", &self.cap_reached)
            .finish_non_exhaustive()
    }
}
