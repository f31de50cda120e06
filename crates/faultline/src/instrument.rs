//! The instrumentation layer transports opt into.
//!
//! A transport wraps each outbound call in [`Instrumentor::begin_call`] and
//! [`Instrumentor::end_call`], and each inbound request in
//! [`Instrumentor::accept_inbound`] / [`Instrumentor::close_scope`]. The
//! instrumentor keeps the per-request index and clock, asks the decision
//! source whether to fault the call, and hands back the serialized index to
//! propagate to the callee.
//!
//! ```text
//! accept_inbound(id, dei?, clock?)
//!     begin_call(id, target) ─► callsite ─► push ─► decide ─► OutboundCall
//!     end_call(call, result) ─► report ─► pop
//! close_scope(id)
//! ```

use std::sync::Arc;

use faultline_analysis::{Fault, TestExecutionDocument};
use faultline_dei::{
    CallTarget, CallsiteExtractor, ExecutionIndex, IndexOptions, KeyEncoder, RequestScope,
    ScopeRegistry, VectorClock,
};
use faultline_orchestrator::{Completion, DecisionService, Invocation, OrchestratorError};
use faultline_types::RequestId;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

/// Where fault decisions come from.
#[derive(Clone, Default)]
pub enum DecisionSource {
    /// A live campaign.
    Service(Arc<dyn DecisionService>),
    /// A recorded counterexample, replayed without a service.
    Replay(Arc<TestExecutionDocument>),
    /// Never fault.
    #[default]
    Disabled,
}

impl std::fmt::Debug for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionSource::Service(_) => f.write_str("Service"),
            DecisionSource::Replay(doc) => write!(f, "Replay({} failures)", doc.failures.len()),
            DecisionSource::Disabled => f.write_str("Disabled"),
        }
    }
}

/// An outbound call in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub request_id: RequestId,
    pub target: CallTarget,
    /// `None` when the callsite could not be determined and the call
    /// proceeds unindexed.
    pub execution_index: Option<ExecutionIndex>,
    pub vclock: VectorClock,
    pub fault: Option<Fault>,
    pub generated_id: Option<usize>,
}

impl OutboundCall {
    /// Text form of the index to attach to the outgoing request.
    pub fn propagated_index(&self) -> Option<String> {
        self.execution_index.as_ref().map(ToString::to_string)
    }

    pub fn propagated_clock(&self) -> String {
        self.vclock.to_string()
    }
}

/// Outcome of an outbound call, as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Returned(Value),
    Failed(Value),
}

pub struct Instrumentor {
    actor: String,
    scopes: ScopeRegistry,
    extractor: CallsiteExtractor,
    encoder: Box<dyn KeyEncoder>,
    decisions: DecisionSource,
    degrade_on_unknown_callsite: bool,
    degrade_when_unavailable: bool,
}

impl Instrumentor {
    /// `actor` names this process in vector clocks.
    pub fn new(actor: impl Into<String>, extractor: CallsiteExtractor, index: IndexOptions) -> Self {
        Self {
            actor: actor.into(),
            scopes: ScopeRegistry::new(),
            extractor,
            encoder: index.encoder(),
            decisions: DecisionSource::Disabled,
            degrade_on_unknown_callsite: false,
            degrade_when_unavailable: false,
        }
    }

    pub fn with_decisions(mut self, decisions: DecisionSource) -> Self {
        self.decisions = decisions;
        self
    }

    /// Lets calls without a determinable callsite proceed unindexed.
    pub fn with_degrade_on_unknown_callsite(mut self, enabled: bool) -> Self {
        self.degrade_on_unknown_callsite = enabled;
        self
    }

    /// Treats an unreachable decision service as "no fault".
    pub fn with_degrade_when_unavailable(mut self, enabled: bool) -> Self {
        self.degrade_when_unavailable = enabled;
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Opens the scope for an inbound request, continuing the caller's
    /// index and clock when they were propagated.
    pub fn accept_inbound(
        &self,
        request_id: RequestId,
        dei: Option<&str>,
        vclock: Option<&str>,
    ) -> HarnessResult<()> {
        let index = match dei {
            Some(text) => ExecutionIndex::parse(text)?,
            None => ExecutionIndex::new(),
        };
        let origin_clock = vclock.map(str::parse::<VectorClock>).transpose()?;
        debug!(request = %request_id, dei = %index, "inbound request");
        self.scopes
            .create(request_id, RequestScope::continuing(index, origin_clock))?;
        Ok(())
    }

    /// Removes the request's scope. Must be called when the request ends.
    pub fn close_scope(&self, request_id: &RequestId) -> Option<RequestScope> {
        self.scopes.clear(request_id)
    }

    pub fn current_index(&self, request_id: &RequestId) -> HarnessResult<ExecutionIndex> {
        Ok(self.scopes.fetch(request_id)?.index)
    }

    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }

    pub fn begin_call(&self, request_id: &RequestId, target: CallTarget) -> HarnessResult<OutboundCall> {
        let callsite = match self.extractor.extract(target.clone()) {
            Ok(callsite) => callsite,
            Err(e) if self.degrade_on_unknown_callsite => {
                warn!(
                    request = %request_id,
                    signature = %target.signature(),
                    error = %e,
                    "callsite unknown, call proceeds without an execution index"
                );
                let vclock = self.scopes.with_scope(request_id, |scope| {
                    scope.clock.increment(&self.actor);
                    scope.clock.clone()
                })?;
                return Ok(OutboundCall {
                    request_id: request_id.clone(),
                    target,
                    execution_index: None,
                    vclock,
                    fault: None,
                    generated_id: None,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let (index, vclock, origin_clock) = self.scopes.with_scope(request_id, |scope| {
            scope.index.push_callsite(&callsite, self.encoder.as_ref());
            scope.clock.increment(&self.actor);
            (
                scope.index.clone(),
                scope.clock.clone(),
                scope.origin_clock.clone(),
            )
        })?;

        let decided = match &self.decisions {
            DecisionSource::Service(service) => {
                let invocation = Invocation {
                    execution_index: index.clone(),
                    service: target.service_name.clone(),
                    module: target.module.clone(),
                    method: target.method.clone(),
                    arguments: target.arguments.clone(),
                    vclock: vclock.clone(),
                    origin_vclock: origin_clock,
                    file_name: callsite.file_name.clone(),
                    line_number: callsite.line_number.clone(),
                };
                self.degradable(service.begin_invocation(&invocation))
                    .map(|decision| match decision {
                        Some(decision) => (decision.fault, decision.generated_id),
                        None => (None, None),
                    })
            }
            DecisionSource::Replay(document) => match document.should_fail_request_with(&index) {
                Some(record) => record
                    .fault()
                    .map(|fault| (fault, None))
                    .map_err(HarnessError::from),
                None => Ok((None, None)),
            },
            DecisionSource::Disabled => Ok((None, None)),
        };
        let (fault, generated_id) = match decided {
            Ok(decided) => decided,
            Err(e) => {
                self.unwind(request_id, &index);
                return Err(e);
            }
        };

        debug!(
            request = %request_id,
            dei = %index,
            callsite = %callsite,
            faulted = fault.is_some(),
            "outbound call"
        );

        Ok(OutboundCall {
            request_id: request_id.clone(),
            target,
            execution_index: Some(index),
            vclock,
            fault,
            generated_id,
        })
    }

    /// Pops the call's segment, then reports its outcome.
    pub fn end_call(&self, call: &OutboundCall, result: CallResult) -> HarnessResult<()> {
        let Some(index) = &call.execution_index else {
            return Ok(());
        };

        let popped = self.scopes.with_scope(&call.request_id, |scope| {
            if scope.index != *index {
                return Err(HarnessError::UnbalancedCall {
                    expected: index.to_string(),
                    found: scope.index.to_string(),
                });
            }
            Ok(scope.index.pop()?)
        })??;
        debug!(request = %call.request_id, key = popped.key(), "call ended");

        if let DecisionSource::Service(service) = &self.decisions {
            let completion = match result {
                CallResult::Returned(value) => Completion::returned(index.clone(), value),
                CallResult::Failed(value) => Completion::failed(index.clone(), value),
            };
            self.degradable(service.end_invocation(&completion))?;
        }
        Ok(())
    }

    /// Pops the segment pushed for a call that could not be issued.
    fn unwind(&self, request_id: &RequestId, index: &ExecutionIndex) {
        let unwound = self.scopes.with_scope(request_id, |scope| {
            scope.index == *index && scope.index.pop().is_ok()
        });
        if !matches!(unwound, Ok(true)) {
            warn!(request = %request_id, dei = %index, "failed call left its segment in place");
        }
    }

    fn degradable<T>(&self, result: Result<T, OrchestratorError>) -> HarnessResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_unavailable() && self.degrade_when_unavailable => {
                warn!(error = %e, "decision service unavailable, call proceeds without a fault");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Instrumentor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentor")
            .field("actor", &self.actor)
            .field("index", &self.encoder.version())
            .field("decisions", &self.decisions)
            .field("open_scopes", &self.scopes.len())
            .finish_non_exhaustive()
    }
}
