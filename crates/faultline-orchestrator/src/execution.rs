//! What happened during one execution of the workflow.

use std::collections::{BTreeSet, HashMap};

use faultline_analysis::Fault;
use faultline_dei::{ArgumentsDescriptor, ExecutionIndex, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::FaultPlan;

/// A call about to be made, as reported by an interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub execution_index: ExecutionIndex,
    pub service: String,
    pub module: String,
    pub method: String,
    #[serde(default)]
    pub arguments: ArgumentsDescriptor,
    #[serde(default)]
    pub vclock: VectorClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_vclock: Option<VectorClock>,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub line_number: String,
}

impl Invocation {
    pub fn new(
        execution_index: ExecutionIndex,
        service: impl Into<String>,
        module: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            execution_index,
            service: service.into(),
            module: module.into(),
            method: method.into(),
            arguments: ArgumentsDescriptor::default(),
            vclock: VectorClock::new(),
            origin_vclock: None,
            file_name: String::new(),
            line_number: String::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: ArgumentsDescriptor) -> Self {
        self.arguments = arguments;
        self
    }

    /// `module/method`, the string analysis patterns match against.
    pub fn signature(&self) -> String {
        format!("{}/{}", self.module, self.method)
    }
}

/// The orchestrator's answer to an [`Invocation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDecision {
    /// Position of the call within the execution; `None` when no
    /// execution is being recorded.
    pub generated_id: Option<usize>,
    /// Fault the interceptor must inject, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

/// How a call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub execution_index: ExecutionIndex,
    /// True if the call failed, whether injected or not.
    pub failed: bool,
    /// Response value, or error description when failed.
    #[serde(default)]
    pub value: Value,
}

impl Completion {
    pub fn returned(execution_index: ExecutionIndex, value: Value) -> Self {
        Self {
            execution_index,
            failed: false,
            value,
        }
    }

    pub fn failed(execution_index: ExecutionIndex, error: Value) -> Self {
        Self {
            execution_index,
            failed: true,
            value: error,
        }
    }
}

/// One call of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRecord {
    pub invocation: Invocation,
    pub completion: Option<Completion>,
    pub fault: Option<Fault>,
}

/// Calls of one execution, in invocation order, under one plan.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    plan: FaultPlan,
    rpcs: Vec<RpcRecord>,
    positions: HashMap<ExecutionIndex, usize>,
    organic_failures: BTreeSet<ExecutionIndex>,
}

impl Execution {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            ..Self::default()
        }
    }

    pub fn plan(&self) -> &FaultPlan {
        &self.plan
    }

    pub fn rpcs(&self) -> &[RpcRecord] {
        &self.rpcs
    }

    pub fn get(&self, index: &ExecutionIndex) -> Option<&RpcRecord> {
        self.positions.get(index).map(|&position| &self.rpcs[position])
    }

    pub fn was_invoked(&self, index: &ExecutionIndex) -> bool {
        self.positions.contains_key(index)
    }

    /// Records a call, returning its position.
    ///
    /// A repeated index keeps its first position and takes the new payload.
    pub fn record_invocation(&mut self, invocation: Invocation) -> usize {
        let fault = self.plan.get(&invocation.execution_index).cloned();
        if let Some(&position) = self.positions.get(&invocation.execution_index) {
            tracing::warn!(
                dei = %invocation.execution_index,
                position,
                "execution index invoked twice in one execution"
            );
            let record = &mut self.rpcs[position];
            record.invocation = invocation;
            record.fault = fault;
            return position;
        }

        let position = self.rpcs.len();
        self.positions
            .insert(invocation.execution_index.clone(), position);
        self.rpcs.push(RpcRecord {
            invocation,
            completion: None,
            fault,
        });
        position
    }

    /// Records how a call ended; false if the call was never invoked.
    ///
    /// A failure at a call the plan did not fault is an organic failure.
    pub fn record_completion(&mut self, completion: Completion) -> bool {
        let Some(&position) = self.positions.get(&completion.execution_index) else {
            return false;
        };
        if completion.failed && !self.plan.contains(&completion.execution_index) {
            self.organic_failures
                .insert(completion.execution_index.clone());
        }
        self.rpcs[position].completion = Some(completion);
        true
    }

    pub fn is_organic_failure(&self, index: &ExecutionIndex) -> bool {
        self.organic_failures.contains(index)
    }

    pub fn organic_failures(&self) -> impl Iterator<Item = &ExecutionIndex> {
        self.organic_failures.iter()
    }

    /// Calls where a fault was injected.
    pub fn injected(&self) -> impl Iterator<Item = &RpcRecord> {
        self.rpcs.iter().filter(|rpc| rpc.fault.is_some())
    }

    /// Plan targets the execution never reached.
    pub fn unreached_targets(&self) -> Vec<&ExecutionIndex> {
        self.plan
            .indices()
            .filter(|index| !self.was_invoked(index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(key: &str) -> ExecutionIndex {
        let mut index = ExecutionIndex::new();
        index.push(key);
        index
    }

    fn invocation(key: &str) -> Invocation {
        Invocation::new(index(key), "hello", "cloud.Hello", key)
    }

    #[test]
    fn positions_follow_invocation_order() {
        let mut execution = Execution::new(FaultPlan::empty());
        assert_eq!(execution.record_invocation(invocation("a")), 0);
        assert_eq!(execution.record_invocation(invocation("b")), 1);
        assert_eq!(execution.rpcs().len(), 2);
    }

    #[test]
    fn repeated_index_keeps_first_position() {
        let mut execution = Execution::new(FaultPlan::empty());
        execution.record_invocation(invocation("a"));
        execution.record_invocation(invocation("b"));
        let mut again = invocation("a");
        again.service = "other".to_string();
        assert_eq!(execution.record_invocation(again), 0);
        assert_eq!(execution.rpcs().len(), 2);
        assert_eq!(execution.get(&index("a")).unwrap().invocation.service, "other");
    }

    #[test]
    fn planned_fault_is_attached() {
        let fault = Fault::Error(json!({"code": 503}));
        let plan = FaultPlan::empty().extended(index("a"), fault.clone());
        let mut execution = Execution::new(plan);
        execution.record_invocation(invocation("a"));
        execution.record_invocation(invocation("b"));
        let injected: Vec<_> = execution.injected().collect();
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0].fault, Some(fault));
    }

    #[test]
    fn unfaulted_failure_is_organic() {
        let plan = FaultPlan::empty().extended(index("a"), Fault::Error(json!({})));
        let mut execution = Execution::new(plan);
        execution.record_invocation(invocation("a"));
        execution.record_invocation(invocation("b"));
        assert!(execution.record_completion(Completion::failed(index("a"), json!("injected"))));
        assert!(execution.record_completion(Completion::failed(index("b"), json!("boom"))));
        assert!(!execution.is_organic_failure(&index("a")));
        assert!(execution.is_organic_failure(&index("b")));
    }

    #[test]
    fn completion_without_invocation_is_rejected() {
        let mut execution = Execution::new(FaultPlan::empty());
        assert!(!execution.record_completion(Completion::returned(index("a"), json!(1))));
    }

    #[test]
    fn unreached_targets_are_reported() {
        let plan = FaultPlan::empty()
            .extended(index("a"), Fault::Error(json!({})))
            .extended(index("z"), Fault::Error(json!({})));
        let mut execution = Execution::new(plan);
        execution.record_invocation(invocation("a"));
        assert_eq!(execution.unreached_targets(), vec![&index("z")]);
    }
}
