//! Per-iteration reports and the end-of-campaign summary.

use std::collections::BTreeMap;

use faultline_analysis::{Fault, FaultKind};
use faultline_dei::ExecutionIndex;
use faultline_types::Iteration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::Execution;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReport {
    pub dei: ExecutionIndex,
    pub request: Value,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub fault: Option<Fault>,
}

/// Record of one iteration that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestExecutionReport {
    pub iteration: Iteration,
    pub passed: bool,
    /// Calls in invocation order; each index appears once.
    pub rpcs: Vec<RpcReport>,
}

impl TestExecutionReport {
    pub(crate) fn from_execution(iteration: Iteration, passed: bool, execution: &Execution) -> Self {
        let rpcs = execution
            .rpcs()
            .iter()
            .map(|rpc| RpcReport {
                dei: rpc.invocation.execution_index.clone(),
                request: serde_json::to_value(&rpc.invocation).unwrap_or(Value::Null),
                response: rpc.completion.as_ref().map(|c| c.value.clone()),
                fault: rpc.fault.clone(),
            })
            .collect();
        Self {
            iteration,
            passed,
            rpcs,
        }
    }

    pub fn invoked(&self) -> impl Iterator<Item = &ExecutionIndex> {
        self.rpcs.iter().map(|rpc| &rpc.dei)
    }

    pub fn faults(&self) -> impl Iterator<Item = (&ExecutionIndex, &Fault)> {
        self.rpcs
            .iter()
            .filter_map(|rpc| rpc.fault.as_ref().map(|fault| (&rpc.dei, fault)))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Why exploration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExplorationStatus {
    /// Every scheduled plan ran or was pruned.
    Exhausted,
    /// The iteration cap stopped the campaign with plans left.
    IterationCapReached { remaining: usize },
    /// The campaign was terminated early with plans left.
    Stopped { remaining: usize },
}

impl ExplorationStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ExplorationStatus::Exhausted)
    }

    pub fn remaining(&self) -> usize {
        match self {
            ExplorationStatus::Exhausted => 0,
            ExplorationStatus::IterationCapReached { remaining }
            | ExplorationStatus::Stopped { remaining } => *remaining,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionStats {
    /// Candidate faults offered by the analysis file.
    pub observed: BTreeMap<FaultKind, u64>,
    /// Plans queued, by the kind of the fault they added.
    pub scheduled: BTreeMap<FaultKind, u64>,
    /// Faults actually handed to interceptors.
    pub injected: BTreeMap<FaultKind, u64>,
    pub pruned: u64,
    pub redundant_skipped: u64,
    pub organic_skipped: u64,
}

impl InjectionStats {
    pub(crate) fn observe(&mut self, kind: FaultKind) {
        *self.observed.entry(kind).or_default() += 1;
    }

    pub(crate) fn schedule(&mut self, kind: FaultKind) {
        *self.scheduled.entry(kind).or_default() += 1;
    }

    pub(crate) fn unschedule(&mut self, kind: FaultKind) {
        if let Some(count) = self.scheduled.get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
    }

    pub(crate) fn inject(&mut self, kind: FaultKind) {
        *self.injected.entry(kind).or_default() += 1;
    }

    pub fn total_injected(&self) -> u64 {
        self.injected.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub exploration: ExplorationStatus,
    /// Iterations whose body ran.
    pub iterations: u32,
    pub reports: Vec<TestExecutionReport>,
    pub stats: InjectionStats,
}

impl CampaignSummary {
    pub fn failed_iterations(&self) -> impl Iterator<Item = &TestExecutionReport> {
        self.reports.iter().filter(|report| !report.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Completion, Invocation};
    use crate::plan::FaultPlan;
    use serde_json::json;

    fn index(key: &str) -> ExecutionIndex {
        let mut index = ExecutionIndex::new();
        index.push(key);
        index
    }

    #[test]
    fn report_json_shape() {
        let fault = Fault::Error(json!({"status_code": "503"}));
        let mut execution = Execution::new(FaultPlan::empty().extended(index("b"), fault.clone()));
        for key in ["a", "b"] {
            execution.record_invocation(Invocation::new(index(key), "svc", "m", key));
        }
        execution.record_completion(Completion::returned(index("a"), json!("ok")));

        let report = TestExecutionReport::from_execution(Iteration::new(2), false, &execution);
        let value = report.to_json();
        assert_eq!(value["iteration"], json!(2));
        assert_eq!(value["passed"], json!(false));
        assert_eq!(value["rpcs"][0]["dei"], json!(r#"[["a",1]]"#));
        assert_eq!(value["rpcs"][0]["response"], json!("ok"));
        assert_eq!(value["rpcs"][1]["fault"], fault.to_value());
        assert_eq!(report.faults().count(), 1);
        assert_eq!(report.invoked().count(), 2);
    }

    #[test]
    fn status_serializes_with_tag() {
        let status = ExplorationStatus::IterationCapReached { remaining: 3 };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"status": "iteration_cap_reached", "remaining": 3})
        );
        assert!(!status.is_complete());
        assert_eq!(status.remaining(), 3);
        assert!(ExplorationStatus::Exhausted.is_complete());
    }

    #[test]
    fn stats_count_by_kind() {
        let mut stats = InjectionStats::default();
        stats.inject(FaultKind::Exception);
        stats.inject(FaultKind::Exception);
        stats.inject(FaultKind::Latency);
        assert_eq!(stats.injected[&FaultKind::Exception], 2);
        assert_eq!(stats.total_injected(), 3);
        stats.schedule(FaultKind::Error);
        stats.unschedule(FaultKind::Error);
        stats.unschedule(FaultKind::Error);
        assert_eq!(stats.scheduled[&FaultKind::Error], 0);
    }
}
