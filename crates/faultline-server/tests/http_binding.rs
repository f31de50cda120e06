//! Campaigns driven through the HTTP binding.
//!
//! The same workflow runs once in-process and once through a live
//! [`DecisionServer`]; the summaries must agree.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use faultline_analysis::{AnalysisConfiguration, AnalysisFile};
use faultline_dei::{ArgumentsDescriptor, ExecutionIndex};
use faultline_orchestrator::{
    CampaignSummary, Completion, DecisionService, InProcessService, Invocation,
    IterationOrchestrator, OrchestratorError, OrchestratorOptions, RetryPolicy, ServiceErrorKind,
    wait_until_available,
};
use faultline_server::{DecisionServer, HttpDecisionClient, ServerResult, ShutdownHandle};
use faultline_types::{CallerPhase, Iteration};
use serde_json::json;

// ============================================================================
// Harness
// ============================================================================

struct Running {
    addr: SocketAddr,
    handle: ShutdownHandle,
    join: Option<thread::JoinHandle<ServerResult<()>>>,
}

impl Running {
    fn start(options: OrchestratorOptions) -> Self {
        let service = InProcessService::new(IterationOrchestrator::new(options).unwrap());
        let server = DecisionServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(service))
            .unwrap();
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let join = Some(thread::spawn(move || server.run()));
        Self { addr, handle, join }
    }

    fn client(&self) -> HttpDecisionClient {
        HttpDecisionClient::new(self.addr).with_timeout(Duration::from_secs(5))
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(join) = self.join.take() {
            join.join().unwrap().unwrap();
        }
    }
}

fn analysis() -> AnalysisFile {
    AnalysisFile::new()
        .with(
            AnalysisConfiguration::builder()
                .name("grpc")
                .pattern("(.*/.*)")
                .exception(
                    "io.grpc.StatusRuntimeException",
                    [("code", json!("UNAVAILABLE"))],
                )
                .build()
                .unwrap(),
        )
        .unwrap()
}

fn call(service: &dyn DecisionService, index: &mut ExecutionIndex, method: &str) -> bool {
    index.push(method);
    let invocation = Invocation::new(index.clone(), "orders", "cloud.Orders", method)
        .with_arguments(ArgumentsDescriptor::new("OrderRequest", format!("{method}()")));
    let decision = service.begin_invocation(&invocation).unwrap();
    let completion = match &decision.fault {
        Some(_) => Completion::failed(index.clone(), json!("UNAVAILABLE")),
        None => Completion::returned(index.clone(), json!("ok")),
    };
    service.end_invocation(&completion).unwrap();
    index.pop().unwrap();
    decision.fault.is_none()
}

fn campaign(service: &dyn DecisionService) -> CampaignSummary {
    service.analysis_file(&analysis()).unwrap();
    let mut iteration = Iteration::REFERENCE;
    while service
        .has_next_iteration(iteration, CallerPhase::BeforeEach)
        .unwrap()
    {
        let mut index = ExecutionIndex::new();
        if !call(service, &mut index, "Place") {
            call(service, &mut index, "Refund");
        }
        call(service, &mut index, "Notify");
        service
            .record_iteration_complete(iteration, false)
            .unwrap();
        service.teardowns_completed(iteration).unwrap();
        iteration = iteration.next();
    }
    service.terminate().unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn remote_campaign_matches_in_process() {
    let local = InProcessService::new(
        IterationOrchestrator::new(OrchestratorOptions::default()).unwrap(),
    );
    let expected = campaign(&local);

    let running = Running::start(OrchestratorOptions::default());
    let client = running.client();
    wait_until_available(&client, RetryPolicy::new(5, Duration::from_millis(50))).unwrap();
    let actual = campaign(&client);

    assert_eq!(actual, expected);
    assert!(actual.exploration.is_complete());
    assert!(actual.iterations > 1);
}

#[test]
fn injection_queries_reflect_the_running_execution() {
    let running = Running::start(OrchestratorOptions::default());
    let client = running.client();
    client.analysis_file(&analysis()).unwrap();

    // Reference run.
    assert!(client.has_next_iteration(Iteration::REFERENCE, CallerPhase::BeforeEach).unwrap());
    let mut index = ExecutionIndex::new();
    call(&client, &mut index, "Place");
    assert!(!client.was_fault_injected().unwrap());
    client.record_iteration_complete(Iteration::REFERENCE, false).unwrap();
    client.teardowns_completed(Iteration::REFERENCE).unwrap();

    // First faulted run.
    let second = Iteration::new(2);
    assert!(client.has_next_iteration(second, CallerPhase::BeforeEach).unwrap());
    let mut index = ExecutionIndex::new();
    assert!(!call(&client, &mut index, "Place"));
    assert!(client.was_fault_injected().unwrap());
    assert!(client.was_fault_injected_on_service("orders").unwrap());
    assert!(!client.was_fault_injected_on_service("billing").unwrap());
    assert!(client.was_fault_injected_on_method("cloud.Orders", "Place").unwrap());
    assert!(!client.was_fault_injected_on_method("cloud.Orders", "Refund").unwrap());
}

#[test]
fn barrier_errors_keep_their_kind_over_http() {
    let running = Running::start(OrchestratorOptions::default());
    let client = running.client();
    client
        .has_next_iteration(Iteration::REFERENCE, CallerPhase::BeforeEach)
        .unwrap();

    let err = client
        .has_next_iteration(Iteration::new(3), CallerPhase::BeforeEach)
        .unwrap_err();
    assert_eq!(err.kind(), ServiceErrorKind::State);
    assert!(!err.is_unavailable());
    match err {
        OrchestratorError::Rejected { message, .. } => assert!(message.contains("torn down")),
        other => panic!("expected rejected error, got {other:?}"),
    }
}

#[test]
fn unknown_transformer_is_a_configuration_error_in_both_bindings() {
    let analysis = AnalysisFile::new()
        .with(
            AnalysisConfiguration::builder()
                .name("documents")
                .pattern(".*")
                .transformer("xml_document")
                .build()
                .unwrap(),
        )
        .unwrap();

    let local = InProcessService::new(
        IterationOrchestrator::new(OrchestratorOptions::default()).unwrap(),
    );
    let local_err = local.analysis_file(&analysis).unwrap_err();

    let running = Running::start(OrchestratorOptions::default());
    let remote_err = running.client().analysis_file(&analysis).unwrap_err();

    assert_eq!(local_err.kind(), ServiceErrorKind::Configuration);
    assert_eq!(remote_err.kind(), local_err.kind());
    assert!(!remote_err.is_unavailable());
}
