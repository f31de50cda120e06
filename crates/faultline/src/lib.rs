//! # Faultline
//!
//! Service-level fault injection testing for RPC workflows.
//!
//! A campaign runs a workflow once fault-free to discover its remote calls,
//! then again and again, each time failing a different combination of them,
//! until every reachable combination has been tried.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Campaign ──► Workflow::run ──► transport ──► Instrumentor      │
//! │    │                                          │  callsite      │
//! │    │                                          │  index + clock │
//! │    ▼                                          ▼                │
//! │ DecisionService (in-process | HTTP) ◄── begin/end invocation │
//! │    └─► IterationOrchestrator: plans, frontier, reports         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`Instrumentor`]: per-request execution indices and fault decisions
//! - [`Campaign`]: the iteration lifecycle around a [`Workflow`]
//! - [`Settings`]: typed options derived from `faultline.toml`
//! - [`HarnessError`]: every failure, classified by [`ErrorClass`]

mod campaign;
mod error;
mod instrument;
mod settings;

pub use campaign::{
    Campaign, CampaignOutcome, CampaignStatus, IterationContext, IterationOutcome,
    IterationRecord, Workflow,
};
pub use error::{ErrorClass, HarnessError, HarnessResult};
pub use instrument::{CallResult, DecisionSource, Instrumentor, OutboundCall};
pub use settings::{Settings, frame_filter, index_options, orchestrator_options};

// Re-export the building blocks most harnesses touch directly.
pub use faultline_analysis::{
    AnalysisConfiguration, AnalysisFile, Fault, FaultKind, FaultRegistry, TestExecutionDocument,
};
pub use faultline_config::{ConfigLoader, FaultlineConfig};
pub use faultline_dei::{
    ArgumentsDescriptor, CallTarget, CallsiteExtractor, ExecutionIndex, FrameFilter,
    IndexOptions, IndexVersion, RecordedStack, VectorClock,
};
pub use faultline_orchestrator::{
    CampaignSummary, DecisionService, ExplorationStatus, InProcessService, IterationOrchestrator,
    OrchestratorError, OrchestratorOptions, RetryPolicy, SearchStrategy, ServiceErrorKind,
};
pub use faultline_server::{DecisionServer, HttpDecisionClient};
pub use faultline_types::{CallerPhase, Iteration, RequestId};
