//! # faultline-orchestrator: Fault-injection campaigns
//!
//! The [`IterationOrchestrator`] decides, execution by execution, which calls
//! to fail. It is reached through a [`DecisionService`], either in-process
//! ([`InProcessService`]) or over HTTP (`faultline-server`).
//!
//! ```text
//! iteration 1 (reference) ─► fault menus ─► FaultPlans ─► Frontier (dfs | bfs)
//!                                                            │
//! iteration n ◄──────────────── next plan ◄── teardown(n-1) ─┘
//! ```

mod availability;
mod core;
mod error;
mod execution;
mod frontier;
mod options;
mod plan;
mod report;
mod service;

pub use availability::{RetryPolicy, wait_until_available};
pub use crate::core::{IterationOrchestrator, Phase};
pub use error::{OrchestratorError, OrchestratorResult, ServiceErrorKind};
pub use execution::{Completion, Execution, Invocation, InvocationDecision, RpcRecord};
pub use frontier::{BreadthFirst, DepthFirst, Frontier};
pub use options::{OrchestratorOptions, SearchStrategy};
pub use plan::FaultPlan;
pub use report::{
    CampaignSummary, ExplorationStatus, InjectionStats, RpcReport, TestExecutionReport,
};
pub use service::{DecisionService, InProcessService};
