//! Typed harness settings derived from [`FaultlineConfig`].
//!
//! The library crates never read configuration themselves; everything they
//! need is converted here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use faultline_analysis::{AnalysisFile, TestExecutionDocument};
use faultline_config::{FaultlineConfig, IndexFormat, SearchOrder, ServiceBinding};
use faultline_dei::{
    CargoManifestImports, ComponentOptions, FrameFilter, ImportedLibraries, IndexOptions,
    IndexVersion, NoImports,
};
use faultline_orchestrator::{
    DecisionService, InProcessService, IterationOrchestrator, OrchestratorOptions, RetryPolicy,
    SearchStrategy,
};
use faultline_server::HttpDecisionClient;
use tracing::debug;

use crate::error::HarnessResult;

#[derive(Debug, Clone)]
pub struct Settings {
    pub index: IndexOptions,
    pub frame_filter: FrameFilter,
    pub line_numbers: bool,
    pub orchestrator: OrchestratorOptions,
    pub binding: ServiceBinding,
    pub address: std::net::SocketAddr,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub degrade_when_unavailable: bool,
    pub degrade_on_unknown_callsite: bool,
    pub analysis_file: Option<PathBuf>,
    pub counterexample_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_config(config: &FaultlineConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            index: index_options(config),
            frame_filter: frame_filter(config)?,
            line_numbers: config.callsite.line_numbers,
            orchestrator: orchestrator_options(config),
            binding: config.service.binding,
            address: config.service.socket_addr()?,
            retry: RetryPolicy::new(
                config.service.health_check_attempts,
                Duration::from_millis(config.service.health_check_backoff_ms),
            ),
            request_timeout: Duration::from_millis(config.service.request_timeout_ms),
            degrade_when_unavailable: config.service.degrade_when_unavailable,
            degrade_on_unknown_callsite: config.campaign.degrade_on_unknown_callsite,
            analysis_file: config.campaign.analysis_file.clone(),
            counterexample_file: config.campaign.counterexample_file.clone(),
        })
    }

    /// The decision service selected by `[service] binding`.
    pub fn decision_service(&self) -> HarnessResult<Arc<dyn DecisionService>> {
        Ok(match self.binding {
            ServiceBinding::InProcess => Arc::new(InProcessService::new(
                IterationOrchestrator::new(self.orchestrator)?,
            )),
            ServiceBinding::Http => Arc::new(
                HttpDecisionClient::new(self.address).with_timeout(self.request_timeout),
            ),
        })
    }

    /// The analysis file, or an empty one when none is configured.
    pub fn load_analysis(&self) -> HarnessResult<AnalysisFile> {
        match &self.analysis_file {
            Some(path) => Ok(AnalysisFile::load(path)?),
            None => {
                debug!("no analysis file configured, no faults will be offered");
                Ok(AnalysisFile::new())
            }
        }
    }

    /// The counterexample to replay. Fails when none is configured.
    pub fn load_counterexample(&self) -> HarnessResult<TestExecutionDocument> {
        Ok(TestExecutionDocument::load(
            self.counterexample_file.as_deref(),
        )?)
    }
}

pub fn index_options(config: &FaultlineConfig) -> IndexOptions {
    let index = &config.index;
    IndexOptions {
        version: match index.version {
            IndexFormat::V1 => IndexVersion::V1,
            IndexFormat::V2 => IndexVersion::V2,
        },
        components: ComponentOptions {
            hash_signature: index.hash_signature,
            include_synchronous: index.include_synchronous,
            hash_synchronous: index.hash_synchronous,
            include_asynchronous: index.include_asynchronous
                && !config.orchestrator.data_nondeterminism,
            hash_asynchronous: index.hash_asynchronous,
        },
    }
}

pub fn frame_filter(config: &FaultlineConfig) -> HarnessResult<FrameFilter> {
    let callsite = &config.callsite;
    let filter = match &callsite.infrastructure_namespaces {
        Some(namespaces) => FrameFilter::new(namespaces.clone()),
        None => FrameFilter::default(),
    };
    if !callsite.remove_imports {
        return Ok(filter);
    }

    let provider: Box<dyn ImportedLibraries> = match &callsite.manifest {
        Some(manifest) => Box::new(
            CargoManifestImports::new(manifest)
                .with_whitelist(callsite.import_whitelist.as_deref().unwrap_or_default()),
        ),
        None => {
            debug!("remove_imports is set without a manifest, no imports filtered");
            Box::new(NoImports)
        }
    };
    let imported = provider.namespaces()?;
    debug!(count = imported.len(), "imported namespaces filtered from stacks");
    Ok(filter.with_imported(imported))
}

pub fn orchestrator_options(config: &FaultlineConfig) -> OrchestratorOptions {
    let o = &config.orchestrator;
    OrchestratorOptions::default()
        .with_max_iterations(o.max_iterations)
        .with_search_strategy(match o.search_strategy {
            SearchOrder::Dfs => SearchStrategy::DepthFirst,
            SearchOrder::Bfs => SearchStrategy::BreadthFirst,
        })
        .with_suppress_combinations(o.suppress_combinations)
        .with_dynamic_reduction(o.dynamic_reduction)
        .with_avoid_redundant_injections(o.avoid_redundant_injections)
        .with_avoid_injections_on_organic_failures(o.avoid_injections_on_organic_failures)
}
