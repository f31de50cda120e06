//! Configuration management for Faultline
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`FAULTLINE_<SECTION>__<KEY>`, highest precedence)
//! 2. faultline.local.toml (gitignored, local overrides)
//! 3. faultline.toml (git-tracked, project config)
//! 4. ~/.config/faultline/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Faultline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    pub index: IndexConfig,
    pub callsite: CallsiteConfig,
    pub orchestrator: OrchestratorConfig,
    pub service: ServiceConfig,
    pub campaign: CampaignConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    V1,
    #[default]
    V2,
}

/// How execution-index segment keys are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub version: IndexFormat,
    pub hash_signature: bool,
    pub include_synchronous: bool,
    pub hash_synchronous: bool,
    pub include_asynchronous: bool,
    pub hash_asynchronous: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            version: IndexFormat::V2,
            hash_signature: true,
            include_synchronous: true,
            hash_synchronous: true,
            include_asynchronous: true,
            hash_asynchronous: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallsiteConfig {
    pub line_numbers: bool,
    pub remove_imports: bool,
    /// Replaces the built-in infrastructure namespaces when set.
    pub infrastructure_namespaces: Option<Vec<String>>,
    /// Manifest whose dependencies count as imported libraries.
    pub manifest: Option<PathBuf>,
    /// Comma-separated prefixes never treated as imports.
    pub import_whitelist: Option<String>,
}

impl Default for CallsiteConfig {
    fn default() -> Self {
        Self {
            line_numbers: true,
            remove_imports: false,
            infrastructure_namespaces: None,
            manifest: None,
            import_whitelist: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    #[default]
    Dfs,
    Bfs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    pub search_strategy: SearchOrder,
    pub suppress_combinations: bool,
    pub dynamic_reduction: bool,
    pub avoid_redundant_injections: bool,
    pub avoid_injections_on_organic_failures: bool,
    /// Drops the asynchronous component from structured indices.
    pub data_nondeterminism: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 99,
            search_strategy: SearchOrder::Dfs,
            suppress_combinations: false,
            dynamic_reduction: false,
            avoid_redundant_injections: false,
            avoid_injections_on_organic_failures: false,
            data_nondeterminism: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceBinding {
    #[default]
    InProcess,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub binding: ServiceBinding,
    pub address: String,
    pub health_check_attempts: u32,
    pub health_check_backoff_ms: u64,
    pub degrade_when_unavailable: bool,
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            binding: ServiceBinding::InProcess,
            address: "127.0.0.1:5005".to_string(),
            health_check_attempts: 10,
            health_check_backoff_ms: 1000,
            degrade_when_unavailable: false,
            request_timeout_ms: 5000,
        }
    }
}

impl ServiceConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address.parse().map_err(|e| {
            ConfigError::ValidationError(format!("service.address {:?}: {e}", self.address))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub analysis_file: Option<PathBuf>,
    pub counterexample_file: Option<PathBuf>,
    pub degrade_on_unknown_callsite: bool,
}

impl FaultlineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Reads a single TOML file, without layering.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.service.health_check_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "service.health_check_attempts must be at least 1".to_string(),
            ));
        }
        if self.service.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "service.request_timeout_ms must be positive".to_string(),
            ));
        }
        self.service.socket_addr()?;
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        for path in [
            &mut self.callsite.manifest,
            &mut self.campaign.analysis_file,
            &mut self.campaign.counterexample_file,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
