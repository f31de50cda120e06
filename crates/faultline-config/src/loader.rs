//! Layered configuration loading.

use crate::{FaultlineConfig, Paths};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Layered configuration loader.
///
/// Later layers override earlier ones key by key:
/// defaults, user file, `faultline.toml`, `faultline.local.toml`, then
/// `FAULTLINE_<SECTION>__<KEY>` variables.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_vars: Option<HashMap<String, String>>,
    user_config: bool,
}

impl ConfigLoader {
    /// A loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "FAULTLINE".to_string(),
            env_vars: None,
            user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        dir.as_ref().clone_into(&mut self.project_dir);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Skips ~/.config/faultline/config.toml.
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Existing TOML layers, lowest precedence first.
    fn file_layers(&self) -> Vec<PathBuf> {
        let user = self
            .user_config
            .then(|| Paths::new().user_config_file().ok())
            .flatten();
        user.into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ])
            .filter(|file| file.exists())
            .collect()
    }

    pub fn load(self) -> Result<FaultlineConfig> {
        let defaults = config::Config::try_from(&FaultlineConfig::default())
            .context("failed to seed configuration defaults")?;
        let files = self.file_layers();
        let environment = config::Environment::with_prefix(&self.env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.env_vars.clone());

        let merged = files
            .iter()
            .fold(config::Config::builder().add_source(defaults), |layers, file| {
                layers.add_source(
                    config::File::from(file.as_path())
                        .required(false)
                        .format(config::FileFormat::Toml),
                )
            })
            .add_source(environment)
            .build()
            .context("failed to build configuration")?;

        let mut resolved: FaultlineConfig = merged
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        resolved.resolve_paths(&self.project_dir);
        resolved
            .validate()
            .with_context(|| format!("invalid configuration in {}", self.project_dir.display()))?;
        Ok(resolved)
    }

    /// Like [`ConfigLoader::load`], falling back to the defaults on any error.
    pub fn load_or_default(self) -> FaultlineConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SearchOrder, ServiceBinding};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    /// A project directory holding `files`.
    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    fn loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir.path())
            .without_user_config()
            .with_env_vars(HashMap::new())
    }

    #[test]
    fn empty_project_loads_defaults() {
        let dir = project(&[]);
        assert_eq!(loader(&dir).load().unwrap(), FaultlineConfig::default());
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = project(&[(
            "faultline.toml",
            r#"
[orchestrator]
max_iterations = 20
search_strategy = "bfs"
dynamic_reduction = true

[service]
binding = "http"
address = "0.0.0.0:7000"

[campaign]
analysis_file = "faults/analysis.json"
"#,
        )]);

        let config = loader(&dir).load().unwrap();
        assert_eq!(config.orchestrator.max_iterations, 20);
        assert_eq!(config.orchestrator.search_strategy, SearchOrder::Bfs);
        assert!(config.orchestrator.dynamic_reduction);
        assert_eq!(config.service.binding, ServiceBinding::Http);
        assert_eq!(config.service.address, "0.0.0.0:7000");
        assert_eq!(
            config.campaign.analysis_file,
            Some(dir.path().join("faults/analysis.json"))
        );
        // Untouched sections keep their defaults.
        assert!(config.index.hash_signature);
    }

    #[test]
    fn local_file_overrides_project_file() {
        let dir = project(&[
            (
                "faultline.toml",
                "[orchestrator]\nmax_iterations = 10\nsuppress_combinations = true\n",
            ),
            ("faultline.local.toml", "[orchestrator]\nmax_iterations = 3\n"),
        ]);

        let config = loader(&dir).load().unwrap();
        assert_eq!(config.orchestrator.max_iterations, 3);
        assert!(config.orchestrator.suppress_combinations);
    }

    #[test]
    fn environment_overrides_files() {
        let dir = project(&[("faultline.toml", "[service]\naddress = \"127.0.0.1:6000\"\n")]);
        let vars = [
            ("FAULTLINE_SERVICE__ADDRESS", "127.0.0.1:6001"),
            ("FAULTLINE_ORCHESTRATOR__MAX_ITERATIONS", "7"),
            ("FAULTLINE_SERVICE__DEGRADE_WHEN_UNAVAILABLE", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = loader(&dir).with_env_vars(vars).load().unwrap();
        assert_eq!(config.service.address, "127.0.0.1:6001");
        assert_eq!(config.orchestrator.max_iterations, 7);
        assert!(config.service.degrade_when_unavailable);
    }

    #[test]
    fn invalid_layer_fails_validation() {
        let dir = project(&[("faultline.toml", "[orchestrator]\nmax_iterations = 0\n")]);
        let err = loader(&dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("max_iterations"));
        assert!(loader(&dir).load_or_default() == FaultlineConfig::default());
    }
}
