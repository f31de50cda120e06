//! Analysis configurations: which faults to try for which calls.
//!
//! A configuration pairs a pattern over `module/method` signatures with the
//! candidate faults for matching calls. An [`AnalysisFile`] is an ordered
//! list of configurations, stored as a JSON object keyed by name:
//!
//! ```json
//! {
//!   "grpc_unavailable": {
//!     "pattern": "(.*/.*)",
//!     "exceptions": [{"name": "io.grpc.StatusRuntimeException",
//!                     "metadata": {"code": "UNAVAILABLE"}}]
//!   }
//! }
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{AnalysisError, AnalysisResult};
use crate::fault::{ExceptionFault, Fault, LatencyFault, LatencyScope};

/// Error responses offered only to services whose name matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFault {
    pub service_name: String,
    pub types: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerEntry {
    pub transformer: String,
}

/// One named rule: pattern plus candidate faults.
#[derive(Debug, Clone)]
pub struct AnalysisConfiguration {
    name: String,
    pattern: Regex,
    exceptions: Vec<ExceptionFault>,
    errors: Vec<(Regex, ErrorFault)>,
    latencies: Vec<(Regex, LatencyFault)>,
    transformers: Vec<TransformerEntry>,
}

impl AnalysisConfiguration {
    pub fn builder() -> AnalysisConfigurationBuilder {
        AnalysisConfigurationBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Case-insensitive search of the pattern within the signature.
    pub fn is_pattern_match(&self, signature: &str) -> bool {
        self.pattern.is_match(signature)
    }

    /// Candidate faults for a call, empty if the pattern does not match.
    ///
    /// Error types are offered only when their `service_name` matches the
    /// invoked service; latencies only when their matcher matches the
    /// service or signature, depending on scope.
    pub fn fault_menu(&self, service: &str, signature: &str) -> Vec<Fault> {
        if !self.is_pattern_match(signature) {
            return Vec::new();
        }

        let exceptions = self.exceptions.iter().cloned().map(Fault::Exception);
        let errors = self
            .errors
            .iter()
            .filter(|(matcher, _)| matcher.is_match(service))
            .flat_map(|(_, error)| error.types.iter().cloned().map(Fault::Error));
        let latencies = self
            .latencies
            .iter()
            .filter(|(matcher, latency)| match latency.scope {
                LatencyScope::Service => matcher.is_match(service),
                LatencyScope::Method => matcher.is_match(signature),
            })
            .map(|(_, latency)| Fault::Latency(latency.clone()));

        exceptions.chain(errors).chain(latencies).collect()
    }

    pub fn transformers(&self) -> &[TransformerEntry] {
        &self.transformers
    }

    /// Transformers applying to calls with this signature.
    pub fn transformers_for(&self, signature: &str) -> &[TransformerEntry] {
        if self.is_pattern_match(signature) {
            &self.transformers
        } else {
            &[]
        }
    }

    fn to_document(&self) -> ConfigurationDocument {
        ConfigurationDocument {
            pattern: self.pattern().to_string(),
            exceptions: self.exceptions.clone(),
            errors: self.errors.iter().map(|(_, e)| e.clone()).collect(),
            latencies: self.latencies.iter().map(|(_, l)| l.clone()).collect(),
            transformers: self.transformers.clone(),
        }
    }

    fn from_document(name: String, document: ConfigurationDocument) -> AnalysisResult<Self> {
        let mut builder = Self::builder().name(name).pattern(document.pattern);
        builder.exceptions = document.exceptions;
        builder.errors = document.errors;
        builder.latencies = document.latencies;
        builder.transformers = document.transformers;
        builder.build()
    }
}

fn case_insensitive(pattern: &str) -> AnalysisResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| AnalysisError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Builder for [`AnalysisConfiguration`]. `name` and `pattern` are required.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfigurationBuilder {
    name: Option<String>,
    pattern: Option<String>,
    exceptions: Vec<ExceptionFault>,
    errors: Vec<ErrorFault>,
    latencies: Vec<LatencyFault>,
    transformers: Vec<TransformerEntry>,
}

impl AnalysisConfigurationBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn exception<I, K>(mut self, name: impl Into<String>, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.exceptions.push(ExceptionFault {
            name: name.into(),
            metadata: metadata.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        });
        self
    }

    pub fn error(mut self, service_name: impl Into<String>, types: Vec<Value>) -> Self {
        self.errors.push(ErrorFault {
            service_name: service_name.into(),
            types,
        });
        self
    }

    pub fn latency(mut self, scope: LatencyScope, matcher: impl Into<String>, milliseconds: u64) -> Self {
        self.latencies.push(LatencyFault {
            scope,
            matcher: matcher.into(),
            milliseconds,
        });
        self
    }

    pub fn transformer(mut self, transformer: impl Into<String>) -> Self {
        self.transformers.push(TransformerEntry {
            transformer: transformer.into(),
        });
        self
    }

    pub fn build(self) -> AnalysisResult<AnalysisConfiguration> {
        let name = self.name.ok_or(AnalysisError::MissingField { field: "name" })?;
        let pattern = self
            .pattern
            .ok_or(AnalysisError::MissingField { field: "pattern" })?;

        let errors = self
            .errors
            .into_iter()
            .map(|error| Ok((case_insensitive(&error.service_name)?, error)))
            .collect::<AnalysisResult<Vec<_>>>()?;
        let latencies = self
            .latencies
            .into_iter()
            .map(|latency| Ok((case_insensitive(&latency.matcher)?, latency)))
            .collect::<AnalysisResult<Vec<_>>>()?;

        Ok(AnalysisConfiguration {
            name,
            pattern: case_insensitive(&pattern)?,
            exceptions: self.exceptions,
            errors,
            latencies,
            transformers: self.transformers,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigurationDocument {
    pattern: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exceptions: Vec<ExceptionFault>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ErrorFault>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    latencies: Vec<LatencyFault>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    transformers: Vec<TransformerEntry>,
}

// ============================================================================
// Analysis File
// ============================================================================

/// Ordered set of analysis configurations, read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFile {
    configurations: Vec<AnalysisConfiguration>,
}

impl AnalysisFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a configuration; names must be unique.
    pub fn with(mut self, configuration: AnalysisConfiguration) -> AnalysisResult<Self> {
        self.add(configuration)?;
        Ok(self)
    }

    fn add(&mut self, configuration: AnalysisConfiguration) -> AnalysisResult<()> {
        if self.get(configuration.name()).is_some() {
            return Err(AnalysisError::DuplicateConfiguration(
                configuration.name().to_string(),
            ));
        }
        self.configurations.push(configuration);
        Ok(())
    }

    pub fn configurations(&self) -> &[AnalysisConfiguration] {
        &self.configurations
    }

    pub fn get(&self, name: &str) -> Option<&AnalysisConfiguration> {
        self.configurations.iter().find(|c| c.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Union of the fault menus of every matching configuration, in file
    /// order, without duplicates.
    pub fn fault_menu(&self, service: &str, signature: &str) -> Vec<Fault> {
        let mut menu: Vec<Fault> = Vec::new();
        for fault in self
            .configurations
            .iter()
            .flat_map(|c| c.fault_menu(service, signature))
        {
            if !menu.contains(&fault) {
                menu.push(fault);
            }
        }
        menu
    }

    /// Names of transformers applying to a signature, without duplicates.
    pub fn transformers_for(&self, signature: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in self
            .configurations
            .iter()
            .flat_map(|c| c.transformers_for(signature))
        {
            if !names.contains(&entry.transformer) {
                names.push(entry.transformer.clone());
            }
        }
        names
    }

    pub fn to_json_string(&self) -> AnalysisResult<String> {
        serde_json::to_string_pretty(self).map_err(AnalysisError::Serialize)
    }

    pub fn from_json_str(text: &str) -> AnalysisResult<Self> {
        serde_json::from_str(text).map_err(AnalysisError::InvalidAnalysisFile)
    }

    pub fn load(path: &Path) -> AnalysisResult<Self> {
        if !path.exists() {
            return Err(AnalysisError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::from_json_str(&text)?;
        tracing::info!(
            path = %path.display(),
            configurations = file.configurations.len(),
            "loaded analysis file"
        );
        Ok(file)
    }

    pub fn write_to(&self, path: &Path) -> AnalysisResult<()> {
        let text = self.to_json_string()?;
        fs::write(path, text).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Serialize for AnalysisFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.configurations.len()))?;
        for configuration in &self.configurations {
            map.serialize_entry(configuration.name(), &configuration.to_document())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AnalysisFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FileVisitor;

        impl<'de> Visitor<'de> for FileVisitor {
            type Value = AnalysisFile;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping configuration names to configurations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut file = AnalysisFile::new();
                while let Some((name, document)) =
                    access.next_entry::<String, ConfigurationDocument>()?
                {
                    let configuration = AnalysisConfiguration::from_document(name, document)
                        .map_err(serde::de::Error::custom)?;
                    file.add(configuration).map_err(serde::de::Error::custom)?;
                }
                Ok(file)
            }
        }

        deserializer.deserialize_map(FileVisitor)
    }
}
