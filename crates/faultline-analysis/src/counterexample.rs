//! Counterexample replay.
//!
//! A counterexample is a recorded failing execution. Replaying it means
//! failing exactly the calls that failed then, with the same faults. On disk
//! the execution is stored as an embedded JSON string:
//!
//! ```json
//! {"TestExecution": "{\"failures\": [{\"execution_index\": \"[[\\\"k\\\", 1]]\", \"forced_exception\": {...}}]}"}
//! ```
//!
//! Lookup compares parsed indices, so legacy and compact index text forms
//! name the same call.

use std::fs;
use std::path::Path;

use faultline_dei::ExecutionIndex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AnalysisError, AnalysisResult};
use crate::fault::Fault;

/// Payload keys that carry a fault, one per [`Fault`] variant.
const FAULT_KEYS: [&str; 4] = [
    "forced_exception",
    "failure_metadata",
    "latency",
    "transformer_fault",
];

/// One call of a recorded execution and what was injected there.
///
/// A record whose payload has no fault key means "do not fail this call".
/// Other keys are bookkeeping and are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub execution_index: ExecutionIndex,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl FailureRecord {
    pub fn no_fault(execution_index: ExecutionIndex) -> Self {
        Self {
            execution_index,
            payload: Map::new(),
        }
    }

    pub fn with_fault(execution_index: ExecutionIndex, fault: &Fault) -> Self {
        let payload = match fault.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            execution_index,
            payload,
        }
    }

    /// The recorded fault, if the payload carries one.
    ///
    /// A fault key whose value is not a valid fault, or two fault keys in
    /// one record, is an error rather than "no fault".
    pub fn fault(&self) -> AnalysisResult<Option<Fault>> {
        let mut tagged = self
            .payload
            .iter()
            .filter(|(key, _)| FAULT_KEYS.contains(&key.as_str()));
        let Some((key, value)) = tagged.next() else {
            return Ok(None);
        };
        if let Some((second, _)) = tagged.next() {
            return Err(AnalysisError::ConflictingFaults {
                first: key.clone(),
                second: second.clone(),
            });
        }
        let mut single = Map::new();
        single.insert(key.clone(), value.clone());
        serde_json::from_value(Value::Object(single))
            .map(Some)
            .map_err(AnalysisError::InvalidFault)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self.fault(), Ok(Some(_)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionDocument {
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CounterexampleEnvelope {
    #[serde(rename = "TestExecution")]
    test_execution: String,
}

impl TestExecutionDocument {
    /// Builds a document that fails the given calls.
    pub fn from_faults<'a>(faults: impl IntoIterator<Item = (&'a ExecutionIndex, &'a Fault)>) -> Self {
        Self {
            failures: faults
                .into_iter()
                .map(|(index, fault)| FailureRecord::with_fault(index.clone(), fault))
                .collect(),
        }
    }

    /// Loads the counterexample at `path`.
    ///
    /// A missing or empty path is a configuration error: the caller asked
    /// for replay without saying what to replay.
    pub fn load(path: Option<&Path>) -> AnalysisResult<Self> {
        let path = match path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return Err(AnalysisError::CounterexampleNotConfigured),
        };
        if !path.exists() {
            return Err(AnalysisError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let text = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |source| AnalysisError::InvalidCounterexample {
            path: path.to_path_buf(),
            source,
        };
        let envelope: CounterexampleEnvelope = serde_json::from_str(&text).map_err(invalid)?;
        let document: Self = serde_json::from_str(&envelope.test_execution).map_err(invalid)?;
        for record in &document.failures {
            record
                .fault()
                .map_err(|source| AnalysisError::InvalidFailureRecord {
                    path: path.to_path_buf(),
                    index: record.execution_index.to_string(),
                    source: Box::new(source),
                })?;
        }

        tracing::info!(
            path = %path.display(),
            failures = document.failures.len(),
            "loaded counterexample"
        );
        Ok(document)
    }

    /// The record for `index`, if the counterexample has one.
    pub fn should_fail_request_with(&self, index: &ExecutionIndex) -> Option<&FailureRecord> {
        self.failures.iter().find(|f| &f.execution_index == index)
    }

    /// The record for `index`, or an empty one tagged with the index.
    pub fn should_fail_request_with_or_default(&self, index: &ExecutionIndex) -> FailureRecord {
        self.should_fail_request_with(index)
            .cloned()
            .unwrap_or_else(|| FailureRecord::no_fault(index.clone()))
    }

    /// Text of the on-disk counterexample envelope.
    pub fn to_counterexample_json(&self) -> AnalysisResult<String> {
        let envelope = CounterexampleEnvelope {
            test_execution: serde_json::to_string(self).map_err(AnalysisError::Serialize)?,
        };
        serde_json::to_string_pretty(&envelope).map_err(AnalysisError::Serialize)
    }

    pub fn write_to(&self, path: &Path) -> AnalysisResult<()> {
        let text = self.to_counterexample_json()?;
        fs::write(path, text).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
