//! Fault descriptors.
//!
//! A [`Fault`] is what the orchestrator hands back to an interceptor for a
//! call it wants to fail. The JSON shape is externally tagged:
//!
//! ```text
//! {"forced_exception":  {"name": "...", "metadata": {...}}}
//! {"failure_metadata":  {...error type object...}}
//! {"latency":           {"type": "SERVICE", "matcher": "...", "milliseconds": 250}}
//! {"transformer_fault": {"transformer": "string", "step": 0, "value": ...}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A simulated failure to inject at one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// Fail the call with a transport exception.
    #[serde(rename = "forced_exception")]
    Exception(ExceptionFault),
    /// Fail the call with an error response described by the object.
    #[serde(rename = "failure_metadata")]
    Error(Value),
    /// Delay the call.
    #[serde(rename = "latency")]
    Latency(LatencyFault),
    /// Let the call succeed but replace its response value.
    #[serde(rename = "transformer_fault")]
    Transformer(TransformerFault),
}

impl Fault {
    pub fn exception<I, K>(name: impl Into<String>, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Fault::Exception(ExceptionFault {
            name: name.into(),
            metadata: metadata.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::Exception(_) => FaultKind::Exception,
            Fault::Error(_) => FaultKind::Error,
            Fault::Latency(_) => FaultKind::Latency,
            Fault::Transformer(_) => FaultKind::Transformer,
        }
    }

    /// Faults that make the call itself fail rather than altering it.
    pub fn is_failure(&self) -> bool {
        matches!(self, Fault::Exception(_) | Fault::Error(_))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Canonical JSON text; identical faults render identically.
impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Tag identifying the kind of a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Exception,
    Error,
    Latency,
    Transformer,
}

impl FaultKind {
    pub const ALL: [FaultKind; 4] = [
        FaultKind::Exception,
        FaultKind::Error,
        FaultKind::Latency,
        FaultKind::Transformer,
    ];

    /// The JSON tag used on the wire.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            FaultKind::Exception => "forced_exception",
            FaultKind::Error => "failure_metadata",
            FaultKind::Latency => "latency",
            FaultKind::Transformer => "transformer_fault",
        }
    }

    pub fn from_wire_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_tag() == tag)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionFault {
    pub name: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// What a latency matcher is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LatencyScope {
    /// The invoked service name.
    Service,
    /// The `module/method` signature.
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyFault {
    #[serde(rename = "type")]
    pub scope: LatencyScope,
    pub matcher: String,
    pub milliseconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerFault {
    pub transformer: String,
    pub step: u32,
    pub value: Value,
}
