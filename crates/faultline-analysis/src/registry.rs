//! Mapping from fault kinds to transport-specific errors.
//!
//! Each transport registers, at startup, how it turns a [`Fault`] of a given
//! kind into its own error type. Looking up a kind nobody registered is an
//! error rather than a silent pass-through.

use std::collections::HashMap;
use std::fmt;

use crate::error::{AnalysisError, AnalysisResult};
use crate::fault::{Fault, FaultKind};

type Constructor<E> = Box<dyn Fn(&Fault) -> E + Send + Sync>;

pub struct FaultRegistry<E> {
    constructors: HashMap<FaultKind, Constructor<E>>,
}

impl<E> FaultRegistry<E> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: FaultKind, f: impl Fn(&Fault) -> E + Send + Sync + 'static) -> Self {
        self.register(kind, f);
        self
    }

    /// Registers the constructor for `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: FaultKind, f: impl Fn(&Fault) -> E + Send + Sync + 'static) {
        self.constructors.insert(kind, Box::new(f));
    }

    pub fn contains(&self, kind: FaultKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Builds the transport error for `fault`.
    pub fn materialize(&self, fault: &Fault) -> AnalysisResult<E> {
        let kind = fault.kind();
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or(AnalysisError::UnregisteredFaultKind(kind))?;
        Ok(constructor(fault))
    }
}

impl<E> Default for FaultRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for FaultRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("FaultRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    enum RpcError {
        Status(String),
        Http(u16),
    }

    fn registry() -> FaultRegistry<RpcError> {
        FaultRegistry::new()
            .with(FaultKind::Exception, |fault| match fault {
                Fault::Exception(e) => RpcError::Status(
                    e.metadata
                        .get("code")
                        .and_then(|c| c.as_str())
                        .unwrap_or("UNKNOWN")
                        .to_string(),
                ),
                _ => RpcError::Status("UNKNOWN".to_string()),
            })
            .with(FaultKind::Error, |fault| match fault {
                Fault::Error(v) => RpcError::Http(
                    v.get("status_code")
                        .and_then(serde_json::Value::as_u64)
                        .map_or(500, |c| c as u16),
                ),
                _ => RpcError::Http(500),
            })
    }

    #[test]
    fn registered_kinds_materialize() {
        let registry = registry();
        let unavailable = Fault::exception("grpc", [("code", json!("UNAVAILABLE"))]);
        assert_eq!(
            registry.materialize(&unavailable).unwrap(),
            RpcError::Status("UNAVAILABLE".to_string())
        );
        assert_eq!(
            registry
                .materialize(&Fault::Error(json!({"status_code": 503})))
                .unwrap(),
            RpcError::Http(503)
        );
    }

    #[test]
    fn unregistered_kind_is_an_error() {
        let registry = registry();
        assert!(!registry.contains(FaultKind::Latency));
        let latency: Fault = serde_json::from_value(json!({
            "latency": {"type": "SERVICE", "matcher": "x", "milliseconds": 1}
        }))
        .unwrap();
        assert!(matches!(
            registry.materialize(&latency),
            Err(AnalysisError::UnregisteredFaultKind(FaultKind::Latency))
        ));
    }
}
