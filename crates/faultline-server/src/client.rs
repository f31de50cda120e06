//! Blocking HTTP client for a remote decision service.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use faultline_analysis::AnalysisFile;
use faultline_orchestrator::{
    CampaignSummary, Completion, DecisionService, Invocation, InvocationDecision,
    OrchestratorError, OrchestratorResult, ServiceErrorKind,
};
use faultline_types::{CallerPhase, Iteration};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::http::{encode_segment, http_request, parse_response};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`DecisionService`] over HTTP. Each call opens a fresh connection.
#[derive(Debug, Clone)]
pub struct HttpDecisionClient {
    address: SocketAddr,
    timeout: Duration,
}

impl HttpDecisionClient {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn round_trip(&self, request: &str) -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect_timeout(&self.address, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(request.as_bytes())?;
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw)?;
        Ok(raw)
    }

    fn exchange(&self, method: &str, path: &str, body: Option<&str>) -> OrchestratorResult<Value> {
        trace!(method, path, "decision request");
        let request = http_request(method, &self.address.to_string(), path, body);
        let raw = self
            .round_trip(&request)
            .map_err(|e| OrchestratorError::Transport {
                reason: format!("{method} {path} to {}: {e}", self.address),
            })?;
        let (status, body) = parse_response(&raw).map_err(|e| OrchestratorError::Protocol {
            reason: e.to_string(),
        })?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| OrchestratorError::Protocol {
                reason: format!("{method} {path}: response is not json: {e}"),
            })?;

        if status != 200 {
            return Err(rejection(method, path, status, &value));
        }
        Ok(value)
    }

    fn field<T: DeserializeOwned>(value: Value, name: &str) -> OrchestratorResult<T> {
        let field = value
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::Protocol {
                reason: format!("response is missing {name:?}"),
            })?;
        decode(field)
    }
}

/// Rebuilds the service error carried by a non-200 response.
fn rejection(method: &str, path: &str, status: u16, body: &Value) -> OrchestratorError {
    let error = body.get("error");
    let kind = error
        .and_then(|e| e.get("kind"))
        .cloned()
        .and_then(|kind| serde_json::from_value::<ServiceErrorKind>(kind).ok());
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no error message");
    match kind {
        Some(ServiceErrorKind::Protocol) | None => OrchestratorError::Protocol {
            reason: format!("{method} {path} returned {status}: {message}"),
        },
        Some(kind) => OrchestratorError::Rejected {
            kind,
            message: message.to_string(),
        },
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> OrchestratorResult<T> {
    serde_json::from_value(value).map_err(|e| OrchestratorError::Protocol {
        reason: e.to_string(),
    })
}

fn encode<T: serde::Serialize>(value: &T) -> OrchestratorResult<String> {
    serde_json::to_string(value).map_err(|e| OrchestratorError::Protocol {
        reason: e.to_string(),
    })
}

impl DecisionService for HttpDecisionClient {
    fn analysis_file(&self, analysis: &AnalysisFile) -> OrchestratorResult<()> {
        let body = analysis.to_json_string()?;
        self.exchange("POST", "/faultline/analysis-file", Some(&body))?;
        Ok(())
    }

    fn has_next_iteration(
        &self,
        iteration: Iteration,
        caller: CallerPhase,
    ) -> OrchestratorResult<bool> {
        let path = format!("/faultline/has-next-iteration/{iteration}/{caller}");
        Self::field(self.exchange("GET", &path, None)?, "has-next-iteration")
    }

    fn record_iteration_complete(
        &self,
        iteration: Iteration,
        exception_occurred: bool,
    ) -> OrchestratorResult<()> {
        let flag = u8::from(exception_occurred);
        let path = format!("/faultline/complete-iteration/{iteration}/exception/{flag}");
        self.exchange("POST", &path, None)?;
        Ok(())
    }

    fn teardowns_completed(&self, iteration: Iteration) -> OrchestratorResult<()> {
        let path = format!("/faultline/teardowns-completed/{iteration}");
        self.exchange("GET", &path, None)?;
        Ok(())
    }

    fn terminate(&self) -> OrchestratorResult<CampaignSummary> {
        decode(self.exchange("GET", "/faultline/terminate", None)?)
    }

    fn health_check(&self) -> OrchestratorResult<bool> {
        let value = self.exchange("GET", "/health-check", None)?;
        Ok(value.get("status").and_then(Value::as_str) == Some("OK"))
    }

    fn begin_invocation(&self, invocation: &Invocation) -> OrchestratorResult<InvocationDecision> {
        let body = encode(invocation)?;
        decode(self.exchange("POST", "/faultline/create", Some(&body))?)
    }

    fn end_invocation(&self, completion: &Completion) -> OrchestratorResult<()> {
        let body = encode(completion)?;
        self.exchange("POST", "/faultline/update", Some(&body))?;
        Ok(())
    }

    fn was_fault_injected(&self) -> OrchestratorResult<bool> {
        Self::field(self.exchange("GET", "/faultline/fault-injected", None)?, "result")
    }

    fn was_fault_injected_on_service(&self, service: &str) -> OrchestratorResult<bool> {
        let path = format!(
            "/faultline/fault-injected/service/{}",
            encode_segment(service)
        );
        Self::field(self.exchange("GET", &path, None)?, "result")
    }

    fn was_fault_injected_on_method(
        &self,
        module: &str,
        method: &str,
    ) -> OrchestratorResult<bool> {
        let path = format!(
            "/faultline/fault-injected/method/{}/{}",
            encode_segment(module),
            encode_segment(method)
        );
        Self::field(self.exchange("GET", &path, None)?, "result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_service_is_a_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client = HttpDecisionClient::new(addr).with_timeout(Duration::from_millis(200));
        let err = client.health_check().unwrap_err();
        assert!(matches!(err, OrchestratorError::Transport { .. }));
        assert!(err.is_unavailable());
    }

    #[test]
    fn rejection_restores_the_reported_kind() {
        let body = serde_json::json!({
            "error": { "kind": "unavailable", "message": "draining" }
        });
        let err = rejection("GET", "/health-check", 503, &body);
        assert!(err.is_unavailable());

        let body = serde_json::json!({ "error": "plain text" });
        let err = rejection("GET", "/health-check", 500, &body);
        assert!(matches!(err, OrchestratorError::Protocol { ref reason } if reason.contains("500")));
    }
}
