//! Route dispatch from HTTP requests to a [`DecisionService`].

use std::sync::Arc;

use faultline_analysis::AnalysisFile;
use faultline_orchestrator::{Completion, DecisionService, Invocation, OrchestratorError};
use faultline_types::{CallerPhase, Iteration};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::http::{HttpRequest, http_response};

const JSON: &str = "application/json";

/// Answers decision-protocol requests.
#[derive(Clone)]
pub struct RequestHandler {
    service: Arc<dyn DecisionService>,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler").finish_non_exhaustive()
    }
}

impl RequestHandler {
    pub fn new(service: Arc<dyn DecisionService>) -> Self {
        Self { service }
    }

    /// Returns the full response text for `request`.
    pub fn handle(&self, request: &HttpRequest) -> String {
        match self.handle_inner(request) {
            Ok(body) => http_response(200, JSON, &body.to_string()),
            Err(e) => {
                let status = e.status();
                if status >= 500 {
                    warn!(method = %request.method, path = %request.path, error = %e, "request failed");
                } else {
                    debug!(method = %request.method, path = %request.path, error = %e, "request rejected");
                }
                let body = json!({ "error": { "kind": e.kind(), "message": e.to_string() } });
                http_response(status, JSON, &body.to_string())
            }
        }
    }

    fn handle_inner(&self, request: &HttpRequest) -> ServerResult<Value> {
        let segments = request.segments()?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let service = self.service.as_ref();

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["health-check"]) => {
                let healthy = service.health_check()?;
                Ok(json!({ "status": if healthy { "OK" } else { "UNAVAILABLE" } }))
            }
            ("POST", ["faultline", "analysis-file"]) => {
                let analysis = AnalysisFile::from_json_str(request.body_str()?)
                    .map_err(OrchestratorError::from)?;
                service.analysis_file(&analysis)?;
                Ok(json!({}))
            }
            ("GET", ["faultline", "has-next-iteration", n, phase]) => {
                let caller: CallerPhase = phase
                    .parse()
                    .map_err(|e| ServerError::BadRequest(format!("{e}")))?;
                let next = service.has_next_iteration(parse_iteration(n)?, caller)?;
                Ok(json!({ "has-next-iteration": next }))
            }
            ("POST", ["faultline", "complete-iteration", n, "exception", flag]) => {
                let exception = match *flag {
                    "0" | "false" => false,
                    "1" | "true" => true,
                    other => {
                        return Err(ServerError::BadRequest(format!(
                            "exception flag must be 0 or 1, got {other:?}"
                        )));
                    }
                };
                service.record_iteration_complete(parse_iteration(n)?, exception)?;
                Ok(json!({}))
            }
            ("GET" | "POST", ["faultline", "teardowns-completed", n]) => {
                service.teardowns_completed(parse_iteration(n)?)?;
                Ok(json!({}))
            }
            ("POST", ["faultline", "create"]) => {
                let invocation: Invocation = serde_json::from_slice(&request.body)?;
                let decision = service.begin_invocation(&invocation)?;
                Ok(serde_json::to_value(decision)?)
            }
            ("POST", ["faultline", "update"]) => {
                let completion: Completion = serde_json::from_slice(&request.body)?;
                service.end_invocation(&completion)?;
                Ok(json!({}))
            }
            ("GET", ["faultline", "fault-injected"]) => {
                Ok(json!({ "result": service.was_fault_injected()? }))
            }
            ("GET", ["faultline", "fault-injected", "service", name]) => {
                Ok(json!({ "result": service.was_fault_injected_on_service(name)? }))
            }
            ("GET", ["faultline", "fault-injected", "method", module, method]) => Ok(json!({
                "result": service.was_fault_injected_on_method(module, method)?
            })),
            ("GET" | "POST", ["faultline", "terminate"]) => {
                Ok(serde_json::to_value(service.terminate()?)?)
            }
            _ => Err(ServerError::RouteNotFound {
                method: request.method.clone(),
                path: request.path.clone(),
            }),
        }
    }
}

fn parse_iteration(raw: &str) -> ServerResult<Iteration> {
    raw.parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .map(Iteration::new)
        .ok_or_else(|| ServerError::BadRequest(format!("invalid iteration {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parse_response;
    use faultline_orchestrator::{InProcessService, IterationOrchestrator, OrchestratorOptions};
    use test_case::test_case;

    fn handler() -> RequestHandler {
        let orchestrator = IterationOrchestrator::new(OrchestratorOptions::default()).unwrap();
        RequestHandler::new(Arc::new(InProcessService::new(orchestrator)))
    }

    fn call(handler: &RequestHandler, method: &str, path: &str, body: &str) -> (u16, Value) {
        let request = HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            body: body.as_bytes().to_vec(),
        };
        let (status, body) = parse_response(handler.handle(&request).as_bytes()).unwrap();
        (status, serde_json::from_str(&body).unwrap())
    }

    #[test]
    fn test_dispatch_health() {
        let (status, body) = call(&handler(), "GET", "/health-check", "");
        assert_eq!(status, 200);
        assert_eq!(body["status"], "OK");
    }

    #[test]
    fn test_dispatch_iteration_protocol() {
        let handler = handler();
        let (_, body) = call(&handler, "GET", "/faultline/has-next-iteration/1/before-each", "");
        assert_eq!(body["has-next-iteration"], true);

        let (status, _) = call(&handler, "POST", "/faultline/complete-iteration/1/exception/0", "");
        assert_eq!(status, 200);
        let (status, _) = call(&handler, "GET", "/faultline/teardowns-completed/1", "");
        assert_eq!(status, 200);

        let (_, body) = call(&handler, "GET", "/faultline/has-next-iteration/2/before-each", "");
        assert_eq!(body["has-next-iteration"], false);

        let (_, body) = call(&handler, "GET", "/faultline/terminate", "");
        assert_eq!(body["iterations"], 1);
    }

    #[test]
    fn test_dispatch_barrier_violation_is_conflict() {
        let handler = handler();
        call(&handler, "GET", "/faultline/has-next-iteration/1/before-each", "");
        let (status, body) = call(&handler, "GET", "/faultline/has-next-iteration/2/before-each", "");
        assert_eq!(status, 409);
        assert_eq!(body["error"]["kind"], "state");
        assert!(body["error"]["message"].as_str().unwrap().contains("torn down"));
    }

    #[test]
    fn test_dispatch_fault_injected_without_execution() {
        let handler = handler();
        let (_, body) = call(&handler, "GET", "/faultline/fault-injected", "");
        assert_eq!(body["result"], false);
        let (_, body) = call(&handler, "GET", "/faultline/fault-injected/service/orders", "");
        assert_eq!(body["result"], false);
        let (_, body) = call(
            &handler,
            "GET",
            "/faultline/fault-injected/method/cloud.Orders/Place",
            "",
        );
        assert_eq!(body["result"], false);
    }

    #[test_case("GET", "/metrics", 404 ; "unknown route")]
    #[test_case("DELETE", "/health-check", 404 ; "wrong method")]
    #[test_case("GET", "/faultline/has-next-iteration/0/before-each", 400 ; "iteration zero")]
    #[test_case("GET", "/faultline/has-next-iteration/1/sometime", 400 ; "unknown phase")]
    #[test_case("POST", "/faultline/complete-iteration/1/exception/maybe", 400 ; "bad flag")]
    #[test_case("POST", "/faultline/analysis-file", 400 ; "empty analysis body")]
    #[test_case("POST", "/faultline/create", 400 ; "empty invocation body")]
    fn test_dispatch_rejects(method: &str, path: &str, expected: u16) {
        let (status, body) = call(&handler(), method, path, "");
        assert_eq!(status, expected);
        assert!(body["error"]["message"].is_string());
    }

    #[test]
    fn test_dispatch_reports_error_kind() {
        let handler = handler();
        let (status, body) = call(&handler, "POST", "/faultline/analysis-file", "{\"x\": 1}");
        assert_eq!(status, 400);
        assert_eq!(body["error"]["kind"], "configuration");

        let (status, body) = call(&handler, "GET", "/metrics", "");
        assert_eq!(status, 404);
        assert_eq!(body["error"]["kind"], "protocol");
    }
}
