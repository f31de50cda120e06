//! # faultline-server: HTTP binding of the decision service
//!
//! [`DecisionServer`] exposes any [`DecisionService`] over HTTP/1.1 on a mio
//! event loop; [`HttpDecisionClient`] is the matching client, itself a
//! [`DecisionService`], so campaigns run unchanged against either binding.
//!
//! | Route | Method |
//! |-------|--------|
//! | `/health-check` | GET |
//! | `/faultline/analysis-file` | POST |
//! | `/faultline/has-next-iteration/{n}/{caller}` | GET |
//! | `/faultline/complete-iteration/{n}/exception/{0,1}` | POST |
//! | `/faultline/teardowns-completed/{n}` | GET |
//! | `/faultline/create` | POST |
//! | `/faultline/update` | POST |
//! | `/faultline/fault-injected[/service/{s}][/method/{m}/{n}]` | GET |
//! | `/faultline/terminate` | GET |
//!
//! [`DecisionService`]: faultline_orchestrator::DecisionService

mod client;
mod error;
mod handler;
mod http;
mod server;

pub use client::{DEFAULT_REQUEST_TIMEOUT, HttpDecisionClient};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use http::{HttpRequest, MAX_REQUEST_BYTES, http_request, http_response, parse_request};
pub use server::{DecisionServer, ShutdownHandle};
