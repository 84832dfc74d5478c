//! Operational endpoint handlers.
//!
//! - `<prefix>/health` - Health check endpoint
//! - `<prefix>/metrics` - Prometheus metrics export
//!
//! Functions return `EndpointResponse` instead of writing directly to the
//! session, which keeps response generation testable. The caller writes the
//! response.

use std::time::Instant;

use crate::metrics::Metrics;

/// Response from an operational endpoint.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl EndpointResponse {
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    pub fn prometheus(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; version=0.0.4",
            body,
        }
    }
}

/// Which operational endpoint a path names, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Metrics,
}

impl Endpoint {
    pub fn match_path(admin_prefix: &str, path: &str) -> Option<Self> {
        let rest = path.strip_prefix(admin_prefix.trim_end_matches('/'))?;
        match rest {
            "/health" => Some(Endpoint::Health),
            "/metrics" => Some(Endpoint::Metrics),
            _ => None,
        }
    }
}

/// Health status with uptime and version information.
pub fn handle_health(start_time: Instant) -> EndpointResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION")
    })
    .to_string();

    EndpointResponse::json(200, body)
}

pub fn handle_metrics(metrics: &Metrics) -> EndpointResponse {
    EndpointResponse::prometheus(metrics.export_prometheus())
}
