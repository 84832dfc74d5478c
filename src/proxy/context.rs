//! Per-request state carried between Pingora hooks.

use std::time::Instant;

use uuid::Uuid;

use crate::engine::CacheStatus;

#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
    method: String,
    path: String,
    upstream_host: Option<String>,
    cache_status: Option<CacheStatus>,
    bytes_sent: u64,
}

impl RequestContext {
    /// Fresh context with a new UUID v4 request id
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            method: String::new(),
            path: String::new(),
            upstream_host: None,
            cache_status: None,
            bytes_sent: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_request_line(&mut self, method: &str, path: &str) {
        self.method = method.to_string();
        self.path = path.to_string();
    }

    pub fn upstream_host(&self) -> Option<&str> {
        self.upstream_host.as_deref()
    }

    pub fn cache_status(&self) -> Option<CacheStatus> {
        self.cache_status
    }

    pub fn record_response(&mut self, upstream_host: Option<String>, cache: Option<CacheStatus>) {
        self.upstream_host = upstream_host;
        self.cache_status = cache;
    }

    pub fn add_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Milliseconds since the context was created
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
