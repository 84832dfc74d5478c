// Error types module

use thiserror::Error;

use crate::cache::CacheError;
use crate::host_codec::DecodeError;

/// Centralized error type for the proxy
///
/// Every variant maps to one HTTP status code and a plain-text message that
/// is safe to show to the client.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Client used a method other than GET
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Decoded upstream hostname is not in the allow-list
    #[error("Refusing host: {0}")]
    HostNotAllowed(String),

    /// Embedded host token could not be decoded
    #[error("Invalid embedded host: {0}")]
    Decode(#[from] DecodeError),

    /// Request path is empty, escapes the cache root or is otherwise unusable
    #[error("Invalid request path: {0}")]
    BadPath(String),

    /// Request carried no Host header to build self-referential links from
    #[error("Missing Host header")]
    MissingHost,

    /// Upstream could not be reached (connect, TLS, timeout, broken body)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Cache read failed after a hit was declared
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// HTML body could not be decoded for link rewriting
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    /// Configuration errors (invalid YAML, missing env vars, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal proxy errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status code sent to the client for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::MethodNotAllowed(_) => 405,
            ProxyError::HostNotAllowed(_) => 401,
            ProxyError::Decode(_) | ProxyError::BadPath(_) | ProxyError::MissingHost => 400,
            ProxyError::Upstream(_) | ProxyError::Rewrite(_) => 502,
            ProxyError::Cache(_) | ProxyError::Config(_) | ProxyError::Internal(_) => 500,
        }
    }

    /// Plain-text body sent to the client
    ///
    /// Internal details of cache and configuration failures stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ProxyError::MethodNotAllowed(_) => "Method not allowed".to_string(),
            ProxyError::HostNotAllowed(host) => format!("Refusing host: {}", host),
            ProxyError::Cache(_) | ProxyError::Config(_) | ProxyError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "method_not_allowed",
            ProxyError::HostNotAllowed(_) => "host_not_allowed",
            ProxyError::Decode(_) => "decode",
            ProxyError::BadPath(_) => "bad_path",
            ProxyError::MissingHost => "missing_host",
            ProxyError::Upstream(_) => "upstream",
            ProxyError::Cache(_) => "cache",
            ProxyError::Rewrite(_) => "rewrite",
            ProxyError::Config(_) => "config",
            ProxyError::Internal(_) => "internal",
        }
    }
}
