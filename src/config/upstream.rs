//! Upstream configuration types.
//!
//! Which origin serves un-prefixed paths, which hosts may be reached at all,
//! and how the HTTP client talks to them.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_UPSTREAM_ORIGIN, DEFAULT_UPSTREAM_TIMEOUT_SECS, FILE_HOSTING_HOST, PACKAGE_INDEX_HOST,
};
use crate::host_codec::UpstreamOrigin;

fn default_origin() -> String {
    DEFAULT_UPSTREAM_ORIGIN.to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec![
        PACKAGE_INDEX_HOST.to_string(),
        FILE_HOSTING_HOST.to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Origin for paths without an embedded host (default: https://pypi.org)
    #[serde(default = "default_origin")]
    pub default_origin: String,
    /// Hostnames that may be proxied
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    /// Whole-request timeout in seconds (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_origin: default_origin(),
            allowed_hosts: default_allowed_hosts(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

impl UpstreamConfig {
    pub fn default_origin(&self) -> Result<UpstreamOrigin, String> {
        UpstreamOrigin::parse(&self.default_origin).map_err(|e| {
            format!(
                "upstream.default_origin '{}' is invalid: {}",
                self.default_origin, e
            )
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.allowed_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err("upstream.allowed_hosts cannot be empty".to_string());
        }
        let origin = self.default_origin()?;
        if !self
            .allowed_hosts
            .iter()
            .any(|h| h.trim().eq_ignore_ascii_case(origin.hostname()))
        {
            return Err(format!(
                "upstream.default_origin host '{}' is not in upstream.allowed_hosts",
                origin.hostname()
            ));
        }
        if self.timeout_secs == 0 {
            return Err("upstream.timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
