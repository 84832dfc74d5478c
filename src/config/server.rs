//! Server configuration types.
//!
//! This module defines the listener and public-facing settings:
//! - Address and port bindings
//! - Worker thread count
//! - Scheme used when writing links back to the proxy
//! - Prefix for the health and metrics endpoints
//!
//! Default values are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ADMIN_PREFIX, DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT, DEFAULT_PUBLIC_SCHEME,
    DEFAULT_THREADS,
};

fn default_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_public_scheme() -> String {
    DEFAULT_PUBLIC_SCHEME.to_string()
}

fn default_admin_prefix() -> String {
    DEFAULT_ADMIN_PREFIX.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads (default: 4)
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Scheme clients use to reach the proxy (default: http)
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,
    /// Path prefix for `/health` and `/metrics` (default: /_pypipo)
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            threads: default_threads(),
            public_scheme: default_public_scheme(),
            admin_prefix: default_admin_prefix(),
        }
    }
}

impl ServerConfig {
    /// `address:port` for the TCP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.public_scheme.as_str(), "http" | "https") {
            return Err(format!(
                "server.public_scheme must be 'http' or 'https', got '{}'",
                self.public_scheme
            ));
        }
        if self.threads == 0 {
            return Err("server.threads must be at least 1".to_string());
        }
        let prefix = self.admin_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return Err(format!(
                "server.admin_prefix '{}' must start with / and name a path",
                self.admin_prefix
            ));
        }
        if prefix == "/~" || prefix.starts_with("/~/") {
            return Err(format!(
                "server.admin_prefix '{}' collides with embedded host paths",
                self.admin_prefix
            ));
        }
        Ok(())
    }
}
