//! Upstream allow-list.
//!
//! Without this check the embedded host token would let any client use the
//! proxy as an open relay, so every decoded hostname passes through here
//! before anything touches the network or the cache.

use std::collections::HashSet;

use crate::error::ProxyError;

/// Set of upstream hostnames the proxy may contact
#[derive(Debug, Clone)]
pub struct OriginGuard {
    allowed: HashSet<String>,
}

impl OriginGuard {
    /// Build a guard from hostnames. Matching is case-insensitive.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Accept the hostname or reject it with `ProxyError::HostNotAllowed`
    pub fn check(&self, hostname: &str) -> Result<(), ProxyError> {
        if self.is_allowed(hostname) {
            Ok(())
        } else {
            Err(ProxyError::HostNotAllowed(hostname.to_string()))
        }
    }

    pub fn is_allowed(&self, hostname: &str) -> bool {
        self.allowed.contains(&hostname.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl Default for OriginGuard {
    fn default() -> Self {
        Self::new([
            crate::constants::PACKAGE_INDEX_HOST,
            crate::constants::FILE_HOSTING_HOST,
        ])
    }
}
