//! Cache key derivation.
//!
//! `(origin, path)` maps to `<root>/<namespace>/<dirs...>/<leaf>.body` with
//! the metadata record next to it as `<leaf>.meta.json`. The namespace is the
//! bare hostname for `https` on port 443 and `<scheme>+<hostname>+<port>`
//! otherwise; hostnames never contain `+`, so the two forms cannot meet.
//! A path ending in `/` uses the leaf `index`. Because both artifacts carry a
//! suffix, a path such as `/simple/requests` and a directory
//! `/simple/requests/` can coexist.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::CacheError;
use crate::constants::{CONTENT_FILE_SUFFIX, DIRECTORY_INDEX_NAME, META_FILE_SUFFIX};
use crate::host_codec::UpstreamOrigin;

/// Longest segment accepted, leaving room for the metadata suffix
const MAX_SEGMENT_BYTES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hostname: String,
    namespace: String,
    dirs: Vec<String>,
    leaf: String,
}

impl CacheKey {
    /// Key for `path` on an upstream origin
    pub fn for_origin(origin: &UpstreamOrigin, path: &str) -> Result<Self, CacheError> {
        let mut key = Self::new(origin.hostname(), path)?;
        if !origin.is_default_https() {
            key.namespace = format!(
                "{}+{}+{}",
                origin.scheme(),
                key.hostname,
                origin.effective_port()
            );
        }
        Ok(key)
    }

    /// Derive a key from an `https` hostname and request path.
    ///
    /// The path is percent-decoded first so that `%2e%2e` cannot sneak a
    /// traversal segment past the checks. Empty paths, `.`/`..` segments,
    /// backslashes and NUL bytes are rejected.
    pub fn new(hostname: &str, path: &str) -> Result<Self, CacheError> {
        let hostname = validate_hostname(hostname)?;

        if path.is_empty() {
            return Err(CacheError::InvalidKey("empty path".to_string()));
        }
        let decoded = urlencoding::decode(path)
            .map_err(|_| CacheError::InvalidKey(format!("path is not UTF-8: {}", path)))?;

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(CacheError::InvalidKey(format!(
                        "traversal segment in path: {}",
                        path
                    )))
                }
                s if s.contains('\\') || s.contains('\0') => {
                    return Err(CacheError::InvalidKey(format!(
                        "forbidden character in path: {}",
                        path
                    )))
                }
                s if s.len() > MAX_SEGMENT_BYTES => {
                    return Err(CacheError::InvalidKey(format!(
                        "path segment too long ({} bytes)",
                        s.len()
                    )))
                }
                s => segments.push(s.to_string()),
            }
        }

        let leaf = if decoded.ends_with('/') || segments.is_empty() {
            DIRECTORY_INDEX_NAME.to_string()
        } else {
            segments.pop().unwrap_or_else(|| DIRECTORY_INDEX_NAME.to_string())
        };

        Ok(Self {
            namespace: hostname.clone(),
            hostname,
            dirs: segments,
            leaf,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Directory holding both artifacts
    pub fn dir_path(&self, root: &Path) -> PathBuf {
        let mut dir = root.join(&self.namespace);
        for d in &self.dirs {
            dir.push(d);
        }
        dir
    }

    pub fn content_path(&self, root: &Path) -> PathBuf {
        self.dir_path(root)
            .join(format!("{}{}", self.leaf, CONTENT_FILE_SUFFIX))
    }

    pub fn meta_path(&self, root: &Path) -> PathBuf {
        self.dir_path(root)
            .join(format!("{}{}", self.leaf, META_FILE_SUFFIX))
    }

    pub(crate) fn leaf(&self) -> &str {
        &self.leaf
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.namespace)?;
        for d in &self.dirs {
            write!(f, "{}/", d)?;
        }
        write!(f, "{}", self.leaf)
    }
}

fn validate_hostname(hostname: &str) -> Result<String, CacheError> {
    let host = hostname.to_ascii_lowercase();
    let valid = !host.is_empty()
        && host != "."
        && host != ".."
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(host)
    } else {
        Err(CacheError::InvalidKey(format!(
            "hostname not usable as directory: {:?}",
            hostname
        )))
    }
}
