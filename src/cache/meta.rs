//! Metadata record stored beside each cached body

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::headers::HeaderSet;

/// Status code and headers of a cached response
///
/// Headers are the ones the response should be served with, i.e. after any
/// rewriting has already removed `content-encoding` and `content-length`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub status_code: u16,
    pub headers: HeaderSet,
    pub stored_at: DateTime<Utc>,
    /// Body size in bytes, filled in by the writer
    #[serde(default)]
    pub content_length: u64,
}

impl CacheMeta {
    pub fn new(status_code: u16, headers: HeaderSet) -> Self {
        Self {
            status_code,
            headers,
            stored_at: Utc::now(),
            content_length: 0,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
