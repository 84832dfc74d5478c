//! Error types for cache operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hostname or path cannot be mapped under the cache root
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Body stream handed to the writer failed part way
    #[error("Body stream error: {0}")]
    Body(String),
}
