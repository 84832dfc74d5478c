//! Cache configuration types.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CACHE_DIR, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_REWRITE_BYTES};

fn default_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_rewrite_bytes() -> usize {
    DEFAULT_MAX_REWRITE_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root directory (default: ./cache)
    #[serde(default = "default_dir")]
    pub dir: String,
    /// Read size when streaming cached bodies (default: 512 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Largest decoded HTML body that will be rewritten (default: 64 MiB)
    #[serde(default = "default_max_rewrite_bytes")]
    pub max_rewrite_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            chunk_size: default_chunk_size(),
            max_rewrite_bytes: default_max_rewrite_bytes(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.dir.trim().is_empty() {
            return Err("cache.dir cannot be empty".to_string());
        }
        if self.chunk_size == 0 {
            return Err("cache.chunk_size must be greater than 0".to_string());
        }
        if self.max_rewrite_bytes == 0 {
            return Err("cache.max_rewrite_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}
