//! Persistent response cache keyed by `(upstream hostname, path)`.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/pypi.org/simple/requests/index.body
//! <root>/pypi.org/simple/requests/index.meta.json
//! <root>/files.pythonhosted.org/packages/ab/cd/requests-2.31.0.tar.gz.body
//! <root>/files.pythonhosted.org/packages/ab/cd/requests-2.31.0.tar.gz.meta.json
//! ```
//!
//! Present on disk means valid forever; clearing the store is left to the
//! operator.

mod error;
mod key;
mod meta;
mod reader;
mod store;

pub use self::error::CacheError;
pub use self::key::CacheKey;
pub use self::meta::CacheMeta;
pub use self::reader::CacheBody;
pub use self::store::{CacheHandle, CacheStore, CachedResponse};
