// Constants module - centralized default values for configuration
//
// Defaults live here so config, cache and engine agree on them.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_LISTEN_PORT: u16 = 8000;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

/// Scheme written into self-referential links
pub const DEFAULT_PUBLIC_SCHEME: &str = "http";

/// Prefix under which the health and metrics endpoints are served
pub const DEFAULT_ADMIN_PREFIX: &str = "/_pypipo";

// =============================================================================
// Upstream defaults
// =============================================================================

/// Origin used when the request path carries no embedded host
pub const DEFAULT_UPSTREAM_ORIGIN: &str = "https://pypi.org";

/// Package index host
pub const PACKAGE_INDEX_HOST: &str = "pypi.org";

/// File hosting host the package index links to
pub const FILE_HOSTING_HOST: &str = "files.pythonhosted.org";

/// Default upstream request timeout in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Embedded host path convention
// =============================================================================

/// Path segment that introduces an embedded upstream origin token
pub const EMBEDDED_HOST_MARKER: &str = "~";

// =============================================================================
// Cache defaults
// =============================================================================

/// Default cache root directory
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Chunk size for streaming cached bodies (512 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Upper bound for a decompressed HTML body that gets rewritten (64 MiB)
pub const DEFAULT_MAX_REWRITE_BYTES: usize = 64 * 1024 * 1024;

/// Suffix appended to the leaf segment for the content blob
pub const CONTENT_FILE_SUFFIX: &str = ".body";

/// Suffix appended to the leaf segment for the metadata record
pub const META_FILE_SUFFIX: &str = ".meta.json";

/// Leaf segment used for paths that end in `/`
pub const DIRECTORY_INDEX_NAME: &str = "index";
