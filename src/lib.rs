// pypipo - caching, link-rewriting mirror proxy for PyPI

pub mod cache;
pub mod coalescing;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod headers;
pub mod host_codec;
pub mod logging;
pub mod metrics;
pub mod origin_guard;
pub mod proxy;
pub mod rewrite;
pub mod upstream;
