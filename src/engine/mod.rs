//! Request orchestration.
//!
//! `ProxyEngine::handle` runs one GET through decode, guard, cache lookup,
//! fetch, rewrite and populate. No state is kept between requests other than
//! the disk cache and the in-flight coalescing map.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;

use crate::cache::{CacheBody, CacheHandle, CacheKey, CacheMeta, CacheStore};
use crate::coalescing::{CoalescingSlot, RequestCoalescer};
use crate::config::Config;
use crate::error::ProxyError;
use crate::headers::HeaderSet;
use crate::host_codec::{self, UpstreamOrigin};
use crate::metrics::Metrics;
use crate::origin_guard::OriginGuard;
use crate::rewrite::{LinkRewriter, RewriteOutcome};
use crate::upstream::{UpstreamFetcher, UpstreamRequest};

/// Normalized inbound request handed over by the HTTP layer
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Raw request path; anything from `?` on is ignored
    pub path: String,
    pub headers: HeaderSet,
}

impl InboundRequest {
    pub fn get(path: impl Into<String>, headers: HeaderSet) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            headers,
        }
    }

    /// Host the client used to reach the proxy
    pub fn proxy_host(&self) -> Option<&str> {
        self.headers.get("host").filter(|h| !h.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Served from an entry another request populated while we waited
    Coalesced,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit | CacheStatus::Coalesced => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Response body, read in chunks by the HTTP layer
#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    Buffered { data: Bytes, chunk_size: usize },
    Cached(CacheBody),
}

impl ResponseBody {
    /// Next chunk, or `None` once the body is exhausted.
    ///
    /// A cached body closes its file on exhaustion; dropping the body early
    /// closes it too.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProxyError> {
        match self {
            ResponseBody::Empty => Ok(None),
            ResponseBody::Buffered { data, chunk_size } => {
                if data.is_empty() {
                    return Ok(None);
                }
                let take = (*chunk_size).max(1).min(data.len());
                Ok(Some(data.split_to(take)))
            }
            ResponseBody::Cached(body) => Ok(body.next_chunk().await?),
        }
    }
}

#[derive(Debug)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderSet,
    pub body: ResponseBody,
    pub cache_status: Option<CacheStatus>,
    pub upstream_host: Option<String>,
}

impl ProxyResponse {
    /// Plain-text error response
    pub fn error(err: &ProxyError) -> Self {
        let message = Bytes::from(err.client_message());
        let mut headers = HeaderSet::new();
        headers.append("content-type", "text/plain; charset=utf-8");
        headers.append("content-length", message.len().to_string());
        Self {
            status: err.status_code(),
            headers,
            body: ResponseBody::Buffered {
                chunk_size: message.len(),
                data: message,
            },
            cache_status: None,
            upstream_host: None,
        }
    }

    /// Drain the body into memory
    pub async fn collect_body(&mut self) -> Result<Bytes, ProxyError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.body.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }
}

pub struct ProxyEngine {
    default_origin: UpstreamOrigin,
    guard: OriginGuard,
    cache: CacheStore,
    rewriter: LinkRewriter,
    fetcher: Arc<dyn UpstreamFetcher>,
    coalescer: RequestCoalescer,
    metrics: Arc<Metrics>,
}

impl ProxyEngine {
    pub fn new(
        default_origin: UpstreamOrigin,
        guard: OriginGuard,
        cache: CacheStore,
        rewriter: LinkRewriter,
        fetcher: Arc<dyn UpstreamFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            default_origin,
            guard,
            cache,
            rewriter,
            fetcher,
            coalescer: RequestCoalescer::new(),
            metrics,
        }
    }

    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn UpstreamFetcher>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ProxyError> {
        let default_origin = config
            .upstream
            .default_origin()
            .map_err(ProxyError::Config)?;
        Ok(Self::new(
            default_origin,
            OriginGuard::new(&config.upstream.allowed_hosts),
            CacheStore::new(&config.cache.dir, config.cache.chunk_size),
            LinkRewriter::new(
                config.server.public_scheme.clone(),
                config.cache.max_rewrite_bytes,
            ),
            fetcher,
            metrics,
        ))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Split a request path into the upstream origin and upstream path.
    ///
    /// `/~/<token>/<rest>` selects the decoded origin; a token that does not
    /// decode is an error, never a fallback to the default origin.
    pub fn resolve<'a>(&self, path: &'a str) -> Result<(UpstreamOrigin, &'a str), ProxyError> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        match host_codec::split_embedded_path(path) {
            Some(embedded) => {
                let origin = host_codec::decode_origin(embedded.token)?;
                Ok((origin, embedded.remainder))
            }
            None => Ok((self.default_origin.clone(), path)),
        }
    }

    /// Like `handle`, but errors become plain-text responses
    pub async fn respond(&self, request: &InboundRequest) -> ProxyResponse {
        match self.handle(request).await {
            Ok(response) => response,
            Err(err) => {
                if err.status_code() >= 500 {
                    tracing::error!(error = %err, kind = err.kind(), path = %request.path, "Request failed");
                } else if matches!(err, ProxyError::Decode(_)) {
                    tracing::warn!(error = %err, path = %request.path, "Undecodable embedded host");
                } else {
                    tracing::debug!(error = %err, kind = err.kind(), path = %request.path, "Request rejected");
                }
                ProxyResponse::error(&err)
            }
        }
    }

    pub async fn handle(&self, request: &InboundRequest) -> Result<ProxyResponse, ProxyError> {
        if request.method != "GET" {
            return Err(ProxyError::MethodNotAllowed(request.method.clone()));
        }

        let (origin, upstream_path) = self.resolve(&request.path)?;

        if let Err(err) = self.guard.check(origin.hostname()) {
            self.metrics.increment_rejected_host();
            tracing::warn!(host = origin.hostname(), path = %request.path, "Refusing host");
            return Err(err);
        }
        self.metrics.increment_host_count(origin.hostname());

        let key = self
            .cache
            .key_for_origin(&origin, upstream_path)
            .map_err(|e| ProxyError::BadPath(e.to_string()))?;

        if let Some(handle) = self.cache.lookup(&key).await {
            return self.serve_cached(&handle, CacheStatus::Hit).await;
        }

        // An HTML answer to a Host-less request is discarded after the fetch,
        // so such a request never becomes the leader others wait on
        if request.proxy_host().is_none() {
            return self
                .fetch_and_populate(&origin, upstream_path, &key, request)
                .await;
        }

        match self.coalescer.acquire(&key).await {
            CoalescingSlot::Leader(_guard) => {
                // Another leader may have finished between lookup and acquire
                if let Some(handle) = self.cache.lookup(&key).await {
                    return self.serve_cached(&handle, CacheStatus::Hit).await;
                }
                self.fetch_and_populate(&origin, upstream_path, &key, request)
                    .await
            }
            CoalescingSlot::Follower => {
                self.metrics.increment_coalesced_wait();
                if let Some(handle) = self.cache.lookup(&key).await {
                    return self.serve_cached(&handle, CacheStatus::Coalesced).await;
                }
                // Leader failed or its write did not land
                tracing::debug!(key = %key, "Coalesced fetch left no entry, fetching directly");
                self.fetch_and_populate(&origin, upstream_path, &key, request)
                    .await
            }
        }
    }

    async fn serve_cached(
        &self,
        handle: &CacheHandle,
        status: CacheStatus,
    ) -> Result<ProxyResponse, ProxyError> {
        self.metrics.increment_cache_hit();
        let cached = self.cache.open(handle).await?;
        tracing::debug!(key = %handle.key(), status_code = cached.meta.status_code, "Cache hit");
        Ok(ProxyResponse {
            status: cached.meta.status_code,
            headers: cached.meta.headers,
            body: ResponseBody::Cached(cached.body),
            cache_status: Some(status),
            upstream_host: Some(handle.key().hostname().to_string()),
        })
    }

    async fn fetch_and_populate(
        &self,
        origin: &UpstreamOrigin,
        upstream_path: &str,
        key: &CacheKey,
        request: &InboundRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        self.metrics.increment_cache_miss();
        self.metrics.increment_upstream_fetch();

        let upstream_request = UpstreamRequest::new(origin.clone(), upstream_path, &request.headers);
        tracing::debug!(url = %upstream_request.url(), "Fetching from upstream");

        let fetched = match self.fetcher.fetch(upstream_request).await {
            Ok(response) => response.collect_body().await,
            Err(err) => Err(err),
        };
        let (status, mut headers, body) = fetched.map_err(|err| {
            self.metrics.increment_upstream_failure();
            match err {
                ProxyError::Upstream(_) => err,
                other => ProxyError::Upstream(other.to_string()),
            }
        })?;
        headers.strip_hop_by_hop();

        let body = if headers.is_html() {
            let proxy_host = request.proxy_host().ok_or(ProxyError::MissingHost)?;
            let (body, outcome) = self
                .rewriter
                .transform(&mut headers, body, proxy_host)
                .map_err(|e| ProxyError::Rewrite(e.to_string()))?;
            if let RewriteOutcome::Rewritten { links } = outcome {
                self.metrics.increment_rewritten_page();
                tracing::debug!(key = %key, links, "Rewrote HTML links");
            }
            body
        } else {
            body
        };

        let meta = CacheMeta::new(status, headers.clone());
        let payload = body.clone();
        let written = self
            .cache
            .write(
                key,
                meta,
                stream::once(async move { Ok::<_, Infallible>(payload) }),
            )
            .await;
        match written {
            Ok(bytes) => tracing::debug!(key = %key, bytes, status_code = status, "Cached response"),
            Err(err) => {
                self.metrics.increment_cache_write_failure();
                tracing::error!(key = %key, error = %err, "Failed to write cache entry");
            }
        }

        Ok(ProxyResponse {
            status,
            headers,
            body: ResponseBody::Buffered {
                data: body,
                chunk_size: self.cache.chunk_size(),
            },
            cache_status: Some(CacheStatus::Miss),
            upstream_host: Some(origin.hostname().to_string()),
        })
    }
}
