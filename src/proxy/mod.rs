// Proxy module - Pingora ProxyHttp implementation
// Every request is answered from request_filter; Pingora's own upstream
// connection path is never used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::{Error, ErrorType, Result};
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};
use tracing::Instrument;

use crate::config::Config;
use crate::engine::{InboundRequest, ProxyEngine, ProxyResponse};
use crate::error::ProxyError;
use crate::headers::HeaderSet;
use crate::metrics::Metrics;
use crate::upstream::HttpFetcher;

pub mod context;
pub mod endpoints;

pub use self::context::RequestContext;
use self::endpoints::{Endpoint, EndpointResponse};

/// Pingora adapter around `ProxyEngine`
pub struct MirrorProxy {
    engine: Arc<ProxyEngine>,
    metrics: Arc<Metrics>,
    admin_prefix: String,
    /// Proxy start time (for uptime in the health endpoint)
    start_time: Instant,
}

impl MirrorProxy {
    pub fn new(engine: Arc<ProxyEngine>, admin_prefix: impl Into<String>) -> Self {
        Self {
            metrics: Arc::clone(engine.metrics()),
            engine,
            admin_prefix: admin_prefix.into(),
            start_time: Instant::now(),
        }
    }

    /// Build the engine with the reqwest fetcher described by `config`
    pub fn from_config(config: &Config) -> std::result::Result<Self, ProxyError> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.upstream.timeout_secs),
            config.upstream.user_agent.as_deref(),
        )?;
        let engine = ProxyEngine::from_config(config, Arc::new(fetcher), Arc::new(Metrics::new()))?;
        Ok(Self::new(Arc::new(engine), config.server.admin_prefix.clone()))
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Convert the Pingora request head into the engine's request type.
    ///
    /// HTTP/2 requests carry the host in the `:authority` pseudo-header,
    /// which shows up as the URI authority rather than a `host` header.
    pub fn inbound_request(req: &RequestHeader) -> InboundRequest {
        let mut headers = HeaderSet::from(&req.headers);
        if !headers.contains("host") {
            if let Some(authority) = req.uri.authority() {
                headers.append("host", authority.as_str());
            }
        }
        InboundRequest {
            method: req.method.as_str().to_string(),
            path: req.uri.path().to_string(),
            headers,
        }
    }

    async fn write_endpoint(
        &self,
        session: &mut Session,
        response: EndpointResponse,
        ctx: &mut RequestContext,
    ) -> Result<()> {
        let mut header = ResponseHeader::build(response.status, None)?;
        header.insert_header("Content-Type", response.content_type)?;
        header.insert_header("Content-Length", response.body.len().to_string())?;
        header.insert_header("X-Request-ID", ctx.request_id().to_string())?;

        ctx.add_bytes_sent(response.body.len());
        session
            .write_response_header(Box::new(header), false)
            .await?;
        session
            .write_response_body(Some(response.body.into()), true)
            .await?;
        Ok(())
    }

    async fn write_proxy_response(
        &self,
        session: &mut Session,
        mut response: ProxyResponse,
        ctx: &mut RequestContext,
    ) -> Result<()> {
        let header = build_response_header(&response, ctx.request_id())?;
        session
            .write_response_header(Box::new(header), false)
            .await?;

        // Dropping `response` on any early return closes a cached body's file
        loop {
            let chunk = response.body.next_chunk().await.map_err(|e| {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    error = %e,
                    "Failed to read response body mid-stream"
                );
                Error::because(ErrorType::InternalError, "reading response body", e)
            })?;
            match chunk {
                Some(chunk) => {
                    ctx.add_bytes_sent(chunk.len());
                    session.write_response_body(Some(chunk), false).await?;
                }
                None => {
                    session.write_response_body(None, true).await?;
                    return Ok(());
                }
            }
        }
    }
}

/// Response head for an engine response.
///
/// Adds `x-cache` and `x-request-id`; bodies without a known length are
/// sent chunked. 1xx, 204 and 304 carry no body and get no framing header.
pub fn build_response_header(response: &ProxyResponse, request_id: &str) -> Result<ResponseHeader> {
    let mut header = ResponseHeader::build(response.status, None)?;
    for (name, value) in response.headers.iter() {
        if let Err(e) = header.append_header(name.to_string(), value.to_string()) {
            tracing::debug!(header = %name, error = %e, "Dropping unrepresentable response header");
        }
    }
    if let Some(cache) = response.cache_status {
        header.insert_header("X-Cache", cache.as_str())?;
    }
    header.insert_header("X-Request-ID", request_id.to_string())?;
    let bodyless = matches!(response.status, 100..=199 | 204 | 304);
    if !bodyless && !response.headers.contains("content-length") {
        header.insert_header("Transfer-Encoding", "chunked")?;
    }
    Ok(header)
}

#[async_trait]
impl ProxyHttp for MirrorProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    /// Never reached: request_filter answers every request
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        tracing::error!(
            request_id = %ctx.request_id(),
            "upstream_peer called for a request that was not answered"
        );
        Err(Error::explain(
            ErrorType::InternalError,
            "request was not handled by the mirror engine",
        ))
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let inbound = Self::inbound_request(session.req_header());
        ctx.set_request_line(&inbound.method, &inbound.path);
        self.metrics.increment_request_count();

        if inbound.method == "GET" {
            if let Some(endpoint) = Endpoint::match_path(&self.admin_prefix, &inbound.path) {
                let response = match endpoint {
                    Endpoint::Health => endpoints::handle_health(self.start_time),
                    Endpoint::Metrics => endpoints::handle_metrics(&self.metrics),
                };
                self.write_endpoint(session, response, ctx).await?;
                return Ok(true);
            }
        }

        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id(),
            method = %inbound.method,
            path = %inbound.path
        );
        let response = self.engine.respond(&inbound).instrument(span).await;
        ctx.record_response(response.upstream_host.clone(), response.cache_status);

        self.write_proxy_response(session, response, ctx).await?;
        Ok(true)
    }

    async fn logging(&self, session: &mut Session, e: Option<&Error>, ctx: &mut Self::CTX) {
        let status_code = session
            .response_written()
            .map(|resp| resp.status.as_u16())
            .unwrap_or(500);
        let duration_ms = ctx.elapsed_ms();

        self.metrics.increment_status_count(status_code);
        self.metrics.record_duration(duration_ms);
        self.metrics.add_bytes_sent(ctx.bytes_sent());

        if let Some(error) = e {
            tracing::warn!(
                request_id = %ctx.request_id(),
                path = %ctx.path(),
                error = %error,
                "Request ended with error"
            );
        }

        tracing::info!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            host = ctx.upstream_host().unwrap_or("-"),
            cache = ctx.cache_status().map(|c| c.as_str()).unwrap_or("-"),
            status_code = status_code,
            bytes = ctx.bytes_sent(),
            duration_ms = duration_ms,
            "Request completed"
        );
    }
}
