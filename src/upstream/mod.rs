//! Upstream fetch collaborator.
//!
//! The engine only sees the `UpstreamFetcher` trait; `HttpFetcher` is the
//! reqwest-backed implementation the binary wires in. One fetcher is created
//! per process and shared by reference.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};

use crate::error::ProxyError;
use crate::headers::HeaderSet;
use crate::host_codec::UpstreamOrigin;

/// Response body as a single-pass chunk stream
pub type BodyStream = BoxStream<'static, Result<Bytes, ProxyError>>;

/// Decoded request ready to be sent upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub origin: UpstreamOrigin,
    /// Path on the upstream, starting with `/`
    pub path: String,
    pub headers: HeaderSet,
}

impl UpstreamRequest {
    /// Build from the inbound headers.
    ///
    /// Hop-by-hop, conditional, range and `Accept-Encoding` headers are
    /// dropped so the upstream returns the full identity-encoded resource,
    /// and `Host` is replaced with the upstream authority.
    pub fn new(origin: UpstreamOrigin, path: impl Into<String>, inbound: &HeaderSet) -> Self {
        let mut headers = inbound.clone();
        headers.strip_hop_by_hop();
        headers.strip_client_specific();
        headers.set("host", origin.authority());
        Self {
            origin,
            path: path.into(),
            headers,
        }
    }

    pub fn hostname(&self) -> &str {
        self.origin.hostname()
    }

    pub fn url(&self) -> String {
        self.origin.url_for(&self.path)
    }
}

/// Status, headers and body returned by the upstream
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderSet,
    pub body: BodyStream,
}

impl UpstreamResponse {
    pub fn new(status: u16, headers: HeaderSet, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response with an in-memory body
    pub fn from_bytes(status: u16, headers: HeaderSet, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, stream::once(async move { Ok(body) }).boxed())
    }

    /// Drain the body into memory
    pub async fn collect_body(self) -> Result<(u16, HeaderSet, Bytes), ProxyError> {
        let body = self
            .body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok((self.status, self.headers, body.freeze()))
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Fetches a resource from an upstream origin.
///
/// Only transport failures are errors; any HTTP status the upstream returns
/// is a normal response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError>;
}

/// reqwest-backed fetcher.
///
/// Redirects are relayed to the client rather than followed, and bodies are
/// never decompressed here.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, ProxyError> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn header_map(headers: &HeaderSet) -> reqwest::header::HeaderMap {
        let mut map = reqwest::header::HeaderMap::new();
        for (name, value) in headers.iter() {
            let parsed = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    map.append(name, value);
                }
                _ => tracing::debug!(header = %name, "Skipping unrepresentable header"),
            }
        }
        map
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let url = request.url();
        let response = self
            .client
            .get(&url)
            .headers(Self::header_map(&request.headers))
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(format!("{}: {}", url, e)))?;

        let status = response.status().as_u16();
        let headers: HeaderSet = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes_stream()
            .map_err(move |e| ProxyError::Upstream(format!("{}: {}", url, e)))
            .boxed();

        Ok(UpstreamResponse::new(status, headers, body))
    }
}
