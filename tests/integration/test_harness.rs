// Test harness for integration tests
// Provides a scripted upstream and helpers to build an engine around it

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};

use pypipo::cache::CacheStore;
use pypipo::engine::{InboundRequest, ProxyEngine};
use pypipo::error::ProxyError;
use pypipo::headers::HeaderSet;
use pypipo::host_codec::UpstreamOrigin;
use pypipo::metrics::Metrics;
use pypipo::origin_guard::OriginGuard;
use pypipo::rewrite::LinkRewriter;
use pypipo::upstream::{UpstreamFetcher, UpstreamRequest, UpstreamResponse};

pub const PROXY_HOST: &str = "myproxy:8000";

/// Canned response for one upstream URL
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Sent as separate body chunks
    pub chunks: Vec<Vec<u8>>,
}

impl Canned {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            chunks: vec![body.into()],
        }
    }

    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, "text/html; charset=utf-8", body)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn chunked(mut self, chunk_size: usize) -> Self {
        let body: Vec<u8> = self.chunks.concat();
        self.chunks = body.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect();
        self
    }
}

/// Scripted upstream that records every request it receives
#[derive(Default)]
pub struct FakeUpstream {
    routes: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<UpstreamRequest>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    fail_transport: Mutex<bool>,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, canned: Canned) {
        self.routes.lock().unwrap().insert(url.to_string(), canned);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_transport_failure(&self, fail: bool) {
        *self.fail_transport.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamFetcher for FakeUpstream {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_transport.lock().unwrap() {
            return Err(ProxyError::Upstream(format!(
                "{}: connection refused",
                request.url()
            )));
        }

        let canned = self.routes.lock().unwrap().get(&request.url()).cloned();
        let canned = canned.unwrap_or_else(|| Canned::new(404, "text/plain", "Not Found"));
        let headers: HeaderSet = canned.headers.into_iter().collect();
        let body = stream::iter(
            canned
                .chunks
                .into_iter()
                .map(|c| Ok::<_, ProxyError>(Bytes::from(c))),
        )
        .boxed();
        Ok(UpstreamResponse::new(canned.status, headers, body))
    }
}

pub fn build_engine(cache_dir: &Path, upstream: Arc<FakeUpstream>) -> ProxyEngine {
    build_engine_with_chunk_size(cache_dir, upstream, 16 * 1024)
}

pub fn build_engine_with_chunk_size(
    cache_dir: &Path,
    upstream: Arc<FakeUpstream>,
    chunk_size: usize,
) -> ProxyEngine {
    ProxyEngine::new(
        UpstreamOrigin::parse("https://pypi.org").unwrap(),
        OriginGuard::default(),
        CacheStore::new(cache_dir, chunk_size),
        LinkRewriter::new("http", 16 * 1024 * 1024),
        upstream,
        Arc::new(Metrics::new()),
    )
}

pub fn get(path: &str) -> InboundRequest {
    let headers: HeaderSet = vec![
        ("Host", PROXY_HOST),
        ("Accept", "text/html"),
        ("Accept-Encoding", "gzip"),
        ("User-Agent", "pip/24.0"),
        ("Connection", "keep-alive"),
    ]
    .into_iter()
    .collect();
    InboundRequest::get(path, headers)
}

/// Every regular file under `root`, relative and sorted
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
