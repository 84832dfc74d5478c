// HttpFetcher against a local TCP origin

use std::sync::Arc;
use std::time::Duration;

use pypipo::cache::CacheStore;
use pypipo::engine::{CacheStatus, ProxyEngine};
use pypipo::error::ProxyError;
use pypipo::headers::HeaderSet;
use pypipo::host_codec::{encode, UpstreamOrigin};
use pypipo::metrics::Metrics;
use pypipo::origin_guard::OriginGuard;
use pypipo::rewrite::LinkRewriter;
use pypipo::upstream::{HttpFetcher, UpstreamFetcher, UpstreamRequest};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::test_harness::get;

/// Serve one canned response; the task yields the raw request head
async fn spawn_origin(response: Vec<u8>) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&head).into_owned()
    });
    (port, handle)
}

fn http_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status_line);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5), Some("pypipo-test/1.0")).unwrap()
}

fn origin(port: u16) -> UpstreamOrigin {
    UpstreamOrigin::parse(&format!("http://127.0.0.1:{}", port)).unwrap()
}

fn find_header<'a>(head: &'a str, name: &str) -> Vec<&'a str> {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(n, _)| n.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .collect()
}

#[tokio::test]
async fn test_fetch_overrides_host_and_returns_response() {
    let (port, server) = spawn_origin(http_response(
        "200 OK",
        &[("Content-Type", "text/plain"), ("X-Upstream", "yes")],
        b"hello",
    ))
    .await;

    let inbound: HeaderSet = vec![
        ("Host", "myproxy:8000"),
        ("Accept", "*/*"),
        ("Connection", "keep-alive, x-secret"),
        ("X-Secret", "hop"),
    ]
    .into_iter()
    .collect();
    let request = UpstreamRequest::new(origin(port), "/simple/requests/", &inbound);
    let response = fetcher().fetch(request).await.unwrap();
    let (status, headers, body) = response.collect_body().await.unwrap();

    assert_eq!(status, 200);
    assert_eq!(headers.get("x-upstream"), Some("yes"));
    assert_eq!(body, "hello");

    let head = server.await.unwrap();
    assert!(head.starts_with("GET /simple/requests/ HTTP/1.1\r\n"), "head: {}", head);
    assert_eq!(find_header(&head, "host"), vec![format!("127.0.0.1:{}", port)]);
    assert_eq!(find_header(&head, "user-agent"), vec!["pypipo-test/1.0"]);
    assert!(find_header(&head, "x-secret").is_empty());
}

#[tokio::test]
async fn test_redirects_are_relayed_not_followed() {
    let (port, server) = spawn_origin(http_response(
        "301 Moved Permanently",
        &[("Location", "/simple/requests/")],
        b"",
    ))
    .await;

    let request = UpstreamRequest::new(origin(port), "/simple/requests", &HeaderSet::new());
    let response = fetcher().fetch(request).await.unwrap();
    assert_eq!(response.status, 301);
    assert_eq!(response.headers.get("location"), Some("/simple/requests/"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_compressed_body_is_not_decoded() {
    let payload = b"\x1f\x8b\x08\x00not-really-gzip";
    let (port, server) = spawn_origin(http_response(
        "200 OK",
        &[("Content-Type", "application/x-tar"), ("Content-Encoding", "gzip")],
        payload,
    ))
    .await;

    let request = UpstreamRequest::new(origin(port), "/x.tar.gz", &HeaderSet::new());
    let (_, headers, body) = fetcher()
        .fetch(request)
        .await
        .unwrap()
        .collect_body()
        .await
        .unwrap();
    assert_eq!(headers.get("content-encoding"), Some("gzip"));
    assert_eq!(body, &payload[..]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_upstream_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let request = UpstreamRequest::new(origin(port), "/simple/", &HeaderSet::new());
    let err = fetcher().fetch(request).await.unwrap_err();
    assert!(matches!(err, ProxyError::Upstream(_)));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn test_engine_with_http_fetcher_rewrites_and_caches() {
    let html = br#"<a href="https://files.pythonhosted.org/p/x.whl">x</a>"#;
    let (port, server) =
        spawn_origin(http_response("200 OK", &[("Content-Type", "text/html")], html)).await;

    let dir = TempDir::new().unwrap();
    let engine = ProxyEngine::new(
        origin(port),
        OriginGuard::new(["127.0.0.1", "files.pythonhosted.org"]),
        CacheStore::new(dir.path(), 1024),
        LinkRewriter::new("http", 1024 * 1024),
        Arc::new(fetcher()),
        Arc::new(Metrics::new()),
    );

    let mut first = engine.respond(&get("/simple/x/")).await;
    assert_eq!(first.status, 200);
    let body = first.collect_body().await.unwrap();
    let expected = format!(
        r#"<a href="http://myproxy:8000/~/{}/p/x.whl">x</a>"#,
        encode("https://files.pythonhosted.org")
    );
    assert_eq!(body, expected.as_bytes());
    server.await.unwrap();

    // The origin is gone; only the cache can answer now
    let mut second = engine.respond(&get("/simple/x/")).await;
    assert_eq!(second.cache_status, Some(CacheStatus::Hit));
    assert_eq!(second.collect_body().await.unwrap(), body);
    assert!(dir
        .path()
        .join(format!("http+127.0.0.1+{}/simple/x/index.body", port))
        .is_file());
}
