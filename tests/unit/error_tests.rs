// Error taxonomy tests: status codes and client-facing messages

use pypipo::cache::CacheError;
use pypipo::error::ProxyError;
use pypipo::host_codec::{self, DecodeError};

#[test]
fn test_client_errors_map_to_4xx() {
    assert_eq!(ProxyError::MethodNotAllowed("PUT".into()).status_code(), 405);
    assert_eq!(ProxyError::HostNotAllowed("evil.example".into()).status_code(), 401);
    assert_eq!(ProxyError::BadPath("/../x".into()).status_code(), 400);
    assert_eq!(ProxyError::MissingHost.status_code(), 400);
    assert_eq!(ProxyError::from(DecodeError::Empty).status_code(), 400);
}

#[test]
fn test_upstream_and_server_errors() {
    assert_eq!(ProxyError::Upstream("timeout".into()).status_code(), 502);
    assert_eq!(ProxyError::Rewrite("bad gzip".into()).status_code(), 502);
    assert_eq!(ProxyError::Internal("x".into()).status_code(), 500);
    assert_eq!(ProxyError::Config("x".into()).status_code(), 500);

    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err = ProxyError::from(CacheError::from(io));
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.kind(), "cache");
}

#[test]
fn test_client_messages() {
    assert_eq!(
        ProxyError::MethodNotAllowed("DELETE".into()).client_message(),
        "Method not allowed"
    );
    assert_eq!(
        ProxyError::HostNotAllowed("evil.example".into()).client_message(),
        "Refusing host: evil.example"
    );
}

#[test]
fn test_internal_details_are_not_exposed() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "/var/cache/secret/path");
    let err = ProxyError::from(CacheError::from(io));
    assert_eq!(err.client_message(), "Internal server error");
    assert!(err.to_string().contains("/var/cache/secret/path"));
}

#[test]
fn test_decode_errors_carry_reason() {
    let err = host_codec::decode_origin(&host_codec::encode("ftp://pypi.org")).unwrap_err();
    let proxy_err = ProxyError::from(err);
    assert_eq!(proxy_err.kind(), "decode");
    assert!(proxy_err.client_message().contains("ftp://pypi.org"));
}
