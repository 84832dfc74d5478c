// Host token format tests against known values
//
// Tokens appear in URLs handed out to clients, so their exact form must not
// drift between releases.

use pypipo::host_codec::{decode, decode_origin, encode, split_embedded_path};
use pypipo::origin_guard::OriginGuard;
use pypipo::rewrite::LinkRewriter;

#[test]
fn test_known_tokens() {
    assert_eq!(encode("https://pypi.org"), "aHR0cHM6Ly9weXBpLm9yZw==");
    assert_eq!(
        encode("https://files.pythonhosted.org"),
        "aHR0cHM6Ly9maWxlcy5weXRob25ob3N0ZWQub3Jn"
    );
    assert_eq!(
        decode("aHR0cHM6Ly9leGFtcGxlLm9yZw==").unwrap(),
        "https://example.org"
    );
}

#[test]
fn test_rewritten_link_is_accepted_back() {
    let rewriter = LinkRewriter::new("http", 1024 * 1024);
    let (html, _) = rewriter.rewrite(
        br#"<a href="https://files.pythonhosted.org/packages/x/requests-2.31.0.tar.gz">"#,
        "localhost:8000",
    );
    let html = String::from_utf8(html.into_owned()).unwrap();
    assert_eq!(
        html,
        r#"<a href="http://localhost:8000/~/aHR0cHM6Ly9maWxlcy5weXRob25ob3N0ZWQub3Jn/packages/x/requests-2.31.0.tar.gz">"#
    );

    let path = html
        .trim_start_matches(r#"<a href="http://localhost:8000"#)
        .trim_end_matches(r#"">"#);
    let split = split_embedded_path(path).unwrap();
    let origin = decode_origin(split.token).unwrap();
    assert!(OriginGuard::default().check(origin.hostname()).is_ok());
    assert_eq!(split.remainder, "/packages/x/requests-2.31.0.tar.gz");
}

#[test]
fn test_disallowed_origin_decodes_but_is_refused() {
    let origin = decode_origin(&encode("https://evil.example")).unwrap();
    let err = OriginGuard::default().check(origin.hostname()).unwrap_err();
    assert_eq!(err.status_code(), 401);
    assert!(err.client_message().contains("evil.example"));
}
