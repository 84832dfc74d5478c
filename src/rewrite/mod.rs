//! HTML link rewriting.
//!
//! This is a narrow textual substitution, not an HTML parser. Only the
//! literal form `href="https://<host>` is recognized; the `https://<host>`
//! part becomes `<scheme>://<proxy host>/~/<token>` and everything after the
//! host (path, query, fragment, closing quote) is left untouched. Links in
//! single quotes, protocol-relative links (`//host/...`), plain `http://`
//! links and URLs assembled by scripts are not rewritten.

mod decode;

use std::borrow::Cow;

use bytes::Bytes;
use regex::bytes::{Captures, Regex};

pub use self::decode::{ContentEncoding, DecodeBodyError};
use crate::constants::EMBEDDED_HOST_MARKER;
use crate::headers::HeaderSet;
use crate::host_codec;

/// Absolute secure link at the start of a double-quoted href.
/// The host stops at the first `/`, quote, whitespace or angle bracket.
const HREF_PATTERN: &str = r#"href="(https://[^/"'\s<>]+)"#;

/// What happened to a response body on its way into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Not HTML, served as received
    Untouched,
    /// HTML whose encoding we cannot undo, served as received
    UnsupportedEncoding,
    /// HTML decoded (if needed) and rewritten
    Rewritten { links: usize },
}

#[derive(Debug, Clone)]
pub struct LinkRewriter {
    pattern: Regex,
    public_scheme: String,
    max_body_bytes: usize,
}

impl LinkRewriter {
    pub fn new(public_scheme: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            // Constant pattern, checked by the tests below
            pattern: Regex::new(HREF_PATTERN).expect("href pattern is valid"),
            public_scheme: public_scheme.into(),
            max_body_bytes,
        }
    }

    /// Proxy-local prefix that replaces `origin` in a link
    pub fn proxy_prefix(&self, proxy_host: &str, origin: &str) -> String {
        format!(
            "{}://{}/{}/{}",
            self.public_scheme,
            proxy_host,
            EMBEDDED_HOST_MARKER,
            host_codec::encode(origin)
        )
    }

    /// Rewrite every `href="https://<host>` in `html`.
    ///
    /// Returns the new bytes and the number of links replaced. Bytes outside
    /// the matched spans are copied unchanged.
    pub fn rewrite<'a>(&self, html: &'a [u8], proxy_host: &str) -> (Cow<'a, [u8]>, usize) {
        let mut links = 0;
        let out = self.pattern.replace_all(html, |caps: &Captures<'_>| {
            links += 1;
            let origin = String::from_utf8_lossy(&caps[1]);
            let mut replacement = b"href=\"".to_vec();
            replacement.extend_from_slice(self.proxy_prefix(proxy_host, &origin).as_bytes());
            replacement
        });
        (out, links)
    }

    /// Apply rewriting to a complete upstream response.
    ///
    /// Only `text/html` bodies are touched. A compressed body is decoded
    /// first and `content-encoding` dropped; `content-length` is always
    /// dropped for rewritten HTML so the transport frames the new body.
    pub fn transform(
        &self,
        headers: &mut HeaderSet,
        body: Bytes,
        proxy_host: &str,
    ) -> Result<(Bytes, RewriteOutcome), DecodeBodyError> {
        if !headers.is_html() {
            return Ok((body, RewriteOutcome::Untouched));
        }

        let Some(encoding) = ContentEncoding::from_header(headers.get("content-encoding")) else {
            tracing::warn!(
                content_encoding = headers.get("content-encoding").unwrap_or(""),
                "HTML body in unsupported encoding, links left as-is"
            );
            return Ok((body, RewriteOutcome::UnsupportedEncoding));
        };

        let decoded = encoding.decode(&body, self.max_body_bytes)?;
        let (rewritten, links) = self.rewrite(&decoded, proxy_host);
        let rewritten = Bytes::from(rewritten.into_owned());

        headers.remove("content-encoding");
        headers.remove("content-length");

        Ok((rewritten, RewriteOutcome::Rewritten { links }))
    }
}
