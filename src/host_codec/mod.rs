//! Embedded upstream host codec.
//!
//! A proxy-local path of the form `/~/<token>/<remainder>` names an explicit
//! upstream origin. The token is the origin URL (`scheme://host[:port]`)
//! encoded with the URL-safe base64 alphabet, so it never contains `/` or `+`
//! and survives being written into an `href` attribute.
//!
//! Any other path belongs to the default upstream.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use thiserror::Error;

use crate::constants::EMBEDDED_HOST_MARKER;

/// Encodes with padding, accepts tokens with or without it.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors produced while decoding an embedded host token
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty host token")]
    Empty,

    #[error("malformed host token: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("host token is not valid UTF-8")]
    NotUtf8,

    #[error("not an origin URL: {0}")]
    NotOrigin(String),
}

/// Scheme, host and optional port of an upstream server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamOrigin {
    scheme: String,
    hostname: String,
    port: Option<u16>,
}

impl UpstreamOrigin {
    /// Parse `scheme://host[:port]` with an optional trailing `/`.
    ///
    /// Anything carrying a path, query, userinfo or a scheme other than
    /// http/https is rejected.
    pub fn parse(url: &str) -> Result<Self, DecodeError> {
        let not_origin = || DecodeError::NotOrigin(url.to_string());

        let uri: http::Uri = url.parse().map_err(|_| not_origin())?;
        let scheme = match uri.scheme_str() {
            Some(s @ ("http" | "https")) => s.to_string(),
            _ => return Err(not_origin()),
        };
        let authority = uri.authority().ok_or_else(not_origin)?;
        if authority.as_str().contains('@') {
            return Err(not_origin());
        }
        let hostname = authority.host().to_ascii_lowercase();
        if hostname.is_empty() {
            return Err(not_origin());
        }
        if uri.query().is_some() || !matches!(uri.path(), "" | "/") {
            return Err(not_origin());
        }

        Ok(Self {
            scheme,
            hostname,
            port: authority.port_u16(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Explicit port, or the scheme's well-known port
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.scheme.as_str()) {
            (Some(port), _) => port,
            (None, "https") => 443,
            (None, _) => 80,
        }
    }

    /// True for `https` on port 443, the form every cache key defaults to
    pub fn is_default_https(&self) -> bool {
        self.scheme == "https" && self.effective_port() == 443
    }

    /// `host[:port]`, as sent in the outbound `Host` header
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.hostname, port),
            None => self.hostname.clone(),
        }
    }

    /// Full URL for a path on this origin
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self, path)
        } else {
            format!("{}/{}", self, path)
        }
    }
}

impl fmt::Display for UpstreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

/// A request path split into its embedded token and the upstream path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedPath<'a> {
    pub token: &'a str,
    /// Upstream path, always starting with `/`
    pub remainder: &'a str,
}

/// Encode an origin URL into a path token
pub fn encode(origin_url: &str) -> String {
    TOKEN_ENGINE.encode(origin_url.as_bytes())
}

/// Decode a path token back into the origin URL it was built from
pub fn decode(token: &str) -> Result<String, DecodeError> {
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }
    let raw = TOKEN_ENGINE.decode(token)?;
    String::from_utf8(raw).map_err(|_| DecodeError::NotUtf8)
}

/// Decode a path token and check that it names an origin
pub fn decode_origin(token: &str) -> Result<UpstreamOrigin, DecodeError> {
    let url = decode(token)?;
    UpstreamOrigin::parse(&url)
}

/// Recognize `/~/<token>[/<remainder>]`.
///
/// Returns `None` when the path does not start with the marker segment,
/// meaning the default upstream should be used.
pub fn split_embedded_path(request_path: &str) -> Option<EmbeddedPath<'_>> {
    let rest = request_path.strip_prefix('/')?;
    let rest = rest.strip_prefix(EMBEDDED_HOST_MARKER)?;

    let after_marker = match rest.as_bytes().first() {
        None => "",
        Some(b'/') => &rest[1..],
        // `/~foo` is an ordinary path
        Some(_) => return None,
    };

    match after_marker.find('/') {
        Some(idx) => Some(EmbeddedPath {
            token: &after_marker[..idx],
            remainder: &after_marker[idx..],
        }),
        None => Some(EmbeddedPath {
            token: after_marker,
            remainder: "/",
        }),
    }
}
