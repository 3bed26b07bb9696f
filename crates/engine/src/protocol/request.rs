//! HTTP request header handling.
//!
//! [`RequestHeader`] wraps an `http::Request<()>` for typed access, and additionally keeps
//! the header fields exactly as the client wrote them. `http::HeaderMap` normalizes names
//! to lower case, while handlers that record requests want to see `X-Foo` rather than `x-foo`.

use http::{HeaderMap, Method, Request, Uri, Version};
use tracing::warn;

/// The decoded request line and header fields of one request.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
    wire_headers: Vec<(String, String)>,
}

impl RequestHeader {
    /// Builds a header from a bodyless request and the header pairs as seen on the wire.
    pub fn with_wire_headers(inner: Request<()>, wire_headers: Vec<(String, String)>) -> Self {
        Self { inner, wire_headers }
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Header name/value pairs in the order and letter case the client sent them.
    pub fn wire_headers(&self) -> &[(String, String)] {
        &self.wire_headers
    }

    /// The request target without its query string.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// `"HTTP/1.1"` style rendering of the request version.
    pub fn version_str(&self) -> String {
        format!("{:?}", self.version())
    }

    /// Decoded query arguments, in the order they appear in the request target.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.inner.uri().query() else {
            return Vec::new();
        };
        serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_else(|e| {
            warn!(cause = %e, query, "can't decode query string");
            Vec::new()
        })
    }

    /// Determines if this request requires a body based on its HTTP method.
    ///
    /// Returns false for methods that typically don't have bodies:
    /// - GET
    /// - HEAD
    /// - DELETE
    /// - OPTIONS
    /// - CONNECT
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Whether the connection may serve another request after this one.
    ///
    /// HTTP/1.1 keeps the connection unless the client sent `Connection: close`,
    /// HTTP/1.0 only keeps it when asked to with `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self
            .headers()
            .get(http::header::CONNECTION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);

        match self.version() {
            Version::HTTP_11 => !connection.is_some_and(|value| value.contains("close")),
            _ => connection.is_some_and(|value| value.contains("keep-alive")),
        }
    }
}

/// Converts a bodyless request into a `RequestHeader`, the wire pairs are taken from the
/// (already normalized) header map.
impl From<Request<()>> for RequestHeader {
    fn from(inner: Request<()>) -> Self {
        let wire_headers = inner
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        Self { inner, wire_headers }
    }
}
