//! HTTP header decoder
//!
//! Parses the request line and header fields with `httparse`, then builds a typed
//! `http::Request<()>` plus the wire-case header pairs, and decides how the payload that
//! follows is framed.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP request headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode HTTP headers from the provided bytes buffer.
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete header was parsed; the header bytes
    ///   are removed from `src`
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if the header is malformed or too large
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match status {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(header_size = body_offset, "parsed request header");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            _ => return Err(ParseError::InvalidVersion(req.version)),
        };

        let mut builder = Request::builder()
            .method(req.method.ok_or(ParseError::InvalidMethod)?)
            .uri(req.path.ok_or(ParseError::InvalidUri)?)
            .version(version);

        let mut wire_headers = Vec::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
            builder = builder.header(name, value);
            wire_headers.push((header.name.to_string(), String::from_utf8_lossy(header.value).into_owned()));
        }

        let request = builder.body(()).map_err(|e| match e {
            e if e.is::<http::method::InvalidMethod>() => ParseError::InvalidMethod,
            e if e.is::<http::uri::InvalidUri>() => ParseError::InvalidUri,
            e => ParseError::invalid_header(e),
        })?;

        let _ = src.split_to(body_offset);

        let header = RequestHeader::with_wire_headers(request, wire_headers);
        let payload_size = parse_payload(&header)?;

        Ok(Some((header, payload_size)))
    }
}

/// Determines how the payload is framed, following
/// [RFC 9112 section 6.3](https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length).
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    if !header.need_body() && te_header.is_none() && cl_header.is_none() {
        return Ok(PayloadSize::new_empty());
    }

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::new_empty()),

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                Err(ParseError::invalid_body("transfer-encoding without chunked as final coding"))
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            Ok(PayloadSize::new_length(length))
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }
    }
}

/// Checks if chunked is the final coding of a Transfer-Encoding value.
fn is_chunked(value: &HeaderValue) -> bool {
    value
        .as_bytes()
        .rsplit(|b| *b == b',')
        .next()
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};
    use indoc::indoc;

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked(&HeaderValue::from_static("gzip, chunked")));
        assert!(is_chunked(&HeaderValue::from_static("Chunked")));
        assert!(!is_chunked(&HeaderValue::from_static("chunked, gzip")));
        assert!(!is_chunked(&HeaderValue::from_static("gzip")));
    }

    #[test]
    fn leaves_body_in_buffer() {
        let str = indoc! {r##"
        POST /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 3

        123"##};

        let mut bytes = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder.decode(&mut bytes).unwrap().unwrap();

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(payload_size, PayloadSize::Length(3));
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn partial_header_needs_more() {
        let mut bytes = BytesMut::from(&b"GET /index.html HTTP/1.1\r\nHost: 127.0"[..]);
        assert!(HeaderDecoder.decode(&mut bytes).unwrap().is_none());
        assert_eq!(bytes.len(), 37);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /get-url?name=daniel&project=curl HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*
        Content-Description: Message-ID: 152019, File-Tag: preview

        "##};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.path(), "/get-url");
        assert_eq!(header.uri().query(), Some("name=daniel&project=curl"));
        assert_eq!(header.headers().len(), 4);
        assert_eq!(
            header.headers().get("content-description"),
            Some(&HeaderValue::from_static("Message-ID: 152019, File-Tag: preview"))
        );

        assert_eq!(header.wire_headers()[3].0, "Content-Description");
        assert_eq!(header.wire_headers()[3].1, "Message-ID: 152019, File-Tag: preview");
    }

    #[test]
    fn chunked_post() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Host: 127.0.0.1:8080
        Transfer-Encoding: chunked

        "##};

        let mut buf = BytesMut::from(str);
        let (_, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn rejects_conflicting_framing() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Transfer-Encoding: chunked
        Content-Length: 10

        "##};

        let mut buf = BytesMut::from(str);
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn rejects_oversized_header() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        raw.push_str(&format!("X-Big: {}\r\n", "a".repeat(MAX_HEADER_BYTES)));
        let mut buf = BytesMut::from(raw.as_str());
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn rejects_garbage() {
        let mut buf = BytesMut::from(&b"\x01\x02 nonsense\r\n\r\n"[..]);
        assert!(HeaderDecoder.decode(&mut buf).is_err());
    }
}
