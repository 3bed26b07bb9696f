//! Fully buffered responses.
//!
//! Handlers build a [`Response`] out of a body and a list of header pairs and queue it on
//! the [`Connection`](crate::connection::Connection) together with a status code. Framing
//! headers are owned by the engine: `Content-Length` is always computed from the body and
//! `Transfer-Encoding` is refused.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode, header};

use crate::protocol::HeaderError;

/// A response body plus its header fields, in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct Response {
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl Response {
    pub fn new<B: Into<Bytes>>(body: B) -> Self {
        Self { headers: Vec::new(), body: body.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends a header field.
    ///
    /// Fails when the name or value can't appear on the wire, or when the header is one the
    /// engine has to control itself.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| HeaderError::InvalidName { name: name.to_string() })?;

        if header_name == header::TRANSFER_ENCODING {
            return Err(HeaderError::Reserved { name: name.to_string() });
        }

        let header_value =
            HeaderValue::from_str(value).map_err(|_| HeaderError::InvalidValue { name: name.to_string() })?;

        self.headers.push((header_name, header_value));
        Ok(())
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// A response accepted by the engine for sending, with the status it goes out with.
#[derive(Debug, Clone)]
pub struct QueuedResponse {
    pub status: StatusCode,
    pub response: Response,
    /// Whether the connection stays open after this response.
    pub keep_alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_headers_in_order() {
        let mut response = Response::new("<html></html>");
        response.add_header("Content-Type", "application/om-scpi-app").unwrap();
        response.add_header("Content-Description", "Message-ID: 152018").unwrap();

        let names: Vec<_> = response.headers().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["content-type", "content-description"]);
        assert_eq!(&response.body()[..], b"<html></html>");
    }

    #[test]
    fn rejects_invalid_headers() {
        let mut response = Response::empty();
        assert!(matches!(response.add_header("Bad Header", "x"), Err(HeaderError::InvalidName { .. })));
        assert!(matches!(response.add_header("X-Foo", "a\r\nb"), Err(HeaderError::InvalidValue { .. })));
        assert!(matches!(response.add_header("Transfer-Encoding", "chunked"), Err(HeaderError::Reserved { .. })));
        assert!(response.headers().is_empty());
    }
}
