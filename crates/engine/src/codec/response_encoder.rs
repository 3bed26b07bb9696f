//! Serializes a [`QueuedResponse`] into raw bytes.
//!
//! Writes the status line, a `Date` header, the handler's headers, a `Content-Length`
//! computed from the body (a handler supplied one is dropped), `Connection: close` when the
//! connection won't be reused, and then the body.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::header;
use tokio_util::codec::Encoder;

use crate::protocol::{QueuedResponse, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<QueuedResponse> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: QueuedResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let QueuedResponse { status, response, keep_alive } = item;
        let body = response.body();

        dst.reserve(INIT_HEADER_SIZE + body.len());
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        let mut date = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut date);
        dst.put_slice(b"date: ");
        dst.put_slice(&date[..]);
        dst.put_slice(b"\r\n");

        for (name, value) in response.headers() {
            if *name == header::CONTENT_LENGTH || *name == header::DATE {
                continue;
            }
            if !keep_alive && *name == header::CONNECTION {
                continue;
            }
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }

        write!(FastWrite(dst), "content-length: {}\r\n", body.len())?;
        if !keep_alive {
            dst.put_slice(b"connection: close\r\n");
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(body);
        Ok(())
    }
}

/// `io::Write` over a `BytesMut`, so `write!` can format straight into the buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;
    use http::StatusCode;

    fn encode(status: StatusCode, response: Response, keep_alive: bool) -> String {
        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(QueuedResponse { status, response, keep_alive }, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn writes_status_headers_and_body() {
        let mut response = Response::new("<html></html>");
        response.add_header("Content-Type", "application/om-scpi-app").unwrap();

        let raw = encode(StatusCode::OK, response, true);

        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("\r\ndate: "));
        assert!(raw.contains("\r\ncontent-type: application/om-scpi-app\r\n"));
        assert!(raw.contains("\r\ncontent-length: 13\r\n"));
        assert!(!raw.contains("connection: close"));
        assert!(raw.ends_with("\r\n\r\n<html></html>"));
    }

    #[test]
    fn computes_content_length_itself() {
        let mut response = Response::new("abc");
        response.add_header("Content-Length", "999").unwrap();

        let raw = encode(StatusCode::CREATED, response, true);

        assert!(raw.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(raw.contains("content-length: 3\r\n"));
        assert!(!raw.contains("999"));
    }

    #[test]
    fn closing_response_says_so() {
        let mut response = Response::empty();
        response.add_header("Connection", "keep-alive").unwrap();

        let raw = encode(StatusCode::INTERNAL_SERVER_ERROR, response, false);

        assert!(raw.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(raw.contains("content-length: 0\r\n"));
        assert!(raw.contains("connection: close\r\n"));
        assert!(!raw.contains("keep-alive"));
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let status = StatusCode::from_u16(599).unwrap();
        let raw = encode(status, Response::empty(), true);
        assert!(raw.starts_with("HTTP/1.1 599 \r\n"));
    }
}
