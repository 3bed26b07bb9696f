//! HTTP codec module for decoding requests and encoding responses
//!
//! - [`RequestDecoder`]: yields a request header, then the payload chunks, then an EOF marker
//! - [`ResponseEncoder`]: writes a [`QueuedResponse`](crate::protocol::QueuedResponse) in one go
//!
//! # Example
//!
//! ```no_run
//! use httpmock_engine::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"[..]);
//! let header = decoder.decode(&mut buffer);
//! ```

mod body;
mod header_decoder;
mod request_decoder;
mod response_encoder;

pub use header_decoder::HeaderDecoder;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
