//! A small callback driven HTTP/1.1 engine
//!
//! This crate accepts HTTP connections on a tokio runtime, decodes requests with
//! `tokio_util` codecs and, instead of handing a whole request to an async handler,
//! drives a synchronous [`handler::ConnectionHandler`] through the life of every
//! request:
//!
//! 1. once right after the request header was decoded,
//! 2. once per decoded body chunk,
//! 3. once more with no chunk, the call on which a response must be queued,
//! 4. and finally a completion call after the response went out (or the exchange failed).
//!
//! The handler correlates these calls through an opaque per-connection token slot, and
//! may ask the engine for a [`post::PostProcessor`] that splits URL-encoded and
//! multipart bodies into fields.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use httpmock_engine::connection::Connection;
//! use httpmock_engine::daemon::{Daemon, EngineConfig};
//! use httpmock_engine::handler::{Action, ConnectionHandler, ConnectionToken, TerminationCode};
//! use httpmock_engine::protocol::Response;
//!
//! struct Hello;
//!
//! impl ConnectionHandler for Hello {
//!     fn on_connection(&self, connection: &mut Connection, upload: Option<&[u8]>) -> Action {
//!         if connection.token().is_none() {
//!             connection.set_token(ConnectionToken::new(1));
//!             return Action::Continue;
//!         }
//!         if upload.is_some() {
//!             return Action::Continue;
//!         }
//!         match connection.queue_response(200, Response::new("Hello World!\r\n")) {
//!             Ok(()) => Action::Continue,
//!             Err(_) => Action::Abort,
//!         }
//!     }
//!
//!     fn on_completed(&self, token: &mut Option<ConnectionToken>, _termination: TerminationCode) {
//!         token.take();
//!     }
//! }
//!
//! let daemon = Daemon::start(&EngineConfig::default(), Arc::new(Hello)).expect("bind failed");
//! daemon.stop();
//! ```
//!
//! # Architecture
//!
//! - [`daemon`]: runtime, listener and accept loop
//! - [`connection`]: per connection request loop and the [`connection::Connection`] view handed to handlers
//! - [`handler`]: the callback trait and its small vocabulary types
//! - [`codec`]: request decoding and response encoding
//! - [`post`]: incremental form body parsing
//! - [`protocol`]: header, message, response and error types
//!
//! # Limitations
//!
//! - HTTP/1.x only, no TLS
//! - Responses are always fully buffered and sent with `Content-Length`
//! - Maximum header size: 8KB, maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod daemon;
pub mod handler;
pub mod post;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
