//! An HTTP server to embed in test suites in place of a remote endpoint.
//!
//! [`HttpMockServer`] accepts real HTTP connections on a local port, captures each request
//! into a [`RequestRecord`] (URL, headers, query arguments, and the body as form fields, one
//! multipart upload or raw bytes), lets a test supplied callback decide the response, and lets
//! the test block until a given number of requests were fully processed.
//!
//! ```no_run
//! use std::time::Duration;
//! use httpmock_server::{HttpMethod, HttpMockServer};
//!
//! let mut server = HttpMockServer::new(0);
//! server.set_response_callback(|record| {
//!     record.response_status = 201;
//!     record.response_body = format!("created {}", record.url);
//! });
//! server.start().expect("port should be free");
//!
//! // the code under test posts to server.base_url() + "/items"
//!
//! assert!(server.wait_for_request_completed(1, Some(Duration::from_secs(5))));
//! let request = server.last_request().expect("request was recorded");
//! assert_eq!(request.method, HttpMethod::PostRawData);
//! ```
//!
//! Requests are served by `httpmock-engine` on its own tokio runtime; everything in this crate
//! is synchronous.

mod classifier;
mod environment;
mod error;
mod lifecycle;
mod notifier;
mod record;
mod response;
mod server;

pub use classifier::{classify, merge_field};
pub use environment::{MockServerEnvironment, first_running_mock_server};
pub use error::MockServerError;
pub use lifecycle::RequestLifecycle;
pub use notifier::CompletionNotifier;
pub use record::{HttpMethod, MultipartField, RequestRecord};
pub use response::ResponseCallback;
pub use server::{HttpMockServer, HttpMockServerBuilder};
