//! Per connection request handling.
//!
//! [`HttpConnection`] runs the request loop of one client connection; [`Connection`] is the
//! view of the current request that is handed to the
//! [`ConnectionHandler`](crate::handler::ConnectionHandler).

mod context;
mod http_connection;

pub use context::Connection;
pub use http_connection::{DEFAULT_READ_BUFFER_CAPACITY, HttpConnection};
