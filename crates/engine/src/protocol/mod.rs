//! Protocol types shared by the codec, the connection loop and handlers.
//!
//! - **Message Handling** ([`Message`], [`PayloadItem`], [`PayloadSize`]): what the request
//!   decoder yields, a header first and then payload chunks up to an EOF marker
//! - **Request Processing** ([`RequestHeader`]): the decoded request line and headers, with the
//!   headers also kept in wire order and wire case
//! - **Response Processing** ([`Response`], [`QueuedResponse`]): a fully buffered response body
//!   plus ordered header pairs, validated as they are added
//! - **Error Handling** ([`HttpError`], [`ParseError`], [`SendError`], [`HeaderError`],
//!   [`EngineError`])

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::QueuedResponse;
pub use response::Response;

mod error;
pub use error::EngineError;
pub use error::HeaderError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
