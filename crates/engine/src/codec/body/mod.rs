//! Request payload decoding
//!
//! - [`LengthDecoder`]: bodies framed by `Content-Length`
//! - [`ChunkedDecoder`]: bodies sent with `Transfer-Encoding: chunked`
//! - [`PayloadDecoder`]: picks one of the above, or yields EOF right away for empty bodies

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;

pub use payload_decoder::PayloadDecoder;
