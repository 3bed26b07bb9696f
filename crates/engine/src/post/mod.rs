//! Incremental parsing of form bodies.
//!
//! A [`PostProcessor`] is fed the request body piece by piece, in whatever slices the
//! connection happens to read, and reports every form field it finds through a callback as a
//! [`PostField`]. Large values may be reported in several calls for the same key, with
//! `offset` telling where in the value the slice belongs.
//!
//! Two encodings are understood:
//!
//! - `application/x-www-form-urlencoded`: each `key=value` pair is reported once, after it is
//!   terminated by `&` or by [`PostProcessor::finish`]
//! - `multipart/form-data; boundary=...`: part data is reported as soon as it can't be the
//!   start of the next delimiter, together with the part's name, filename, content type and
//!   transfer encoding

use http::header::CONTENT_TYPE;
use mime::Mime;
use tracing::trace;

use crate::protocol::{ParseError, RequestHeader};

mod multipart;
mod urlencoded;

pub use multipart::MultipartParser;
pub use urlencoded::UrlEncodedParser;

/// One piece of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostField<'a> {
    pub key: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub transfer_encoding: Option<&'a str>,
    pub data: &'a [u8],
    /// Position of `data` within the whole field value.
    pub offset: u64,
}

/// Form body parser for one request.
#[derive(Debug)]
pub enum PostProcessor {
    UrlEncoded(UrlEncodedParser),
    Multipart(MultipartParser),
}

impl PostProcessor {
    /// Creates a parser matching the request's `Content-Type`, or `None` when the body is not
    /// a form this module understands.
    pub fn for_request(header: &RequestHeader) -> Option<Self> {
        let content_type = header.headers().get(CONTENT_TYPE)?.to_str().ok()?;
        Self::for_content_type(content_type)
    }

    pub fn for_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.parse::<Mime>().ok()?;

        if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            trace!("using url-encoded post processor");
            return Some(Self::UrlEncoded(UrlEncodedParser::new()));
        }

        if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
            let boundary = mime.get_param(mime::BOUNDARY)?;
            let boundary = boundary.as_str().trim_matches('"');
            if boundary.is_empty() {
                return None;
            }
            trace!(boundary, "using multipart post processor");
            return Some(Self::Multipart(MultipartParser::new(boundary)));
        }

        None
    }

    /// Feeds the next slice of the body.
    pub fn process<F>(&mut self, data: &[u8], on_field: F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        match self {
            Self::UrlEncoded(parser) => parser.process(data, on_field),
            Self::Multipart(parser) => parser.process(data, on_field),
        }
    }

    /// Signals the end of the body, reporting whatever field is still pending.
    pub fn finish<F>(&mut self, on_field: F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        match self {
            Self::UrlEncoded(parser) => parser.finish(on_field),
            Self::Multipart(parser) => parser.finish(on_field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn header(content_type: Option<&str>) -> RequestHeader {
        let mut builder = Request::builder().method("POST").uri("/upload");
        if let Some(value) = content_type {
            builder = builder.header("Content-Type", value);
        }
        builder.body(()).unwrap().into()
    }

    #[test]
    fn picks_parser_from_content_type() {
        assert!(matches!(
            PostProcessor::for_request(&header(Some("application/x-www-form-urlencoded"))),
            Some(PostProcessor::UrlEncoded(_))
        ));
        assert!(matches!(
            PostProcessor::for_request(&header(Some("application/x-www-form-urlencoded; charset=utf-8"))),
            Some(PostProcessor::UrlEncoded(_))
        ));
        assert!(matches!(
            PostProcessor::for_request(&header(Some("multipart/form-data; boundary=----WebKitFormBoundary"))),
            Some(PostProcessor::Multipart(_))
        ));
        assert!(matches!(
            PostProcessor::for_request(&header(Some("multipart/form-data; boundary=\"quoted\""))),
            Some(PostProcessor::Multipart(_))
        ));
    }

    #[test]
    fn no_parser_for_other_bodies() {
        assert!(PostProcessor::for_request(&header(None)).is_none());
        assert!(PostProcessor::for_request(&header(Some("application/json"))).is_none());
        assert!(PostProcessor::for_request(&header(Some("multipart/form-data"))).is_none());
        assert!(PostProcessor::for_request(&header(Some("not a mime"))).is_none());
    }

    #[test]
    fn dispatches_to_parser() {
        let mut processor = PostProcessor::for_content_type("application/x-www-form-urlencoded").unwrap();
        let mut fields = Vec::new();
        processor.process(b"a=1&b", |field| fields.push(field.key.to_string())).unwrap();
        processor.finish(|field| fields.push(field.key.to_string())).unwrap();
        assert_eq!(fields, vec!["a", "b"]);
    }
}
