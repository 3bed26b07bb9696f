//! The captured request, plus the response the test wants to send back.

use std::collections::HashMap;
use std::fmt;

/// How the request body was encoded, as far as the server could tell.
///
/// POST requests start out as [`HttpMethod::PostFormUrlEncoded`] when the body looks like a
/// form and [`HttpMethod::PostRawData`] otherwise; the first field carrying a filename or a
/// content type turns a form into [`HttpMethod::PostMultipart`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET, and every verb other than POST
    #[default]
    Get,
    PostFormUrlEncoded,
    PostMultipart,
    PostRawData,
}

/// Metadata of the last multipart field that was started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartField {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub transfer_encoding: String,
}

/// Everything known about one HTTP exchange.
///
/// The request side is filled in while the request is read; `query_arguments` and `headers`
/// right before the response callback runs. The callback then writes the `response_*` fields.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Sequence number, unique for the server that captured the request.
    pub id: u64,
    /// Request target path, without the query string.
    pub url: String,
    /// `"HTTP/1.1"` or `"HTTP/1.0"`.
    pub version: String,
    /// The verb as received.
    pub request_method: String,
    pub method: HttpMethod,
    pub query_arguments: HashMap<String, String>,
    /// Header names keep the letter case the client used.
    pub headers: HashMap<String, String>,
    pub form_fields: HashMap<String, String>,
    pub multipart_field: MultipartField,
    /// Raw body for [`HttpMethod::PostRawData`], data of the multipart field otherwise.
    pub body: Vec<u8>,

    pub response_status: u16,
    pub response_headers: HashMap<String, String>,
    pub response_body: String,
}

impl Default for RequestRecord {
    fn default() -> Self {
        Self {
            id: 0,
            url: String::new(),
            version: String::new(),
            request_method: String::new(),
            method: HttpMethod::default(),
            query_arguments: HashMap::new(),
            headers: HashMap::new(),
            form_fields: HashMap::new(),
            multipart_field: MultipartField::default(),
            body: Vec::new(),
            response_status: 200,
            response_headers: HashMap::new(),
            response_body: String::new(),
        }
    }
}

impl RequestRecord {
    /// Looks a request header up ignoring letter case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("version", &self.version)
            .field("request_method", &self.request_method)
            .field("method", &self.method)
            .field("query_arguments", &self.query_arguments)
            .field("headers", &self.headers)
            .field("form_fields", &self.form_fields)
            .field("multipart_field", &self.multipart_field)
            .field("body_len", &self.body.len())
            .field("response_status", &self.response_status)
            .field("response_headers", &self.response_headers)
            .field("response_body_len", &self.response_body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_empty_ok_response() {
        let record = RequestRecord::default();
        assert_eq!(record.method, HttpMethod::Get);
        assert_eq!(record.response_status, 200);
        assert!(record.response_body.is_empty());
        assert!(record.body.is_empty());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut record = RequestRecord::default();
        record.headers.insert("Content-Description".to_string(), "Message-ID: 152019".to_string());

        assert_eq!(record.header("content-description"), Some("Message-ID: 152019"));
        assert_eq!(record.header("CONTENT-DESCRIPTION"), Some("Message-ID: 152019"));
        assert_eq!(record.header("Content-Type"), None);
    }

    #[test]
    fn debug_leaves_bodies_out() {
        let record = RequestRecord { body: vec![0; 4096], ..Default::default() };
        let debug = format!("{record:?}");
        assert!(debug.contains("body_len: 4096"));
        assert!(!debug.contains("0, 0"));
    }
}
