//! Decides how a request body is encoded and merges parsed form fields into the record.

use httpmock_engine::post::PostField;
use tracing::trace;

use crate::record::{HttpMethod, MultipartField, RequestRecord};

/// First guess at the body encoding, made before any body byte was seen.
///
/// `has_post_processor` tells whether the engine could provide a form parser for the request.
pub fn classify(request_method: &str, has_post_processor: bool) -> HttpMethod {
    match request_method {
        "POST" if has_post_processor => HttpMethod::PostFormUrlEncoded,
        "POST" => HttpMethod::PostRawData,
        _ => HttpMethod::Get,
    }
}

/// Merges one parsed piece of a form field into `record`.
///
/// Fields without filename and content type are plain form fields. Any other field is a
/// multipart upload; only the most recently started one is kept, starting a new one resets
/// `multipart_field` and `body`.
pub fn merge_field(record: &mut RequestRecord, field: &PostField<'_>) {
    if field.filename.is_none() && field.content_type.is_none() {
        record.method = HttpMethod::PostFormUrlEncoded;
        let value = String::from_utf8_lossy(field.data);
        if field.offset == 0 {
            record.form_fields.insert(field.key.to_string(), value.into_owned());
        } else {
            record.form_fields.entry(field.key.to_string()).or_default().push_str(&value);
        }
        return;
    }

    record.method = HttpMethod::PostMultipart;
    if field.offset == 0 {
        trace!(name = field.key, filename = ?field.filename, "new multipart field replaces the previous one");
        record.multipart_field = MultipartField {
            name: field.key.to_string(),
            filename: field.filename.unwrap_or_default().to_string(),
            content_type: field.content_type.unwrap_or_default().to_string(),
            transfer_encoding: field.transfer_encoding.unwrap_or_default().to_string(),
        };
        record.body.clear();
    }
    record.body.extend_from_slice(field.data);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(
        key: &'a str,
        filename: Option<&'a str>,
        content_type: Option<&'a str>,
        data: &'a [u8],
        offset: u64,
    ) -> PostField<'a> {
        PostField { key, filename, content_type, transfer_encoding: None, data, offset }
    }

    #[test]
    fn provisional_classification() {
        assert_eq!(classify("GET", false), HttpMethod::Get);
        assert_eq!(classify("POST", true), HttpMethod::PostFormUrlEncoded);
        assert_eq!(classify("POST", false), HttpMethod::PostRawData);
        assert_eq!(classify("PUT", true), HttpMethod::Get);
        assert_eq!(classify("DELETE", false), HttpMethod::Get);
    }

    #[test]
    fn form_fields_last_write_wins() {
        let mut record = RequestRecord::default();
        merge_field(&mut record, &field("name", None, None, b"daniel", 0));
        merge_field(&mut record, &field("project", None, None, b"curl", 0));
        merge_field(&mut record, &field("name", None, None, b"stenberg", 0));

        assert_eq!(record.method, HttpMethod::PostFormUrlEncoded);
        assert_eq!(record.form_fields.len(), 2);
        assert_eq!(record.form_fields["name"], "stenberg");
        assert_eq!(record.form_fields["project"], "curl");
    }

    #[test]
    fn form_field_continuation_appends() {
        let mut record = RequestRecord::default();
        merge_field(&mut record, &field("note", None, None, b"hello ", 0));
        merge_field(&mut record, &field("note", None, None, b"world", 6));
        assert_eq!(record.form_fields["note"], "hello world");
    }

    #[test]
    fn file_field_switches_to_multipart() {
        let mut record = RequestRecord { method: HttpMethod::PostFormUrlEncoded, ..Default::default() };
        merge_field(&mut record, &field("data", Some("omCloudService-0.xml"), Some("image/xml"), b"<a>", 0));
        merge_field(&mut record, &field("data", Some("omCloudService-0.xml"), Some("image/xml"), b"</a>", 3));

        assert_eq!(record.method, HttpMethod::PostMultipart);
        assert_eq!(record.multipart_field.name, "data");
        assert_eq!(record.multipart_field.filename, "omCloudService-0.xml");
        assert_eq!(record.multipart_field.content_type, "image/xml");
        assert_eq!(record.multipart_field.transfer_encoding, "");
        assert_eq!(record.body, b"<a></a>");
    }

    #[test]
    fn content_type_alone_is_multipart() {
        let mut record = RequestRecord::default();
        merge_field(&mut record, &field("blob", None, Some("application/octet-stream"), b"\x00\x01", 0));
        assert_eq!(record.method, HttpMethod::PostMultipart);
        assert_eq!(record.multipart_field.filename, "");
        assert_eq!(record.body, b"\x00\x01");
    }

    #[test]
    fn only_last_multipart_field_is_kept() {
        let mut record = RequestRecord::default();
        merge_field(&mut record, &field("first", Some("a.txt"), None, b"first data", 0));
        merge_field(&mut record, &field("second", Some("b.txt"), None, b"second", 0));

        assert_eq!(record.multipart_field.name, "second");
        assert_eq!(record.multipart_field.filename, "b.txt");
        assert_eq!(record.body, b"second");
    }

    #[test]
    fn empty_multipart_chunk_still_resets() {
        let mut record = RequestRecord { body: b"stale".to_vec(), ..Default::default() };
        merge_field(&mut record, &field("empty", Some("e.bin"), None, b"", 0));
        assert_eq!(record.multipart_field.name, "empty");
        assert!(record.body.is_empty());
    }
}
