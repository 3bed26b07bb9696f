//! Streaming `multipart/form-data` parser, see
//! [RFC 7578](https://www.rfc-editor.org/rfc/rfc7578.html).
//!
//! Every delimiter is `CRLF--boundary`. The buffer starts out holding a CRLF so a body that
//! opens directly with `--boundary` matches the same pattern. Part data is handed out as soon
//! as it can no longer be the beginning of a delimiter, so only `delimiter.len() - 1` bytes are
//! ever held back.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::ensure;
use crate::post::PostField;
use crate::protocol::ParseError;
use crate::utils::find_subsequence;

/// Upper bound for the header block of a single part.
const MAX_PART_HEADER_BYTES: usize = 8 * 1024;

#[derive(Debug)]
pub struct MultipartParser {
    delimiter: Vec<u8>,
    buffer: BytesMut,
    state: State,
    part: Option<Part>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Anything before the first delimiter
    Preamble,
    /// Right after a delimiter: `--` closes the body, otherwise the line ends and headers follow
    AfterDelimiter,
    /// Reading a part's header block
    Headers,
    /// Reading part data
    Body,
    /// Anything after the closing delimiter, ignored
    Epilogue,
    /// The body was malformed, everything else is dropped
    Failed,
}

/// Metadata of the part currently being read.
#[derive(Debug, Default)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    transfer_encoding: Option<String>,
    offset: u64,
    reported: bool,
}

impl Part {
    fn report<F>(&mut self, data: &[u8], on_field: &mut F)
    where
        F: FnMut(&PostField<'_>),
    {
        on_field(&PostField {
            key: &self.name,
            filename: self.filename.as_deref(),
            content_type: self.content_type.as_deref(),
            transfer_encoding: self.transfer_encoding.as_deref(),
            data,
            offset: self.offset,
        });
        self.offset += data.len() as u64;
        self.reported = true;
    }
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        Self { delimiter, buffer: BytesMut::from(&b"\r\n"[..]), state: State::Preamble, part: None }
    }

    pub fn process<F>(&mut self, data: &[u8], mut on_field: F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        if self.state == State::Failed {
            return Ok(());
        }
        self.buffer.extend_from_slice(data);
        self.advance_or_fail(&mut on_field)
    }

    /// Fails when the body ended before the closing delimiter.
    pub fn finish<F>(&mut self, mut on_field: F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        if self.state == State::Failed {
            return Ok(());
        }
        self.advance_or_fail(&mut on_field)?;
        ensure!(
            self.state == State::Epilogue,
            ParseError::invalid_body("multipart body ended before closing boundary")
        );
        Ok(())
    }

    /// Bytes held back, waiting for a delimiter or the end of a header block.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn advance_or_fail<F>(&mut self, on_field: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        let result = self.advance(on_field);
        if result.is_err() {
            self.state = State::Failed;
            self.buffer = BytesMut::new();
            self.part = None;
        }
        result
    }

    fn advance<F>(&mut self, on_field: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        loop {
            match self.state {
                State::Preamble => match find_subsequence(&self.buffer, &self.delimiter) {
                    Some(start) => {
                        self.buffer.advance(start + self.delimiter.len());
                        self.state = State::AfterDelimiter;
                    }
                    None => {
                        let discard = self.buffer.len().saturating_sub(self.delimiter.len() - 1);
                        self.buffer.advance(discard);
                        return Ok(());
                    }
                },

                State::AfterDelimiter => {
                    if self.buffer.len() < 2 {
                        return Ok(());
                    }
                    if self.buffer.starts_with(b"--") {
                        trace!("reached closing boundary");
                        self.buffer.clear();
                        self.state = State::Epilogue;
                        continue;
                    }
                    match find_subsequence(&self.buffer, b"\r\n") {
                        Some(end) => {
                            // transport padding after the boundary is ignored
                            self.buffer.advance(end + 2);
                            self.state = State::Headers;
                        }
                        None => {
                            ensure!(
                                self.buffer.len() <= MAX_PART_HEADER_BYTES,
                                ParseError::invalid_body("multipart boundary line too long")
                            );
                            return Ok(());
                        }
                    }
                }

                State::Headers => {
                    if self.buffer.len() < 2 {
                        return Ok(());
                    }
                    let part = if self.buffer.starts_with(b"\r\n") {
                        self.buffer.advance(2);
                        Part::default()
                    } else {
                        let Some(end) = find_subsequence(&self.buffer, b"\r\n\r\n") else {
                            ensure!(
                                self.buffer.len() <= MAX_PART_HEADER_BYTES,
                                ParseError::too_large_header(self.buffer.len(), MAX_PART_HEADER_BYTES)
                            );
                            return Ok(());
                        };
                        let block = self.buffer.split_to(end);
                        self.buffer.advance(4);
                        parse_part_headers(&block)
                    };

                    debug!(
                        name = %part.name,
                        filename = ?part.filename,
                        content_type = ?part.content_type,
                        "multipart part started"
                    );
                    self.part = Some(part);
                    self.state = State::Body;
                }

                State::Body => {
                    let part = self.part.get_or_insert_with(Part::default);
                    match find_subsequence(&self.buffer, &self.delimiter) {
                        Some(end) => {
                            let data = self.buffer.split_to(end);
                            if !data.is_empty() || !part.reported {
                                part.report(&data, on_field);
                            }
                            self.buffer.advance(self.delimiter.len());
                            self.part = None;
                            self.state = State::AfterDelimiter;
                        }
                        None => {
                            let keep = self.delimiter.len() - 1;
                            if self.buffer.len() > keep {
                                let data = self.buffer.split_to(self.buffer.len() - keep);
                                part.report(&data, on_field);
                            }
                            return Ok(());
                        }
                    }
                }

                State::Epilogue | State::Failed => {
                    self.buffer.clear();
                    return Ok(());
                }
            }
        }
    }
}

fn parse_part_headers(block: &[u8]) -> Part {
    let mut part = Part::default();
    let block = String::from_utf8_lossy(block);

    for line in block.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for param in split_params(value).into_iter().skip(1) {
                    let Some((key, raw)) = param.split_once('=') else {
                        continue;
                    };
                    match key.trim().to_ascii_lowercase().as_str() {
                        "name" => part.name = unquote(raw),
                        "filename" => part.filename = Some(unquote(raw)),
                        _ => {}
                    }
                }
            }
            "content-type" => part.content_type = Some(value.to_string()),
            "content-transfer-encoding" => part.transfer_encoding = Some(value.to_string()),
            _ => {}
        }
    }

    part
}

/// Splits header parameters on `;`, leaving quoted semicolons alone.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value).to_string()
}
