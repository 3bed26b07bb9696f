//! Decoder for `Transfer-Encoding: chunked` bodies, see
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding).
//!
//! The decoder works line by line: a size line (hex size, optional extensions), the chunk
//! data followed by CRLF, and after the zero sized chunk any trailer lines up to an empty line.
//! Extensions and trailer fields are read and dropped.

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

/// Longest size line (size plus extensions) accepted before giving up.
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Waiting for a complete size line
    Size,
    /// Inside chunk data, with this many bytes left
    Data(u64),
    /// Expecting the CRLF that closes chunk data
    DataEnd,
    /// After the last chunk, reading trailer lines
    Trailer,
    /// Everything read
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }

                ChunkedState::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { ChunkedState::Trailer } else { ChunkedState::Data(size) };
                }

                ChunkedState::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = usize::try_from(remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
                    let bytes = src.split_to(len).freeze();
                    let left = remaining - bytes.len() as u64;
                    self.state = if left == 0 { ChunkedState::DataEnd } else { ChunkedState::Data(left) };
                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_body("missing CRLF after chunk data"));
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = ChunkedState::End;
                    }
                }
            }
        }
    }
}

/// Removes one CRLF terminated line from `src`, without the CRLF.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.windows(2).position(|window| window == b"\r\n") {
        Some(end) => {
            let line = src.split_to(end);
            src.advance(2);
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk size line too long"));
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    // extensions start at ';' and are ignored
    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();

    ensure!(!size.is_empty(), ParseError::invalid_body("empty chunk size"));
    ensure!(!line.contains(&b'\n'), ParseError::invalid_body("chunk size line contains newline"));

    size.iter().try_fold(0u64, |acc, b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(ParseError::invalid_body("invalid chunk size")),
        };
        acc.checked_mul(16)
            .and_then(|acc| acc.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("invalid overflow chunked length"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        loop {
            match decoder.decode(buffer).unwrap() {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return (body, true),
                None => return (body, false),
            }
        }
    }

    #[test]
    fn decodes_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7;ext=1\r\n, world\r\n0\r\n\r\nGET"[..]);
        let (body, eof) = decode_all(&mut ChunkedDecoder::new(), &mut buffer);
        assert!(eof);
        assert_eq!(body, b"hello, world");
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn decodes_with_trailers() {
        let mut buffer = BytesMut::from(&b"A\r\n0123456789\r\n0\r\nExpires: never\r\n\r\n"[..]);
        let (body, eof) = decode_all(&mut ChunkedDecoder::new(), &mut buffer);
        assert!(eof);
        assert_eq!(body, b"0123456789");
        assert!(buffer.is_empty());
    }

    #[test]
    fn resumes_across_reads() {
        let mut decoder = ChunkedDecoder::new();

        let mut buffer = BytesMut::from(&b"6\r\nabc"[..]);
        let (body, eof) = decode_all(&mut decoder, &mut buffer);
        assert!(!eof);
        assert_eq!(body, b"abc");

        let mut buffer = BytesMut::from(&b"def\r"[..]);
        let (body, eof) = decode_all(&mut decoder, &mut buffer);
        assert!(!eof);
        assert_eq!(body, b"def");

        buffer.extend_from_slice(b"\n0\r\n\r\n");
        let (body, eof) = decode_all(&mut decoder, &mut buffer);
        assert!(eof);
        assert!(body.is_empty());
    }

    #[test]
    fn rejects_invalid_size() {
        let mut buffer = BytesMut::from(&b"zz\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn rejects_overflow() {
        let mut buffer = BytesMut::from(&b"f0000000000000003\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn rejects_missing_data_crlf() {
        let mut buffer = BytesMut::from(&b"3\r\nabcXY"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(decoder.decode(&mut buffer).is_err());
    }
}
