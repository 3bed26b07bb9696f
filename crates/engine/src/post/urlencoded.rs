use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::ensure;
use crate::post::PostField;
use crate::protocol::ParseError;

/// Longest single `key=value` pair kept while waiting for its terminating `&`.
const MAX_PAIR_BYTES: usize = 1024 * 1024;

/// Splits `application/x-www-form-urlencoded` bodies into pairs.
///
/// After the first error the parser drops its buffer and ignores the rest of the body.
#[derive(Debug, Default)]
pub struct UrlEncodedParser {
    pending: BytesMut,
    failed: bool,
}

impl UrlEncodedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process<F>(&mut self, data: &[u8], mut on_field: F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        if self.failed {
            return Ok(());
        }

        self.pending.extend_from_slice(data);
        let result = self.split_pairs(&mut on_field);
        if result.is_err() {
            self.failed = true;
            self.pending = BytesMut::new();
        }
        result
    }

    pub fn finish<F>(&mut self, mut on_field: F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        if self.failed {
            return Ok(());
        }
        let pair = self.pending.split();
        emit_pair(&pair, &mut on_field)
    }

    /// Bytes held back while waiting for the end of the current pair.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn split_pairs<F>(&mut self, on_field: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&PostField<'_>),
    {
        while let Some(end) = self.pending.iter().position(|b| *b == b'&') {
            let pair = self.pending.split_to(end);
            self.pending.advance(1);
            emit_pair(&pair, on_field)?;
        }

        ensure!(self.pending.len() <= MAX_PAIR_BYTES, ParseError::invalid_body("url-encoded pair too long"));
        Ok(())
    }
}

fn emit_pair<F>(pair: &[u8], on_field: &mut F) -> Result<(), ParseError>
where
    F: FnMut(&PostField<'_>),
{
    if pair.is_empty() {
        return Ok(());
    }

    let decoded = serde_urlencoded::from_bytes::<Vec<(String, String)>>(pair).map_err(|e| {
        warn!(cause = %e, "can't decode url-encoded pair");
        ParseError::invalid_body(e)
    })?;

    for (key, value) in &decoded {
        trace!(key, "url-encoded field");
        on_field(&PostField {
            key,
            filename: None,
            content_type: None,
            transfer_encoding: None,
            data: value.as_bytes(),
            offset: 0,
        });
    }
    Ok(())
}
