//! Block metadata sub-record.
//!
//! Every block starts with a length-indicated metadata record:
//!
//! ```text
//! <mlen>,<rbn>,<record count>,<prev rbn>,<next rbn>,
//! ```
//!
//! `mlen` is the byte length of the whole sub-record, itself and the trailing
//! comma included. A missing link is written as `-1`.

use crate::error::ParseError;
use crate::record::{decimal_width, LENGTH_SEPARATOR};
use crate::Rbn;
use bytes::BufMut;

/// Metadata describing one block and its place in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    /// The block's own RBN.
    pub rbn: Rbn,
    /// Number of records packed after the metadata.
    pub record_count: u32,
    /// Logical predecessor.
    pub prev: Option<Rbn>,
    /// Logical successor.
    pub next: Option<Rbn>,
}

impl BlockMeta {
    /// Create new block metadata.
    pub fn new(rbn: Rbn, record_count: u32, prev: Option<Rbn>, next: Option<Rbn>) -> Self {
        Self { rbn, record_count, prev, next }
    }

    fn body(&self) -> String {
        format!(
            "{},{},{},{},",
            self.rbn,
            self.record_count,
            link_str(self.prev),
            link_str(self.next)
        )
    }

    /// Length of the encoded sub-record in bytes.
    pub fn encoded_len(&self) -> usize {
        let body = self.body().len();
        // The length prefix counts its own digits.
        let mut total = body + 2;
        loop {
            let candidate = decimal_width(total) + 1 + body;
            if candidate == total {
                return total;
            }
            total = candidate;
        }
    }

    /// Append the encoded sub-record to `buf`.
    pub fn encode_to<B: BufMut>(&self, buf: &mut B) {
        let total = self.encoded_len();
        buf.put_slice(total.to_string().as_bytes());
        buf.put_u8(LENGTH_SEPARATOR);
        buf.put_slice(self.body().as_bytes());
    }

    /// Encode to a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut buf);
        buf
    }

    /// Decode a sub-record from the front of `buf`.
    ///
    /// Returns the metadata and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ParseError> {
        let sep = buf
            .iter()
            .take(11)
            .position(|&b| b == LENGTH_SEPARATOR)
            .ok_or_else(|| ParseError::InvalidLength(lossy(&buf[..buf.len().min(11)])))?;
        let total: usize = ascii_number(&buf[..sep], "metadata length")?;
        if total > buf.len() {
            return Err(ParseError::Truncated { needed: total, available: buf.len() });
        }
        if total <= sep + 1 || buf[total - 1] != LENGTH_SEPARATOR {
            return Err(ParseError::InvalidLength(lossy(&buf[..total.min(buf.len())])));
        }

        let body = &buf[sep + 1..total - 1];
        let parts: Vec<&[u8]> = body.split(|&b| b == LENGTH_SEPARATOR).collect();
        if parts.len() != 4 {
            return Err(ParseError::FieldCountMismatch { expected: 4, actual: parts.len() });
        }

        let meta = Self {
            rbn: ascii_number(parts[0], "RBN")?,
            record_count: ascii_number(parts[1], "record count")?,
            prev: parse_link(parts[2], "previous RBN")?,
            next: parse_link(parts[3], "next RBN")?,
        };
        Ok((meta, total))
    }
}

fn link_str(link: Option<Rbn>) -> String {
    match link {
        Some(rbn) => rbn.to_string(),
        None => "-1".to_string(),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn ascii_number<T: std::str::FromStr>(bytes: &[u8], field: &str) -> Result<T, ParseError> {
    let text = std::str::from_utf8(bytes).unwrap_or("");
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidNumber { field: field.to_string(), value: lossy(bytes) });
    }
    text.parse()
        .map_err(|_| ParseError::InvalidNumber { field: field.to_string(), value: lossy(bytes) })
}

fn parse_link(bytes: &[u8], field: &str) -> Result<Option<Rbn>, ParseError> {
    if bytes == b"-1" {
        return Ok(None);
    }
    ascii_number(bytes, field).map(Some)
}
