//! Record codec.
//!
//! A record is stored as an ASCII length prefix, a comma, then exactly that
//! many bytes of comma-delimited field values:
//!
//! ```text
//! 42,501,Holtsville,NY,Suffolk,40.8154,-73.0451
//! ^^ payload length in bytes
//! ```

use crate::error::ParseError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Separator between the length prefix and the payload.
pub const LENGTH_SEPARATOR: u8 = b',';

/// Separator between field values inside a payload.
pub const FIELD_SEPARATOR: u8 = b',';

/// Number of fields in a ZIP code record.
pub const ZIP_FIELD_COUNT: usize = 6;

/// Primary key type. ZIP codes compare numerically.
pub type Key = u32;

/// Frames a payload as `<len>,<payload>`.
pub fn frame(payload: &[u8]) -> Bytes {
    let prefix = payload.len().to_string();
    let mut buf = BytesMut::with_capacity(prefix.len() + 1 + payload.len());
    buf.put_slice(prefix.as_bytes());
    buf.put_u8(LENGTH_SEPARATOR);
    buf.put_slice(payload);
    buf.freeze()
}

/// Size of a payload once framed.
pub fn framed_len(payload_len: usize) -> usize {
    decimal_width(payload_len) + 1 + payload_len
}

/// Number of ASCII digits needed to print `n`.
pub fn decimal_width(n: usize) -> usize {
    let mut width = 1;
    let mut n = n / 10;
    while n > 0 {
        width += 1;
        n /= 10;
    }
    width
}

/// Parses one framed record from the front of `buf`.
///
/// Returns the payload and the number of bytes consumed.
pub fn split_framed(buf: &[u8]) -> Result<(&[u8], usize), ParseError> {
    let sep = buf
        .iter()
        .position(|&b| b == LENGTH_SEPARATOR)
        .ok_or_else(|| ParseError::InvalidLength(preview(buf)))?;
    let declared = parse_length(&buf[..sep])?;

    let start = sep + 1;
    let available = buf.len() - start;
    if declared > available {
        return Err(ParseError::Truncated { needed: declared, available });
    }
    Ok((&buf[start..start + declared], start + declared))
}

/// Validates one input line of the form `<len>,<payload>`.
///
/// The declared length must match the rest of the line exactly.
pub fn parse_line(line: &[u8]) -> Result<Bytes, ParseError> {
    let sep = line
        .iter()
        .position(|&b| b == LENGTH_SEPARATOR)
        .ok_or_else(|| ParseError::InvalidLength(preview(line)))?;
    let declared = parse_length(&line[..sep])?;
    let payload = &line[sep + 1..];
    if declared != payload.len() {
        return Err(ParseError::LengthMismatch { declared, actual: payload.len() });
    }
    Ok(Bytes::copy_from_slice(payload))
}

fn parse_length(digits: &[u8]) -> Result<usize, ParseError> {
    if digits.is_empty() || digits.len() > 10 || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidLength(preview(digits)));
    }
    digits
        .iter()
        .try_fold(0usize, |acc, d| acc.checked_mul(10)?.checked_add((d - b'0') as usize))
        .ok_or_else(|| ParseError::InvalidLength(preview(digits)))
}

fn preview(bytes: &[u8]) -> String {
    let end = bytes.len().min(16);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Splits and joins record payloads according to a fixed field count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCodec {
    field_count: usize,
    key_index: usize,
}

impl RecordCodec {
    /// Create a codec for records with `field_count` fields whose primary key
    /// is field `key_index`.
    pub fn new(field_count: usize, key_index: usize) -> Self {
        Self { field_count, key_index }
    }

    /// Codec for the six-field ZIP code schema keyed on field 0.
    pub fn zip_codes() -> Self {
        Self::new(ZIP_FIELD_COUNT, 0)
    }

    /// Number of fields per record.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Index of the primary key field.
    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Joins fields and frames the result as `<len>,<payload>`.
    ///
    /// Field values must not contain the field separator.
    pub fn encode<S: AsRef<str>>(&self, fields: &[S]) -> Bytes {
        frame(&join_fields(fields))
    }

    /// Splits a payload (without its length prefix) into fields.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<String>, ParseError> {
        let fields = payload
            .split(|&b| b == FIELD_SEPARATOR)
            .enumerate()
            .map(|(i, f)| {
                std::str::from_utf8(f).map(str::to_string).map_err(|e| {
                    ParseError::InvalidEncoding {
                        what: format!("field {}", i + 1),
                        valid_up_to: e.valid_up_to(),
                    }
                })
            })
            .collect::<Result<Vec<String>, ParseError>>()?;
        if fields.len() != self.field_count {
            return Err(ParseError::FieldCountMismatch {
                expected: self.field_count,
                actual: fields.len(),
            });
        }
        Ok(fields)
    }

    /// Extracts the primary key from a payload.
    ///
    /// `Ok(None)` marks the terminal record: its key field is empty or not a
    /// number.
    pub fn key_of(&self, payload: &[u8]) -> Result<Option<Key>, ParseError> {
        let fields = self.decode(payload)?;
        Ok(fields[self.key_index].trim().parse::<Key>().ok())
    }
}

/// Joins field values with the field separator.
pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            payload.push(FIELD_SEPARATOR);
        }
        payload.extend_from_slice(field.as_ref().as_bytes());
    }
    payload
}

/// A decoded ZIP code record.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipCodeRecord {
    /// ZIP code, the primary key.
    pub zip_code: Key,
    /// Place name.
    pub place_name: String,
    /// Two-letter state code.
    pub state: String,
    /// County name.
    pub county: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl ZipCodeRecord {
    /// Builds a typed record from decoded fields.
    pub fn from_fields(fields: &[String]) -> Result<Self, ParseError> {
        if fields.len() != ZIP_FIELD_COUNT {
            return Err(ParseError::FieldCountMismatch {
                expected: ZIP_FIELD_COUNT,
                actual: fields.len(),
            });
        }
        Ok(Self {
            zip_code: parse_number(&fields[0], "ZIP Code")?,
            place_name: fields[1].clone(),
            state: fields[2].clone(),
            county: fields[3].clone(),
            latitude: parse_number(&fields[4], "Latitude")?,
            longitude: parse_number(&fields[5], "Longitude")?,
        })
    }

    /// Decodes a payload straight into a typed record.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        let fields = RecordCodec::zip_codes().decode(payload)?;
        Self::from_fields(&fields)
    }

    /// Field values in on-disk order.
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.zip_code.to_string(),
            self.place_name.clone(),
            self.state.clone(),
            self.county.clone(),
            self.latitude.to_string(),
            self.longitude.to_string(),
        ]
    }

    /// Framed on-disk form.
    pub fn encode(&self) -> Bytes {
        RecordCodec::zip_codes().encode(&self.to_fields())
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, field: &str) -> Result<T, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    })
}

impl fmt::Display for ZipCodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ZIP Code: {}", self.zip_code)?;
        writeln!(f, "Place Name: {}", self.place_name)?;
        writeln!(f, "State: {}", self.state)?;
        writeln!(f, "County: {}", self.county)?;
        writeln!(f, "Latitude: {}", self.latitude)?;
        write!(f, "Longitude: {}", self.longitude)
    }
}
