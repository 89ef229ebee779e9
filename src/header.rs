//! Header record implementation.
//!
//! The header is a text region at file offset 0 made of `label: value` lines
//! and terminated by a `Data:` sentinel line. Blocks start immediately after
//! the sentinel:
//!
//! ```text
//! blocked sequence set header
//! file structure type: blocked sequence set
//! ...
//! block size (bytes): 512
//! ...
//! field: ZIP Code, integer
//! ...
//! Data:
//! [Block 0][Block 1]...[Block N-1]
//! ```
//!
//! `header size (bytes)` stores the length of the whole region, sentinel
//! included, so `header_size + rbn * block_size` addresses any block.

use crate::block::{BlockLayout, DEFAULT_BLOCK_SIZE};
use crate::error::{Error, ParseError, Result};
use crate::record::{decimal_width, RecordCodec};
use crate::Rbn;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Line marking the end of the header region.
pub const DATA_SENTINEL: &str = "Data:";

/// First line of every header.
pub const TITLE: &str = "blocked sequence set header";

const LABEL_STRUCTURE_TYPE: &str = "file structure type";
const LABEL_VERSION: &str = "file structure version";
const LABEL_HEADER_SIZE: &str = "header size (bytes)";
const LABEL_RECORD_SIZE_WIDTH: &str = "record size field width (bytes)";
const LABEL_SIZE_FORMAT: &str = "size format type";
const LABEL_BLOCK_SIZE: &str = "block size (bytes)";
const LABEL_MIN_FILL: &str = "minimum block capacity";
const LABEL_INDEX_FILE: &str = "primary key index file name";
const LABEL_INDEX_SCHEMA: &str = "primary key index schema";
const LABEL_RECORD_COUNT: &str = "record count";
const LABEL_BLOCK_COUNT: &str = "block count";
const LABEL_FIELD_COUNT: &str = "field count";
const LABEL_PRIMARY_KEY: &str = "primary key field";
const LABEL_AVAIL_HEAD: &str = "avail head RBN";
const LABEL_SEQUENCE_HEAD: &str = "sequence head RBN";
const LABEL_STALE: &str = "stale";
const LABEL_FIELD: &str = "field";

/// How record length prefixes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeFormat {
    /// Decimal digits.
    Ascii,
    /// Fixed-width binary integers.
    Binary,
}

impl SizeFormat {
    fn as_str(&self) -> &'static str {
        match self {
            SizeFormat::Ascii => "ASCII",
            SizeFormat::Binary => "binary",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ascii" => Some(SizeFormat::Ascii),
            "binary" => Some(SizeFormat::Binary),
            _ => None,
        }
    }
}

/// Value type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Free text.
    String,
    /// Whole number.
    Integer,
    /// Floating point number.
    Double,
}

impl FieldType {
    fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(FieldType::String),
            "integer" | "int" => Some(FieldType::Integer),
            "double" => Some(FieldType::Double),
            _ => None,
        }
    }
}

/// One entry of the record schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Display name.
    pub name: String,
    /// Value type.
    pub field_type: FieldType,
}

impl FieldDef {
    /// Create a new field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type }
    }
}

/// Schema of a ZIP code record.
pub fn zip_code_schema() -> Vec<FieldDef> {
    vec![
        FieldDef::new("ZIP Code", FieldType::Integer),
        FieldDef::new("Place Name", FieldType::String),
        FieldDef::new("State", FieldType::String),
        FieldDef::new("County", FieldType::String),
        FieldDef::new("Latitude", FieldType::Double),
        FieldDef::new("Longitude", FieldType::Double),
    ]
}

/// File-wide descriptor stored in the header region.
///
/// Values are immutable once read; updates produce a new descriptor that
/// must be written back explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    /// File structure type tag.
    pub structure_type: String,
    /// File structure version.
    pub version: String,
    /// Bytes occupied by the header region, sentinel included.
    pub header_size: u64,
    /// Widest record length prefix, in digits.
    pub record_size_width: u32,
    /// Encoding of record length prefixes.
    pub size_format: SizeFormat,
    /// Bytes per block.
    pub block_size: u32,
    /// Minimum fill ratio of a non-final block.
    pub min_fill_ratio: f64,
    /// File name of the block index.
    pub index_file_name: String,
    /// Description of the block index lines.
    pub index_schema: String,
    /// Total records in all blocks.
    pub record_count: u64,
    /// Total blocks after the header.
    pub block_count: u32,
    /// Record schema, in field order.
    pub fields: Vec<FieldDef>,
    /// Index into `fields` of the primary key.
    pub primary_key_index: usize,
    /// Head of the free block chain.
    pub avail_head: Option<Rbn>,
    /// First block in logical order.
    pub sequence_head: Option<Rbn>,
    /// Set when the block index no longer matches the blocks.
    pub stale: bool,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            structure_type: "blocked sequence set".to_string(),
            version: "1.0".to_string(),
            header_size: 0,
            record_size_width: 2,
            size_format: SizeFormat::Ascii,
            block_size: DEFAULT_BLOCK_SIZE,
            min_fill_ratio: 0.5,
            index_file_name: "block_index.txt".to_string(),
            index_schema: "RBN,greatest key".to_string(),
            record_count: 0,
            block_count: 0,
            fields: zip_code_schema(),
            primary_key_index: 0,
            avail_head: None,
            sequence_head: None,
            stale: false,
        }
    }
}

impl Descriptor {
    /// Block addressing constants.
    pub fn layout(&self) -> BlockLayout {
        BlockLayout::new(self.header_size, self.block_size)
    }

    /// Record codec matching the schema.
    pub fn record_codec(&self) -> RecordCodec {
        RecordCodec::new(self.fields.len(), self.primary_key_index)
    }

    /// Copy of this descriptor with the stale flag set.
    pub fn mark_stale(&self) -> Self {
        Self { stale: true, ..self.clone() }
    }

    /// Copy of this descriptor with the stale flag cleared.
    pub fn mark_fresh(&self) -> Self {
        Self { stale: false, ..self.clone() }
    }

    /// Copy of this descriptor with new record and block totals.
    pub fn with_counts(&self, record_count: u64, block_count: u32) -> Self {
        Self { record_count, block_count, ..self.clone() }
    }
}

fn format_link(link: Option<Rbn>) -> String {
    match link {
        Some(rbn) => rbn.to_string(),
        None => "-1".to_string(),
    }
}

fn parse_link(label: &str, value: &str) -> std::result::Result<Option<Rbn>, ParseError> {
    match value.parse::<i64>() {
        Ok(-1) => Ok(None),
        Ok(n) if n >= 0 && n <= Rbn::MAX as i64 => Ok(Some(n as Rbn)),
        _ => Err(ParseError::MissingField(label.to_string())),
    }
}

fn parse_num<T: std::str::FromStr>(label: &str, value: &str) -> std::result::Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::MissingField(label.to_string()))
}

/// Reads and writes the header region.
pub struct HeaderCodec;

impl HeaderCodec {
    /// Encode a descriptor.
    ///
    /// Returns the header bytes and the descriptor with `header_size` set to
    /// their length.
    pub fn encode(descriptor: &Descriptor) -> (Vec<u8>, Descriptor) {
        let mut finalized = descriptor.clone();
        // The size line contains its own value; settle on a width that agrees.
        let mut size = Self::render(&finalized).len();
        loop {
            finalized.header_size = size as u64;
            let text = Self::render(&finalized);
            if text.len() == size {
                return (text.into_bytes(), finalized);
            }
            size = text.len();
        }
    }

    fn render(d: &Descriptor) -> String {
        let mut out = String::new();
        let mut line = |label: &str, value: &dyn std::fmt::Display| {
            out.push_str(label);
            out.push_str(": ");
            out.push_str(&value.to_string());
            out.push('\n');
        };
        line(LABEL_STRUCTURE_TYPE, &d.structure_type);
        line(LABEL_VERSION, &d.version);
        line(LABEL_HEADER_SIZE, &d.header_size);
        line(LABEL_RECORD_SIZE_WIDTH, &d.record_size_width);
        line(LABEL_SIZE_FORMAT, &d.size_format.as_str());
        line(LABEL_BLOCK_SIZE, &d.block_size);
        line(LABEL_MIN_FILL, &d.min_fill_ratio);
        line(LABEL_INDEX_FILE, &d.index_file_name);
        line(LABEL_INDEX_SCHEMA, &d.index_schema);
        line(LABEL_RECORD_COUNT, &d.record_count);
        line(LABEL_BLOCK_COUNT, &d.block_count);
        line(LABEL_FIELD_COUNT, &d.fields.len());
        line(LABEL_PRIMARY_KEY, &d.primary_key_index);
        line(LABEL_AVAIL_HEAD, &format_link(d.avail_head));
        line(LABEL_SEQUENCE_HEAD, &format_link(d.sequence_head));
        line(LABEL_STALE, &d.stale);
        for field in &d.fields {
            line(LABEL_FIELD, &format!("{}, {}", field.name, field.field_type.as_str()));
        }
        format!("{}\n{}{}\n", TITLE, out, DATA_SENTINEL)
    }

    /// Decode a header region from the start of `reader`.
    ///
    /// Scanning stops at the `Data:` line. Unknown lines are ignored. When
    /// the stored header size is missing or disagrees with the sentinel
    /// position, the sentinel position is used.
    pub fn decode<R: BufRead>(mut reader: R) -> Result<Descriptor> {
        let mut d = Descriptor::default();
        let mut offset: u64 = 0;
        let mut stored_size: Option<u64> = None;
        let mut block_size: Option<u32> = None;
        let mut declared_fields: Option<usize> = None;
        let mut fields = Vec::new();
        let mut sentinel_end = None;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            offset += n as u64;

            let line = std::str::from_utf8(&buf).map_err(|e| ParseError::InvalidEncoding {
                what: format!("header at byte {}", offset - n as u64),
                valid_up_to: e.valid_up_to(),
            })?;
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim() == DATA_SENTINEL {
                sentinel_end = Some(offset);
                break;
            }

            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let label = label.trim();
            let value = value.trim();
            match label {
                LABEL_STRUCTURE_TYPE => d.structure_type = value.to_string(),
                LABEL_VERSION => d.version = value.to_string(),
                LABEL_HEADER_SIZE => stored_size = Some(parse_num(label, value)?),
                LABEL_RECORD_SIZE_WIDTH => d.record_size_width = parse_num(label, value)?,
                LABEL_SIZE_FORMAT => {
                    d.size_format = SizeFormat::parse(value)
                        .ok_or_else(|| ParseError::MissingField(label.to_string()))?
                }
                LABEL_BLOCK_SIZE => block_size = Some(parse_num(label, value)?),
                LABEL_MIN_FILL => d.min_fill_ratio = parse_num(label, value)?,
                LABEL_INDEX_FILE => d.index_file_name = value.to_string(),
                LABEL_INDEX_SCHEMA => d.index_schema = value.to_string(),
                LABEL_RECORD_COUNT => d.record_count = parse_num(label, value)?,
                LABEL_BLOCK_COUNT => d.block_count = parse_num(label, value)?,
                LABEL_FIELD_COUNT => declared_fields = Some(parse_num(label, value)?),
                LABEL_PRIMARY_KEY => d.primary_key_index = parse_num(label, value)?,
                LABEL_AVAIL_HEAD => d.avail_head = parse_link(label, value)?,
                LABEL_SEQUENCE_HEAD => d.sequence_head = parse_link(label, value)?,
                LABEL_STALE => d.stale = parse_num(label, value)?,
                LABEL_FIELD => {
                    let (name, ty) = value
                        .rsplit_once(',')
                        .ok_or_else(|| ParseError::MissingField(label.to_string()))?;
                    let field_type = FieldType::parse(ty.trim())
                        .ok_or_else(|| ParseError::MissingField(label.to_string()))?;
                    fields.push(FieldDef::new(name.trim(), field_type));
                }
                _ => {}
            }
        }

        let sentinel_end = sentinel_end.ok_or(ParseError::MissingSentinel)?;
        d.block_size = block_size.ok_or_else(|| ParseError::MissingField(LABEL_BLOCK_SIZE.into()))?;
        if d.block_size == 0 {
            return Err(Error::corruption("header declares a block size of 0"));
        }

        if !fields.is_empty() {
            d.fields = fields;
        }
        if let Some(expected) = declared_fields {
            if expected != d.fields.len() {
                return Err(ParseError::FieldCountMismatch { expected, actual: d.fields.len() }.into());
            }
        }
        if d.primary_key_index >= d.fields.len() {
            return Err(Error::corruption(format!(
                "primary key field {} out of range for {} fields",
                d.primary_key_index,
                d.fields.len()
            )));
        }

        d.header_size = match stored_size {
            Some(size) if size == sentinel_end => size,
            Some(size) => {
                log::warn!(
                    "Header declares {} bytes but 'Data:' ends at offset {}; using {}",
                    size,
                    sentinel_end,
                    sentinel_end
                );
                sentinel_end
            }
            None => sentinel_end,
        };

        Ok(d)
    }

    /// Read the descriptor from the file at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Descriptor> {
        let file = File::open(path)?;
        Self::decode(BufReader::new(file))
    }

    /// Write a descriptor to the header region of `path`.
    ///
    /// Blocks already following an existing header are preserved and shifted
    /// as needed. The file is rebuilt in a sibling temporary file and renamed
    /// over the existing file, so it is never truncated in place.
    pub fn write<P: AsRef<Path>>(path: P, descriptor: &Descriptor) -> Result<Descriptor> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::install(path, descriptor, io::empty());
        }

        let old = Self::read(path)?;
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(old.header_size))?;
        Self::install(path, descriptor, file)
    }

    /// Write a header followed by `payload` to `path`, atomically.
    pub fn install<P: AsRef<Path>, R: Read>(
        path: P,
        descriptor: &Descriptor,
        mut payload: R,
    ) -> Result<Descriptor> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let (header, finalized) = Self::encode(descriptor);
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = io::BufWriter::new(temp.as_file_mut());
            writer.write_all(&header)?;
            io::copy(&mut payload, &mut writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        log::debug!(
            "Installed header ({} bytes, {} blocks) at {:?}",
            finalized.header_size,
            finalized.block_count,
            path
        );
        Ok(finalized)
    }
}

/// Digits needed for the widest length prefix of payloads up to `max_len`.
pub fn record_size_width(max_len: usize) -> u32 {
    decimal_width(max_len) as u32
}
