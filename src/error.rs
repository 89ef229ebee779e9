//! Error types for the BlockSeq storage engine.

use crate::Rbn;
use std::io;
use thiserror::Error;

/// The result type used throughout BlockSeq.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for BlockSeq operations.
///
/// A key that is simply absent is never an error: lookups return `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred (open, seek, read or write).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A record, line or header field could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A block's bytes could not be decoded.
    #[error("Malformed block {rbn}: {source}")]
    Block {
        /// RBN of the offending block.
        rbn: Rbn,
        /// What was wrong with it.
        #[source]
        source: ParseError,
    },

    /// The serialized metadata and records do not fit in one block.
    #[error("Block {rbn} overflow: {required} bytes exceed block size {block_size}")]
    BlockOverflow {
        /// RBN of the block being written.
        rbn: Rbn,
        /// Bytes needed for metadata plus records.
        required: usize,
        /// Configured block size.
        block_size: usize,
    },

    /// Data corruption was detected in the header, a block or the index.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Attaches a block number to a parse error.
    pub fn block(rbn: Rbn, source: ParseError) -> Self {
        Error::Block { rbn, source }
    }
}

/// Low-level decoding failures.
///
/// Codecs never recover from these; the caller decides whether to skip the
/// offending line or abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A required field is absent or its numeric value could not be parsed.
    #[error("missing or unparsable field '{0}'")]
    MissingField(String),

    /// A record did not split into the expected number of fields.
    #[error("expected {expected} fields, found {actual}")]
    FieldCountMismatch {
        /// Fields declared by the schema.
        expected: usize,
        /// Fields actually present.
        actual: usize,
    },

    /// A numeric field held a non-numeric value.
    #[error("invalid number in field '{field}': '{value}'")]
    InvalidNumber {
        /// Field name.
        field: String,
        /// Offending text.
        value: String,
    },

    /// A length prefix was not a decimal number followed by its separator.
    #[error("invalid length prefix '{0}'")]
    InvalidLength(String),

    /// A length prefix disagreed with the payload that follows it.
    #[error("length prefix declares {declared} bytes but payload has {actual}")]
    LengthMismatch {
        /// Declared payload length.
        declared: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// A declared length runs past the end of the available bytes.
    #[error("need {needed} bytes but only {available} remain")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// The header region has no `Data:` sentinel line.
    #[error("header has no 'Data:' sentinel")]
    MissingSentinel,

    /// Text that must be UTF-8 is not.
    #[error("invalid UTF-8 in {what} after {valid_up_to} bytes")]
    InvalidEncoding {
        /// What was being decoded
        what: String,
        /// Length of the valid prefix
        valid_up_to: usize,
    },
}
