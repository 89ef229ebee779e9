//! # blockseq - A Blocked Sequence Set Storage Engine
//!
//! blockseq packs variable-length, length-indicated records into fixed-size
//! blocks inside a single file, links the blocks into a sequence, and finds
//! records by key through a small block index kept next to the file.
//!
//! ## Architecture
//!
//! - **Header**: text region at the start of the file describing its layout
//! - **Blocks**: fixed-size units of metadata, packed records, and filler
//! - **Builder**: packs a sorted record stream into blocks in one pass
//! - **Block Index**: greatest key per block, for coarse key-to-block lookup
//! - **Locator**: index lookup, then one block read and scan
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use blockseq::{Locator, Options, SequenceBuilder};
//!
//! # fn main() -> Result<(), blockseq::Error> {
//! // Build a file from sorted records
//! let mut builder = SequenceBuilder::new("zips.seq", Options::default())?;
//! builder.add(b"501,Holtsville,NY,Suffolk,40.8154,-73.0451")?;
//! builder.add(b"544,Holtsville,NY,Suffolk,40.8154,-73.0451")?;
//! builder.finish()?;
//!
//! // Look a key up
//! let locator = Locator::open("zips.seq")?;
//! if let Some(record) = locator.find(501)? {
//!     println!("{}", record);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
pub mod builder;
pub mod config;
pub mod dump;
pub mod error;
pub mod header;
pub mod index;
pub mod locator;
pub mod record;

// Re-exports
pub use block::{Block, BlockMeta, BlockStore};
pub use builder::{BuildReport, SequenceBuilder};
pub use config::Options;
pub use error::{Error, ParseError, Result};
pub use header::{Descriptor, HeaderCodec};
pub use index::{BlockIndex, IndexEntry};
pub use locator::Locator;
pub use record::{Key, RecordCodec, ZipCodeRecord};

/// Relative block number: zero-based position of a block after the header.
///
/// "No block" is expressed as `Option::<Rbn>::None`, never as a reserved value.
pub type Rbn = u32;
