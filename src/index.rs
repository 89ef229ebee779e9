//! Block index.
//!
//! Maps every block to the greatest key it holds, enabling a coarse
//! key-to-block lookup before the block itself is read. The side file is
//! plain text, one `rbn,max_key` line per block in RBN order.

use crate::block::BlockStore;
use crate::error::{Error, ParseError, Result};
use crate::header::Descriptor;
use crate::record::Key;
use crate::Rbn;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// IndexEntry pairs a block with the greatest key stored in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Block number.
    pub rbn: Rbn,
    /// The largest key in the block.
    pub max_key: Key,
}

impl IndexEntry {
    /// Create a new IndexEntry
    pub fn new(rbn: Rbn, max_key: Key) -> Self {
        Self { rbn, max_key }
    }
}

/// BlockIndex provides lookup of blocks by key.
///
/// Entries are ordered by RBN. Records are stored in ascending key order, so
/// the entries are ordered by key as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndex {
    entries: Vec<IndexEntry>,
}

impl BlockIndex {
    /// Create an index from entries, checking that RBNs and keys ascend.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        for pair in entries.windows(2) {
            if pair[1].rbn <= pair[0].rbn {
                return Err(Error::corruption(format!(
                    "index entries out of RBN order: {} follows {}",
                    pair[1].rbn, pair[0].rbn
                )));
            }
            if pair[1].max_key <= pair[0].max_key {
                return Err(Error::corruption(format!(
                    "index key {} of block {} does not exceed key {} of block {}",
                    pair[1].max_key, pair[1].rbn, pair[0].max_key, pair[0].rbn
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Build the index by reading every block in physical order.
    pub fn build<F: Read + Seek>(store: &mut BlockStore<F>, descriptor: &Descriptor) -> Result<Self> {
        let codec = descriptor.record_codec();
        let mut entries = Vec::with_capacity(descriptor.block_count as usize);

        for rbn in 0..descriptor.block_count {
            let block = store.read(rbn)?;
            let Some(last) = block.last_record() else {
                log::warn!("Block {} holds no records; left out of the index", rbn);
                continue;
            };
            let key = codec.key_of(last).map_err(|e| Error::block(rbn, e))?.ok_or_else(|| {
                Error::block(
                    rbn,
                    ParseError::InvalidNumber {
                        field: "primary key".to_string(),
                        value: String::from_utf8_lossy(last).into_owned(),
                    },
                )
            })?;
            entries.push(IndexEntry::new(rbn, key));
        }

        log::info!("Built block index with {} entries", entries.len());
        Self::from_entries(entries)
    }

    /// Path of the index file that belongs to the data file at `data_path`.
    pub fn path_for(data_path: &Path, descriptor: &Descriptor) -> PathBuf {
        match data_path.parent() {
            Some(dir) => dir.join(&descriptor.index_file_name),
            None => PathBuf::from(&descriptor.index_file_name),
        }
    }

    /// Write the index as text, replacing any existing file atomically.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            for entry in &self.entries {
                writeln!(writer, "{},{}", entry.rbn, entry.max_key)?;
            }
            writer.flush()?;
        }
        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Read an index file written by [`persist`](Self::persist).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry = parse_entry(line)
                .map_err(|e| Error::corruption(format!("index line {}: {}", lineno + 1, e)))?;
            entries.push(entry);
        }

        Self::from_entries(entries)
    }

    /// Find the block whose key range may contain `target`.
    ///
    /// Returns the first block whose greatest key is at least `target`, or
    /// `None` when `target` exceeds every block's greatest key.
    pub fn locate(&self, target: Key) -> Option<Rbn> {
        let i = self.entries.partition_point(|e| e.max_key < target);
        self.entries.get(i).map(|e| e.rbn)
    }

    /// Reference linear scan with the same result as [`locate`](Self::locate).
    pub fn locate_linear(&self, target: Key) -> Option<Rbn> {
        self.entries.iter().find(|e| e.max_key >= target).map(|e| e.rbn)
    }

    /// All entries in RBN order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(line: &str) -> std::result::Result<IndexEntry, ParseError> {
    let (rbn, key) = line
        .split_once(',')
        .ok_or(ParseError::FieldCountMismatch { expected: 2, actual: 1 })?;
    let number = |field: &str, value: &str| ParseError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    };
    Ok(IndexEntry {
        rbn: rbn.trim().parse().map_err(|_| number("RBN", rbn))?,
        max_key: key.trim().parse().map_err(|_| number("key", key))?,
    })
}
