//! Blocked sequence set builder.
//!
//! Packs an ascending stream of records into fixed-size blocks, links them
//! in physical order, and installs the result behind a freshly written
//! header. The block index is written alongside.

use crate::block::{Block, BlockLayout, BlockMeta, BlockStore};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::header::{record_size_width, Descriptor, HeaderCodec};
use crate::index::{BlockIndex, IndexEntry};
use crate::record::{framed_len, parse_line, Key, RecordCodec};
use crate::Rbn;
use bytes::Bytes;
use std::io::{BufRead, BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Records written.
    pub record_count: u64,
    /// Blocks written.
    pub block_count: u32,
    /// Non-final blocks filled below the minimum fill ratio.
    pub underfilled: Vec<Rbn>,
    /// Input lines or keyless records skipped under `skip_malformed`.
    pub skipped: usize,
    /// Descriptor written to the header.
    pub descriptor: Descriptor,
    /// Index written next to the data file.
    pub index: BlockIndex,
}

/// SequenceBuilder builds a blocked sequence set file.
///
/// A block is closed once its fill passes the capacity threshold, or earlier
/// when the next record would not fit at all. A closed block is held back
/// until the next record arrives, because only then is its `next` link known.
///
/// Usage:
/// ```no_run
/// use blockseq::{Options, SequenceBuilder};
///
/// let mut builder = SequenceBuilder::new("zips.seq", Options::default()).unwrap();
/// builder.add(b"501,Holtsville,NY,Suffolk,40.8154,-73.0451").unwrap();
/// builder.add(b"544,Holtsville,NY,Suffolk,40.8154,-73.0451").unwrap();
/// let report = builder.finish().unwrap();
/// assert_eq!(report.block_count, 1);
/// ```
pub struct SequenceBuilder {
    path: PathBuf,
    options: Options,
    codec: RecordCodec,
    staging: BlockStore<BufWriter<NamedTempFile>>,
    pending: Vec<Bytes>,
    pending_size: usize,
    pending_max: Key,
    sealed: Option<(Vec<Bytes>, Key)>,
    blocks_written: u32,
    last_key: Option<Key>,
    record_count: u64,
    max_payload_len: usize,
    index_entries: Vec<IndexEntry>,
    underfilled: Vec<Rbn>,
    skipped: usize,
}

impl SequenceBuilder {
    /// Create a builder writing to `path`.
    ///
    /// Blocks are staged in a temporary file in the same directory; `path`
    /// itself is only replaced by [`finish`](Self::finish).
    pub fn new<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = NamedTempFile::new_in(dir)?;
        let staging = BlockStore::new(BufWriter::new(temp), BlockLayout::new(0, options.block_size));

        Ok(Self {
            path,
            codec: RecordCodec::zip_codes(),
            staging,
            pending: Vec::new(),
            pending_size: 0,
            pending_max: 0,
            sealed: None,
            blocks_written: 0,
            last_key: None,
            record_count: 0,
            max_payload_len: 0,
            index_entries: Vec::new(),
            underfilled: Vec::new(),
            skipped: 0,
            options,
        })
    }

    /// Add one record payload (without its length prefix).
    ///
    /// Keys must be strictly ascending. A record without a numeric key is
    /// rejected, or skipped when `skip_malformed` is set.
    pub fn add(&mut self, payload: &[u8]) -> Result<()> {
        let Some(key) = self.codec.key_of(payload)? else {
            if self.options.skip_malformed {
                log::warn!("Skipping record without a primary key");
                self.skipped += 1;
                return Ok(());
            }
            return Err(Error::invalid_argument("record has no primary key"));
        };

        if let Some(last) = self.last_key {
            if key <= last {
                return Err(Error::invalid_argument(format!(
                    "key {} does not follow {}; records must be added in ascending order",
                    key, last
                )));
            }
        }

        let framed = framed_len(payload.len());
        let pending_rbn = self.blocks_written + self.sealed.is_some() as u32;
        let fits_pending = !self.pending.is_empty() && self.fits(pending_rbn, framed);
        if !fits_pending {
            // The record starts a new block and must fit in one on its own.
            let rbn = pending_rbn + (!self.pending.is_empty()) as u32;
            let required = meta_len(rbn, 1) + framed;
            if required > self.options.block_size as usize {
                return Err(Error::BlockOverflow {
                    rbn,
                    required,
                    block_size: self.options.block_size as usize,
                });
            }
        }

        // More input means any held block has a successor.
        self.write_sealed(true)?;
        if !fits_pending {
            self.seal();
            self.write_sealed(true)?;
        }

        self.pending.push(Bytes::copy_from_slice(payload));
        self.pending_size += framed;
        self.pending_max = key;
        self.last_key = Some(key);
        self.record_count += 1;
        self.max_payload_len = self.max_payload_len.max(payload.len());

        let rbn = self.blocks_written;
        if meta_len(rbn, self.pending.len()) + self.pending_size > self.options.capacity() {
            self.seal();
        }
        Ok(())
    }

    /// Add one input line of the form `<len>,<payload>`.
    pub fn add_line(&mut self, line: &[u8]) -> Result<()> {
        let payload = parse_line(line)?;
        self.add(&payload)
    }

    /// Add every line of `reader`. Blank lines are ignored.
    ///
    /// Lines that fail to parse abort the build unless `skip_malformed` is
    /// set, in which case they are logged and skipped. Ordering violations
    /// always abort. Returns the number of records added.
    pub fn build_from_reader<R: BufRead>(&mut self, mut reader: R) -> Result<u64> {
        let before = self.record_count;
        let mut buf = Vec::new();
        let mut lineno = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            lineno += 1;

            let line = trim_line_end(&buf);
            if line.is_empty() {
                continue;
            }

            let checked = parse_line(line)
                .and_then(|payload| self.codec.decode(&payload).map(|_| payload));
            match checked {
                Ok(payload) => self.add(&payload)?,
                Err(e) if self.options.skip_malformed => {
                    log::warn!("Skipping line {}: {}", lineno, e);
                    self.skipped += 1;
                }
                Err(e) => {
                    log::error!("Malformed input at line {}: {}", lineno, e);
                    return Err(e.into());
                }
            }
        }

        Ok(self.record_count - before)
    }

    fn fits(&self, rbn: Rbn, framed: usize) -> bool {
        meta_len(rbn, self.pending.len() + 1) + self.pending_size + framed
            <= self.options.block_size as usize
    }

    fn seal(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.pending);
        self.pending_size = 0;
        self.sealed = Some((records, self.pending_max));
    }

    fn write_sealed(&mut self, has_next: bool) -> Result<()> {
        let Some((records, max_key)) = self.sealed.take() else {
            return Ok(());
        };

        let rbn = self.blocks_written;
        let next = if has_next {
            Some(rbn.checked_add(1).ok_or_else(|| Error::invalid_argument("too many blocks"))?)
        } else {
            None
        };
        let meta = BlockMeta::new(rbn, records.len() as u32, rbn.checked_sub(1), next);
        self.staging.write_block(rbn, &meta, &records)?;

        let used = Block::used_size(&meta, &records);
        if has_next && used < self.options.minimum_fill() {
            log::warn!(
                "Block {} holds {} of {} bytes, below the minimum fill of {}",
                rbn,
                used,
                self.options.block_size,
                self.options.minimum_fill()
            );
            self.underfilled.push(rbn);
        }

        self.index_entries.push(IndexEntry::new(rbn, max_key));
        self.blocks_written += 1;
        Ok(())
    }

    /// Finish the build.
    ///
    /// Writes the last block, installs header and blocks at the target path,
    /// and writes the block index next to it.
    pub fn finish(mut self) -> Result<BuildReport> {
        self.seal();
        self.write_sealed(false)?;
        self.staging.flush()?;

        let mut temp = self
            .staging
            .into_inner()
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        temp.seek(SeekFrom::Start(0))?;

        let descriptor = Descriptor {
            record_size_width: record_size_width(self.max_payload_len),
            block_size: self.options.block_size,
            min_fill_ratio: self.options.min_fill_ratio,
            index_file_name: self.options.index_file_for(&self.path),
            sequence_head: (self.blocks_written > 0).then_some(0),
            avail_head: None,
            stale: false,
            ..Descriptor::default()
        }
        .with_counts(self.record_count, self.blocks_written);
        let descriptor = HeaderCodec::install(&self.path, &descriptor, temp.as_file_mut())?;

        let index = BlockIndex::from_entries(self.index_entries)?;
        index.persist(BlockIndex::path_for(&self.path, &descriptor))?;

        log::info!(
            "Built {:?}: {} records in {} blocks, {} underfilled, {} skipped",
            self.path,
            self.record_count,
            self.blocks_written,
            self.underfilled.len(),
            self.skipped
        );

        Ok(BuildReport {
            record_count: self.record_count,
            block_count: self.blocks_written,
            underfilled: self.underfilled,
            skipped: self.skipped,
            descriptor,
            index,
        })
    }

    /// Get the number of records added
    pub fn num_records(&self) -> u64 {
        self.record_count
    }

    /// Number of blocks written or started so far.
    pub fn num_blocks(&self) -> u32 {
        self.blocks_written + self.sealed.is_some() as u32 + (!self.pending.is_empty()) as u32
    }

    /// Abandon the build. The target path is left untouched.
    pub fn abandon(self) {
        log::info!("Abandoned build of {:?} after {} records", self.path, self.record_count);
    }
}

/// Widest metadata a block at `rbn` with `record_count` records can need.
fn meta_len(rbn: Rbn, record_count: usize) -> usize {
    let prev = rbn.checked_sub(1);
    let count = record_count as u32;
    let last = BlockMeta::new(rbn, count, prev, None).encoded_len();
    let linked = BlockMeta::new(rbn, count, prev, Some(rbn.saturating_add(1))).encoded_len();
    last.max(linked)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}
