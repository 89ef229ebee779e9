//! Random-access block I/O.

use crate::block::{Block, BlockLayout, BlockMeta};
use crate::error::{Error, Result};
use crate::header::{Descriptor, HeaderCodec, SizeFormat};
use crate::Rbn;
use bytes::Bytes;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// BlockStore reads and writes whole blocks of a blocked sequence set.
///
/// Every read seeks to the block's computed address, so no cursor position
/// is carried between calls. The only state kept is the metadata of the
/// block last returned by [`read_block`](Self::read_block), which
/// [`read_next`](Self::read_next) follows.
///
/// Usage:
/// ```no_run
/// use blockseq::block::BlockStore;
///
/// let (mut store, descriptor) = BlockStore::open("zips.seq").unwrap();
/// let mut records = store.read_block(descriptor.sequence_head).unwrap();
/// while !records.is_empty() {
///     println!("{} records", records.len());
///     records = store.read_next().unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct BlockStore<F = File> {
    file: F,
    layout: BlockLayout,
    current: Option<BlockMeta>,
}

impl BlockStore<File> {
    /// Open a blocked sequence set file for reading.
    ///
    /// Returns the store and the descriptor read from the file's header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Descriptor)> {
        let path = path.as_ref();
        let descriptor = HeaderCodec::read(path)?;
        if descriptor.size_format != SizeFormat::Ascii {
            return Err(Error::invalid_argument(
                "only ASCII record length prefixes are supported",
            ));
        }

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let layout = descriptor.layout();
        let physical = layout.block_count(file_len)?;
        if physical != descriptor.block_count {
            return Err(Error::corruption(format!(
                "header declares {} blocks but the file holds {}",
                descriptor.block_count, physical
            )));
        }

        log::info!(
            "Opened {:?}: {} blocks of {} bytes after a {}-byte header",
            path,
            physical,
            layout.block_size,
            layout.header_size
        );
        Ok((Self::new(file, layout), descriptor))
    }
}

impl<F> BlockStore<F> {
    /// Wrap an open handle.
    pub fn new(file: F, layout: BlockLayout) -> Self {
        Self { file, layout, current: None }
    }

    /// Addressing constants.
    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// File offset of a block.
    pub fn address_of(&self, rbn: Rbn) -> u64 {
        self.layout.address_of(rbn)
    }

    /// Metadata of the block last read with `read_block`, if any.
    pub fn current(&self) -> Option<&BlockMeta> {
        self.current.as_ref()
    }

    /// Forget the current block.
    pub fn detach(&mut self) {
        self.current = None;
    }

    /// Release the underlying handle.
    pub fn into_inner(self) -> F {
        self.file
    }
}

impl<F: Read + Seek> BlockStore<F> {
    /// Read and decode the block at `rbn`.
    ///
    /// Does not change the current block.
    pub fn read(&mut self, rbn: Rbn) -> Result<Block> {
        let offset = self.address_of(rbn);
        let mut buf = vec![0u8; self.layout.block_size as usize];

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::corruption(format!(
                "block {} at offset {} extends past the end of the file",
                rbn, offset
            )),
            _ => Error::Io(e),
        })?;

        log::debug!("Read block {} at offset {}", rbn, offset);
        Block::decode(rbn, Bytes::from(buf))
    }

    /// Read the records of the block a link points to.
    ///
    /// `None` yields no records and detaches the store. Otherwise the block
    /// becomes current.
    pub fn read_block(&mut self, link: Option<Rbn>) -> Result<Vec<Bytes>> {
        let Some(rbn) = link else {
            self.current = None;
            return Ok(Vec::new());
        };

        let block = self.read(rbn)?;
        self.current = Some(block.meta);
        Ok(block.records)
    }

    /// Read the successor of the current block.
    ///
    /// An empty result means the end of the chain was reached, or no block is
    /// current.
    pub fn read_next(&mut self) -> Result<Vec<Bytes>> {
        let next = self.current.and_then(|meta| meta.next);
        self.read_block(next)
    }

    /// Number of whole blocks after the header.
    pub fn physical_block_count(&mut self) -> Result<u32> {
        let len = self.file.seek(SeekFrom::End(0))?;
        self.layout.block_count(len)
    }

    /// Walk blocks in logical order starting at `head`.
    ///
    /// More than `limit` blocks means the links form a cycle, which is
    /// reported as corruption.
    pub fn chain(&mut self, head: Option<Rbn>, limit: u32) -> Chain<'_, F> {
        Chain { store: self, next: head, visited: 0, limit }
    }
}

impl<F: Write + Seek> BlockStore<F> {
    /// Write one block: metadata, records, then filler up to the block size.
    ///
    /// Fails with [`Error::BlockOverflow`] before any byte is written when
    /// the content does not fit.
    pub fn write_block(&mut self, rbn: Rbn, meta: &BlockMeta, records: &[Bytes]) -> Result<()> {
        if meta.rbn != rbn {
            return Err(Error::invalid_argument(format!(
                "metadata for RBN {} written at RBN {}",
                meta.rbn, rbn
            )));
        }
        let data = Block::encode(meta, records, self.layout.block_size as usize)?;

        let offset = self.address_of(rbn);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&data)?;

        log::debug!("Wrote block {} ({} records) at offset {}", rbn, records.len(), offset);
        Ok(())
    }

    /// Flush buffered writes.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Iterator over blocks following `next` links.
pub struct Chain<'a, F> {
    store: &'a mut BlockStore<F>,
    next: Option<Rbn>,
    visited: u32,
    limit: u32,
}

impl<F: Read + Seek> Iterator for Chain<'_, F> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let rbn = self.next.take()?;
        if self.visited >= self.limit {
            return Some(Err(Error::corruption(format!(
                "chain revisits blocks: more than {} links followed, last at RBN {}",
                self.limit, rbn
            ))));
        }
        self.visited += 1;

        match self.store.read(rbn) {
            Ok(block) => {
                self.next = block.meta.next;
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
