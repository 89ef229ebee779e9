//! Human-readable dumps of a blocked sequence set.
//!
//! Each block prints as one row: previous RBN, the keys it holds, next RBN,
//! in six-character left-aligned columns. A missing link prints as `-1`.

use crate::block::{Block, BlockStore};
use crate::error::{Error, Result};
use crate::header::Descriptor;
use crate::index::BlockIndex;
use crate::record::RecordCodec;
use crate::Rbn;
use std::io::{Read, Seek, Write};

fn link(rbn: Option<Rbn>) -> String {
    rbn.map_or_else(|| "-1".to_string(), |r| r.to_string())
}

fn write_heads<W: Write>(descriptor: &Descriptor, out: &mut W) -> Result<()> {
    writeln!(out, "List Head RBN: {}", link(descriptor.sequence_head))?;
    writeln!(out, "Avail Head RBN: {}", link(descriptor.avail_head))?;
    Ok(())
}

fn write_block<W: Write>(block: &Block, codec: &RecordCodec, out: &mut W) -> Result<()> {
    write!(out, "{:<6}", link(block.meta.prev))?;
    for payload in &block.records {
        let key = codec.key_of(payload).map_err(|e| Error::block(block.meta.rbn, e))?;
        match key {
            Some(key) => write!(out, "{:<6}", key)?,
            None => write!(out, "{:<6}", "?")?,
        }
    }
    writeln!(out, "{:<6}", link(block.meta.next))?;
    Ok(())
}

/// Dump blocks in logical order, following `next` links from the sequence
/// head.
pub fn dump_logical<F, W>(store: &mut BlockStore<F>, descriptor: &Descriptor, out: &mut W) -> Result<()>
where
    F: Read + Seek,
    W: Write,
{
    let codec = descriptor.record_codec();
    write_heads(descriptor, out)?;
    for block in store.chain(descriptor.sequence_head, descriptor.block_count) {
        write_block(&block?, &codec, out)?;
    }
    Ok(())
}

/// Dump blocks in physical order, RBN 0 through the last block.
pub fn dump_physical<F, W>(store: &mut BlockStore<F>, descriptor: &Descriptor, out: &mut W) -> Result<()>
where
    F: Read + Seek,
    W: Write,
{
    let codec = descriptor.record_codec();
    write_heads(descriptor, out)?;
    for rbn in 0..descriptor.block_count {
        write_block(&store.read(rbn)?, &codec, out)?;
    }
    Ok(())
}

/// Dump the block index, one entry per line.
pub fn dump_index<W: Write>(index: &BlockIndex, out: &mut W) -> Result<()> {
    for entry in index.entries() {
        writeln!(out, "RBN: {} Primary Key: {}", entry.rbn, entry.max_key)?;
    }
    Ok(())
}
