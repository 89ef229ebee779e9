//! Fixed-size blocks of length-indicated records.
//!
//! ## File Format
//!
//! ```text
//! [Header region, ends with "Data:\n"]   // header_size bytes
//! [Block 0]                              // block_size bytes
//! [Block 1]
//! ...
//! [Block N-1]
//! ```
//!
//! ## Block Format
//!
//! ```text
//! [metadata: <mlen>,<rbn>,<count>,<prev>,<next>,]
//! [record 1: <len>,<payload>]
//! ...
//! [record count: <len>,<payload>]
//! [filler: '~' up to block_size]
//! ```
//!
//! Decoding reads exactly `count` records after the metadata. Filler bytes
//! are never scanned for, so payloads may contain the filler byte.

pub mod meta;
pub mod store;

pub use meta::BlockMeta;
pub use store::{BlockStore, Chain};

use crate::error::{Error, Result};
use crate::record::{frame, framed_len, split_framed};
use crate::Rbn;
use bytes::{BufMut, Bytes, BytesMut};

/// Byte used to pad a block to its fixed size.
pub const FILLER: u8 = b'~';

/// Default block size (512 bytes)
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Addressing constants for blocks in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Bytes before block 0.
    pub header_size: u64,
    /// Bytes per block.
    pub block_size: u32,
}

impl BlockLayout {
    /// Create a new layout.
    pub fn new(header_size: u64, block_size: u32) -> Self {
        Self { header_size, block_size }
    }

    /// File offset of the block with the given RBN.
    pub fn address_of(&self, rbn: Rbn) -> u64 {
        self.header_size + rbn as u64 * self.block_size as u64
    }

    /// Number of whole blocks in a file of `file_len` bytes.
    pub fn block_count(&self, file_len: u64) -> Result<u32> {
        if file_len < self.header_size {
            return Err(Error::corruption(format!(
                "file is {} bytes, shorter than its {}-byte header",
                file_len, self.header_size
            )));
        }
        let payload = file_len - self.header_size;
        let block_size = self.block_size as u64;
        if payload % block_size != 0 {
            return Err(Error::corruption(format!(
                "{} trailing bytes after the last whole block at offset {}",
                payload % block_size,
                self.address_of((payload / block_size) as Rbn)
            )));
        }
        u32::try_from(payload / block_size)
            .map_err(|_| Error::corruption("block count exceeds the RBN range"))
    }
}

/// A decoded block: its metadata and record payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Metadata sub-record.
    pub meta: BlockMeta,
    /// Record payloads without their length prefixes, in stored order.
    pub records: Vec<Bytes>,
}

impl Block {
    /// Create a new Block.
    pub fn new(meta: BlockMeta, records: Vec<Bytes>) -> Self {
        Self { meta, records }
    }

    /// Bytes used by metadata and records, filler excluded.
    pub fn used_size(meta: &BlockMeta, records: &[Bytes]) -> usize {
        meta.encoded_len() + records.iter().map(|r| framed_len(r.len())).sum::<usize>()
    }

    /// Encode the block padded to exactly `block_size` bytes.
    ///
    /// Nothing is produced when the content does not fit.
    pub fn encode(meta: &BlockMeta, records: &[Bytes], block_size: usize) -> Result<Bytes> {
        if meta.record_count as usize != records.len() {
            return Err(Error::invalid_argument(format!(
                "block {} metadata declares {} records but {} were given",
                meta.rbn,
                meta.record_count,
                records.len()
            )));
        }

        let required = Self::used_size(meta, records);
        if required > block_size {
            return Err(Error::BlockOverflow { rbn: meta.rbn, required, block_size });
        }

        let mut buf = BytesMut::with_capacity(block_size);
        meta.encode_to(&mut buf);
        for record in records {
            buf.put_slice(&frame(record));
        }
        buf.put_bytes(FILLER, block_size - buf.len());
        Ok(buf.freeze())
    }

    /// Decode the block expected at `rbn` from exactly one block of bytes.
    pub fn decode(rbn: Rbn, data: Bytes) -> Result<Self> {
        let (meta, mut pos) = BlockMeta::decode(&data).map_err(|e| Error::block(rbn, e))?;
        if meta.rbn != rbn {
            return Err(Error::corruption(format!(
                "block at RBN {} claims to be RBN {}",
                rbn, meta.rbn
            )));
        }

        // Every framed record takes at least two bytes; the count itself is untrusted.
        let mut records = Vec::with_capacity((meta.record_count as usize).min(data.len() / 2));
        for _ in 0..meta.record_count {
            let (payload, consumed) =
                split_framed(&data[pos..]).map_err(|e| Error::block(rbn, e))?;
            let start = pos + consumed - payload.len();
            records.push(data.slice(start..pos + consumed));
            pos += consumed;
        }

        Ok(Self { meta, records })
    }

    /// Payload of the last record, which holds the block's greatest key.
    pub fn last_record(&self) -> Option<&Bytes> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn payloads(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
    }

    #[test]
    fn test_layout_address() {
        let layout = BlockLayout::new(400, 512);
        assert_eq!(layout.address_of(0), 400);
        assert_eq!(layout.address_of(3), 400 + 3 * 512);
    }

    #[test]
    fn test_layout_block_count() {
        let layout = BlockLayout::new(100, 50);
        assert_eq!(layout.block_count(100).unwrap(), 0);
        assert_eq!(layout.block_count(250).unwrap(), 3);
        assert!(layout.block_count(260).is_err());
        assert!(layout.block_count(99).is_err());
    }

    #[test]
    fn test_encode_pads_with_filler() {
        let records = payloads(&["501,Holtsville,NY,Suffolk,40.8154,-73.0451"]);
        let meta = BlockMeta::new(0, 1, None, None);
        let data = Block::encode(&meta, &records, 100).unwrap();

        assert_eq!(data.len(), 100);
        let used = Block::used_size(&meta, &records);
        assert_eq!(used, 13 + 45);
        assert!(data[used..].iter().all(|&b| b == FILLER));
        assert_eq!(&data[..16], b"13,0,1,-1,-1,42,");
    }

    #[test]
    fn test_encode_overflow_writes_nothing() {
        let records = payloads(&["0123456789012345678901234567890123456789"]);
        let meta = BlockMeta::new(7, 1, Some(6), Some(8));
        let err = Block::encode(&meta, &records, 40).unwrap_err();
        assert!(matches!(err, Error::BlockOverflow { rbn: 7, block_size: 40, .. }));
    }

    #[test]
    fn test_encode_count_mismatch() {
        let meta = BlockMeta::new(0, 2, None, None);
        assert!(Block::encode(&meta, &payloads(&["a,b"]), 64).is_err());
    }

    #[test]
    fn test_decode_roundtrip() {
        let records = payloads(&["1001,A,MA,X,1,2", "1002,B,MA,X,3,4", "1005,C,MA,X,5,6"]);
        let meta = BlockMeta::new(2, 3, Some(1), Some(3));
        let data = Block::encode(&meta, &records, 128).unwrap();

        let block = Block::decode(2, data).unwrap();
        assert_eq!(block.meta, meta);
        assert_eq!(block.records, records);
        assert_eq!(&block.last_record().unwrap()[..], b"1005,C,MA,X,5,6");
    }

    #[test]
    fn test_decode_payload_containing_filler() {
        let records = payloads(&["7,~~~,NY,~,0,0"]);
        let meta = BlockMeta::new(0, 1, None, None);
        let data = Block::encode(&meta, &records, 64).unwrap();

        let block = Block::decode(0, data).unwrap();
        assert_eq!(block.records, records);
    }

    #[test]
    fn test_decode_wrong_rbn() {
        let meta = BlockMeta::new(4, 0, None, None);
        let data = Block::encode(&meta, &[], 32).unwrap();
        assert!(matches!(Block::decode(5, data), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_decode_huge_record_count() {
        let mut raw = b"21,0,4294967295,-1,1,".to_vec();
        raw.resize(128, FILLER);
        let err = Block::decode(0, Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, Error::Block { rbn: 0, .. }));
    }

    #[test]
    fn test_decode_count_exceeds_records() {
        // metadata promises two records but only one follows before the filler
        let mut raw = b"13,0,2,-1,-1,3,a,b".to_vec();
        raw.resize(40, FILLER);
        let err = Block::decode(0, Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, Error::Block { rbn: 0, source: ParseError::InvalidLength(_) }));
    }
}
