//! Key lookup over a blocked sequence set.
//!
//! A lookup is two-level: the block index names the only block that can hold
//! the key, then that block is read and scanned.

use crate::block::BlockStore;
use crate::error::{Error, Result};
use crate::header::{Descriptor, HeaderCodec};
use crate::index::BlockIndex;
use crate::record::{Key, RecordCodec, ZipCodeRecord};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Message shown for a key that is not stored.
pub const NOT_FOUND: &str = "Record not found";

/// Locator answers key lookups against one data file.
///
/// # Example
///
/// ```rust,no_run
/// use blockseq::Locator;
///
/// # fn main() -> Result<(), blockseq::Error> {
/// let locator = Locator::open("zips.seq")?;
/// match locator.find(501)? {
///     Some(record) => println!("{}", record),
///     None => println!("not found"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Locator {
    path: PathBuf,
    store: Mutex<BlockStore<File>>,
    descriptor: Descriptor,
    index: BlockIndex,
    codec: RecordCodec,
}

impl Locator {
    /// Open a data file and its block index.
    ///
    /// The index is rebuilt from the blocks and written back when its file is
    /// missing, the header marks it stale, or it does not describe this
    /// file's blocks. A stale flag is then cleared in the header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (mut store, mut descriptor) = BlockStore::open(&path)?;
        let codec = descriptor.record_codec();
        let index_path = BlockIndex::path_for(&path, &descriptor);

        let loaded = if !descriptor.stale && index_path.exists() {
            let index = BlockIndex::load(&index_path)?;
            if Self::index_matches(&index, &mut store, &descriptor, &codec)? {
                Some(index)
            } else {
                log::warn!(
                    "Block index {:?} does not match the {} blocks of {:?}",
                    index_path,
                    descriptor.block_count,
                    path
                );
                None
            }
        } else {
            None
        };

        let index = match loaded {
            Some(index) => index,
            None => {
                log::info!(
                    "Rebuilding block index {:?} (stale: {})",
                    index_path,
                    descriptor.stale
                );
                let index = BlockIndex::build(&mut store, &descriptor)?;
                index.persist(&index_path)?;

                if descriptor.stale {
                    HeaderCodec::write(&path, &descriptor.mark_fresh())?;
                    // The header was rewritten into a new file; reopen it.
                    let (fresh_store, fresh) = BlockStore::open(&path)?;
                    store = fresh_store;
                    descriptor = fresh;
                }
                index
            }
        };

        log::info!("Opened locator on {:?} with {} index entries", path, index.len());
        Ok(Self {
            path,
            store: Mutex::new(store),
            codec,
            descriptor,
            index,
        })
    }

    /// Whether `index` has one entry per block, in block order, ending with
    /// the greatest key of the last block.
    fn index_matches(
        index: &BlockIndex,
        store: &mut BlockStore<File>,
        descriptor: &Descriptor,
        codec: &RecordCodec,
    ) -> Result<bool> {
        if index.len() != descriptor.block_count as usize {
            return Ok(false);
        }
        if !index.entries().iter().enumerate().all(|(i, e)| e.rbn as usize == i) {
            return Ok(false);
        }
        let Some(last) = index.entries().last() else {
            return Ok(true);
        };

        let block = store.read(last.rbn)?;
        let greatest = match block.last_record() {
            Some(payload) => codec.key_of(payload).map_err(|e| Error::block(last.rbn, e))?,
            None => None,
        };
        Ok(greatest == Some(last.max_key))
    }

    /// Find the payload stored under `key`.
    pub fn find_raw(&self, key: Key) -> Result<Option<Bytes>> {
        let Some(rbn) = self.index.locate(key) else {
            log::debug!("Key {} lies past the last block", key);
            return Ok(None);
        };

        let records = self.store.lock().read_block(Some(rbn))?;
        for payload in records {
            match self.codec.key_of(&payload).map_err(|e| Error::block(rbn, e))? {
                Some(k) if k == key => return Ok(Some(payload)),
                Some(k) if k > key => break,
                _ => {}
            }
        }

        log::debug!("Key {} falls in block {} but is not stored", key, rbn);
        Ok(None)
    }

    /// Find and decode the ZIP code record stored under `key`.
    pub fn find(&self, key: Key) -> Result<Option<ZipCodeRecord>> {
        match self.find_raw(key)? {
            Some(payload) => Ok(Some(ZipCodeRecord::from_payload(&payload)?)),
            None => Ok(None),
        }
    }

    /// Format a payload one field per line, labeled by the schema.
    ///
    /// A payload that does not decode yields [`NOT_FOUND`].
    pub fn display(&self, payload: &[u8]) -> String {
        match self.codec.decode(payload) {
            Ok(values) => self
                .descriptor
                .fields
                .iter()
                .zip(values)
                .map(|(field, value)| format!("{}: {}", field.name, value))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                log::debug!("Cannot display record: {}", e);
                NOT_FOUND.to_string()
            }
        }
    }

    /// Look up `key` and format the result for display.
    pub fn describe(&self, key: Key) -> Result<String> {
        Ok(match self.find_raw(key)? {
            Some(payload) => self.display(&payload),
            None => NOT_FOUND.to_string(),
        })
    }

    /// Descriptor read from the header.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The block index in use.
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SequenceBuilder;
    use crate::config::Options;
    use tempfile::TempDir;

    fn payload(zip: Key) -> Vec<u8> {
        format!("{},Town{},NY,County,40.{},-73.{}", zip, zip, zip, zip).into_bytes()
    }

    /// Builds a file holding every third key from 501.
    fn build(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("zips.seq");
        let options = Options::new().block_size(128);
        let mut builder = SequenceBuilder::new(&path, options).unwrap();
        for zip in (501..800).step_by(3) {
            builder.add(&payload(zip)).unwrap();
        }
        let report = builder.finish().unwrap();
        assert!(report.block_count > 5);
        path
    }

    #[test]
    fn test_find_every_stored_key() {
        let dir = TempDir::new().unwrap();
        let locator = Locator::open(build(&dir)).unwrap();

        for zip in (501..800).step_by(3) {
            let record = locator.find(zip).unwrap().expect("stored key");
            assert_eq!(record.zip_code, zip);
            assert_eq!(record.place_name, format!("Town{}", zip));
        }
    }

    #[test]
    fn test_find_absent_keys() {
        let dir = TempDir::new().unwrap();
        let locator = Locator::open(build(&dir)).unwrap();

        assert!(locator.find(1).unwrap().is_none());
        assert!(locator.find(502).unwrap().is_none());
        assert!(locator.find(99_999).unwrap().is_none());
        assert_eq!(locator.describe(502).unwrap(), NOT_FOUND);
    }

    #[test]
    fn test_display() {
        let dir = TempDir::new().unwrap();
        let locator = Locator::open(build(&dir)).unwrap();

        let text = locator.describe(501).unwrap();
        assert_eq!(
            text,
            "ZIP Code: 501\nPlace Name: Town501\nState: NY\nCounty: County\n\
             Latitude: 40.501\nLongitude: -73.501"
        );
        assert_eq!(locator.display(b"501,too,few"), NOT_FOUND);
    }

    #[test]
    fn test_missing_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir);
        let index_path = dir.path().join("zips.idx");
        let expected = std::fs::read_to_string(&index_path).unwrap();
        std::fs::remove_file(&index_path).unwrap();

        let locator = Locator::open(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&index_path).unwrap(), expected);
        assert!(locator.find(700).unwrap().is_some());
    }

    #[test]
    fn test_stale_index_is_rebuilt_and_flag_cleared() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir);
        let index_path = dir.path().join("zips.idx");
        let expected = std::fs::read_to_string(&index_path).unwrap();

        let descriptor = HeaderCodec::read(&path).unwrap();
        HeaderCodec::write(&path, &descriptor.mark_stale()).unwrap();
        std::fs::write(&index_path, "0,1\n").unwrap();

        let locator = Locator::open(&path).unwrap();
        assert!(!locator.descriptor().stale);
        assert!(!HeaderCodec::read(&path).unwrap().stale);
        assert_eq!(std::fs::read_to_string(&index_path).unwrap(), expected);
        assert_eq!(locator.find(799).unwrap().map(|r| r.zip_code), Some(799));
    }

    #[test]
    fn test_index_naming_missing_block_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir);
        let index_path = dir.path().join("zips.idx");
        let expected = std::fs::read_to_string(&index_path).unwrap();
        std::fs::write(&index_path, "0,600\n900,700\n").unwrap();

        let locator = Locator::open(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&index_path).unwrap(), expected);
        assert_eq!(locator.find(799).unwrap().map(|r| r.zip_code), Some(799));
    }

    fn build_range(path: &Path, options: Options, keys: impl Iterator<Item = Key>) {
        let mut builder = SequenceBuilder::new(path, options).unwrap();
        for zip in keys {
            builder.add(&payload(zip)).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_files_in_one_directory_keep_separate_indexes() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.seq");
        let b = dir.path().join("b.seq");
        build_range(&a, Options::default(), (1000..1400).step_by(4));
        build_range(&b, Options::default(), 5000..5040);

        assert!(dir.path().join("a.idx").exists());
        assert!(dir.path().join("b.idx").exists());

        let first = Locator::open(&a).unwrap();
        let second = Locator::open(&b).unwrap();
        assert_eq!(first.find(1200).unwrap().map(|r| r.zip_code), Some(1200));
        assert_eq!(second.find(5020).unwrap().map(|r| r.zip_code), Some(5020));
        assert!(first.find(5020).unwrap().is_none());
    }

    #[test]
    fn test_shared_index_name_is_detected() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.seq");
        let b = dir.path().join("b.seq");
        let options = Options::new().index_file_name("shared.idx");
        build_range(&a, options.clone(), (1000..1400).step_by(4));
        // The second build overwrites the first file's index.
        build_range(&b, options, 5000..5040);

        let first = Locator::open(&a).unwrap();
        assert_eq!(first.index().len() as u32, first.descriptor().block_count);
        assert_eq!(first.find(1200).unwrap().map(|r| r.zip_code), Some(1200));
        drop(first);

        let second = Locator::open(&b).unwrap();
        assert_eq!(second.find(5020).unwrap().map(|r| r.zip_code), Some(5020));
    }
}
