//! Configuration options for building a blocked sequence set.

use crate::block::DEFAULT_BLOCK_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extension of index files named after their data file.
pub const INDEX_EXTENSION: &str = "idx";

/// Build policy for a blocked sequence set file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Size of every block in bytes.
    /// Default: 512
    pub block_size: u32,

    /// Fraction of `block_size` after which a block is closed.
    /// Default: 0.75
    pub capacity_ratio: f64,

    /// Minimum fill fraction expected of every block except the last.
    /// Violations are logged, not rejected.
    /// Default: 0.5
    pub min_fill_ratio: f64,

    /// File name of the block index, resolved next to the data file.
    /// Default: None, which names the index after the data file (`zips.seq` gets `zips.idx`)
    pub index_file_name: Option<String>,

    /// Skip unparsable input lines instead of aborting the build.
    /// Default: false
    pub skip_malformed: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            capacity_ratio: 0.75,
            min_fill_ratio: 0.5,
            index_file_name: None,
            skip_malformed: false,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the capacity ratio.
    pub fn capacity_ratio(mut self, ratio: f64) -> Self {
        self.capacity_ratio = ratio;
        self
    }

    /// Sets the minimum fill ratio.
    pub fn min_fill_ratio(mut self, ratio: f64) -> Self {
        self.min_fill_ratio = ratio;
        self
    }

    /// Sets the block index file name.
    pub fn index_file_name(mut self, name: impl Into<String>) -> Self {
        self.index_file_name = Some(name.into());
        self
    }

    /// Enables or disables skipping of malformed input lines.
    pub fn skip_malformed(mut self, value: bool) -> Self {
        self.skip_malformed = value;
        self
    }

    /// Soft close threshold in bytes.
    pub fn capacity(&self) -> usize {
        (self.block_size as f64 * self.capacity_ratio).floor() as usize
    }

    /// Minimum expected fill of a non-final block in bytes.
    pub fn minimum_fill(&self) -> usize {
        (self.block_size as f64 * self.min_fill_ratio).ceil() as usize
    }

    /// Index file name for the data file at `data_path`.
    pub fn index_file_for(&self, data_path: &Path) -> String {
        if let Some(name) = &self.index_file_name {
            return name.clone();
        }
        let stem = data_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "sequence".to_string());
        format!("{}.{}", stem, INDEX_EXTENSION)
    }

    /// Parses options from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("invalid options JSON: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_argument("block_size must be > 0"));
        }
        if !(self.capacity_ratio > 0.0 && self.capacity_ratio <= 1.0) {
            return Err(Error::invalid_argument("capacity_ratio must be in (0, 1]"));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 1.0) {
            return Err(Error::invalid_argument("min_fill_ratio must be in (0, 1]"));
        }
        if self.min_fill_ratio > self.capacity_ratio {
            return Err(Error::invalid_argument("min_fill_ratio must not exceed capacity_ratio"));
        }
        if self.index_file_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::invalid_argument("index_file_name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(opts.capacity(), 384);
        assert_eq!(opts.index_file_name, None);
        assert_eq!(opts.minimum_fill(), 256);
        assert!(!opts.skip_malformed);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new().block_size(100).capacity_ratio(0.75).skip_malformed(true);

        assert_eq!(opts.block_size, 100);
        assert_eq!(opts.capacity(), 75);
        assert!(opts.skip_malformed);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.block_size = 0;
        assert!(opts.validate().is_err());

        opts.block_size = 512;
        opts.capacity_ratio = 1.5;
        assert!(opts.validate().is_err());

        opts.capacity_ratio = 0.4;
        assert!(opts.validate().is_err(), "min fill above capacity");

        opts.capacity_ratio = 0.75;
        opts.index_file_name = Some(" ".to_string());
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_index_file_for() {
        let opts = Options::default();
        assert_eq!(opts.index_file_for(Path::new("/data/zips.seq")), "zips.idx");
        assert_eq!(opts.index_file_for(Path::new("/data/other.seq")), "other.idx");
        assert_eq!(opts.index_file_for(Path::new("plain")), "plain.idx");

        let opts = opts.index_file_name("shared.txt");
        assert_eq!(opts.index_file_for(Path::new("/data/zips.seq")), "shared.txt");
    }

    #[test]
    fn test_options_from_json() {
        let opts = Options::from_json_str(r#"{ "block_size": 1024, "skip_malformed": true }"#)
            .unwrap();
        assert_eq!(opts.block_size, 1024);
        assert!(opts.skip_malformed);
        assert_eq!(opts.capacity_ratio, 0.75);

        assert!(Options::from_json_str(r#"{ "block_size": 0 }"#).is_err());
        assert!(Options::from_json_str("not json").is_err());
    }

    #[test]
    fn test_options_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "block_size": 256, "index_file_name": "zips.index" }"#).unwrap();

        let opts = Options::from_json_file(&path).unwrap();
        assert_eq!(opts.block_size, 256);
        assert_eq!(opts.index_file_name.as_deref(), Some("zips.index"));
        assert_eq!(opts.min_fill_ratio, 0.5);

        std::fs::write(&path, r#"{ "capacity_ratio": 2.0 }"#).unwrap();
        assert!(matches!(Options::from_json_file(&path), Err(Error::InvalidArgument(_))));

        let missing = dir.path().join("missing.json");
        assert!(matches!(Options::from_json_file(&missing), Err(Error::Io(_))));
    }
}
