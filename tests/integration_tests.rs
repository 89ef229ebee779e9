// Integration tests for blockseq
// Build a file end to end, then search, traverse, and dump it

use blockseq::block::BlockStore;
use blockseq::dump::{dump_index, dump_logical};
use blockseq::record::frame;
use blockseq::{BlockIndex, HeaderCodec, Locator, Options, SequenceBuilder};
use rand::Rng;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

const STATES: [&str; 5] = ["NY", "MA", "NJ", "CT", "PA"];

fn zip_line(zip: u32) -> Vec<u8> {
    let payload = format!(
        "{},Place {},{},County {},{:.4},{:.4}",
        zip,
        zip % 97,
        STATES[zip as usize % STATES.len()],
        zip % 13,
        40.0 + zip as f64 / 10_000.0,
        -73.0 - zip as f64 / 10_000.0
    );
    frame(payload.as_bytes()).to_vec()
}

/// Every fifth ZIP code from 501 to 9_996.
fn zips() -> impl Iterator<Item = u32> {
    (501..10_000).step_by(5)
}

fn build(dir: &TempDir, options: Options) -> PathBuf {
    let path = dir.path().join("us_postal_codes.seq");
    let mut input = Vec::new();
    for zip in zips() {
        input.extend_from_slice(&zip_line(zip));
        input.push(b'\n');
    }

    let mut builder = SequenceBuilder::new(&path, options).unwrap();
    builder.build_from_reader(Cursor::new(input)).unwrap();
    let report = builder.finish().unwrap();
    assert_eq!(report.record_count, zips().count() as u64);
    assert!(report.underfilled.is_empty());
    path
}

#[test]
fn test_build_and_find_all() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::default());

    let locator = Locator::open(&path).unwrap();
    for zip in zips() {
        let record = locator.find(zip).unwrap().unwrap();
        assert_eq!(record.zip_code, zip);
        assert_eq!(record.state, STATES[zip as usize % STATES.len()]);
    }
}

#[test]
fn test_random_lookups() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::new().block_size(256));
    let locator = Locator::open(&path).unwrap();

    let mut rng = rand::rng();
    for _ in 0..500 {
        let target: u32 = rng.random_range(0..12_000);
        let stored = (501..10_000).contains(&target) && (target - 501) % 5 == 0;
        let found = locator.find(target).unwrap();
        assert_eq!(found.is_some(), stored, "target {}", target);
    }
}

#[test]
fn test_header_describes_file() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::new().block_size(1024).capacity_ratio(0.8));

    let descriptor = HeaderCodec::read(&path).unwrap();
    assert_eq!(descriptor.block_size, 1024);
    assert_eq!(descriptor.record_count, zips().count() as u64);
    assert_eq!(descriptor.sequence_head, Some(0));
    assert_eq!(descriptor.avail_head, None);
    assert!(!descriptor.stale);

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, descriptor.header_size + descriptor.block_count as u64 * 1024);
}

#[test]
fn test_logical_walk_visits_all_records_in_order() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::new().block_size(200));
    let (mut store, descriptor) = BlockStore::open(&path).unwrap();
    let codec = descriptor.record_codec();

    let mut keys = Vec::new();
    let mut records = store.read_block(descriptor.sequence_head).unwrap();
    while !records.is_empty() {
        for payload in &records {
            keys.push(codec.key_of(payload).unwrap().unwrap());
        }
        records = store.read_next().unwrap();
    }

    assert_eq!(keys, zips().collect::<Vec<_>>());
}

#[test]
fn test_index_file_matches_rebuild() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::default().index_file_name("zip_index.txt"));

    let (mut store, descriptor) = BlockStore::open(&path).unwrap();
    assert_eq!(descriptor.index_file_name, "zip_index.txt");

    let loaded = BlockIndex::load(dir.path().join("zip_index.txt")).unwrap();
    let rebuilt = BlockIndex::build(&mut store, &descriptor).unwrap();
    assert_eq!(loaded, rebuilt);
    assert_eq!(loaded.len(), descriptor.block_count as usize);
}

#[test]
fn test_dumps() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::new().block_size(512));
    let (mut store, descriptor) = BlockStore::open(&path).unwrap();

    let mut out = Vec::new();
    dump_logical(&mut store, &descriptor, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 2 + descriptor.block_count as usize);

    let locator = Locator::open(&path).unwrap();
    let mut out = Vec::new();
    dump_index(locator.index(), &mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().starts_with("RBN: 0 Primary Key: "));
}

#[test]
fn test_rebuild_replaces_existing_file() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = build(&dir, Options::default());
    let before = HeaderCodec::read(&path).unwrap();

    let mut builder = SequenceBuilder::new(&path, Options::default()).unwrap();
    builder.add_line(&zip_line(501)).unwrap();
    builder.add_line(&zip_line(502)).unwrap();
    let report = builder.finish().unwrap();
    assert!(report.block_count < before.block_count);

    let locator = Locator::open(&path).unwrap();
    assert!(locator.find(502).unwrap().is_some());
    assert!(locator.find(506).unwrap().is_none());
}
