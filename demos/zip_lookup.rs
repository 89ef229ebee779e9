//! ZIP code lookup example for blockseq
//!
//! This example demonstrates the full workflow:
//! - Building a blocked sequence set from length-indicated records
//! - Dumping the blocks and the block index
//! - Looking up ZIP codes by key
//!
//! Usage: `cargo run --example zip_lookup -- [INPUT] [ZIP...]`
//!
//! INPUT holds one `<len>,<payload>` record per line, sorted by ZIP code.
//! Without it a small built-in sample is used.

use anyhow::{Context, Result};
use blockseq::block::BlockStore;
use blockseq::dump::{dump_index, dump_logical};
use blockseq::record::frame;
use blockseq::{Locator, Options, SequenceBuilder};
use std::fs::File;
use std::io::{self, BufReader, Cursor};

const SAMPLE: &[&str] = &[
    "501,Holtsville,NY,Suffolk,40.8154,-73.0451",
    "544,Holtsville,NY,Suffolk,40.8154,-73.0451",
    "1001,Agawam,MA,Hampden,42.0702,-72.6227",
    "1002,Amherst,MA,Hampshire,42.3671,-72.4646",
    "1003,Amherst,MA,Hampshire,42.3919,-72.5248",
    "1004,Amherst,MA,Hampshire,42.3845,-72.5132",
    "1005,Barre,MA,Worcester,42.4097,-72.1084",
    "1007,Belchertown,MA,Hampshire,42.2751,-72.411",
    "1008,Blandford,MA,Hampden,42.1829,-72.9361",
    "1009,Bondsville,MA,Hampden,42.2061,-72.3405",
    "1010,Brimfield,MA,Hampden,42.1165,-72.1885",
    "1011,Chester,MA,Hampden,42.2794,-72.9888",
    "1012,Chesterfield,MA,Hampshire,42.3923,-72.8256",
    "1013,Chicopee,MA,Hampden,42.1487,-72.6079",
];

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = args.next();
    let targets: Vec<u32> = args
        .map(|a| a.parse().with_context(|| format!("not a ZIP code: {}", a)))
        .collect::<Result<_>>()?;

    let dir = tempfile::tempdir().context("creating working directory")?;
    let path = dir.path().join("zip_codes.seq");

    // Build the blocked sequence set
    let options = Options::new().block_size(256).skip_malformed(true);
    let mut builder = SequenceBuilder::new(&path, options)?;
    match &input {
        Some(name) => {
            let file = File::open(name).with_context(|| format!("opening {}", name))?;
            builder.build_from_reader(BufReader::new(file))?;
        }
        None => {
            let lines: Vec<u8> = SAMPLE
                .iter()
                .flat_map(|p| {
                    let mut line = frame(p.as_bytes()).to_vec();
                    line.push(b'\n');
                    line
                })
                .collect();
            builder.build_from_reader(Cursor::new(lines))?;
        }
    }
    let report = builder.finish()?;
    println!(
        "Built {} records into {} blocks ({} skipped, {} underfilled)",
        report.record_count,
        report.block_count,
        report.skipped,
        report.underfilled.len()
    );

    // Dump blocks and index
    let (mut store, descriptor) = BlockStore::open(&path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    println!("\nLogical order:");
    dump_logical(&mut store, &descriptor, &mut out)?;
    println!("\nBlock index:");
    dump_index(&report.index, &mut out)?;
    drop(out);

    // Look up keys
    let locator = Locator::open(&path)?;
    let targets = if targets.is_empty() { vec![501, 1007, 1006, 99_999] } else { targets };
    for zip in targets {
        println!("\nZIP {}:\n{}", zip, locator.describe(zip)?);
    }

    Ok(())
}
