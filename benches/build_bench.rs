// Build performance benchmarks for blockseq

use blockseq::record::frame;
use blockseq::{Options, SequenceBuilder};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::io::Cursor;
use tempfile::TempDir;

fn input_lines(count: u32) -> Vec<u8> {
    let mut input = Vec::new();
    for i in 0..count {
        let zip = 501 + i * 3;
        let payload = format!("{},Place {},NY,County {},40.{:04},-73.{:04}", zip, i, i % 61, i, i);
        input.extend_from_slice(&frame(payload.as_bytes()));
        input.push(b'\n');
    }
    input
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for size in [1_000u32, 10_000, 40_000].iter() {
        let input = input_lines(*size);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let mut builder =
                    SequenceBuilder::new(dir.path().join("bench.seq"), Options::default()).unwrap();
                builder.build_from_reader(Cursor::new(input)).unwrap();
                black_box(builder.finish().unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_block_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_block_size");
    let input = input_lines(10_000);

    for block_size in [256u32, 512, 1024, 4096].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(block_size), block_size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let options = Options::new().block_size(size);
                let mut builder =
                    SequenceBuilder::new(dir.path().join("bench.seq"), options).unwrap();
                builder.build_from_reader(Cursor::new(&input)).unwrap();
                black_box(builder.finish().unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_build, benchmark_block_size);
criterion_main!(benches);
