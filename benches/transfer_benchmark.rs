//! Performance benchmarks for CloudMove
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

use cloudmove::config::{EngineConfig, OverwritePolicy, RemoteKind};
use cloudmove::properties::SecurityDescriptor;
use cloudmove::transfer::{TransferInfo, TransferRunner};
use cloudmove::transport::InMemoryTransport;

/// Create a test file of the specified size
fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_chunk_sizing(c: &mut Criterion) {
    c.bench_function("chunk_ranges_1gib_8mib", |b| {
        b.iter(|| {
            let ranges = cloudmove::chunk::chunk_ranges(
                black_box(1024 * 1024 * 1024),
                black_box(8 * 1024 * 1024),
            );
            black_box(ranges.len())
        });
    });
}

fn bench_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("upload_in_memory");

    for size in [1024 * 1024usize, 16 * 1024 * 1024] {
        let dir = TempDir::new().unwrap();
        let source = create_test_file(dir.path(), "payload.bin", size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let transport = Arc::new(InMemoryTransport::new());
                let runner = TransferRunner::new(EngineConfig {
                    chunk_size: 1024 * 1024,
                    workers: 4,
                    ..Default::default()
                })
                .unwrap();

                let report = runner
                    .upload(
                        TransferInfo {
                            id: 1,
                            source: source.to_string_lossy().to_string(),
                            destination: "bucket/payload.bin".to_string(),
                            size: size as u64,
                            chunk_size: 1024 * 1024,
                            overwrite: OverwritePolicy::Always,
                        },
                        RemoteKind::ObjectStore,
                        transport,
                        None,
                    )
                    .unwrap();
                black_box(report.bytes_moved)
            });
        });
    }

    group.finish();
}

fn bench_descriptor_parse(c: &mut Criterion) {
    let descriptor = "O:S-1-22-1-1000G:S-1-22-2-1000D:(A;;FRFWFX;;;S-1-22-1-1000)(A;;FR;;;S-1-22-2-1000)(A;;FR;;;WD)";

    c.bench_function("security_descriptor_parse", |b| {
        b.iter(|| SecurityDescriptor::parse(black_box(descriptor)).unwrap());
    });
}

criterion_group!(benches, bench_chunk_sizing, bench_upload, bench_descriptor_parse);
criterion_main!(benches);
