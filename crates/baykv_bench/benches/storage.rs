//! Storage backend benchmarks.

use baykv_bench::random_data;
use baykv_storage::{FileBackend, FileOptions, InMemoryBackend, StorageBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

/// Benchmark InMemoryBackend appends.
fn bench_inmemory_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut backend = InMemoryBackend::new();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }
    group.finish();
}

/// Benchmark FileBackend appends, with and without a sync per append.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(20);

    for sync in [false, true] {
        group.bench_with_input(BenchmarkId::new("sync", sync), &sync, |b, &sync| {
            let dir = TempDir::new().unwrap();
            let mut backend =
                FileBackend::open_with(&dir.path().join("bench.log"), FileOptions::default())
                    .unwrap();
            let data = random_data(256);

            b.iter(|| {
                backend.append(black_box(&data)).unwrap();
                if sync {
                    backend.sync().unwrap();
                } else {
                    backend.flush().unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark FileBackend reads at random offsets.
fn bench_file_read(c: &mut Criterion) {
    c.bench_function("file_read", |b| {
        let dir = TempDir::new().unwrap();
        let mut backend =
            FileBackend::open_with(&dir.path().join("bench.log"), FileOptions::default()).unwrap();
        let data = random_data(256);
        let mut offsets = Vec::new();
        for _ in 0..1000 {
            offsets.push(backend.append(&data).unwrap());
        }
        backend.flush().unwrap();
        let mut i = 0;

        b.iter(|| {
            i = (i + 7) % offsets.len();
            let bytes = backend.read_at(black_box(offsets[i]), 256).unwrap();
            black_box(bytes);
        });
    });
}

criterion_group!(
    benches,
    bench_inmemory_append,
    bench_file_append,
    bench_file_read
);
criterion_main!(benches);
