//! Database operation benchmarks.

use baykv_bench::{populate, random_data, scratch, sequential_keys};
use baykv_core::{EnvFlags, ReadFlags, TxnFlags, WriteFlags};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

/// Benchmark single unscoped puts.
fn bench_single_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_put");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_home, _env, db) = scratch("put.db", EnvFlags::empty());
            let data = random_data(size);
            let mut n: u64 = 0;

            b.iter(|| {
                n += 1;
                db.put(None, &n.to_be_bytes(), black_box(&data), WriteFlags::empty())
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark batches of puts committed as one transaction.
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_commit");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let (_home, env, db) = scratch("batch.db", EnvFlags::empty());
                let records: Vec<_> = sequential_keys(batch_size)
                    .into_iter()
                    .map(|key| (key, random_data(256)))
                    .collect();

                b.iter(|| {
                    let txn = env.begin(None, TxnFlags::empty()).unwrap();
                    for (key, value) in &records {
                        db.put(Some(&txn), key, black_box(value), WriteFlags::empty())
                            .unwrap();
                    }
                    txn.commit(TxnFlags::NOSYNC).unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark random point reads from a populated database.
fn bench_read_populated(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_populated");

    for count in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (_home, _env, db) = scratch("read.db", EnvFlags::empty());
            let keys = populate(&db, count, 256);
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let key = &keys[rng.gen_range(0..keys.len())];
                let value = db.get(None, black_box(key), ReadFlags::empty()).unwrap();
                black_box(value);
            });
        });
    }
    group.finish();
}

/// Benchmark full cursor scans.
fn bench_cursor_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor_scan");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (_home, _env, db) = scratch("scan.db", EnvFlags::empty());
            populate(&db, count, 64);

            b.iter(|| {
                let cursor = db.cursor(None, ReadFlags::empty()).unwrap();
                let seen = cursor.iter().map(Result::unwrap).count();
                black_box(seen);
            });
        });
    }
    group.finish();
}

/// Benchmark transaction overhead (empty transaction).
fn bench_transaction_overhead(c: &mut Criterion) {
    c.bench_function("transaction_overhead", |b| {
        let (_home, env, _db) = scratch("empty.db", EnvFlags::empty());

        b.iter(|| {
            let txn = env.begin(None, TxnFlags::empty()).unwrap();
            txn.commit(TxnFlags::empty()).unwrap();
        });
    });
}

/// Benchmark deletes.
fn bench_delete(c: &mut Criterion) {
    c.bench_function("delete", |b| {
        let (_home, _env, db) = scratch("del.db", EnvFlags::empty());
        let mut n: u64 = 0;

        b.iter_batched(
            || {
                n += 1;
                let key = n.to_be_bytes();
                db.put(None, &key, &random_data(256), WriteFlags::empty())
                    .unwrap();
                key
            },
            |key| {
                db.del(None, black_box(&key), WriteFlags::empty()).unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_single_put,
    bench_batch_commit,
    bench_read_populated,
    bench_cursor_scan,
    bench_transaction_overhead,
    bench_delete,
);

criterion_main!(benches);
