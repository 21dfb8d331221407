//! Benchmarks for the whisper database engine.
//!
//! Run with: cargo bench --package whisper
//!
//! ## Benchmark Categories
//!
//! - **Create**: header + region initialization, dense and sparse
//! - **Update**: single-point writes with propagation
//! - **Batch**: grouped batch writes
//! - **Fetch**: window reads at the finest resolution

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::io::Cursor;
use tempfile::TempDir;
use whisper::{CreateOptions, Retention, WhisperFile};

/// A fixed reference clock keeps the benchmarks deterministic.
const NOW: u32 = 1_700_000_000;

/// One day at 10-second resolution, a week at 10-minute resolution.
fn bench_archives() -> Vec<Retention> {
    vec![Retention::new(10, 8640), Retention::new(600, 1008)]
}

fn memory_db() -> WhisperFile<Cursor<Vec<u8>>> {
    WhisperFile::create_in(
        Cursor::new(Vec::new()),
        &bench_archives(),
        &CreateOptions::default(),
    )
    .unwrap()
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_in_memory", |b| {
        b.iter(|| {
            WhisperFile::create_in(
                Cursor::new(Vec::new()),
                black_box(&bench_archives()),
                &CreateOptions::default(),
            )
            .unwrap()
        })
    });

    let temp_dir = TempDir::new().unwrap();
    let options = CreateOptions {
        overwrite: true,
        ..CreateOptions::default()
    };
    c.bench_function("create_on_disk", |b| {
        b.iter(|| {
            WhisperFile::create(
                temp_dir.path().join("bench.wsp"),
                black_box(&bench_archives()),
                &options,
            )
            .unwrap()
        })
    });
}

fn bench_update_single(c: &mut Criterion) {
    let mut db = memory_db();
    let mut timestamp = NOW - 86_000;
    c.bench_function("update_single", |b| {
        b.iter(|| {
            timestamp += 10;
            db.update_at(black_box(1.5), timestamp, timestamp).unwrap()
        })
    });
}

fn bench_update_many(c: &mut Criterion) {
    let points: Vec<(u32, f64)> = (0..1000)
        .map(|i| (NOW - 10_000 + i * 10, i as f64))
        .collect();

    let mut group = c.benchmark_group("update_many");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("1k_points", |b| {
        b.iter_batched(
            memory_db,
            |mut db| db.update_many_at(black_box(&points), NOW).unwrap(),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_fetch(c: &mut Criterion) {
    let mut db = memory_db();
    let points: Vec<(u32, f64)> = (0..8000)
        .map(|i| (NOW - 80_000 + i * 10, i as f64))
        .collect();
    db.update_many_at(&points, NOW).unwrap();

    c.bench_function("fetch_1h_window", |b| {
        b.iter(|| {
            db.fetch_at(black_box(NOW - 3600), None, NOW).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_update_single,
    bench_update_many,
    bench_fetch
);
criterion_main!(benches);
