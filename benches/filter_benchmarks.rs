//! Benchmarks for the filter paths at different selectivities.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use galleon::column::ChunkedColumn;
use galleon::{init_thread_pool, ops, CHUNK_SIZE};

fn bench_filter_selectivity(c: &mut Criterion) {
    init_thread_pool().unwrap();
    let data: Vec<f64> = (0..CHUNK_SIZE * 8).map(|i| ((i * 37) % 1000) as f64).collect();
    let col = ChunkedColumn::from_slice(&data).unwrap();

    // ~10% of rows survive.
    c.bench_function("filter_gt_f64_sparse", |b| {
        b.iter(|| black_box(ops::filter_gt(black_box(&col), 899.0).unwrap()))
    });

    // ~90% of rows survive.
    c.bench_function("filter_gt_f64_dense", |b| {
        b.iter(|| black_box(ops::filter_gt(black_box(&col), 99.0).unwrap()))
    });

    c.bench_function("filter_predicate_naive", |b| {
        b.iter(|| {
            let kept: Vec<f64> = black_box(&data).iter().copied().filter(|&v| v > 899.0).collect();
            black_box(kept);
        })
    });
}

fn bench_argsort(c: &mut Criterion) {
    init_thread_pool().unwrap();
    let data: Vec<i64> = (0..CHUNK_SIZE * 4).map(|i| ((i * 2654435761) % 1_000_003) as i64).collect();

    c.bench_function("argsort_multi_chunk", |b| {
        b.iter(|| {
            let mut col = ChunkedColumn::from_slice(black_box(&data)).unwrap();
            black_box(ops::argsort(&mut col));
        })
    });
}

criterion_group!(benches, bench_filter_selectivity, bench_argsort);
criterion_main!(benches);
