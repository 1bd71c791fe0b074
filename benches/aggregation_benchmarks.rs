//! Benchmarks for column reductions: sequential vs pooled, kernel vs naive.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use galleon::column::ChunkedColumn;
use galleon::{init_thread_pool, ops, CHUNK_SIZE};

fn bench_sum_f64(c: &mut Criterion) {
    let data: Vec<f64> = (0..CHUNK_SIZE * 8).map(|i| (i % 1000) as f64).collect();
    let col = ChunkedColumn::from_slice(&data).unwrap();

    c.bench_function("sum_f64_naive_iter", |b| {
        b.iter(|| black_box(black_box(&data).iter().sum::<f64>()))
    });

    c.bench_function("sum_f64_kernel_sequential", |b| {
        b.iter(|| black_box(ops::sum(black_box(&col))))
    });

    init_thread_pool().unwrap();
    c.bench_function("sum_f64_kernel_parallel", |b| {
        b.iter(|| black_box(ops::sum(black_box(&col))))
    });
}

fn bench_minmax_i64(c: &mut Criterion) {
    init_thread_pool().unwrap();
    let data: Vec<i64> = (0..CHUNK_SIZE * 8).map(|i| ((i * 31) % 100_000) as i64).collect();
    let col = ChunkedColumn::from_slice(&data).unwrap();

    c.bench_function("min_i64", |b| b.iter(|| black_box(ops::min(black_box(&col)))));
    c.bench_function("max_i64", |b| b.iter(|| black_box(ops::max(black_box(&col)))));
}

fn bench_elementwise_add(c: &mut Criterion) {
    init_thread_pool().unwrap();
    let data: Vec<f64> = (0..CHUNK_SIZE * 4).map(|i| i as f64).collect();
    let a = ChunkedColumn::from_slice(&data).unwrap();
    let b_col = ChunkedColumn::from_slice(&data).unwrap();

    c.bench_function("add_f64_columns", |b| {
        b.iter(|| black_box(ops::add(black_box(&a), black_box(&b_col)).unwrap()))
    });
}

criterion_group!(benches, bench_sum_f64, bench_minmax_i64, bench_elementwise_add);
criterion_main!(benches);
