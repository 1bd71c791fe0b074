//! Predicate filters over chunked columns.
//!
//! Filters run in two passes: a scan pass collecting matching row indices per
//! chunk, then a gather pass materializing the survivors into a contiguous
//! buffer that is repackaged as a fresh column. Output order equals input
//! order.

use rayon::prelude::*;

use crate::column::ChunkedColumn;
use crate::error::GalleonError;
use crate::ops::SimdElement;
use crate::parallel::{should_parallelize, thread_pool, OpKind, MIN_PARALLEL_CHUNKS};
use crate::simd::kernel_table;

/// Element types with a vectorized `>` filter scan in the dispatch table.
pub trait SimdFilter: SimdElement {
    /// Writes matching local row indices into `out_idx` and returns the count.
    fn kernel_filter_gt(data: &[Self], threshold: Self, out_idx: &mut [u32]) -> usize;
}

impl SimdFilter for f64 {
    fn kernel_filter_gt(data: &[Self], threshold: Self, out_idx: &mut [u32]) -> usize {
        debug_assert!(out_idx.len() >= data.len());
        let table = kernel_table();
        unsafe { (table.filter_gt_f64)(data.as_ptr(), data.len(), threshold, out_idx.as_mut_ptr()) }
    }
}

impl SimdFilter for i64 {
    fn kernel_filter_gt(data: &[Self], threshold: Self, out_idx: &mut [u32]) -> usize {
        debug_assert!(out_idx.len() >= data.len());
        let table = kernel_table();
        unsafe { (table.filter_gt_i64)(data.as_ptr(), data.len(), threshold, out_idx.as_mut_ptr()) }
    }
}

fn use_pool<T: SimdElement>(col: &ChunkedColumn<T>) -> bool {
    thread_pool().is_some()
        && col.num_chunks() >= MIN_PARALLEL_CHUNKS
        && should_parallelize(OpKind::CheapScan, col.len())
}

fn scan_chunks<T, S>(col: &ChunkedColumn<T>, scan: &S) -> Vec<Vec<u32>>
where
    T: SimdElement,
    S: Fn(usize) -> Vec<u32> + Sync,
{
    let num_chunks = col.num_chunks();
    match thread_pool() {
        Some(pool) if use_pool(col) => {
            pool.install(|| (0..num_chunks).into_par_iter().map(scan).collect())
        }
        _ => (0..num_chunks).map(scan).collect(),
    }
}

fn gather_matches<T: SimdElement>(
    col: &ChunkedColumn<T>,
    matches: Vec<Vec<u32>>,
) -> Result<ChunkedColumn<T>, GalleonError> {
    let total: usize = matches.iter().map(Vec::len).sum();
    let mut out = vec![T::default(); total];
    let mut pieces = Vec::with_capacity(matches.len());
    let mut rest = out.as_mut_slice();
    for idx in &matches {
        let (head, tail) = rest.split_at_mut(idx.len());
        pieces.push(head);
        rest = tail;
    }
    let gather = |((c, idx), piece): ((usize, &Vec<u32>), &mut &mut [T])| {
        T::kernel_gather(col.chunk(c).unwrap_or(&[]), idx, piece);
    };
    match thread_pool() {
        Some(pool) if use_pool(col) => pool.install(|| {
            matches
                .iter()
                .enumerate()
                .zip(pieces.iter_mut())
                .par_bridge()
                .for_each(gather);
        }),
        _ => matches.iter().enumerate().zip(pieces.iter_mut()).for_each(gather),
    }
    ChunkedColumn::from_slice(&out)
}

/// Rows where `value > threshold`, via the vectorized filter kernel.
pub fn filter_gt<T: SimdFilter>(
    col: &ChunkedColumn<T>,
    threshold: T,
) -> Result<ChunkedColumn<T>, GalleonError> {
    let matches = scan_chunks(col, &|c: usize| {
        let chunk = col.chunk(c).unwrap_or(&[]);
        let mut idx = vec![0u32; chunk.len()];
        let n = T::kernel_filter_gt(chunk, threshold, &mut idx);
        idx.truncate(n);
        idx
    });
    gather_matches(col, matches)
}

/// Rows where `value < threshold`.
pub fn filter_lt<T: SimdFilter>(
    col: &ChunkedColumn<T>,
    threshold: T,
) -> Result<ChunkedColumn<T>, GalleonError> {
    filter(col, |v| v < threshold)
}

/// Rows satisfying an arbitrary predicate.
pub fn filter<T, F>(col: &ChunkedColumn<T>, pred: F) -> Result<ChunkedColumn<T>, GalleonError>
where
    T: SimdElement,
    F: Fn(T) -> bool + Sync,
{
    let matches = scan_chunks(col, &|c: usize| {
        let chunk = col.chunk(c).unwrap_or(&[]);
        chunk
            .iter()
            .enumerate()
            .filter(|(_, &v)| pred(v))
            .map(|(i, _)| i as u32)
            .collect()
    });
    gather_matches(col, matches)
}
