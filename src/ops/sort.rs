//! Argsort and sort over chunked columns.
//!
//! A single chunk sorts an index array directly (pattern-defeating quicksort
//! via `sort_unstable_by_key`). Multiple chunks sort each chunk's indices
//! independently against the scratch sort keys, then k-way merge through a
//! min-heap of (chunk, position) cursors, emitting global row indices.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::column::{ChunkedColumn, ColumnScratch, Element};
use crate::error::GalleonError;
use crate::ops::SimdElement;
use crate::parallel::{should_parallelize, thread_pool, OpKind};

/// Indices that would sort the column ascending.
pub fn argsort<T: Element>(col: &mut ChunkedColumn<T>) -> Vec<u32> {
    if col.is_empty() {
        return Vec::new();
    }
    if col.num_chunks() == 1 {
        let chunk = col.chunk(0).unwrap_or(&[]);
        let mut indices: Vec<u32> = (0..chunk.len() as u32).collect();
        indices.sort_unstable_by_key(|&i| chunk[i as usize].sort_key());
        return indices;
    }
    multi_chunk_argsort(col)
}

fn multi_chunk_argsort<T: Element>(col: &mut ChunkedColumn<T>) -> Vec<u32> {
    col.ensure_sort_buffers();
    let Some(mut scratch) = col.take_scratch() else {
        return Vec::new();
    };
    sort_chunks(col, &mut scratch);
    let merged = merge_sorted_chunks(col, &scratch);
    col.put_scratch(scratch);
    merged
}

/// Fills each chunk's (key, index) scratch pair and sorts it by key.
fn sort_chunks<T: Element>(col: &ChunkedColumn<T>, scratch: &mut ColumnScratch<T>) {
    let per_chunk = |c: usize,
                     keys: &mut Vec<u64>,
                     indices: &mut Vec<u32>,
                     keys_tmp: &mut Vec<u64>,
                     indices_tmp: &mut Vec<u32>| {
        let chunk = col.chunk(c).unwrap_or(&[]);
        for (i, &v) in chunk.iter().enumerate() {
            keys[i] = v.sort_key();
            indices[i] = i as u32;
        }
        radix_sort_pairs(keys, indices, keys_tmp, indices_tmp);
    };
    let parallel = thread_pool().is_some() && should_parallelize(OpKind::HeavyScan, col.len());
    if let Some(pool) = thread_pool().filter(|_| parallel) {
        pool.install(|| {
            scratch
                .sort_keys
                .par_iter_mut()
                .zip(scratch.sort_indices.par_iter_mut())
                .zip(scratch.sort_keys_tmp.par_iter_mut())
                .zip(scratch.sort_indices_tmp.par_iter_mut())
                .enumerate()
                .for_each(|(c, (((keys, indices), keys_tmp), indices_tmp))| {
                    per_chunk(c, keys, indices, keys_tmp, indices_tmp);
                });
        });
    } else {
        for c in 0..col.num_chunks() {
            per_chunk(
                c,
                &mut scratch.sort_keys[c],
                &mut scratch.sort_indices[c],
                &mut scratch.sort_keys_tmp[c],
                &mut scratch.sort_indices_tmp[c],
            );
        }
    }
}

/// Least-significant-digit radix sort of (key, index) pairs, ping-ponging
/// through the tmp buffers. All four slices share one length.
fn radix_sort_pairs(
    keys: &mut Vec<u64>,
    indices: &mut Vec<u32>,
    keys_tmp: &mut Vec<u64>,
    indices_tmp: &mut Vec<u32>,
) {
    let n = keys.len();
    if n <= 1 {
        return;
    }
    for pass in 0..8 {
        let shift = pass * 8;
        let mut counts = [0usize; 256];
        for &k in keys.iter() {
            counts[((k >> shift) & 0xFF) as usize] += 1;
        }
        // All keys in one bucket: nothing moves this pass.
        if counts.iter().any(|&c| c == n) {
            continue;
        }
        let mut offsets = [0usize; 256];
        let mut total = 0;
        for (offset, &c) in offsets.iter_mut().zip(counts.iter()) {
            *offset = total;
            total += c;
        }
        for i in 0..n {
            let bucket = ((keys[i] >> shift) & 0xFF) as usize;
            keys_tmp[offsets[bucket]] = keys[i];
            indices_tmp[offsets[bucket]] = indices[i];
            offsets[bucket] += 1;
        }
        std::mem::swap(keys, keys_tmp);
        std::mem::swap(indices, indices_tmp);
    }
}

fn merge_sorted_chunks<T: Element>(col: &ChunkedColumn<T>, scratch: &ColumnScratch<T>) -> Vec<u32> {
    let sizes = col.chunk_sizes();
    let mut bases = Vec::with_capacity(sizes.len());
    let mut base = 0u32;
    for &size in sizes {
        bases.push(base);
        base += size as u32;
    }
    let mut heap = BinaryHeap::with_capacity(sizes.len());
    for (c, &size) in sizes.iter().enumerate() {
        if size > 0 {
            heap.push(Reverse((scratch.sort_keys[c][0], c, 0usize)));
        }
    }
    let mut out = Vec::with_capacity(col.len());
    while let Some(Reverse((_, c, pos))) = heap.pop() {
        out.push(bases[c] + scratch.sort_indices[c][pos]);
        let next = pos + 1;
        if next < sizes[c] {
            heap.push(Reverse((scratch.sort_keys[c][next], c, next)));
        }
    }
    out
}

/// A new column holding the sorted values.
pub fn sort<T: SimdElement>(col: &mut ChunkedColumn<T>) -> Result<ChunkedColumn<T>, GalleonError> {
    let indices = argsort(col);
    let values = col.to_vec();
    let mut out = vec![T::default(); values.len()];
    T::kernel_gather(&values, &indices, &mut out);
    ChunkedColumn::from_slice(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::init_thread_pool;
    use crate::CHUNK_SIZE;

    #[test]
    fn test_argsort_single_chunk() {
        let mut col = ChunkedColumn::from_slice(&[5i64, 2, 8, 1, 9]).unwrap();
        assert_eq!(argsort(&mut col), vec![3, 1, 0, 2, 4]);
    }

    #[test]
    fn test_argsort_negative_floats() {
        let mut col = ChunkedColumn::from_slice(&[0.5f64, -3.25, 2.0, -0.5]).unwrap();
        assert_eq!(argsort(&mut col), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_sort_matches_std() {
        let data: Vec<i64> = (0..5000).map(|i| (i * 7919) % 2003 - 1000).collect();
        let mut col = ChunkedColumn::from_slice(&data).unwrap();
        let sorted = sort(&mut col).unwrap();
        let mut expected = data.clone();
        expected.sort();
        assert_eq!(sorted.to_vec(), expected);
    }

    #[test]
    fn test_multi_chunk_sort_matches_std() {
        init_thread_pool().unwrap();
        let n = CHUNK_SIZE * 2 + 123;
        let data: Vec<i64> = (0..n as i64).map(|i| (i * 2654435761) % 100_000 - 50_000).collect();
        let mut col = ChunkedColumn::from_slice(&data).unwrap();
        let indices = argsort(&mut col);
        assert_eq!(indices.len(), n);
        let mut sorted_via_indices: Vec<i64> =
            indices.iter().map(|&i| data[i as usize]).collect();
        let mut expected = data.clone();
        expected.sort();
        assert_eq!(sorted_via_indices, expected);
        // Indices form a permutation.
        sorted_via_indices.clear();
        let mut seen = vec![false; n];
        for &i in &indices {
            assert!(!seen[i as usize]);
            seen[i as usize] = true;
        }
    }

    #[test]
    fn test_sort_idempotent() {
        let data: Vec<f64> = (0..1000).map(|i| ((i * 31) % 97) as f64 - 48.0).collect();
        let mut col = ChunkedColumn::from_slice(&data).unwrap();
        let mut once = sort(&mut col).unwrap();
        let twice = sort(&mut once).unwrap();
        assert_eq!(once.to_vec(), twice.to_vec());
    }

    #[test]
    fn test_argsort_empty() {
        let mut col = ChunkedColumn::<f64>::from_slice(&[]).unwrap();
        assert!(argsort(&mut col).is_empty());
    }
}
