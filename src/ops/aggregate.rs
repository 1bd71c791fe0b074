//! Column reductions.
//!
//! Small columns (fewer than [`MIN_PARALLEL_CHUNKS`] chunks, or below the
//! cheap-scan parallel floor, or with no pool initialized) take a sequential
//! per-chunk loop over the SIMD kernel; larger ones fan out through
//! [`parallel_chunk_reduce`]. Chunk results combine left-to-right, so float
//! sums can differ from a strictly sequential accumulation.

use num_traits::ToPrimitive;

use crate::column::ChunkedColumn;
use crate::ops::SimdElement;
use crate::parallel::{
    parallel_chunk_reduce, should_parallelize, thread_pool, OpKind, MIN_PARALLEL_CHUNKS,
};

fn run_sequential<T: SimdElement>(col: &ChunkedColumn<T>) -> bool {
    col.num_chunks() < MIN_PARALLEL_CHUNKS
        || thread_pool().is_none()
        || !should_parallelize(OpKind::CheapScan, col.len())
}

/// Sum of all elements; `0` for an empty column. Integer sums wrap.
pub fn sum<T: SimdElement>(col: &ChunkedColumn<T>) -> T {
    if run_sequential(col) {
        let mut acc = T::default();
        for c in 0..col.num_chunks() {
            acc = T::add_values(acc, T::kernel_sum(col.chunk(c).unwrap_or(&[])));
        }
        return acc;
    }
    parallel_chunk_reduce(
        col,
        T::default(),
        &|chunk| T::kernel_sum(chunk),
        &|a, b| T::add_values(a, b),
    )
}

/// Minimum element, or `None` for an empty column.
pub fn min<T: SimdElement>(col: &ChunkedColumn<T>) -> Option<T> {
    minmax(col, false)
}

/// Maximum element, or `None` for an empty column.
pub fn max<T: SimdElement>(col: &ChunkedColumn<T>) -> Option<T> {
    minmax(col, true)
}

fn minmax<T: SimdElement>(col: &ChunkedColumn<T>, is_max: bool) -> Option<T> {
    if col.is_empty() {
        return None;
    }
    let pick = move |a: T, b: T| {
        if is_max == (b > a) {
            b
        } else {
            a
        }
    };
    let process = |chunk: &[T]| {
        if chunk.is_empty() {
            None
        } else {
            Some(T::kernel_minmax(chunk, is_max))
        }
    };
    let merge = |a: Option<T>, b: Option<T>| match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (x, None) => x,
        (None, y) => y,
    };
    if run_sequential(col) {
        let mut best = None;
        for c in 0..col.num_chunks() {
            best = merge(best, process(col.chunk(c).unwrap_or(&[])));
        }
        return best;
    }
    parallel_chunk_reduce(col, None, &process, &merge)
}

/// Arithmetic mean as `f64`, or `None` for an empty column.
pub fn mean<T: SimdElement + ToPrimitive>(col: &ChunkedColumn<T>) -> Option<f64> {
    if col.is_empty() {
        return None;
    }
    let total = sum(col).to_f64()?;
    Some(total / col.len() as f64)
}

/// Number of elements; `0` for an empty column.
pub fn count<T: SimdElement>(col: &ChunkedColumn<T>) -> usize {
    col.len()
}

/// Product of all elements; `1` for an empty column. Integer products wrap.
pub fn product<T: SimdElement>(col: &ChunkedColumn<T>) -> T {
    let mut acc = T::one();
    for c in 0..col.num_chunks() {
        for &v in col.chunk(c).unwrap_or(&[]) {
            acc = T::mul_values(acc, v);
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::init_thread_pool;
    use crate::CHUNK_SIZE;

    #[test]
    fn test_sum_small_column() {
        let col = ChunkedColumn::from_slice(&[1.0f64, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(sum(&col), 10.0);
    }

    #[test]
    fn test_sum_empty_identity() {
        let col = ChunkedColumn::<i64>::from_slice(&[]).unwrap();
        assert_eq!(sum(&col), 0);
        assert_eq!(product(&col), 1);
        assert_eq!(count(&col), 0);
        assert_eq!(min(&col), None);
        assert_eq!(max(&col), None);
        assert_eq!(mean(&col), None);
    }

    #[test]
    fn test_cross_chunk_sum() {
        let data: Vec<i64> = (0..(CHUNK_SIZE * 2 + 100) as i64).map(|i| i % 100).collect();
        let col = ChunkedColumn::from_slice(&data).unwrap();
        let per_chunk: i64 = (0..CHUNK_SIZE as i64).map(|i| i % 100).sum();
        let tail: i64 = (0..100).sum();
        assert_eq!(sum(&col), 2 * per_chunk + tail);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        init_thread_pool().unwrap();
        let data: Vec<i64> = (0..(CHUNK_SIZE * 5) as i64).map(|i| (i * 31) % 1000 - 500).collect();
        let col = ChunkedColumn::from_slice(&data).unwrap();
        assert_eq!(sum(&col), data.iter().sum::<i64>());
        assert_eq!(min(&col), data.iter().min().copied());
        assert_eq!(max(&col), data.iter().max().copied());
    }

    #[test]
    fn test_mean() {
        let col = ChunkedColumn::from_slice(&[2.0f64, 4.0, 6.0, 8.0]).unwrap();
        assert_eq!(mean(&col), Some(5.0));
        let ints = ChunkedColumn::from_slice(&[1i64, 2, 3, 4]).unwrap();
        assert_eq!(mean(&ints), Some(2.5));
    }

    #[test]
    fn test_minmax_negative_values() {
        let col = ChunkedColumn::from_slice(&[-5.0f64, 3.0, -9.5, 7.25]).unwrap();
        assert_eq!(min(&col), Some(-9.5));
        assert_eq!(max(&col), Some(7.25));
    }
}
