//! Elementwise column arithmetic and comparisons.
//!
//! Outputs are fresh columns with the input's chunk shape. Work distributes
//! over chunks; these streams are bandwidth-bound, so the memory-bound
//! parallel floor applies. Worker-side allocation failures land in a
//! [`WorkerContext`] and surface after the join.

use rayon::prelude::*;

use crate::column::{AlignedChunk, ChunkedColumn};
use crate::error::GalleonError;
use crate::ops::SimdElement;
use crate::parallel::{
    should_parallelize, thread_pool, OpKind, WorkerContext, MIN_PARALLEL_CHUNKS,
};
use crate::simd::{kernel_table, CmpOp};

/// Element types with elementwise add/sub/mul kernels (plus scalar-broadcast
/// add/mul) in the dispatch table.
pub trait SimdArith: SimdElement {
    fn kernel_add(a: &[Self], b: &[Self], out: &mut [Self]);
    fn kernel_sub(a: &[Self], b: &[Self], out: &mut [Self]);
    fn kernel_mul(a: &[Self], b: &[Self], out: &mut [Self]);
    fn kernel_add_scalar(a: &[Self], s: Self, out: &mut [Self]);
    fn kernel_mul_scalar(a: &[Self], s: Self, out: &mut [Self]);
}

/// Float element types with a division kernel. Integer division stays out of
/// the kernel surface.
pub trait SimdFloatArith: SimdArith {
    fn kernel_div(a: &[Self], b: &[Self], out: &mut [Self]);
}

/// Element types with compare kernels writing 0/1 byte masks.
pub trait SimdCompare: SimdElement {
    fn kernel_cmp(a: &[Self], b: &[Self], out: &mut [u8], op: CmpOp);
}

macro_rules! simd_arith {
    ($ty:ty, $add:ident, $sub:ident, $mul:ident, $adds:ident, $muls:ident) => {
        impl SimdArith for $ty {
            fn kernel_add(a: &[Self], b: &[Self], out: &mut [Self]) {
                let table = kernel_table();
                unsafe { (table.$add)(a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), a.len()) }
            }

            fn kernel_sub(a: &[Self], b: &[Self], out: &mut [Self]) {
                let table = kernel_table();
                unsafe { (table.$sub)(a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), a.len()) }
            }

            fn kernel_mul(a: &[Self], b: &[Self], out: &mut [Self]) {
                let table = kernel_table();
                unsafe { (table.$mul)(a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), a.len()) }
            }

            fn kernel_add_scalar(a: &[Self], s: Self, out: &mut [Self]) {
                let table = kernel_table();
                unsafe { (table.$adds)(a.as_ptr(), s, out.as_mut_ptr(), a.len()) }
            }

            fn kernel_mul_scalar(a: &[Self], s: Self, out: &mut [Self]) {
                let table = kernel_table();
                unsafe { (table.$muls)(a.as_ptr(), s, out.as_mut_ptr(), a.len()) }
            }
        }
    };
}

simd_arith!(f32, add_f32, sub_f32, mul_f32, add_scalar_f32, mul_scalar_f32);
simd_arith!(f64, add_f64, sub_f64, mul_f64, add_scalar_f64, mul_scalar_f64);
simd_arith!(i64, add_i64, sub_i64, mul_i64, add_scalar_i64, mul_scalar_i64);

macro_rules! simd_float_arith {
    ($ty:ty, $div:ident) => {
        impl SimdFloatArith for $ty {
            fn kernel_div(a: &[Self], b: &[Self], out: &mut [Self]) {
                let table = kernel_table();
                unsafe { (table.$div)(a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), a.len()) }
            }
        }
    };
}

simd_float_arith!(f32, div_f32);
simd_float_arith!(f64, div_f64);

macro_rules! simd_compare {
    ($ty:ty, $cmp:ident) => {
        impl SimdCompare for $ty {
            fn kernel_cmp(a: &[Self], b: &[Self], out: &mut [u8], op: CmpOp) {
                let table = kernel_table();
                unsafe {
                    (table.$cmp)(a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), a.len(), op as i32)
                }
            }
        }
    };
}

simd_compare!(f64, cmp_f64);
simd_compare!(i64, cmp_i64);

fn check_lengths<T: SimdElement>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<(), GalleonError> {
    if a.len() != b.len() {
        return Err(GalleonError::InvalidInput(format!(
            "column length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

fn use_pool<T: SimdElement>(a: &ChunkedColumn<T>) -> bool {
    thread_pool().is_some()
        && a.num_chunks() >= MIN_PARALLEL_CHUNKS
        && should_parallelize(OpKind::MemoryBound, a.len())
}

/// Fills one output chunk per input chunk, in parallel above the memory-bound
/// floor. `fill` receives the chunk index and the sized output slice.
fn map_chunks<T, F>(a: &ChunkedColumn<T>, fill: &F) -> Result<ChunkedColumn<T>, GalleonError>
where
    T: SimdElement,
    F: Fn(usize, &mut [T]) + Sync,
{
    let num_chunks = a.num_chunks();
    let sizes = a.chunk_sizes().to_vec();
    let mut out: Vec<Option<AlignedChunk<T>>> = (0..num_chunks).map(|_| None).collect();
    if use_pool(a) {
        let ctx = WorkerContext::new();
        if let Some(pool) = thread_pool() {
            pool.install(|| {
                out.par_iter_mut().enumerate().for_each(|(c, slot)| {
                    match AlignedChunk::new() {
                        Ok(mut chunk) => {
                            fill(c, chunk.as_mut_slice(sizes[c]));
                            *slot = Some(chunk);
                        }
                        Err(e) => ctx.record_error(e.to_string()),
                    }
                });
            });
        }
        if let Some(err) = ctx.take_error() {
            return Err(err);
        }
    } else {
        for (c, slot) in out.iter_mut().enumerate() {
            let mut chunk = AlignedChunk::new()?;
            fill(c, chunk.as_mut_slice(sizes[c]));
            *slot = Some(chunk);
        }
    }
    let chunks = out
        .into_iter()
        .map(|slot| slot.ok_or_else(|| GalleonError::Memory("missing output chunk".to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ChunkedColumn::from_parts(chunks, sizes))
}

fn binary_op<T, K>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
    kernel: &K,
) -> Result<ChunkedColumn<T>, GalleonError>
where
    T: SimdElement,
    K: Fn(&[T], &[T], &mut [T]) + Sync,
{
    check_lengths(a, b)?;
    map_chunks(a, &|c, out: &mut [T]| {
        kernel(a.chunk(c).unwrap_or(&[]), b.chunk(c).unwrap_or(&[]), out)
    })
}

fn unary_op<T, K>(a: &ChunkedColumn<T>, kernel: &K) -> Result<ChunkedColumn<T>, GalleonError>
where
    T: SimdElement,
    K: Fn(&[T], &mut [T]) + Sync,
{
    map_chunks(a, &|c, out: &mut [T]| kernel(a.chunk(c).unwrap_or(&[]), out))
}

/// Elementwise `a + b`.
pub fn add<T: SimdArith>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<ChunkedColumn<T>, GalleonError> {
    binary_op(a, b, &T::kernel_add)
}

/// Elementwise `a - b`.
pub fn sub<T: SimdArith>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<ChunkedColumn<T>, GalleonError> {
    binary_op(a, b, &T::kernel_sub)
}

/// Elementwise `a * b`.
pub fn mul<T: SimdArith>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<ChunkedColumn<T>, GalleonError> {
    binary_op(a, b, &T::kernel_mul)
}

/// Elementwise `a / b`. Float only; division by zero follows IEEE semantics.
pub fn div<T: SimdFloatArith>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<ChunkedColumn<T>, GalleonError> {
    binary_op(a, b, &T::kernel_div)
}

/// Elementwise `a + s`.
pub fn add_scalar<T: SimdArith>(
    a: &ChunkedColumn<T>,
    s: T,
) -> Result<ChunkedColumn<T>, GalleonError> {
    unary_op(a, &move |x: &[T], out: &mut [T]| T::kernel_add_scalar(x, s, out))
}

/// Elementwise `a * s`.
pub fn mul_scalar<T: SimdArith>(
    a: &ChunkedColumn<T>,
    s: T,
) -> Result<ChunkedColumn<T>, GalleonError> {
    unary_op(a, &move |x: &[T], out: &mut [T]| T::kernel_mul_scalar(x, s, out))
}

/// Elementwise comparison, one `0`/`1` byte per row.
pub fn compare<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
    op: CmpOp,
) -> Result<Vec<u8>, GalleonError> {
    check_lengths(a, b)?;
    let mut out = vec![0u8; a.len()];
    let mut offset = 0;
    for c in 0..a.num_chunks() {
        let chunk_a = a.chunk(c).unwrap_or(&[]);
        let chunk_b = b.chunk(c).unwrap_or(&[]);
        T::kernel_cmp(chunk_a, chunk_b, &mut out[offset..offset + chunk_a.len()], op);
        offset += chunk_a.len();
    }
    Ok(out)
}

pub fn compare_gt<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<Vec<u8>, GalleonError> {
    compare(a, b, CmpOp::Gt)
}

pub fn compare_ge<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<Vec<u8>, GalleonError> {
    compare(a, b, CmpOp::Ge)
}

pub fn compare_lt<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<Vec<u8>, GalleonError> {
    compare(a, b, CmpOp::Lt)
}

pub fn compare_le<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<Vec<u8>, GalleonError> {
    compare(a, b, CmpOp::Le)
}

pub fn compare_eq<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<Vec<u8>, GalleonError> {
    compare(a, b, CmpOp::Eq)
}

pub fn compare_ne<T: SimdCompare>(
    a: &ChunkedColumn<T>,
    b: &ChunkedColumn<T>,
) -> Result<Vec<u8>, GalleonError> {
    compare(a, b, CmpOp::Ne)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHUNK_SIZE;

    #[test]
    fn test_add_f64() {
        let a = ChunkedColumn::from_slice(&[1.0f64, 2.0, 3.0]).unwrap();
        let b = ChunkedColumn::from_slice(&[10.0f64, 20.0, 30.0]).unwrap();
        let out = add(&a, &b).unwrap();
        assert_eq!(out.to_vec(), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let a = ChunkedColumn::from_slice(&[1.0f64, 2.0]).unwrap();
        let b = ChunkedColumn::from_slice(&[1.0f64]).unwrap();
        assert!(matches!(add(&a, &b), Err(GalleonError::InvalidInput(_))));
    }

    #[test]
    fn test_sub_mul_div_f64() {
        let a = ChunkedColumn::from_slice(&[10.0f64, 9.0, 8.0]).unwrap();
        let b = ChunkedColumn::from_slice(&[2.0f64, 3.0, 4.0]).unwrap();
        assert_eq!(sub(&a, &b).unwrap().to_vec(), vec![8.0, 6.0, 4.0]);
        assert_eq!(mul(&a, &b).unwrap().to_vec(), vec![20.0, 27.0, 32.0]);
        assert_eq!(div(&a, &b).unwrap().to_vec(), vec![5.0, 3.0, 2.0]);
    }

    #[test]
    fn test_f32_arithmetic() {
        let data_a: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let data_b: Vec<f32> = (0..100).map(|i| (i + 1) as f32).collect();
        let a = ChunkedColumn::from_slice(&data_a).unwrap();
        let b = ChunkedColumn::from_slice(&data_b).unwrap();
        let summed = add(&a, &b).unwrap();
        assert_eq!(summed.get(10), Some(21.0));
        let quotient = div(&a, &b).unwrap();
        let expected: Vec<f32> = data_a.iter().zip(data_b.iter()).map(|(x, y)| x / y).collect();
        assert_eq!(quotient.to_vec(), expected);
        assert_eq!(add_scalar(&a, 0.5f32).unwrap().get(0), Some(0.5));
        assert_eq!(mul_scalar(&a, 2.0f32).unwrap().get(3), Some(6.0));
    }

    #[test]
    fn test_i64_wrapping_add() {
        let a = ChunkedColumn::from_slice(&[i64::MAX, 1]).unwrap();
        let b = ChunkedColumn::from_slice(&[1i64, 1]).unwrap();
        assert_eq!(add(&a, &b).unwrap().to_vec(), vec![i64::MIN, 2]);
    }

    #[test]
    fn test_scalar_ops() {
        let a = ChunkedColumn::from_slice(&[1.0f64, 2.0, 3.0]).unwrap();
        assert_eq!(add_scalar(&a, 0.5).unwrap().to_vec(), vec![1.5, 2.5, 3.5]);
        assert_eq!(mul_scalar(&a, 2.0).unwrap().to_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_scalar_ops_cross_chunk() {
        crate::parallel::init_thread_pool().unwrap();
        let n = CHUNK_SIZE * 2 + 50;
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let a = ChunkedColumn::from_slice(&data).unwrap();
        let out = add_scalar(&a, 1.0).unwrap();
        assert_eq!(out.len(), n);
        assert_eq!(out.get(0), Some(1.0));
        assert_eq!(out.get(CHUNK_SIZE), Some(CHUNK_SIZE as f64 + 1.0));
        assert_eq!(out.get(n - 1), Some(n as f64));
    }

    #[test]
    fn test_compare_ops_cross_chunk() {
        let n = CHUNK_SIZE + 7;
        let data_a: Vec<i64> = (0..n as i64).collect();
        let data_b: Vec<i64> = vec![(n / 2) as i64; n];
        let a = ChunkedColumn::from_slice(&data_a).unwrap();
        let b = ChunkedColumn::from_slice(&data_b).unwrap();
        let mask = compare_gt(&a, &b).unwrap();
        assert_eq!(mask.len(), n);
        assert_eq!(mask[n / 2], 0);
        assert_eq!(mask[n / 2 + 1], 1);
        let lt = compare_lt(&a, &b).unwrap();
        assert_eq!(lt[0], 1);
        assert_eq!(lt[n - 1], 0);
    }
}
