//! Column-level operations composed from the parallel runtime and the SIMD
//! kernel dispatch table.

pub mod aggregate;
pub mod arithmetic;
pub mod filter;
pub mod sort;

pub use aggregate::{count, max, mean, min, product, sum};
pub use arithmetic::{
    add, add_scalar, compare, compare_eq, compare_ge, compare_gt, compare_le, compare_lt,
    compare_ne, div, mul, mul_scalar, sub,
};
pub use filter::{filter, filter_gt, filter_lt};
pub use sort::{argsort, sort};

use crate::column::Element;
use crate::simd::kernel_table;

/// Element types with monomorphized kernels in the dispatch table.
///
/// Everything routes through the process-wide table, so the active SIMD level
/// decides which implementation actually runs. No dynamic dispatch happens on
/// the element type itself.
pub trait SimdElement: Element {
    /// Wrapping addition for integers, IEEE addition for floats.
    fn add_values(a: Self, b: Self) -> Self;
    /// Wrapping multiplication for integers, IEEE multiplication for floats.
    fn mul_values(a: Self, b: Self) -> Self;
    /// Multiplicative identity.
    fn one() -> Self;
    fn kernel_sum(data: &[Self]) -> Self;
    /// Caller must not pass an empty slice.
    fn kernel_minmax(data: &[Self], is_max: bool) -> Self;
    /// `indices` must all be in range for `src`; `out.len() == indices.len()`.
    fn kernel_gather(src: &[Self], indices: &[u32], out: &mut [Self]);
}

macro_rules! simd_element {
    ($ty:ty, $sum:ident, $minmax:ident, $gather:ident, $add:expr, $mul:expr, $one:expr) => {
        impl SimdElement for $ty {
            #[inline]
            fn add_values(a: Self, b: Self) -> Self {
                $add(a, b)
            }

            #[inline]
            fn mul_values(a: Self, b: Self) -> Self {
                $mul(a, b)
            }

            #[inline]
            fn one() -> Self {
                $one
            }

            fn kernel_sum(data: &[Self]) -> Self {
                let table = kernel_table();
                unsafe { (table.$sum)(data.as_ptr(), data.len()) }
            }

            fn kernel_minmax(data: &[Self], is_max: bool) -> Self {
                debug_assert!(!data.is_empty());
                let table = kernel_table();
                unsafe { (table.$minmax)(data.as_ptr(), data.len(), is_max as i32) }
            }

            fn kernel_gather(src: &[Self], indices: &[u32], out: &mut [Self]) {
                debug_assert_eq!(indices.len(), out.len());
                debug_assert!(indices.iter().all(|&i| (i as usize) < src.len()));
                let table = kernel_table();
                unsafe {
                    (table.$gather)(src.as_ptr(), indices.as_ptr(), indices.len(), out.as_mut_ptr())
                }
            }
        }
    };
}

simd_element!(f32, sum_f32, minmax_f32, gather_f32, |a, b| a + b, |a, b| a * b, 1.0);
simd_element!(f64, sum_f64, minmax_f64, gather_f64, |a, b| a + b, |a, b| a * b, 1.0);
simd_element!(
    i32,
    sum_i32,
    minmax_i32,
    gather_i32,
    i32::wrapping_add,
    i32::wrapping_mul,
    1
);
simd_element!(
    i64,
    sum_i64,
    minmax_i64,
    gather_i64,
    i64::wrapping_add,
    i64::wrapping_mul,
    1
);
