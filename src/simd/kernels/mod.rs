//! Vectorized leaf kernels, one set per vector width class.
//!
//! Every kernel is exported with the C calling convention over raw
//! pointer/length pairs so alternate kernel crates can link against the same
//! dispatch table. Kernels are a vector body plus a scalar tail; reducers end
//! in a horizontal reduction. Integer sums wrap (two's complement). The filter
//! kernels emit row indices in input order.
//!
//! The portable set is compiled on every target and doubles as the 128-bit
//! (SSE4/NEON) class; the AVX2 and AVX-512 sets are x86-64 only and must be
//! installed in the dispatch table only when the CPU supports them.

pub mod portable;

#[cfg(target_arch = "x86_64")]
pub mod avx2;
#[cfg(target_arch = "x86_64")]
pub mod avx512;

/// Comparison selector shared by the `cmp_*` kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CmpOp {
    Gt = 0,
    Ge = 1,
    Lt = 2,
    Le = 3,
    Eq = 4,
    Ne = 5,
}

impl CmpOp {
    /// Recovers a selector passed through an `extern "C"` boundary.
    pub fn from_raw(raw: i32) -> CmpOp {
        match raw {
            0 => CmpOp::Gt,
            1 => CmpOp::Ge,
            2 => CmpOp::Lt,
            3 => CmpOp::Le,
            4 => CmpOp::Eq,
            _ => CmpOp::Ne,
        }
    }
}

// Reductions. `minmax` takes an `is_max` selector; callers must not pass an
// empty slice to `minmax` kernels.
pub type SumF32Fn = unsafe extern "C" fn(*const f32, usize) -> f32;
pub type SumF64Fn = unsafe extern "C" fn(*const f64, usize) -> f64;
pub type SumI32Fn = unsafe extern "C" fn(*const i32, usize) -> i32;
pub type SumI64Fn = unsafe extern "C" fn(*const i64, usize) -> i64;
pub type MinMaxF32Fn = unsafe extern "C" fn(*const f32, usize, i32) -> f32;
pub type MinMaxF64Fn = unsafe extern "C" fn(*const f64, usize, i32) -> f64;
pub type MinMaxI32Fn = unsafe extern "C" fn(*const i32, usize, i32) -> i32;
pub type MinMaxI64Fn = unsafe extern "C" fn(*const i64, usize, i32) -> i64;

// Elementwise binary and scalar-broadcast forms.
pub type BinaryF32Fn = unsafe extern "C" fn(*const f32, *const f32, *mut f32, usize);
pub type BinaryF64Fn = unsafe extern "C" fn(*const f64, *const f64, *mut f64, usize);
pub type BinaryI64Fn = unsafe extern "C" fn(*const i64, *const i64, *mut i64, usize);
pub type ScalarF32Fn = unsafe extern "C" fn(*const f32, f32, *mut f32, usize);
pub type ScalarF64Fn = unsafe extern "C" fn(*const f64, f64, *mut f64, usize);
pub type ScalarI64Fn = unsafe extern "C" fn(*const i64, i64, *mut i64, usize);

// Compare, writing a 0/1 byte per row.
pub type CmpF64Fn = unsafe extern "C" fn(*const f64, *const f64, *mut u8, usize, i32);
pub type CmpI64Fn = unsafe extern "C" fn(*const i64, *const i64, *mut u8, usize, i32);

// Predicate scan emitting matching row indices; returns the match count.
// `out_idx` must hold at least `len` entries.
pub type FilterF64Fn = unsafe extern "C" fn(*const f64, usize, f64, *mut u32) -> usize;
pub type FilterI64Fn = unsafe extern "C" fn(*const i64, usize, i64, *mut u32) -> usize;

// Hashing.
pub type HashI64Fn = unsafe extern "C" fn(*const i64, usize, *mut u64);
pub type CombineHashesFn = unsafe extern "C" fn(u64, u64) -> u64;

// Indexed loads.
pub type GatherF32Fn = unsafe extern "C" fn(*const f32, *const u32, usize, *mut f32);
pub type GatherF64Fn = unsafe extern "C" fn(*const f64, *const u32, usize, *mut f64);
pub type GatherI32Fn = unsafe extern "C" fn(*const i32, *const u32, usize, *mut i32);
pub type GatherI64Fn = unsafe extern "C" fn(*const i64, *const u32, usize, *mut i64);

// Dense per-group aggregation over a group-id stream. Accumulator arrays must
// be pre-initialized by the caller (sums/counts zeroed, mins +inf, maxs -inf)
// and sized to the group count; every group id must be in range.
pub type GroupAggF64Fn = unsafe extern "C" fn(*const f64, *const u32, usize, *mut f64);
pub type GroupCountFn = unsafe extern "C" fn(*const u32, usize, *mut u64);
pub type GroupMultiAggF64Fn =
    unsafe extern "C" fn(*const f64, *const u32, usize, *mut f64, *mut f64, *mut f64, *mut u64);
