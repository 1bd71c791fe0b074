//! Function-pointer dispatch over the kernel sets.
//!
//! The table is published once per process through an atomic pointer
//! (double-checked against a mutex on the slow path). `scalar` resolves to the
//! portable set, which is always compiled. After [`crate::simd::set_simd_level`]
//! the table must be rebuilt with [`reinit_dispatch`].

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::simd::kernels::portable;
use crate::simd::kernels::*;
use crate::simd::level::{get_simd_level, SimdLevel};

/// Vtable of leaf kernels for the active vector width class.
///
/// One entry per (operation, element type) pair. Selection is data, not
/// inheritance: the whole table is swapped, never individual entries.
pub struct KernelTable {
    pub sum_f32: SumF32Fn,
    pub sum_f64: SumF64Fn,
    pub sum_i32: SumI32Fn,
    pub sum_i64: SumI64Fn,
    pub minmax_f32: MinMaxF32Fn,
    pub minmax_f64: MinMaxF64Fn,
    pub minmax_i32: MinMaxI32Fn,
    pub minmax_i64: MinMaxI64Fn,
    pub add_f32: BinaryF32Fn,
    pub sub_f32: BinaryF32Fn,
    pub mul_f32: BinaryF32Fn,
    pub div_f32: BinaryF32Fn,
    pub add_f64: BinaryF64Fn,
    pub sub_f64: BinaryF64Fn,
    pub mul_f64: BinaryF64Fn,
    pub div_f64: BinaryF64Fn,
    pub add_i64: BinaryI64Fn,
    pub sub_i64: BinaryI64Fn,
    pub mul_i64: BinaryI64Fn,
    pub add_scalar_f32: ScalarF32Fn,
    pub mul_scalar_f32: ScalarF32Fn,
    pub add_scalar_f64: ScalarF64Fn,
    pub mul_scalar_f64: ScalarF64Fn,
    pub add_scalar_i64: ScalarI64Fn,
    pub mul_scalar_i64: ScalarI64Fn,
    pub cmp_f64: CmpF64Fn,
    pub cmp_i64: CmpI64Fn,
    pub filter_gt_f64: FilterF64Fn,
    pub filter_gt_i64: FilterI64Fn,
    pub hash_i64: HashI64Fn,
    pub combine_hashes: CombineHashesFn,
    pub gather_f32: GatherF32Fn,
    pub gather_f64: GatherF64Fn,
    pub gather_i32: GatherI32Fn,
    pub gather_i64: GatherI64Fn,
    pub group_sum_f64: GroupAggF64Fn,
    pub group_min_f64: GroupAggF64Fn,
    pub group_max_f64: GroupAggF64Fn,
    pub group_count: GroupCountFn,
    pub group_multiagg_f64: GroupMultiAggF64Fn,
}

static PORTABLE_TABLE: KernelTable = KernelTable {
    sum_f32: portable::sum_f32,
    sum_f64: portable::sum_f64,
    sum_i32: portable::sum_i32,
    sum_i64: portable::sum_i64,
    minmax_f32: portable::minmax_f32,
    minmax_f64: portable::minmax_f64,
    minmax_i32: portable::minmax_i32,
    minmax_i64: portable::minmax_i64,
    add_f32: portable::add_f32,
    sub_f32: portable::sub_f32,
    mul_f32: portable::mul_f32,
    div_f32: portable::div_f32,
    add_f64: portable::add_f64,
    sub_f64: portable::sub_f64,
    mul_f64: portable::mul_f64,
    div_f64: portable::div_f64,
    add_i64: portable::add_i64,
    sub_i64: portable::sub_i64,
    mul_i64: portable::mul_i64,
    add_scalar_f32: portable::add_scalar_f32,
    mul_scalar_f32: portable::mul_scalar_f32,
    add_scalar_f64: portable::add_scalar_f64,
    mul_scalar_f64: portable::mul_scalar_f64,
    add_scalar_i64: portable::add_scalar_i64,
    mul_scalar_i64: portable::mul_scalar_i64,
    cmp_f64: portable::cmp_f64,
    cmp_i64: portable::cmp_i64,
    filter_gt_f64: portable::filter_gt_f64,
    filter_gt_i64: portable::filter_gt_i64,
    hash_i64: portable::hash_i64,
    combine_hashes: portable::combine_hashes_kernel,
    gather_f32: portable::gather_f32,
    gather_f64: portable::gather_f64,
    gather_i32: portable::gather_i32,
    gather_i64: portable::gather_i64,
    group_sum_f64: portable::group_sum_f64,
    group_min_f64: portable::group_min_f64,
    group_max_f64: portable::group_max_f64,
    group_count: portable::group_count,
    group_multiagg_f64: portable::group_multiagg_f64,
};

// 64-bit integer min/max and multiply have no 256-bit instruction, and the
// hash/gather/group-aggregate kernels are port-bound, so those entries keep
// the portable functions.
#[cfg(target_arch = "x86_64")]
static AVX2_TABLE: KernelTable = KernelTable {
    sum_f32: avx2::sum_f32,
    sum_f64: avx2::sum_f64,
    sum_i32: avx2::sum_i32,
    sum_i64: avx2::sum_i64,
    minmax_f32: avx2::minmax_f32,
    minmax_f64: avx2::minmax_f64,
    minmax_i32: avx2::minmax_i32,
    minmax_i64: portable::minmax_i64,
    add_f32: avx2::add_f32,
    sub_f32: avx2::sub_f32,
    mul_f32: avx2::mul_f32,
    div_f32: avx2::div_f32,
    add_f64: avx2::add_f64,
    sub_f64: avx2::sub_f64,
    mul_f64: avx2::mul_f64,
    div_f64: avx2::div_f64,
    add_i64: avx2::add_i64,
    sub_i64: avx2::sub_i64,
    mul_i64: portable::mul_i64,
    add_scalar_f32: avx2::add_scalar_f32,
    mul_scalar_f32: avx2::mul_scalar_f32,
    add_scalar_f64: avx2::add_scalar_f64,
    mul_scalar_f64: avx2::mul_scalar_f64,
    add_scalar_i64: portable::add_scalar_i64,
    mul_scalar_i64: portable::mul_scalar_i64,
    cmp_f64: avx2::cmp_f64,
    cmp_i64: avx2::cmp_i64,
    filter_gt_f64: avx2::filter_gt_f64,
    filter_gt_i64: avx2::filter_gt_i64,
    hash_i64: portable::hash_i64,
    combine_hashes: portable::combine_hashes_kernel,
    gather_f32: portable::gather_f32,
    gather_f64: portable::gather_f64,
    gather_i32: portable::gather_i32,
    gather_i64: portable::gather_i64,
    group_sum_f64: avx2::group_sum_f64,
    group_min_f64: portable::group_min_f64,
    group_max_f64: portable::group_max_f64,
    group_count: portable::group_count,
    group_multiagg_f64: avx2::group_multiagg_f64,
};

#[cfg(target_arch = "x86_64")]
static AVX512_TABLE: KernelTable = KernelTable {
    sum_f32: avx512::sum_f32,
    sum_f64: avx512::sum_f64,
    sum_i32: avx512::sum_i32,
    sum_i64: avx512::sum_i64,
    minmax_f32: avx512::minmax_f32,
    minmax_f64: avx512::minmax_f64,
    minmax_i32: avx512::minmax_i32,
    minmax_i64: avx512::minmax_i64,
    add_f32: avx512::add_f32,
    sub_f32: avx512::sub_f32,
    mul_f32: avx512::mul_f32,
    div_f32: avx512::div_f32,
    add_f64: avx512::add_f64,
    sub_f64: avx512::sub_f64,
    mul_f64: avx512::mul_f64,
    div_f64: avx512::div_f64,
    add_i64: avx512::add_i64,
    sub_i64: avx512::sub_i64,
    mul_i64: portable::mul_i64,
    add_scalar_f32: avx512::add_scalar_f32,
    mul_scalar_f32: avx512::mul_scalar_f32,
    add_scalar_f64: avx512::add_scalar_f64,
    mul_scalar_f64: avx512::mul_scalar_f64,
    add_scalar_i64: portable::add_scalar_i64,
    mul_scalar_i64: portable::mul_scalar_i64,
    cmp_f64: avx512::cmp_f64,
    cmp_i64: avx512::cmp_i64,
    filter_gt_f64: avx512::filter_gt_f64,
    filter_gt_i64: avx512::filter_gt_i64,
    hash_i64: portable::hash_i64,
    combine_hashes: portable::combine_hashes_kernel,
    gather_f32: portable::gather_f32,
    gather_f64: portable::gather_f64,
    gather_i32: portable::gather_i32,
    gather_i64: portable::gather_i64,
    group_sum_f64: avx2::group_sum_f64,
    group_min_f64: portable::group_min_f64,
    group_max_f64: portable::group_max_f64,
    group_count: portable::group_count,
    group_multiagg_f64: avx2::group_multiagg_f64,
};

static TABLE_PTR: AtomicPtr<KernelTable> = AtomicPtr::new(ptr::null_mut());
static INIT_LOCK: Mutex<()> = Mutex::new(());

#[cfg(target_arch = "x86_64")]
fn hardware_ceiling() -> SimdLevel {
    if is_x86_feature_detected!("avx512f")
        && is_x86_feature_detected!("avx512vl")
        && is_x86_feature_detected!("avx512bw")
    {
        SimdLevel::Avx512
    } else if is_x86_feature_detected!("avx2") {
        SimdLevel::Avx2
    } else {
        SimdLevel::Sse4
    }
}

#[cfg(target_arch = "x86_64")]
fn select_table(level: SimdLevel) -> &'static KernelTable {
    // An override above the hardware's capability must not install kernels
    // the CPU cannot execute.
    match level.min(hardware_ceiling()) {
        SimdLevel::Avx512 => &AVX512_TABLE,
        SimdLevel::Avx2 => &AVX2_TABLE,
        SimdLevel::Sse4 | SimdLevel::Scalar => &PORTABLE_TABLE,
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn select_table(_level: SimdLevel) -> &'static KernelTable {
    &PORTABLE_TABLE
}

/// Returns the process-wide kernel table, initializing it on first use.
pub fn kernel_table() -> &'static KernelTable {
    let p = TABLE_PTR.load(Ordering::Acquire);
    if !p.is_null() {
        return unsafe { &*p };
    }
    init_slow()
}

#[cold]
fn init_slow() -> &'static KernelTable {
    let _guard = INIT_LOCK.lock().expect("dispatch init lock poisoned");
    let p = TABLE_PTR.load(Ordering::Acquire);
    if !p.is_null() {
        return unsafe { &*p };
    }
    let level = get_simd_level();
    let table = select_table(level);
    debug!(level = %level, "kernel dispatch table initialized");
    TABLE_PTR.store(table as *const KernelTable as *mut KernelTable, Ordering::Release);
    table
}

/// Rebuilds the table from the current SIMD level.
///
/// Must be called after [`crate::simd::set_simd_level`]; in-flight operations
/// keep the table reference they already loaded.
pub fn reinit_dispatch() {
    let _guard = INIT_LOCK.lock().expect("dispatch init lock poisoned");
    let level = get_simd_level();
    let table = select_table(level);
    debug!(level = %level, "kernel dispatch table reinitialized");
    TABLE_PTR.store(table as *const KernelTable as *mut KernelTable, Ordering::Release);
}
