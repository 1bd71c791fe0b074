//! # Galleon
//!
//! Cache-conscious, SIMD-accelerated execution core for columnar analytics:
//! chunked primitive columns, a work-stealing fork-join runtime, runtime
//! kernel dispatch over SSE4/AVX2/AVX-512 classes, and Swiss-table group-by.
//!
//! This crate is a library core; binary formats, I/O, query planning, and
//! result formatting live in surrounding collaborators. All state is
//! in-process: the detected SIMD level and the kernel dispatch table are
//! published once and read-only afterwards, and everything else is owned by
//! the caller.
//!
//! ```rust
//! use galleon::column::ChunkedColumn;
//! use galleon::{groupby, ops};
//!
//! let col = ChunkedColumn::from_slice(&[1.0f64, 5.0, 2.0, 8.0]).unwrap();
//! assert_eq!(ops::sum(&col), 16.0);
//! assert_eq!(ops::filter_gt(&col, 4.0).unwrap().to_vec(), vec![5.0, 8.0]);
//!
//! let result = groupby::groupby_sum_i64_f64(&[1, 2, 1], &[10.0, 20.0, 30.0]).unwrap();
//! assert_eq!(result.num_groups, 2);
//! ```

pub mod column;
pub mod error;
pub mod groupby;
pub mod ops;
pub mod parallel;
pub mod simd;

/// Elements per chunk buffer.
pub const CHUNK_SIZE: usize = 65_536;

/// Alignment of every chunk buffer, in bytes.
pub const CACHE_LINE_SIZE: usize = 64;

pub use column::{ChunkedColumn, Element};
pub use error::GalleonError;
pub use groupby::{
    groupby_multiagg_i64_f64, groupby_sum_i64_f64, groupby_sum_i64_f64_parallel,
    GroupByMultiAggResult, GroupBySumResult,
};
pub use parallel::{init_thread_pool, MAX_THREADS, MIN_PARALLEL_CHUNKS};
pub use simd::{get_simd_level, reinit_dispatch, reset_detection, set_simd_level, SimdLevel};
