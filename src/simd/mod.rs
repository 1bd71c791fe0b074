//! Runtime SIMD capability detection and kernel dispatch.

pub mod dispatch;
pub mod kernels;
pub mod level;

pub use dispatch::{kernel_table, reinit_dispatch, KernelTable};
pub use kernels::CmpOp;
pub use level::{get_simd_level, reset_detection, set_simd_level, SimdLevel};
