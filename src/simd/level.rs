//! Runtime CPU vector-capability detection.
//!
//! The detected level is process-wide state: it is probed once on first use,
//! cached behind a mutex, and can be overridden for testing or pinned down by
//! an embedding binary (e.g. one that maps a `GALLEON_SIMD_LEVEL` environment
//! variable onto [`set_simd_level`]). After an override the kernel dispatch
//! table must be rebuilt with [`crate::simd::dispatch::reinit_dispatch`].

use std::str::FromStr;
use std::sync::Mutex;

use tracing::debug;

/// Vector width class of the executing CPU.
///
/// Levels are totally ordered by vector width. `Sse4` doubles as the 128-bit
/// class on non-x86 targets (NEON is treated as its peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    Scalar,
    Sse4,
    Avx2,
    Avx512,
}

impl SimdLevel {
    /// Width of one vector register in bytes.
    pub fn bytes_per_vector(self) -> usize {
        match self {
            SimdLevel::Scalar => 8,
            SimdLevel::Sse4 => 16,
            SimdLevel::Avx2 => 32,
            SimdLevel::Avx512 => 64,
        }
    }

    /// `f64` lanes per vector.
    pub fn lanes_f64(self) -> usize {
        self.bytes_per_vector() / 8
    }

    /// `f32` lanes per vector.
    pub fn lanes_f32(self) -> usize {
        self.bytes_per_vector() / 4
    }

    /// `i64` lanes per vector.
    pub fn lanes_i64(self) -> usize {
        self.bytes_per_vector() / 8
    }

    /// `i32` lanes per vector.
    pub fn lanes_i32(self) -> usize {
        self.bytes_per_vector() / 4
    }
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SimdLevel::Scalar => "scalar",
            SimdLevel::Sse4 => "sse4",
            SimdLevel::Avx2 => "avx2",
            SimdLevel::Avx512 => "avx512",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SimdLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scalar" => Ok(SimdLevel::Scalar),
            "sse4" => Ok(SimdLevel::Sse4),
            "avx2" => Ok(SimdLevel::Avx2),
            "avx512" => Ok(SimdLevel::Avx512),
            other => Err(format!("unknown SIMD level: {}", other)),
        }
    }
}

static DETECTED_LEVEL: Mutex<Option<SimdLevel>> = Mutex::new(None);

#[cfg(target_arch = "x86_64")]
fn detect_level() -> SimdLevel {
    if is_x86_feature_detected!("avx512f")
        && is_x86_feature_detected!("avx512vl")
        && is_x86_feature_detected!("avx512bw")
    {
        SimdLevel::Avx512
    } else if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
        SimdLevel::Avx2
    } else if is_x86_feature_detected!("sse4.1") {
        SimdLevel::Sse4
    } else {
        SimdLevel::Scalar
    }
}

#[cfg(target_arch = "aarch64")]
fn detect_level() -> SimdLevel {
    // NEON is mandatory on AArch64; treat it as the 128-bit class.
    SimdLevel::Sse4
}

#[cfg(target_arch = "arm")]
fn detect_level() -> SimdLevel {
    if cfg!(target_feature = "neon") {
        SimdLevel::Sse4
    } else {
        SimdLevel::Scalar
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm")))]
fn detect_level() -> SimdLevel {
    SimdLevel::Scalar
}

/// Returns the process-wide SIMD level, probing the CPU on first call.
pub fn get_simd_level() -> SimdLevel {
    let mut guard = DETECTED_LEVEL.lock().expect("simd level lock poisoned");
    match *guard {
        Some(level) => level,
        None => {
            let level = detect_level();
            debug!(level = %level, "detected SIMD level");
            *guard = Some(level);
            level
        }
    }
}

/// Overrides the cached SIMD level.
///
/// Callers must invoke [`crate::simd::dispatch::reinit_dispatch`] afterwards
/// so the kernel table matches the new level.
pub fn set_simd_level(level: SimdLevel) {
    let mut guard = DETECTED_LEVEL.lock().expect("simd level lock poisoned");
    debug!(level = %level, "SIMD level override");
    *guard = Some(level);
}

/// Clears the cached level; the next [`get_simd_level`] call re-probes.
pub fn reset_detection() {
    let mut guard = DETECTED_LEVEL.lock().expect("simd level lock poisoned");
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(SimdLevel::Scalar < SimdLevel::Sse4);
        assert!(SimdLevel::Sse4 < SimdLevel::Avx2);
        assert!(SimdLevel::Avx2 < SimdLevel::Avx512);
    }

    #[test]
    fn test_lane_widths() {
        assert_eq!(SimdLevel::Sse4.bytes_per_vector(), 16);
        assert_eq!(SimdLevel::Avx2.lanes_f64(), 4);
        assert_eq!(SimdLevel::Avx512.lanes_f64(), 8);
        assert_eq!(SimdLevel::Avx512.lanes_f32(), 16);
        assert_eq!(SimdLevel::Scalar.lanes_i64(), 1);
    }

    #[test]
    fn test_parse_roundtrip() {
        for level in [
            SimdLevel::Scalar,
            SimdLevel::Sse4,
            SimdLevel::Avx2,
            SimdLevel::Avx512,
        ] {
            let parsed: SimdLevel = level.to_string().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert_eq!("AVX2".parse::<SimdLevel>().unwrap(), SimdLevel::Avx2);
        assert!("avx1024".parse::<SimdLevel>().is_err());
    }

    #[test]
    fn test_override_and_reset() {
        set_simd_level(SimdLevel::Sse4);
        assert_eq!(get_simd_level(), SimdLevel::Sse4);
        reset_detection();
        // After reset, detection runs again and yields whatever the host has.
        let detected = get_simd_level();
        assert!(detected >= SimdLevel::Scalar);
    }
}
