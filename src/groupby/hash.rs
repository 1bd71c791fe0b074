//! Key hashing for the group-by engine.
//!
//! `rapid_hash64` mixes through one widening multiply: the two 64-bit
//! operands are the key xored with fixed secrets, and the 128-bit product is
//! folded by xoring its halves. Cheap enough to recompute on rehash, strong
//! enough that the Swiss control bytes stay well distributed.

use crate::simd::kernel_table;

pub const RAPID_SECRET_0: u64 = 0x2d358dccaa6c78a5;
pub const RAPID_SECRET_1: u64 = 0x8bb84b93962eacc9;
pub const RAPID_SECRET_2: u64 = 0x4b33a62ed433d4a3;

/// 64-bit mix of a single key.
#[inline(always)]
pub fn rapid_hash64(x: u64) -> u64 {
    let a = x ^ RAPID_SECRET_0;
    let b = x ^ RAPID_SECRET_1;
    let m = (a as u128) * (b as u128);
    ((m as u64) ^ ((m >> 64) as u64)) ^ RAPID_SECRET_2
}

/// Seeded mixing of two hashes, for chaining multi-part keys.
#[inline(always)]
pub fn combine_hashes(seed: u64, h: u64) -> u64 {
    let a = seed ^ RAPID_SECRET_0;
    let b = h ^ RAPID_SECRET_1;
    let m = (a as u128) * (b as u128);
    ((m as u64) ^ ((m >> 64) as u64)) ^ RAPID_SECRET_2
}

/// Per-lane hashing of a key slice through the dispatch table.
pub fn hash_i64_slice(keys: &[i64], out: &mut [u64]) {
    debug_assert_eq!(keys.len(), out.len());
    let table = kernel_table();
    unsafe { (table.hash_i64)(keys.as_ptr(), keys.len(), out.as_mut_ptr()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(rapid_hash64(42), rapid_hash64(42));
        assert_ne!(rapid_hash64(42), rapid_hash64(43));
    }

    #[test]
    fn test_hash_spreads_sequential_keys() {
        // Sequential keys must not collide in the top 7 bits too often; the
        // Swiss control byte depends on them.
        let mut tags = std::collections::HashSet::new();
        for k in 0..128u64 {
            tags.insert(rapid_hash64(k) >> 57);
        }
        assert!(tags.len() > 32);
    }

    #[test]
    fn test_combine_hashes_order_matters() {
        let a = rapid_hash64(1);
        let b = rapid_hash64(2);
        assert_ne!(combine_hashes(a, b), combine_hashes(b, a));
    }

    #[test]
    fn test_hash_slice_matches_scalar() {
        let keys: Vec<i64> = vec![-5, 0, 1, 7, i64::MAX, i64::MIN, 1234567];
        let mut out = vec![0u64; keys.len()];
        hash_i64_slice(&keys, &mut out);
        for (k, h) in keys.iter().zip(out.iter()) {
            assert_eq!(*h, rapid_hash64(*k as u64));
        }
    }
}
