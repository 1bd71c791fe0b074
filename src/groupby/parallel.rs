//! Radix-partitioned parallel group-by.
//!
//! Rows are partitioned on hash bits `(hash >> 20) & 63`; workers own
//! partitions, each building a private Swiss table, and the per-partition
//! results concatenate directly. Partitioning is exact on hash bits, so a key
//! lives in exactly one partition and no cross-partition merge is needed.
//! Small inputs delegate to the single-threaded path; the row floor is a
//! tunable, not a promise.

use rayon::prelude::*;
use tracing::debug;

use crate::error::GalleonError;
use crate::groupby::hash::hash_i64_slice;
use crate::groupby::swiss::SwissSumTable;
use crate::groupby::{check_groupby_inputs, groupby_sum_i64_f64, GroupBySumResult};
use crate::parallel::thread_pool;

pub const NUM_PARTITIONS: usize = 64;
pub const PARTITION_BITS: u32 = 6;
pub const PARTITION_MASK: u64 = 63;

/// Row floor below which the parallel entry point stays single-threaded.
pub const PARALLEL_GROUPBY_MIN_ROWS: usize = 262_144;

#[inline(always)]
fn partition_of(hash: u64) -> usize {
    ((hash >> 20) & PARTITION_MASK) as usize
}

/// Group-by sum over `(keys, values)` with radix-partitioned workers.
pub fn groupby_sum_i64_f64_parallel(
    keys: &[i64],
    values: &[f64],
) -> Result<GroupBySumResult, GalleonError> {
    check_groupby_inputs(keys.len(), values.len())?;
    let Some(pool) = thread_pool() else {
        return groupby_sum_i64_f64(keys, values);
    };
    if keys.len() < PARALLEL_GROUPBY_MIN_ROWS {
        return groupby_sum_i64_f64(keys, values);
    }
    debug!(rows = keys.len(), "radix-partitioned group-by");

    let mut hashes = vec![0u64; keys.len()];
    hash_i64_slice(keys, &mut hashes);

    // Scatter row indices; each row lands in exactly one partition.
    let mut partitions: Vec<Vec<u32>> = (0..NUM_PARTITIONS)
        .map(|_| Vec::with_capacity(keys.len() / NUM_PARTITIONS + 1))
        .collect();
    for (row, &hash) in hashes.iter().enumerate() {
        partitions[partition_of(hash)].push(row as u32);
    }

    // Workers own whole partitions; tables and output buffers are private
    // until the final concatenation.
    let per_partition: Vec<(Vec<i64>, Vec<f64>)> = pool.install(|| {
        partitions
            .par_iter()
            .map(|rows| {
                let mut table = SwissSumTable::with_capacity(rows.len() / 8);
                for &row in rows {
                    table.insert_or_add(keys[row as usize], values[row as usize]);
                }
                table.extract()
            })
            .collect()
    });

    let num_groups: usize = per_partition.iter().map(|(k, _)| k.len()).sum();
    let mut out_keys = Vec::with_capacity(num_groups);
    let mut out_sums = Vec::with_capacity(num_groups);
    for (k, s) in per_partition {
        out_keys.extend_from_slice(&k);
        out_sums.extend_from_slice(&s);
    }
    Ok(GroupBySumResult {
        keys: out_keys,
        sums: out_sums,
        num_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::init_thread_pool;

    #[test]
    fn test_partition_of_uses_six_bits() {
        for hash in [0u64, u64::MAX, 0xFFF0_0000, 1 << 20, 63 << 20] {
            assert!(partition_of(hash) < NUM_PARTITIONS);
        }
        assert_eq!(partition_of(0), 0);
        assert_eq!(partition_of(63 << 20), 63);
        assert_eq!(partition_of(1 << 26), 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        init_thread_pool().unwrap();
        let n = PARALLEL_GROUPBY_MIN_ROWS + 1000;
        let keys: Vec<i64> = (0..n as i64).map(|i| i % 997).collect();
        let values: Vec<f64> = (0..n).map(|i| (i % 13) as f64).collect();
        let parallel = groupby_sum_i64_f64_parallel(&keys, &values).unwrap();
        let sequential = groupby_sum_i64_f64(&keys, &values).unwrap();
        assert_eq!(parallel.num_groups, sequential.num_groups);
        let p = parallel.sorted_by_key();
        let s = sequential.sorted_by_key();
        assert_eq!(p.keys, s.keys);
        for (a, b) in p.sums.iter().zip(s.sums.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_small_input_delegates() {
        init_thread_pool().unwrap();
        let keys = vec![1i64, 2, 1, 3, 2, 1];
        let values = vec![1.0; 6];
        let result = groupby_sum_i64_f64_parallel(&keys, &values).unwrap();
        assert_eq!(result.num_groups, 3);
        let sorted = result.sorted_by_key();
        assert_eq!(sorted.keys, vec![1, 2, 3]);
        assert_eq!(sorted.sums, vec![3.0, 2.0, 1.0]);
    }
}
