//! Two-phase group-by: assign dense group ids, then aggregate into dense
//! arrays.
//!
//! Phase 1 walks the rows once, probing a [`GroupIdTable`] to turn each hash
//! into a dense group id. Phase 2 runs one or more per-group kernels over
//! `(values, group_ids)`; the accumulator arrays are indexed directly by group
//! id, so the kernels stream with software prefetch instead of probing.

use crate::groupby::swiss::GroupIdTable;
use crate::simd::kernel_table;

/// Dense group assignment for a row batch.
pub struct GroupByResult {
    /// Per-row group id in `[0, num_groups)`.
    pub group_ids: Vec<u32>,
    pub num_groups: usize,
}

/// [`GroupByResult`] extended with per-group bookkeeping.
pub struct GroupByResultExt {
    pub group_ids: Vec<u32>,
    pub num_groups: usize,
    /// First row index of each group, indexed by group id.
    pub first_row_idx: Vec<u32>,
    /// Row count of each group, indexed by group id.
    pub group_counts: Vec<u64>,
}

/// Assigns dense group ids by hash equality.
pub fn compute_group_ids(hashes: &[u64]) -> GroupByResult {
    let mut table = GroupIdTable::with_capacity(hashes.len() / 8);
    let mut group_ids = Vec::with_capacity(hashes.len());
    for (row, &hash) in hashes.iter().enumerate() {
        group_ids.push(table.lookup_or_insert(hash, row as u32));
    }
    GroupByResult {
        group_ids,
        num_groups: table.len(),
    }
}

/// [`compute_group_ids`] plus first-row indices and group counts.
pub fn compute_group_ids_ext(hashes: &[u64]) -> GroupByResultExt {
    let mut table = GroupIdTable::with_capacity(hashes.len() / 8);
    let mut group_ids = Vec::with_capacity(hashes.len());
    for (row, &hash) in hashes.iter().enumerate() {
        group_ids.push(table.lookup_or_insert(hash, row as u32));
    }
    let num_groups = table.len();
    let first_row_idx = table.first_rows();
    let group_counts = count_by_group(&group_ids, num_groups);
    GroupByResultExt {
        group_ids,
        num_groups,
        first_row_idx,
        group_counts,
    }
}

/// Assigns dense group ids with key verification: a hash match joins a group
/// only when the key at the group's first row equals the key at this row.
pub fn compute_group_ids_with_keys(hashes: &[u64], keys: &[i64]) -> GroupByResult {
    debug_assert_eq!(hashes.len(), keys.len());
    let mut table = GroupIdTable::with_capacity(hashes.len() / 8);
    let mut group_ids = Vec::with_capacity(hashes.len());
    for (row, &hash) in hashes.iter().enumerate() {
        let key = keys[row];
        let id = table.lookup_or_insert_with(hash, row as u32, |first_row| {
            keys[first_row as usize] == key
        });
        group_ids.push(id);
    }
    GroupByResult {
        group_ids,
        num_groups: table.len(),
    }
}

/// Per-group sums over a dense group-id stream.
pub fn sum_by_group(values: &[f64], group_ids: &[u32], num_groups: usize) -> Vec<f64> {
    debug_assert_eq!(values.len(), group_ids.len());
    debug_assert!(group_ids.iter().all(|&g| (g as usize) < num_groups));
    let mut sums = vec![0.0; num_groups];
    let table = kernel_table();
    unsafe {
        (table.group_sum_f64)(values.as_ptr(), group_ids.as_ptr(), values.len(), sums.as_mut_ptr())
    };
    sums
}

/// Per-group minimums; groups with no rows stay `+inf`.
pub fn min_by_group(values: &[f64], group_ids: &[u32], num_groups: usize) -> Vec<f64> {
    debug_assert_eq!(values.len(), group_ids.len());
    let mut mins = vec![f64::INFINITY; num_groups];
    let table = kernel_table();
    unsafe {
        (table.group_min_f64)(values.as_ptr(), group_ids.as_ptr(), values.len(), mins.as_mut_ptr())
    };
    mins
}

/// Per-group maximums; groups with no rows stay `-inf`.
pub fn max_by_group(values: &[f64], group_ids: &[u32], num_groups: usize) -> Vec<f64> {
    debug_assert_eq!(values.len(), group_ids.len());
    let mut maxs = vec![f64::NEG_INFINITY; num_groups];
    let table = kernel_table();
    unsafe {
        (table.group_max_f64)(values.as_ptr(), group_ids.as_ptr(), values.len(), maxs.as_mut_ptr())
    };
    maxs
}

/// Per-group row counts.
pub fn count_by_group(group_ids: &[u32], num_groups: usize) -> Vec<u64> {
    let mut counts = vec![0u64; num_groups];
    let table = kernel_table();
    unsafe { (table.group_count)(group_ids.as_ptr(), group_ids.len(), counts.as_mut_ptr()) };
    counts
}

/// All four aggregates in one fused pass.
#[allow(clippy::type_complexity)]
pub fn multiagg_by_group(
    values: &[f64],
    group_ids: &[u32],
    num_groups: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<u64>) {
    debug_assert_eq!(values.len(), group_ids.len());
    let mut sums = vec![0.0; num_groups];
    let mut mins = vec![f64::INFINITY; num_groups];
    let mut maxs = vec![f64::NEG_INFINITY; num_groups];
    let mut counts = vec![0u64; num_groups];
    let table = kernel_table();
    unsafe {
        (table.group_multiagg_f64)(
            values.as_ptr(),
            group_ids.as_ptr(),
            values.len(),
            sums.as_mut_ptr(),
            mins.as_mut_ptr(),
            maxs.as_mut_ptr(),
            counts.as_mut_ptr(),
        )
    };
    (sums, mins, maxs, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupby::hash::rapid_hash64;

    #[test]
    fn test_compute_group_ids_scenario() {
        let hashes: Vec<u64> = [100u64, 200, 100, 300, 200, 100]
            .iter()
            .map(|&k| rapid_hash64(k))
            .collect();
        let result = compute_group_ids(&hashes);
        assert_eq!(result.num_groups, 3);
        let ids = &result.group_ids;
        assert_eq!(ids[0], ids[2]);
        assert_eq!(ids[0], ids[5]);
        assert_eq!(ids[1], ids[4]);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[3]);
        assert_ne!(ids[1], ids[3]);
        assert_eq!(*ids.iter().max().unwrap() as usize + 1, result.num_groups);
    }

    #[test]
    fn test_compute_group_ids_ext_bookkeeping() {
        let hashes: Vec<u64> = [7u64, 8, 7, 9, 8, 7]
            .iter()
            .map(|&k| rapid_hash64(k))
            .collect();
        let result = compute_group_ids_ext(&hashes);
        assert_eq!(result.num_groups, 3);
        assert_eq!(result.first_row_idx.len(), 3);
        assert_eq!(result.group_counts.len(), 3);
        let g0 = result.group_ids[0] as usize;
        assert_eq!(result.first_row_idx[g0], 0);
        assert_eq!(result.group_counts[g0], 3);
        assert_eq!(result.group_counts.iter().sum::<u64>(), 6);
    }

    #[test]
    fn test_group_ids_with_keys_handles_hash_collisions() {
        // Same fake hash for different keys: key verification must still
        // split them into distinct groups.
        let hashes = vec![0xDEAD_BEEFu64; 4];
        let keys = vec![1i64, 2, 1, 2];
        let result = compute_group_ids_with_keys(&hashes, &keys);
        assert_eq!(result.num_groups, 2);
        assert_eq!(result.group_ids[0], result.group_ids[2]);
        assert_eq!(result.group_ids[1], result.group_ids[3]);
        assert_ne!(result.group_ids[0], result.group_ids[1]);
    }

    #[test]
    fn test_sum_by_group_scenario() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let gids = [0u32, 1, 0, 2, 1, 0];
        assert_eq!(sum_by_group(&values, &gids, 3), vec![10.0, 7.0, 4.0]);
    }

    #[test]
    fn test_multiagg_by_group() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let gids = [0u32, 1, 0, 2, 1, 0];
        let (sums, mins, maxs, counts) = multiagg_by_group(&values, &gids, 3);
        assert_eq!(sums, vec![10.0, 7.0, 4.0]);
        assert_eq!(mins, vec![1.0, 2.0, 4.0]);
        assert_eq!(maxs, vec![6.0, 5.0, 4.0]);
        assert_eq!(counts, vec![3, 2, 1]);
    }

    #[test]
    fn test_min_max_by_group() {
        let values = [5.0, -3.0, 2.0, 8.0];
        let gids = [0u32, 0, 1, 1];
        assert_eq!(min_by_group(&values, &gids, 2), vec![-3.0, 2.0]);
        assert_eq!(max_by_group(&values, &gids, 2), vec![5.0, 8.0]);
    }
}
