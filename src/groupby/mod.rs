//! Group-by engine: hashing, hash tables, and the aggregation entry points.
//!
//! Two execution shapes share the table machinery. The single-pass path
//! stores aggregates inside the Swiss entries and accumulates during the row
//! scan; it wins when the number of distinct keys is modest and is the
//! default for the `groupby_*` entry points. The two-phase path assigns dense
//! group ids first and then streams dense aggregation kernels; it wins when
//! several aggregates share one assignment. Callers pick; there is no
//! dynamic switch.

pub mod hash;
pub mod parallel;
pub mod robinhood;
pub mod swiss;
pub mod two_phase;

pub use hash::{combine_hashes, hash_i64_slice, rapid_hash64};
pub use parallel::{
    groupby_sum_i64_f64_parallel, NUM_PARTITIONS, PARALLEL_GROUPBY_MIN_ROWS, PARTITION_BITS,
    PARTITION_MASK,
};
pub use robinhood::{RobinHoodMultiAggTable, RobinHoodSumTable};
pub use swiss::{GroupIdTable, SwissMultiAggTable, SwissSumTable, GROUP_WIDTH};
pub use two_phase::{
    compute_group_ids, compute_group_ids_ext, compute_group_ids_with_keys, count_by_group,
    max_by_group, min_by_group, multiagg_by_group, sum_by_group, GroupByResult, GroupByResultExt,
};

use crate::error::GalleonError;

/// Result of a group-by sum: parallel arrays indexed by result slot.
///
/// Keys appear in table-traversal order, which is implementation-defined;
/// use [`Self::sorted_by_key`] for a deterministic view.
pub struct GroupBySumResult {
    pub keys: Vec<i64>,
    pub sums: Vec<f64>,
    pub num_groups: usize,
}

impl GroupBySumResult {
    /// The same result with rows reordered by ascending key.
    pub fn sorted_by_key(&self) -> GroupBySumResult {
        let mut order: Vec<usize> = (0..self.num_groups).collect();
        order.sort_unstable_by_key(|&i| self.keys[i]);
        GroupBySumResult {
            keys: order.iter().map(|&i| self.keys[i]).collect(),
            sums: order.iter().map(|&i| self.sums[i]).collect(),
            num_groups: self.num_groups,
        }
    }
}

/// Result of a group-by with sum/min/max/count per key.
pub struct GroupByMultiAggResult {
    pub keys: Vec<i64>,
    pub sums: Vec<f64>,
    pub mins: Vec<f64>,
    pub maxs: Vec<f64>,
    pub counts: Vec<u64>,
    pub num_groups: usize,
}

impl GroupByMultiAggResult {
    /// The same result with rows reordered by ascending key.
    pub fn sorted_by_key(&self) -> GroupByMultiAggResult {
        let mut order: Vec<usize> = (0..self.num_groups).collect();
        order.sort_unstable_by_key(|&i| self.keys[i]);
        GroupByMultiAggResult {
            keys: order.iter().map(|&i| self.keys[i]).collect(),
            sums: order.iter().map(|&i| self.sums[i]).collect(),
            mins: order.iter().map(|&i| self.mins[i]).collect(),
            maxs: order.iter().map(|&i| self.maxs[i]).collect(),
            counts: order.iter().map(|&i| self.counts[i]).collect(),
            num_groups: self.num_groups,
        }
    }
}

pub(crate) fn check_groupby_inputs(keys: usize, values: usize) -> Result<(), GalleonError> {
    if keys != values {
        return Err(GalleonError::InvalidInput(format!(
            "key/value length mismatch: {} vs {}",
            keys, values
        )));
    }
    Ok(())
}

/// Sums `values` per distinct key, single-pass through a Swiss table.
pub fn groupby_sum_i64_f64(keys: &[i64], values: &[f64]) -> Result<GroupBySumResult, GalleonError> {
    check_groupby_inputs(keys.len(), values.len())?;
    let mut table = SwissSumTable::with_capacity(keys.len() / 8);
    for (key, value) in keys.iter().zip(values.iter()) {
        table.insert_or_add(*key, *value);
    }
    let (out_keys, out_sums) = table.extract();
    Ok(GroupBySumResult {
        num_groups: out_keys.len(),
        keys: out_keys,
        sums: out_sums,
    })
}

/// Sum, min, max, and count of `values` per distinct key, single-pass.
pub fn groupby_multiagg_i64_f64(
    keys: &[i64],
    values: &[f64],
) -> Result<GroupByMultiAggResult, GalleonError> {
    check_groupby_inputs(keys.len(), values.len())?;
    let mut table = SwissMultiAggTable::with_capacity(keys.len() / 8);
    for (key, value) in keys.iter().zip(values.iter()) {
        table.insert_or_update(*key, *value);
    }
    let (out_keys, sums, mins, maxs, counts) = table.extract();
    Ok(GroupByMultiAggResult {
        num_groups: out_keys.len(),
        keys: out_keys,
        sums,
        mins,
        maxs,
        counts,
    })
}

/// Group-by sum through the two-phase path: dense group-id assignment, then
/// the prefetched dense sum kernel.
pub fn groupby_sum_i64_f64_two_phase(
    keys: &[i64],
    values: &[f64],
) -> Result<GroupBySumResult, GalleonError> {
    check_groupby_inputs(keys.len(), values.len())?;
    let mut hashes = vec![0u64; keys.len()];
    hash_i64_slice(keys, &mut hashes);
    let assignment = compute_group_ids_with_keys(&hashes, keys);
    let sums = sum_by_group(values, &assignment.group_ids, assignment.num_groups);
    let mut first_rows = vec![u32::MAX; assignment.num_groups];
    for (row, &gid) in assignment.group_ids.iter().enumerate() {
        if first_rows[gid as usize] == u32::MAX {
            first_rows[gid as usize] = row as u32;
        }
    }
    let out_keys: Vec<i64> = first_rows.iter().map(|&row| keys[row as usize]).collect();
    Ok(GroupBySumResult {
        keys: out_keys,
        sums,
        num_groups: assignment.num_groups,
    })
}

/// Group-by multi-aggregate through the two-phase path with the fused kernel.
pub fn groupby_multiagg_i64_f64_two_phase(
    keys: &[i64],
    values: &[f64],
) -> Result<GroupByMultiAggResult, GalleonError> {
    check_groupby_inputs(keys.len(), values.len())?;
    let mut hashes = vec![0u64; keys.len()];
    hash_i64_slice(keys, &mut hashes);
    let assignment = compute_group_ids_with_keys(&hashes, keys);
    let (sums, mins, maxs, counts) =
        multiagg_by_group(values, &assignment.group_ids, assignment.num_groups);
    let mut first_rows = vec![u32::MAX; assignment.num_groups];
    for (row, &gid) in assignment.group_ids.iter().enumerate() {
        if first_rows[gid as usize] == u32::MAX {
            first_rows[gid as usize] = row as u32;
        }
    }
    let out_keys: Vec<i64> = first_rows.iter().map(|&row| keys[row as usize]).collect();
    Ok(GroupByMultiAggResult {
        keys: out_keys,
        sums,
        mins,
        maxs,
        counts,
        num_groups: assignment.num_groups,
    })
}
