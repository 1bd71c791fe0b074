//! Robin-Hood open-addressed tables.
//!
//! Alternative to the Swiss tables with the same external contract, kept for
//! benchmarking; not on any default path. Single entry array, hash `0` as the
//! empty sentinel, 70% load cap, and the displacement invariant: a probing
//! entry that has travelled further than the resident swaps with it.

use crate::groupby::hash::rapid_hash64;

const MAX_LOAD_PERCENT: usize = 70;
const MIN_CAPACITY: usize = 16;

#[inline(always)]
fn nonzero_hash(key: i64) -> u64 {
    let hash = rapid_hash64(key as u64);
    if hash == 0 {
        1
    } else {
        hash
    }
}

fn table_capacity(hint: usize) -> usize {
    let needed = hint * 100 / MAX_LOAD_PERCENT + 1;
    needed.max(MIN_CAPACITY).next_power_of_two()
}

#[inline(always)]
fn probe_distance(hash: u64, slot: usize, mask: usize) -> usize {
    (slot + mask + 1 - ((hash as usize) & mask)) & mask
}

/// Robin-Hood table accumulating one `f64` sum per `i64` key.
pub struct RobinHoodSumTable {
    entries: Vec<RhSumEntry>,
    count: usize,
    mask: usize,
}

#[derive(Clone, Copy)]
struct RhSumEntry {
    hash: u64,
    key: i64,
    sum: f64,
}

const EMPTY_SUM: RhSumEntry = RhSumEntry {
    hash: 0,
    key: 0,
    sum: 0.0,
};

impl RobinHoodSumTable {
    pub fn with_capacity(hint: usize) -> Self {
        let capacity = table_capacity(hint);
        Self {
            entries: vec![EMPTY_SUM; capacity],
            count: 0,
            mask: capacity - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Adds `value` to the entry for `key`, inserting it first if absent.
    pub fn insert_or_add(&mut self, key: i64, value: f64) {
        if (self.count + 1) * 100 > self.capacity() * MAX_LOAD_PERCENT {
            self.grow();
        }
        let mut carried = RhSumEntry {
            hash: nonzero_hash(key),
            key,
            sum: value,
        };
        let mut slot = (carried.hash as usize) & self.mask;
        let mut distance = 0;
        loop {
            let resident = &mut self.entries[slot];
            if resident.hash == 0 {
                *resident = carried;
                self.count += 1;
                return;
            }
            if resident.hash == carried.hash && resident.key == carried.key {
                resident.sum += carried.sum;
                return;
            }
            let resident_distance = probe_distance(resident.hash, slot, self.mask);
            if resident_distance < distance {
                std::mem::swap(resident, &mut carried);
                distance = resident_distance;
            }
            slot = (slot + 1) & self.mask;
            distance += 1;
        }
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity() * 2;
        let old_entries = std::mem::replace(&mut self.entries, vec![EMPTY_SUM; new_capacity]);
        self.mask = new_capacity - 1;
        self.count = 0;
        for entry in old_entries {
            if entry.hash != 0 {
                self.reinsert(entry);
            }
        }
    }

    fn reinsert(&mut self, mut carried: RhSumEntry) {
        let mut slot = (carried.hash as usize) & self.mask;
        let mut distance = 0;
        loop {
            let resident = &mut self.entries[slot];
            if resident.hash == 0 {
                *resident = carried;
                self.count += 1;
                return;
            }
            let resident_distance = probe_distance(resident.hash, slot, self.mask);
            if resident_distance < distance {
                std::mem::swap(resident, &mut carried);
                distance = resident_distance;
            }
            slot = (slot + 1) & self.mask;
            distance += 1;
        }
    }

    /// Copies live entries out in table-traversal order.
    pub fn extract(&self) -> (Vec<i64>, Vec<f64>) {
        let mut keys = Vec::with_capacity(self.count);
        let mut sums = Vec::with_capacity(self.count);
        for entry in &self.entries {
            if entry.hash != 0 {
                keys.push(entry.key);
                sums.push(entry.sum);
            }
        }
        (keys, sums)
    }
}

/// Robin-Hood table accumulating sum/min/max/count per `i64` key.
pub struct RobinHoodMultiAggTable {
    entries: Vec<RhMultiAggEntry>,
    count: usize,
    mask: usize,
}

#[derive(Clone, Copy)]
struct RhMultiAggEntry {
    hash: u64,
    key: i64,
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

const EMPTY_MULTI: RhMultiAggEntry = RhMultiAggEntry {
    hash: 0,
    key: 0,
    sum: 0.0,
    min: 0.0,
    max: 0.0,
    count: 0,
};

impl RobinHoodMultiAggTable {
    pub fn with_capacity(hint: usize) -> Self {
        let capacity = table_capacity(hint);
        Self {
            entries: vec![EMPTY_MULTI; capacity],
            count: 0,
            mask: capacity - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Folds `value` into the entry for `key`, inserting it first if absent.
    pub fn insert_or_update(&mut self, key: i64, value: f64) {
        if (self.count + 1) * 100 > self.capacity() * MAX_LOAD_PERCENT {
            self.grow();
        }
        let mut carried = RhMultiAggEntry {
            hash: nonzero_hash(key),
            key,
            sum: value,
            min: value,
            max: value,
            count: 1,
        };
        let mut slot = (carried.hash as usize) & self.mask;
        let mut distance = 0;
        loop {
            let resident = &mut self.entries[slot];
            if resident.hash == 0 {
                *resident = carried;
                self.count += 1;
                return;
            }
            if resident.hash == carried.hash && resident.key == carried.key {
                resident.sum += carried.sum;
                if carried.min < resident.min {
                    resident.min = carried.min;
                }
                if carried.max > resident.max {
                    resident.max = carried.max;
                }
                resident.count += carried.count;
                return;
            }
            let resident_distance = probe_distance(resident.hash, slot, self.mask);
            if resident_distance < distance {
                std::mem::swap(resident, &mut carried);
                distance = resident_distance;
            }
            slot = (slot + 1) & self.mask;
            distance += 1;
        }
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity() * 2;
        let old_entries = std::mem::replace(&mut self.entries, vec![EMPTY_MULTI; new_capacity]);
        self.mask = new_capacity - 1;
        self.count = 0;
        for entry in old_entries {
            if entry.hash != 0 {
                self.reinsert(entry);
            }
        }
    }

    fn reinsert(&mut self, mut carried: RhMultiAggEntry) {
        let mut slot = (carried.hash as usize) & self.mask;
        let mut distance = 0;
        loop {
            let resident = &mut self.entries[slot];
            if resident.hash == 0 {
                *resident = carried;
                self.count += 1;
                return;
            }
            let resident_distance = probe_distance(resident.hash, slot, self.mask);
            if resident_distance < distance {
                std::mem::swap(resident, &mut carried);
                distance = resident_distance;
            }
            slot = (slot + 1) & self.mask;
            distance += 1;
        }
    }

    /// Copies live entries out in table-traversal order.
    #[allow(clippy::type_complexity)]
    pub fn extract(&self) -> (Vec<i64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<u64>) {
        let mut keys = Vec::with_capacity(self.count);
        let mut sums = Vec::with_capacity(self.count);
        let mut mins = Vec::with_capacity(self.count);
        let mut maxs = Vec::with_capacity(self.count);
        let mut counts = Vec::with_capacity(self.count);
        for entry in &self.entries {
            if entry.hash != 0 {
                keys.push(entry.key);
                sums.push(entry.sum);
                mins.push(entry.min);
                maxs.push(entry.max);
                counts.push(entry.count);
            }
        }
        (keys, sums, mins, maxs, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_table_accumulates() {
        let mut table = RobinHoodSumTable::with_capacity(8);
        table.insert_or_add(10, 1.5);
        table.insert_or_add(20, 2.5);
        table.insert_or_add(10, 3.0);
        assert_eq!(table.len(), 2);
        let (keys, sums) = table.extract();
        let mut pairs: Vec<(i64, f64)> = keys.into_iter().zip(sums).collect();
        pairs.sort_by_key(|&(k, _)| k);
        assert_eq!(pairs, vec![(10, 4.5), (20, 2.5)]);
    }

    #[test]
    fn test_load_cap_respected_through_growth() {
        let mut table = RobinHoodSumTable::with_capacity(0);
        for k in 0..20_000i64 {
            table.insert_or_add(k, 1.0);
        }
        assert_eq!(table.len(), 20_000);
        assert!(table.len() * 100 <= table.capacity() * MAX_LOAD_PERCENT);
        let (keys, _) = table.extract();
        assert_eq!(keys.len(), 20_000);
    }

    #[test]
    fn test_multiagg_matches_swiss_contract() {
        let mut table = RobinHoodMultiAggTable::with_capacity(4);
        for (k, v) in [(1i64, 4.0), (1, -2.0), (2, 7.0), (1, 1.0)] {
            table.insert_or_update(k, v);
        }
        let (keys, sums, mins, maxs, counts) = table.extract();
        let mut rows: Vec<_> = (0..keys.len())
            .map(|i| (keys[i], sums[i], mins[i], maxs[i], counts[i]))
            .collect();
        rows.sort_by_key(|&(k, ..)| k);
        assert_eq!(rows, vec![(1, 3.0, -2.0, 4.0, 3), (2, 7.0, 7.0, 7.0, 1)]);
    }
}
