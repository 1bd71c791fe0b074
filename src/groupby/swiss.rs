//! Swiss-table style open-addressed hash tables with SIMD control-byte
//! probing.
//!
//! Layout per table: a control byte array of `capacity + 16` (the trailing 16
//! bytes mirror the first probe group so a 16-wide load never wraps), an entry
//! array of `capacity`, and a power-of-two mask. A control byte is `0x00` for
//! an empty slot or the top seven hash bits with the high bit set for an
//! occupied one. `0x7F` is reserved for deleted slots and unused: these tables
//! never remove entries. Load is capped at 87%, which also bounds probing:
//! there is always an empty slot before a probe wraps.

use tracing::debug;

use crate::groupby::hash::rapid_hash64;

/// Slots examined per vector control-byte compare.
pub const GROUP_WIDTH: usize = 16;

pub(crate) const CTRL_EMPTY: u8 = 0x00;
const MAX_LOAD_PERCENT: usize = 87;
const MIN_CAPACITY: usize = 16;

/// Top seven hash bits packed with the occupied marker.
#[inline(always)]
fn h2(hash: u64) -> u8 {
    ((hash >> 57) as u8) | 0x80
}

/// 16-bit match mask of `ctrl[group..group + 16]` against `byte`.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn match_ctrl(ctrl: &[u8], group: usize, byte: u8) -> u16 {
    debug_assert!(group + GROUP_WIDTH <= ctrl.len());
    unsafe {
        use std::arch::x86_64::*;
        let v = _mm_loadu_si128(ctrl.as_ptr().add(group) as *const __m128i);
        let b = _mm_set1_epi8(byte as i8);
        _mm_movemask_epi8(_mm_cmpeq_epi8(v, b)) as u16
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
fn match_ctrl(ctrl: &[u8], group: usize, byte: u8) -> u16 {
    debug_assert!(group + GROUP_WIDTH <= ctrl.len());
    let mut mask = 0u16;
    for (bit, &c) in ctrl[group..group + GROUP_WIDTH].iter().enumerate() {
        mask |= ((c == byte) as u16) << bit;
    }
    mask
}

fn table_capacity(hint: usize) -> usize {
    let needed = hint * 100 / MAX_LOAD_PERCENT + 1;
    needed.max(MIN_CAPACITY).next_power_of_two()
}

/// Probe protocol shared by all three table variants, expressed per table
/// because the entry layouts differ. Each implements:
/// start at `hash & mask`, vector-match `h2`, verify candidates, vector-match
/// empty, insert at the first empty, else advance one probe group.
macro_rules! swiss_probe_common {
    () => {
        pub fn len(&self) -> usize {
            self.count
        }

        pub fn is_empty(&self) -> bool {
            self.count == 0
        }

        pub fn capacity(&self) -> usize {
            self.mask + 1
        }

        fn set_ctrl(&mut self, slot: usize, byte: u8) {
            self.ctrl[slot] = byte;
            if slot < GROUP_WIDTH {
                let capacity = self.mask + 1;
                self.ctrl[capacity + slot] = byte;
            }
        }

        fn over_load(&self) -> bool {
            self.count * 100 > self.capacity() * MAX_LOAD_PERCENT
        }
    };
}

/// Swiss table accumulating one `f64` sum per `i64` key.
///
/// Entries store the key inline (16 bytes each), so probing never chases an
/// indirection.
pub struct SwissSumTable {
    ctrl: Vec<u8>,
    entries: Vec<SumEntry>,
    count: usize,
    mask: usize,
}

#[derive(Clone, Copy)]
#[repr(C)]
struct SumEntry {
    key: i64,
    sum: f64,
}

impl SwissSumTable {
    swiss_probe_common!();

    pub fn with_capacity(hint: usize) -> Self {
        let capacity = table_capacity(hint);
        Self {
            ctrl: vec![CTRL_EMPTY; capacity + GROUP_WIDTH],
            entries: vec![SumEntry { key: 0, sum: 0.0 }; capacity],
            count: 0,
            mask: capacity - 1,
        }
    }

    /// Adds `value` to the entry for `key`, inserting it first if absent.
    pub fn insert_or_add(&mut self, key: i64, value: f64) {
        let hash = rapid_hash64(key as u64);
        let tag = h2(hash);
        let mut group = (hash as usize) & self.mask;
        loop {
            let mut matches = match_ctrl(&self.ctrl, group, tag);
            while matches != 0 {
                let slot = (group + matches.trailing_zeros() as usize) & self.mask;
                if self.entries[slot].key == key {
                    self.entries[slot].sum += value;
                    return;
                }
                matches &= matches - 1;
            }
            let empties = match_ctrl(&self.ctrl, group, CTRL_EMPTY);
            if empties != 0 {
                let slot = (group + empties.trailing_zeros() as usize) & self.mask;
                self.set_ctrl(slot, tag);
                self.entries[slot] = SumEntry { key, sum: value };
                self.count += 1;
                if self.over_load() {
                    self.grow();
                }
                return;
            }
            group = (group + GROUP_WIDTH) & self.mask;
        }
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity() * 2;
        let old_capacity = self.capacity();
        let old_ctrl = std::mem::replace(&mut self.ctrl, vec![CTRL_EMPTY; new_capacity + GROUP_WIDTH]);
        let old_entries = std::mem::replace(
            &mut self.entries,
            vec![SumEntry { key: 0, sum: 0.0 }; new_capacity],
        );
        self.mask = new_capacity - 1;
        for (slot, &ctrl) in old_ctrl[..old_capacity].iter().enumerate() {
            if ctrl != CTRL_EMPTY {
                self.reinsert(old_entries[slot]);
            }
        }
        debug!(capacity = new_capacity, count = self.count, "swiss sum table grown");
    }

    fn reinsert(&mut self, entry: SumEntry) {
        let hash = rapid_hash64(entry.key as u64);
        let mut slot = (hash as usize) & self.mask;
        while self.ctrl[slot] != CTRL_EMPTY {
            slot = (slot + 1) & self.mask;
        }
        self.set_ctrl(slot, h2(hash));
        self.entries[slot] = entry;
    }

    /// Copies live entries out in table-traversal order. The order is
    /// implementation-defined; callers must not rely on it.
    pub fn extract(&self) -> (Vec<i64>, Vec<f64>) {
        let mut keys = Vec::with_capacity(self.count);
        let mut sums = Vec::with_capacity(self.count);
        for slot in 0..self.capacity() {
            if self.ctrl[slot] & 0x80 != 0 {
                keys.push(self.entries[slot].key);
                sums.push(self.entries[slot].sum);
            }
        }
        (keys, sums)
    }
}

/// Swiss table accumulating sum/min/max/count per `i64` key (40-byte entries).
pub struct SwissMultiAggTable {
    ctrl: Vec<u8>,
    entries: Vec<MultiAggEntry>,
    count: usize,
    mask: usize,
}

#[derive(Clone, Copy)]
#[repr(C)]
struct MultiAggEntry {
    key: i64,
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl MultiAggEntry {
    fn fresh(key: i64) -> Self {
        Self {
            key,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }

    fn update(&mut self, value: f64) {
        self.sum += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.count += 1;
    }
}

impl SwissMultiAggTable {
    swiss_probe_common!();

    pub fn with_capacity(hint: usize) -> Self {
        let capacity = table_capacity(hint);
        Self {
            ctrl: vec![CTRL_EMPTY; capacity + GROUP_WIDTH],
            entries: vec![MultiAggEntry::fresh(0); capacity],
            count: 0,
            mask: capacity - 1,
        }
    }

    /// Folds `value` into the entry for `key`, inserting it first if absent.
    pub fn insert_or_update(&mut self, key: i64, value: f64) {
        let hash = rapid_hash64(key as u64);
        let tag = h2(hash);
        let mut group = (hash as usize) & self.mask;
        loop {
            let mut matches = match_ctrl(&self.ctrl, group, tag);
            while matches != 0 {
                let slot = (group + matches.trailing_zeros() as usize) & self.mask;
                if self.entries[slot].key == key {
                    self.entries[slot].update(value);
                    return;
                }
                matches &= matches - 1;
            }
            let empties = match_ctrl(&self.ctrl, group, CTRL_EMPTY);
            if empties != 0 {
                let slot = (group + empties.trailing_zeros() as usize) & self.mask;
                self.set_ctrl(slot, tag);
                self.entries[slot] = MultiAggEntry::fresh(key);
                self.entries[slot].update(value);
                self.count += 1;
                if self.over_load() {
                    self.grow();
                }
                return;
            }
            group = (group + GROUP_WIDTH) & self.mask;
        }
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity() * 2;
        let old_capacity = self.capacity();
        let old_ctrl = std::mem::replace(&mut self.ctrl, vec![CTRL_EMPTY; new_capacity + GROUP_WIDTH]);
        let old_entries =
            std::mem::replace(&mut self.entries, vec![MultiAggEntry::fresh(0); new_capacity]);
        self.mask = new_capacity - 1;
        for (slot, &ctrl) in old_ctrl[..old_capacity].iter().enumerate() {
            if ctrl != CTRL_EMPTY {
                self.reinsert(old_entries[slot]);
            }
        }
        debug!(capacity = new_capacity, count = self.count, "swiss multi-agg table grown");
    }

    fn reinsert(&mut self, entry: MultiAggEntry) {
        let hash = rapid_hash64(entry.key as u64);
        let mut slot = (hash as usize) & self.mask;
        while self.ctrl[slot] != CTRL_EMPTY {
            slot = (slot + 1) & self.mask;
        }
        self.set_ctrl(slot, h2(hash));
        self.entries[slot] = entry;
    }

    /// Copies live entries out in table-traversal order.
    #[allow(clippy::type_complexity)]
    pub fn extract(&self) -> (Vec<i64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<u64>) {
        let mut keys = Vec::with_capacity(self.count);
        let mut sums = Vec::with_capacity(self.count);
        let mut mins = Vec::with_capacity(self.count);
        let mut maxs = Vec::with_capacity(self.count);
        let mut counts = Vec::with_capacity(self.count);
        for slot in 0..self.capacity() {
            if self.ctrl[slot] & 0x80 != 0 {
                let entry = &self.entries[slot];
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

/// Swiss table assigning dense group ids by hash.
///
/// Entries carry no key, only `{hash, first_row, group_id}`: two rows belong
/// to the same group when their hashes are equal, or, through
/// [`Self::lookup_or_insert_with`], when a caller-supplied comparison against
/// the group's first row confirms the key.
pub struct GroupIdTable {
    ctrl: Vec<u8>,
    entries: Vec<GroupIdEntry>,
    count: usize,
    mask: usize,
}

#[derive(Clone, Copy)]
#[repr(C)]
struct GroupIdEntry {
    hash: u64,
    first_row: u32,
    group_id: u32,
}

impl GroupIdTable {
    swiss_probe_common!();

    pub fn with_capacity(hint: usize) -> Self {
        let capacity = table_capacity(hint);
        Self {
            ctrl: vec![CTRL_EMPTY; capacity + GROUP_WIDTH],
            entries: vec![
                GroupIdEntry {
                    hash: 0,
                    first_row: 0,
                    group_id: 0
                };
                capacity
            ],
            count: 0,
            mask: capacity - 1,
        }
    }

    /// Group id for `hash`, assigning the next dense id on first sight.
    pub fn lookup_or_insert(&mut self, hash: u64, row: u32) -> u32 {
        self.lookup_or_insert_with(hash, row, |_| true)
    }

    /// Like [`Self::lookup_or_insert`], but a hash match must also pass
    /// `same_key(first_row)` before the row joins the group.
    pub fn lookup_or_insert_with<F>(&mut self, hash: u64, row: u32, same_key: F) -> u32
    where
        F: Fn(u32) -> bool,
    {
        let tag = h2(hash);
        let mut group = (hash as usize) & self.mask;
        loop {
            let mut matches = match_ctrl(&self.ctrl, group, tag);
            while matches != 0 {
                let slot = (group + matches.trailing_zeros() as usize) & self.mask;
                let entry = self.entries[slot];
                if entry.hash == hash && same_key(entry.first_row) {
                    return entry.group_id;
                }
                matches &= matches - 1;
            }
            let empties = match_ctrl(&self.ctrl, group, CTRL_EMPTY);
            if empties != 0 {
                let slot = (group + empties.trailing_zeros() as usize) & self.mask;
                let group_id = self.count as u32;
                self.set_ctrl(slot, tag);
                self.entries[slot] = GroupIdEntry {
                    hash,
                    first_row: row,
                    group_id,
                };
                self.count += 1;
                if self.over_load() {
                    self.grow();
                }
                return group_id;
            }
            group = (group + GROUP_WIDTH) & self.mask;
        }
    }

    /// First row index of every group, indexed by group id.
    pub fn first_rows(&self) -> Vec<u32> {
        let mut first = vec![0u32; self.count];
        for slot in 0..self.capacity() {
            if self.ctrl[slot] & 0x80 != 0 {
                let entry = self.entries[slot];
                first[entry.group_id as usize] = entry.first_row;
            }
        }
        first
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity() * 2;
        let old_capacity = self.capacity();
        let old_ctrl = std::mem::replace(&mut self.ctrl, vec![CTRL_EMPTY; new_capacity + GROUP_WIDTH]);
        let old_entries = std::mem::replace(
            &mut self.entries,
            vec![
                GroupIdEntry {
                    hash: 0,
                    first_row: 0,
                    group_id: 0
                };
                new_capacity
            ],
        );
        self.mask = new_capacity - 1;
        for (slot, &ctrl) in old_ctrl[..old_capacity].iter().enumerate() {
            if ctrl != CTRL_EMPTY {
                self.reinsert(old_entries[slot]);
            }
        }
        debug!(capacity = new_capacity, count = self.count, "group-id table grown");
    }

    fn reinsert(&mut self, entry: GroupIdEntry) {
        // The stored hash is authoritative; there is no key to recompute from.
        let mut slot = (entry.hash as usize) & self.mask;
        while self.ctrl[slot] != CTRL_EMPTY {
            slot = (slot + 1) & self.mask;
        }
        self.set_ctrl(slot, h2(entry.hash));
        self.entries[slot] = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_table_accumulates() {
        let mut table = SwissSumTable::with_capacity(8);
        table.insert_or_add(1, 10.0);
        table.insert_or_add(2, 20.0);
        table.insert_or_add(1, 5.0);
        assert_eq!(table.len(), 2);
        let (keys, sums) = table.extract();
        let mut pairs: Vec<(i64, f64)> = keys.into_iter().zip(sums).collect();
        pairs.sort_by_key(|&(k, _)| k);
        assert_eq!(pairs, vec![(1, 15.0), (2, 20.0)]);
    }

    #[test]
    fn test_sum_table_growth_preserves_entries() {
        let mut table = SwissSumTable::with_capacity(0);
        let initial_capacity = table.capacity();
        for k in 0..10_000i64 {
            table.insert_or_add(k, 1.0);
        }
        assert!(table.capacity() > initial_capacity);
        assert_eq!(table.len(), 10_000);
        // Load invariant holds after every growth.
        assert!(table.len() * 100 <= table.capacity() * 87);
        let (keys, sums) = table.extract();
        assert_eq!(keys.len(), 10_000);
        assert!(sums.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_ctrl_mirror_invariant() {
        let mut table = SwissSumTable::with_capacity(16);
        for k in 0..12i64 {
            table.insert_or_add(k * 1_000_003, 1.0);
        }
        let capacity = table.capacity();
        for slot in 0..GROUP_WIDTH {
            assert_eq!(table.ctrl[slot], table.ctrl[capacity + slot]);
        }
        for slot in 0..capacity {
            let ctrl = table.ctrl[slot];
            assert!(ctrl == CTRL_EMPTY || ctrl & 0x80 != 0);
        }
    }

    #[test]
    fn test_multiagg_table() {
        let mut table = SwissMultiAggTable::with_capacity(8);
        for (k, v) in [(7i64, 3.0), (7, -1.0), (9, 5.0), (7, 2.0)] {
            table.insert_or_update(k, v);
        }
        let (keys, sums, mins, maxs, counts) = table.extract();
        let mut rows: Vec<_> = (0..keys.len())
            .map(|i| (keys[i], sums[i], mins[i], maxs[i], counts[i]))
            .collect();
        rows.sort_by_key(|&(k, ..)| k);
        assert_eq!(rows, vec![(7, 4.0, -1.0, 3.0, 3), (9, 5.0, 5.0, 5.0, 1)]);
    }

    #[test]
    fn test_entry_sizes_stay_cache_friendly() {
        assert_eq!(std::mem::size_of::<SumEntry>(), 16);
        assert_eq!(std::mem::size_of::<MultiAggEntry>(), 40);
    }

    #[test]
    fn test_group_id_table_dense_ids() {
        let mut table = GroupIdTable::with_capacity(4);
        let h1 = rapid_hash64(100);
        let h2_ = rapid_hash64(200);
        assert_eq!(table.lookup_or_insert(h1, 0), 0);
        assert_eq!(table.lookup_or_insert(h2_, 1), 1);
        assert_eq!(table.lookup_or_insert(h1, 2), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.first_rows(), vec![0, 1]);
    }

    #[test]
    fn test_group_id_table_growth() {
        let mut table = GroupIdTable::with_capacity(0);
        for row in 0..5_000u32 {
            let id = table.lookup_or_insert(rapid_hash64(row as u64), row);
            assert_eq!(id, row);
        }
        // Second pass resolves to the same ids.
        for row in 0..5_000u32 {
            assert_eq!(table.lookup_or_insert(rapid_hash64(row as u64), row), row);
        }
    }
}
