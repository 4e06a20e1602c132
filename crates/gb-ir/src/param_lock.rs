//! ParamLockPool: fixed-capacity arena of parameter-lock records.
//!
//! Every record lives in one backing array and is addressed by a `u16`
//! index. Unused records are threaded onto an inline free list through the
//! same `next` field the pattern lists use, so the in-memory layout is the
//! persisted layout and nothing is ever allocated after construction.

use alloc::vec::Vec;
use core::mem::size_of;

use crate::PoolError;

/// Number of records in the shared pool (16 voices x 256).
pub const POOL_CAPACITY: usize = 16 * 256;

/// Index of a record in the pool. `LockIndex::NULL` terminates a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LockIndex(u16);

impl LockIndex {
    /// Reserved sentinel, never returned by `allocate`.
    pub const NULL: LockIndex = LockIndex(0xFFFF);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl Default for LockIndex {
    fn default() -> Self {
        Self::NULL
    }
}

/// A per-step override of one voice parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamLock {
    /// Legacy lock id of the parameter (see `Param::lock_id`).
    pub param: u8,
    /// Step within the pattern (0-63).
    pub step: u8,
    pub value: u8,
    pub next: LockIndex,
}

impl ParamLock {
    const EMPTY: ParamLock = ParamLock {
        param: 0,
        step: 0,
        value: 0,
        next: LockIndex::NULL,
    };
}

/// Shared arena for all lock lists of all voices and patterns.
#[derive(Clone, Debug)]
pub struct ParamLockPool {
    records: Vec<ParamLock>,
    free_head: LockIndex,
    free_count: usize,
}

impl ParamLockPool {
    /// Create a pool with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(POOL_CAPACITY)
    }

    /// Create a pool holding `capacity` records, all of them free.
    ///
    /// Capacity is clamped so the sentinel can never be a valid index.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(LockIndex::NULL.slot());
        let mut records = alloc::vec![ParamLock::EMPTY; capacity];
        for (i, record) in records.iter_mut().enumerate() {
            record.next = if i + 1 < capacity {
                LockIndex::new((i + 1) as u16)
            } else {
                LockIndex::NULL
            };
        }
        let free_head = if capacity > 0 { LockIndex::new(0) } else { LockIndex::NULL };
        Self {
            records,
            free_head,
            free_count: capacity,
        }
    }

    /// Rebuild a pool from persisted records and free-list head.
    ///
    /// The free list is walked to recompute the free count; an out-of-range
    /// link or a cycle rejects the whole pool.
    pub fn from_raw(records: Vec<ParamLock>, free_head: LockIndex) -> Result<Self, PoolError> {
        if records.len() >= LockIndex::NULL.slot() {
            return Err(PoolError::Corrupt("pool larger than index space"));
        }
        let pool = Self {
            records,
            free_head,
            free_count: 0,
        };
        for record in &pool.records {
            if !record.next.is_null() && record.next.slot() >= pool.records.len() {
                return Err(PoolError::InvalidIndex(record.next.raw()));
            }
        }
        if !free_head.is_null() && free_head.slot() >= pool.records.len() {
            return Err(PoolError::InvalidIndex(free_head.raw()));
        }
        let free_count = pool.checked_list_len(free_head)?;
        Ok(Self { free_count, ..pool })
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Number of records currently on the free list.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of records owned by pattern lists.
    pub fn used_count(&self) -> usize {
        self.capacity() - self.free_count
    }

    /// Pop a record off the free list.
    ///
    /// The returned record has its `next` link cleared; the caller fills the
    /// payload and links it into a pattern list.
    pub fn allocate(&mut self) -> Result<LockIndex, PoolError> {
        let index = self.free_head;
        let Some(record) = self.records.get_mut(index.slot()) else {
            return Err(PoolError::Exhausted);
        };
        self.free_head = record.next;
        record.next = LockIndex::NULL;
        self.free_count -= 1;
        Ok(index)
    }

    /// Push a record back onto the free list.
    ///
    /// The caller must already have unlinked it from its pattern list.
    pub fn release(&mut self, index: LockIndex) {
        debug_assert!(
            !self.free_list().any(|(free, _)| free == index),
            "lock index {} released twice",
            index.raw()
        );
        let free_head = self.free_head;
        let Some(record) = self.records.get_mut(index.slot()) else {
            log::error!("release of invalid lock index {}", index.raw());
            return;
        };
        *record = ParamLock {
            next: free_head,
            ..ParamLock::EMPTY
        };
        self.free_head = index;
        self.free_count += 1;
    }

    /// Bounds- and sentinel-checked lookup.
    pub fn resolve(&self, index: LockIndex) -> Option<&ParamLock> {
        self.records.get(index.slot())
    }

    pub fn resolve_mut(&mut self, index: LockIndex) -> Option<&mut ParamLock> {
        self.records.get_mut(index.slot())
    }

    /// Inverse of `resolve`: the index of a record borrowed from this pool.
    pub fn index_of(&self, record: &ParamLock) -> Option<LockIndex> {
        let base = self.records.as_ptr() as usize;
        let addr = record as *const ParamLock as usize;
        let offset = addr.checked_sub(base)?;
        let slot = offset / size_of::<ParamLock>();
        if offset % size_of::<ParamLock>() != 0 || slot >= self.records.len() {
            return None;
        }
        Some(LockIndex::new(slot as u16))
    }

    /// Walk a list starting at `head`.
    pub fn iter_list(&self, head: LockIndex) -> LockIter<'_> {
        LockIter {
            pool: self,
            cursor: head,
            budget: self.records.len(),
        }
    }

    pub fn free_head(&self) -> LockIndex {
        self.free_head
    }

    /// All records, free or owned, in index order.
    pub fn records(&self) -> &[ParamLock] {
        &self.records
    }

    /// Walk the free list. Used by tests and by project validation.
    pub fn free_list(&self) -> LockIter<'_> {
        self.iter_list(self.free_head)
    }

    /// Length of the list at `head`, failing on a cycle or a bad link.
    pub fn checked_list_len(&self, head: LockIndex) -> Result<usize, PoolError> {
        let mut len = 0;
        let mut cursor = head;
        while !cursor.is_null() {
            let record = self
                .records
                .get(cursor.slot())
                .ok_or(PoolError::InvalidIndex(cursor.raw()))?;
            len += 1;
            if len > self.records.len() {
                return Err(PoolError::Corrupt("cycle in lock list"));
            }
            cursor = record.next;
        }
        Ok(len)
    }
}

impl Default for ParamLockPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over one singly-linked list in the pool.
///
/// Stops after `capacity` steps or on a self-link; either means the pool is
/// corrupt, which is reported as an invariant violation.
pub struct LockIter<'a> {
    pool: &'a ParamLockPool,
    cursor: LockIndex,
    budget: usize,
}

impl<'a> Iterator for LockIter<'a> {
    type Item = (LockIndex, &'a ParamLock);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor;
        let record = self.pool.resolve(index)?;
        if self.budget == 0 || record.next == index {
            log::error!("lock list cycle detected at index {}", index.raw());
            debug_assert!(false, "lock list cycle at index {}", index.raw());
            self.cursor = LockIndex::NULL;
            return None;
        }
        self.budget -= 1;
        self.cursor = record.next;
        Some((index, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Allocation ===

    #[test]
    fn new_pool_is_all_free() {
        let pool = ParamLockPool::with_capacity(8);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.free_count(), 8);
        assert_eq!(pool.free_list().count(), 8);
    }

    #[test]
    fn default_capacity_matches_constant() {
        assert_eq!(ParamLockPool::new().capacity(), POOL_CAPACITY);
    }

    #[test]
    fn allocate_never_returns_sentinel() {
        let mut pool = ParamLockPool::with_capacity(4);
        for _ in 0..4 {
            let index = pool.allocate().unwrap();
            assert!(!index.is_null());
            assert!(pool.resolve(index).is_some());
        }
    }

    #[test]
    fn exhausted_pool_reports_error() {
        let mut pool = ParamLockPool::with_capacity(2);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert_eq!(pool.allocate(), Err(PoolError::Exhausted));
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn release_makes_record_reusable() {
        let mut pool = ParamLockPool::with_capacity(1);
        let a = pool.allocate().unwrap();
        pool.release(a);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn release_invalid_index_is_ignored() {
        let mut pool = ParamLockPool::with_capacity(2);
        pool.release(LockIndex::new(99));
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released twice")]
    fn double_release_asserts() {
        let mut pool = ParamLockPool::with_capacity(2);
        let a = pool.allocate().unwrap();
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn conservation_over_mixed_sequence() {
        let mut pool = ParamLockPool::with_capacity(16);
        let mut held = Vec::new();
        for round in 0..40usize {
            if round % 3 == 2 {
                if let Some(index) = held.pop() {
                    pool.release(index);
                }
            } else if let Ok(index) = pool.allocate() {
                held.push(index);
            }
            assert_eq!(pool.free_list().count() + held.len(), pool.capacity());
            assert_eq!(pool.free_count(), pool.free_list().count());
        }
    }

    // === Lookup ===

    #[test]
    fn resolve_rejects_sentinel_and_out_of_range() {
        let pool = ParamLockPool::with_capacity(4);
        assert!(pool.resolve(LockIndex::NULL).is_none());
        assert!(pool.resolve(LockIndex::new(4)).is_none());
    }

    #[test]
    fn index_of_inverts_resolve() {
        let mut pool = ParamLockPool::with_capacity(8);
        pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let record = pool.resolve(b).unwrap();
        assert_eq!(pool.index_of(record), Some(b));
    }

    #[test]
    fn index_of_foreign_record_is_none() {
        let pool = ParamLockPool::with_capacity(8);
        let stray = ParamLock::EMPTY;
        assert_eq!(pool.index_of(&stray), None);
    }

    // === Raw reconstruction ===

    #[test]
    fn from_raw_recounts_free_list() {
        let mut pool = ParamLockPool::with_capacity(6);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        let rebuilt = ParamLockPool::from_raw(pool.records().to_vec(), pool.free_head()).unwrap();
        assert_eq!(rebuilt.free_count(), 4);
    }

    #[test]
    fn from_raw_rejects_out_of_range_link() {
        let mut records = ParamLockPool::with_capacity(3).records().to_vec();
        records[1].next = LockIndex::new(7);
        let err = ParamLockPool::from_raw(records, LockIndex::new(0)).unwrap_err();
        assert_eq!(err, PoolError::InvalidIndex(7));
    }

    #[test]
    fn from_raw_rejects_cycle() {
        let mut records = ParamLockPool::with_capacity(3).records().to_vec();
        records[2].next = LockIndex::new(0);
        assert!(matches!(
            ParamLockPool::from_raw(records, LockIndex::new(0)),
            Err(PoolError::Corrupt(_))
        ));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn iterator_stops_on_self_link() {
        let mut pool = ParamLockPool::with_capacity(3);
        let a = pool.allocate().unwrap();
        pool.resolve_mut(a).unwrap().next = a;
        assert_eq!(pool.iter_list(a).count(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "lock list cycle")]
    fn iterator_asserts_on_self_link() {
        let mut pool = ParamLockPool::with_capacity(3);
        let a = pool.allocate().unwrap();
        pool.resolve_mut(a).unwrap().next = a;
        let _ = pool.iter_list(a).count();
    }
}
