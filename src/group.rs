//! Ordered groups of chromosome storage references.
//!
//! A group keeps storage ids in insertion order. Membership can be guarded
//! by a flag bit on the storage object so a chromosome cannot enter the
//! same group twice, and removal can recycle the storage back to the
//! owning population's pool. Groups carry a helper array for the in-place
//! merge sort and for shuffle backups.

use crate::errors::{Error, Result};
use crate::sorting::merge_sort_by;
use crate::storage::{ChromosomeStorage, FlagWord, StorageId, StoragePool, REMOVE_CHROMOSOME};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

/// Ordered, optionally bounded container of storage ids.
///
/// The backing array holds atomics so that branches can append
/// concurrently through [`ChromosomeGroup::add_atomic`]; every structural
/// operation still requires exclusive access.
#[derive(Debug)]
pub struct ChromosomeGroup {
    slots: Vec<AtomicUsize>,
    len: AtomicUsize,
    helper: Vec<StorageId>,
    sizable: bool,
    membership_flag: FlagWord,
    recycle: bool,
    has_shuffle_backup: AtomicBool,
}

impl Default for ChromosomeGroup {
    fn default() -> Self {
        Self::sizable_new()
    }
}

impl Clone for ChromosomeGroup {
    fn clone(&self) -> Self {
        Self {
            slots: self
                .slots
                .iter()
                .map(|slot| AtomicUsize::new(slot.load(AtomicOrdering::Relaxed)))
                .collect(),
            len: AtomicUsize::new(self.len()),
            helper: self.helper.clone(),
            sizable: self.sizable,
            membership_flag: self.membership_flag,
            recycle: self.recycle,
            has_shuffle_backup: AtomicBool::new(false),
        }
    }
}

impl ChromosomeGroup {
    pub fn new(sizable: bool, capacity: usize, membership_flag: FlagWord, recycle: bool) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            len: AtomicUsize::new(0),
            helper: Vec::new(),
            sizable,
            membership_flag,
            recycle,
            has_shuffle_backup: AtomicBool::new(false),
        }
    }

    /// Auto-growing group without membership control or recycling.
    pub fn sizable_new() -> Self {
        Self::new(true, 0, 0, false)
    }

    /// Fixed-capacity group without membership control or recycling.
    pub fn fixed_new(capacity: usize) -> Self {
        Self::new(false, capacity, 0, false)
    }

    pub fn len(&self) -> usize {
        self.len.load(AtomicOrdering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn membership_flag(&self) -> FlagWord {
        self.membership_flag
    }

    pub fn recycles(&self) -> bool {
        self.recycle
    }

    pub fn set_recycling(&mut self, recycle: bool) {
        self.recycle = recycle;
    }

    pub fn get(&self, index: usize) -> StorageId {
        debug_assert!(index < self.len());
        self.slots[index].load(AtomicOrdering::Relaxed)
    }

    pub fn iter(&self) -> impl Iterator<Item = StorageId> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }

    pub fn ids(&self) -> Vec<StorageId> {
        self.iter().collect()
    }

    /// Change the flag bit that marks membership, rewriting the flags of
    /// every current member.
    pub fn set_membership_flag(&mut self, pool: &StoragePool, flag: FlagWord) {
        for index in 0..self.len() {
            let storage = pool.get(self.get(index));
            storage.flags().clear(self.membership_flag);
            storage.flags().set(flag);
        }
        self.membership_flag = flag;
    }

    /// Resize a fixed group. Members beyond the new capacity are dropped
    /// through the usual removal path.
    pub fn set_capacity(&mut self, pool: &mut StoragePool, capacity: usize) -> Result<()> {
        if capacity == self.slots.len() {
            return Ok(());
        }
        if self.sizable {
            return Err(Error::InvalidOperation(
                "a sizable group manages its capacity automatically",
            ));
        }

        if capacity == 0 {
            self.clear(pool, false);
        } else {
            while self.len() > capacity {
                let last = self.len() - 1;
                let id = self.get(last);
                self.len.store(last, AtomicOrdering::Relaxed);
                self.remove_helper(pool, id, false);
            }
        }
        self.resize_slots(capacity);
        Ok(())
    }

    /// Append a chromosome. Returns its position, or `None` when the
    /// membership flag shows it is already a member.
    pub fn add(&mut self, pool: &StoragePool, id: StorageId) -> Result<Option<usize>> {
        let storage = pool.get(id);
        if self.membership_flag != 0 && storage.flags().all(self.membership_flag) {
            return Ok(None);
        }

        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);

        let position = self.len();
        if position == self.slots.len() {
            if !self.sizable {
                return Err(Error::InvalidOperation("this chromosome group is full"));
            }
            let grown = (self.slots.len() * 2).max(4);
            self.resize_slots(grown);
        }

        self.slots[position].store(id, AtomicOrdering::Relaxed);
        self.len.store(position + 1, AtomicOrdering::Relaxed);
        storage.flags().set(self.membership_flag);
        Ok(Some(position))
    }

    /// Thread-safe append against a single group. Capacity must already be
    /// reserved; concurrent callers each receive a distinct position.
    pub fn add_atomic(&self, storage: &ChromosomeStorage) -> Result<Option<usize>> {
        if self.membership_flag != 0 && storage.flags().all(self.membership_flag) {
            return Ok(None);
        }

        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);

        let position = self.len.fetch_add(1, AtomicOrdering::Relaxed);
        if position >= self.slots.len() {
            self.len.fetch_sub(1, AtomicOrdering::Relaxed);
            return Err(Error::InvalidOperation("this chromosome group is full"));
        }

        self.slots[position].store(storage.id(), AtomicOrdering::Relaxed);
        storage.flags().set(self.membership_flag);
        Ok(Some(position))
    }

    /// Remove one chromosome by id, preserving order. Returns whether it
    /// was a member.
    pub fn remove_by_id(
        &mut self,
        pool: &mut StoragePool,
        id: StorageId,
        dont_recycle: bool,
    ) -> bool {
        if self.membership_flag != 0 && !pool.get(id).flags().all(self.membership_flag) {
            return false;
        }

        let len = self.len();
        let position = (0..len).find(|index| self.get(*index) == id);
        match position {
            Some(position) => {
                self.has_shuffle_backup
                    .store(false, AtomicOrdering::Relaxed);
                for index in position..len - 1 {
                    let next = self.slots[index + 1].load(AtomicOrdering::Relaxed);
                    self.slots[index].store(next, AtomicOrdering::Relaxed);
                }
                self.len.store(len - 1, AtomicOrdering::Relaxed);
                self.remove_helper(pool, id, dont_recycle);
                true
            }
            None => false,
        }
    }

    /// Remove the chromosome at `index`, preserving order.
    pub fn remove_at(&mut self, pool: &mut StoragePool, index: usize, dont_recycle: bool) {
        let len = self.len();
        debug_assert!(index < len);
        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);

        let id = self.get(index);
        for slot in index..len - 1 {
            let next = self.slots[slot + 1].load(AtomicOrdering::Relaxed);
            self.slots[slot].store(next, AtomicOrdering::Relaxed);
        }
        self.len.store(len - 1, AtomicOrdering::Relaxed);
        self.remove_helper(pool, id, dont_recycle);
    }

    /// Drop every member whose `REMOVE_CHROMOSOME` flag is set, compacting
    /// in order.
    pub fn remove_marked(&mut self, pool: &mut StoragePool, dont_recycle: bool) {
        let len = self.len();
        let mut kept = 0;
        for index in 0..len {
            let id = self.get(index);
            if pool.get(id).flags().any(REMOVE_CHROMOSOME) {
                self.remove_helper(pool, id, dont_recycle);
            } else {
                self.slots[kept].store(id, AtomicOrdering::Relaxed);
                kept += 1;
            }
        }
        if kept != len {
            self.has_shuffle_backup
                .store(false, AtomicOrdering::Relaxed);
            self.len.store(kept, AtomicOrdering::Relaxed);
        }
    }

    /// Drop members from the tail until `new_count` remain.
    pub fn trim(&mut self, pool: &mut StoragePool, new_count: usize, dont_recycle: bool) {
        if new_count >= self.len() {
            return;
        }
        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);
        while self.len() > new_count {
            let last = self.len() - 1;
            let id = self.get(last);
            self.len.store(last, AtomicOrdering::Relaxed);
            self.remove_helper(pool, id, dont_recycle);
        }
    }

    /// Remove and return the last member. With `dont_recycle` unset and a
    /// recycling group the id goes back to the pool and `None` is
    /// returned.
    pub fn pop_last(&mut self, pool: &mut StoragePool, dont_recycle: bool) -> Option<StorageId> {
        if self.is_empty() {
            return None;
        }
        let last = self.len() - 1;
        let id = self.get(last);
        let keep = dont_recycle || !self.recycle;
        self.len.store(last, AtomicOrdering::Relaxed);
        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);
        self.remove_helper(pool, id, dont_recycle);
        keep.then_some(id)
    }

    /// Remove all members. Sizable groups shrink their backing array when
    /// it is at most half full.
    pub fn clear(&mut self, pool: &mut StoragePool, dont_recycle: bool) {
        let len = self.len();
        if len == 0 {
            return;
        }

        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);
        let shrink = self.sizable && 2 * len <= self.slots.len();

        for index in 0..len {
            self.remove_helper(pool, self.get(index), dont_recycle);
        }
        self.len.store(0, AtomicOrdering::Relaxed);

        if shrink {
            self.resize_slots(self.slots.len() / 2);
        }
    }

    /// Fisher–Yates shuffle, optionally saving the previous order.
    pub fn shuffle(&mut self, rng: &mut SmallRng, save_backup: bool) {
        let mut ids = self.ids();
        if save_backup {
            self.helper.clear();
            self.helper.extend_from_slice(&ids);
        }
        ids.shuffle(rng);
        self.store_ids(&ids);
        self.has_shuffle_backup
            .store(save_backup, AtomicOrdering::Relaxed);
    }

    /// Restore the order saved by the last `shuffle(save_backup = true)`.
    pub fn restore_shuffle(&mut self) -> Result<()> {
        if !self.has_shuffle_backup.load(AtomicOrdering::Relaxed) {
            return Err(Error::InvalidOperation(
                "group holds no backup of a shuffle operation",
            ));
        }
        let ids = self.helper.clone();
        self.store_ids(&ids);
        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);
        Ok(())
    }

    /// Stable in-place merge sort through the helper array.
    pub fn sort(
        &mut self,
        pool: &StoragePool,
        mut compare: impl FnMut(&ChromosomeStorage, &ChromosomeStorage) -> Ordering,
    ) {
        self.has_shuffle_backup
            .store(false, AtomicOrdering::Relaxed);
        let mut ids = self.ids();
        merge_sort_by(&mut ids, &mut self.helper, |a, b| {
            compare(pool.get(*a), pool.get(*b))
        });
        self.store_ids(&ids);
    }

    fn store_ids(&self, ids: &[StorageId]) {
        for (index, id) in ids.iter().enumerate() {
            self.slots[index].store(*id, AtomicOrdering::Relaxed);
        }
    }

    fn resize_slots(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots
                .extend((self.slots.len()..capacity).map(|_| AtomicUsize::new(0)));
        } else {
            self.slots.truncate(capacity);
        }
    }

    fn remove_helper(&self, pool: &mut StoragePool, id: StorageId, dont_recycle: bool) {
        if self.recycle && !dont_recycle {
            pool.release(id);
        } else if self.membership_flag != 0 {
            pool.get(id).flags().clear(self.membership_flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::ScalarFitness;
    use rand::SeedableRng;

    fn pool_with(count: usize) -> StoragePool {
        let mut pool = StoragePool::new(count.max(1));
        for _ in 0..count {
            let id = pool.reserve().unwrap();
            pool.insert(ChromosomeStorage::new(id, &ScalarFitness::new(0.0), None));
        }
        pool
    }

    #[test]
    fn membership_flag_blocks_double_insertion() {
        let pool = pool_with(2);
        let mut group = ChromosomeGroup::new(true, 0, 1 << 5, false);

        assert_eq!(group.add(&pool, 0).unwrap(), Some(0));
        assert_eq!(group.add(&pool, 0).unwrap(), None);
        assert_eq!(group.add(&pool, 1).unwrap(), Some(1));
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn remove_marked_preserves_order() {
        let mut pool = pool_with(5);
        let mut group = ChromosomeGroup::sizable_new();
        for id in 0..5 {
            group.add(&pool, id).unwrap();
        }

        pool.get(1).flags().set(REMOVE_CHROMOSOME);
        pool.get(3).flags().set(REMOVE_CHROMOSOME);
        group.remove_marked(&mut pool, true);

        assert_eq!(group.ids(), vec![0, 2, 4]);
    }

    #[test]
    fn shuffle_backup_round_trips() {
        let mut pool = pool_with(8);
        let mut group = ChromosomeGroup::sizable_new();
        for id in 0..8 {
            group.add(&pool, id).unwrap();
        }
        let original = group.ids();

        let mut rng = SmallRng::seed_from_u64(11);
        group.shuffle(&mut rng, true);
        group.restore_shuffle().unwrap();
        assert_eq!(group.ids(), original);

        group.shuffle(&mut rng, false);
        assert!(group.restore_shuffle().is_err());
        let _ = &mut pool;
    }

    #[test]
    fn sort_is_stable_and_idempotent() {
        let mut pool = pool_with(4);
        for (id, value) in [(0usize, 2.0f32), (1, 1.0), (2, 2.0), (3, 0.5)] {
            crate::fitness::downcast_mut::<ScalarFitness>(pool.get_mut(id).raw_fitness_mut())
                .unwrap()
                .set_value(value);
        }

        let mut group = ChromosomeGroup::sizable_new();
        for id in 0..4 {
            group.add(&pool, id).unwrap();
        }

        let by_value = |a: &ChromosomeStorage, b: &ChromosomeStorage| {
            a.raw_fitness()
                .probability_base()
                .partial_cmp(&b.raw_fitness().probability_base())
                .unwrap_or(std::cmp::Ordering::Equal)
        };
        group.sort(&pool, by_value);
        assert_eq!(group.ids(), vec![3, 1, 0, 2]);
        group.sort(&pool, by_value);
        assert_eq!(group.ids(), vec![3, 1, 0, 2]);
    }

    #[test]
    fn recycling_clear_returns_ids_to_the_pool() {
        let mut pool = pool_with(3);
        let mut group = ChromosomeGroup::new(true, 0, 0, true);
        for id in 0..3 {
            group.add(&pool, id).unwrap();
        }

        group.clear(&mut pool, false);
        assert_eq!(pool.pooled_count(), 3);
    }

    #[test]
    fn add_atomic_reserves_distinct_positions() {
        let pool = pool_with(3);
        let group = ChromosomeGroup::new(false, 2, 0, false);

        assert_eq!(group.add_atomic(pool.get(0)).unwrap(), Some(0));
        assert_eq!(group.add_atomic(pool.get(1)).unwrap(), Some(1));
        assert!(group.add_atomic(pool.get(2)).is_err());
    }
}
