//! Chromosome storage objects and the pool that recycles them.
//!
//! A storage object is the container the population actually manages: one
//! shared genotype reference, the owned raw and scaled fitness values, a
//! flags word and the typed tag buffer. Storage objects are created lazily
//! by the pool, prepared when acquired and returned on removal; their id is
//! stable for the lifetime of the population, which lets groups and tags
//! refer to chromosomes by id instead of by pointer.

use crate::chromosome::ChromosomePtr;
use crate::errors::{Error, Result};
use crate::fitness::{Fitness, FitnessKind};
use crate::tags::TagBuffer;
use fixedbitset::FixedBitSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of a storage slot inside its population's pool.
pub type StorageId = usize;

pub type FlagWord = u64;

/// Set while the chromosome sits in the new-this-generation group.
pub const NEW_CHROMOSOME: FlagWord = 1 << 0;

/// Marks the chromosome for the next `remove_marked` pass.
pub const REMOVE_CHROMOSOME: FlagWord = 1 << 1;

const USER_FLAG_BASE: u32 = 2;
const USER_FLAG_COUNT: u32 = 32;

/// Atomic flags word of one storage object. Parallel passes mark removal
/// and membership through shared references.
#[derive(Debug, Default)]
pub struct StorageFlags(AtomicU64);

impl StorageFlags {
    pub fn set(&self, bits: FlagWord) {
        self.0.fetch_or(bits, Ordering::Relaxed);
    }

    pub fn clear(&self, bits: FlagWord) {
        self.0.fetch_and(!bits, Ordering::Relaxed);
    }

    /// Any of `bits` set?
    pub fn any(&self, bits: FlagWord) -> bool {
        self.0.load(Ordering::Relaxed) & bits != 0
    }

    /// All of `bits` set?
    pub fn all(&self, bits: FlagWord) -> bool {
        self.0.load(Ordering::Relaxed) & bits == bits
    }

    pub fn load(&self) -> FlagWord {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

impl Clone for StorageFlags {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.load()))
    }
}

/// Hands out the user-assignable bits of the storage flags word.
#[derive(Debug, Clone)]
pub struct FlagManager {
    allocated: FixedBitSet,
}

impl Default for FlagManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagManager {
    pub fn new() -> Self {
        Self {
            allocated: FixedBitSet::with_capacity(USER_FLAG_COUNT as usize),
        }
    }

    /// Reserve a free user bit and return its mask.
    pub fn acquire(&mut self) -> Result<FlagWord> {
        let free = (0..USER_FLAG_COUNT as usize).find(|bit| !self.allocated.contains(*bit));
        match free {
            Some(bit) => {
                self.allocated.insert(bit);
                Ok(1 << (USER_FLAG_BASE + bit as u32))
            }
            None => Err(Error::InvalidOperation("all user flag bits are taken")),
        }
    }

    /// Return a previously acquired mask to the free set.
    pub fn release(&mut self, mask: FlagWord) -> Result<()> {
        let bit = mask.trailing_zeros();
        if mask.count_ones() != 1 || bit < USER_FLAG_BASE || bit >= USER_FLAG_BASE + USER_FLAG_COUNT
        {
            return Err(Error::ArgumentOutOfRange {
                argument: "mask",
                reason: "not a single user flag bit",
            });
        }
        let index = (bit - USER_FLAG_BASE) as usize;
        if !self.allocated.contains(index) {
            return Err(Error::InvalidOperation("flag bit is not allocated"));
        }
        self.allocated.remove(index);
        Ok(())
    }
}

/// One pooled chromosome container.
#[derive(Debug)]
pub struct ChromosomeStorage {
    id: StorageId,
    chromosome: Option<ChromosomePtr>,
    parent: Option<StorageId>,
    raw_fitness: Box<dyn Fitness>,
    scaled_fitness: Option<Box<dyn Fitness>>,
    flags: StorageFlags,
    tags: TagBuffer,
}

impl ChromosomeStorage {
    pub fn new(
        id: StorageId,
        raw_prototype: &dyn Fitness,
        scaled_prototype: Option<&dyn Fitness>,
    ) -> Self {
        Self {
            id,
            chromosome: None,
            parent: None,
            raw_fitness: raw_prototype.clone_boxed(),
            scaled_fitness: scaled_prototype.map(|prototype| prototype.clone_boxed()),
            flags: StorageFlags::default(),
            tags: TagBuffer::new(),
        }
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn chromosome(&self) -> Option<&ChromosomePtr> {
        self.chromosome.as_ref()
    }

    /// The genotype, shared. Callable only while a chromosome is stored.
    pub fn chromosome_ptr(&self) -> Result<ChromosomePtr> {
        self.chromosome
            .clone()
            .ok_or(Error::NullArgument("chromosome"))
    }

    pub fn set_chromosome(&mut self, chromosome: ChromosomePtr, parent: Option<StorageId>) {
        self.chromosome = Some(chromosome);
        self.parent = parent;
    }

    pub fn parent(&self) -> Option<StorageId> {
        self.parent
    }

    pub fn is_in_use(&self) -> bool {
        self.chromosome.is_some()
    }

    pub fn fitness(&self, kind: FitnessKind) -> Result<&dyn Fitness> {
        match kind {
            FitnessKind::Raw => Ok(self.raw_fitness.as_ref()),
            FitnessKind::Scaled => self
                .scaled_fitness
                .as_deref()
                .ok_or(Error::NullArgument("scaled fitness prototype")),
        }
    }

    pub fn fitness_mut(&mut self, kind: FitnessKind) -> Result<&mut dyn Fitness> {
        match kind {
            FitnessKind::Raw => Ok(self.raw_fitness.as_mut()),
            FitnessKind::Scaled => match self.scaled_fitness.as_deref_mut() {
                Some(fitness) => Ok(fitness),
                None => Err(Error::NullArgument("scaled fitness prototype")),
            },
        }
    }

    pub fn raw_fitness(&self) -> &dyn Fitness {
        self.raw_fitness.as_ref()
    }

    pub fn raw_fitness_mut(&mut self) -> &mut dyn Fitness {
        self.raw_fitness.as_mut()
    }

    pub fn scaled_fitness(&self) -> Option<&dyn Fitness> {
        self.scaled_fitness.as_deref()
    }

    pub fn has_scaled_fitness(&self) -> bool {
        self.scaled_fitness.is_some()
    }

    /// Replace an owned fitness object by cloning a prototype. Used when
    /// the population changes its fitness operation or scaled prototype.
    pub fn set_fitness_object(
        &mut self,
        prototype: Option<&dyn Fitness>,
        kind: FitnessKind,
    ) -> Result<()> {
        match kind {
            FitnessKind::Raw => {
                let prototype = prototype.ok_or(Error::NullArgument("raw fitness prototype"))?;
                self.raw_fitness = prototype.clone_boxed();
            }
            FitnessKind::Scaled => {
                self.scaled_fitness = prototype.map(|fitness| fitness.clone_boxed());
            }
        }
        Ok(())
    }

    pub fn flags(&self) -> &StorageFlags {
        &self.flags
    }

    pub fn tags(&self) -> &TagBuffer {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagBuffer {
        &mut self.tags
    }

    /// Drop the stored chromosome and reset metadata for reuse. Fitness
    /// objects keep their shape; tag preparation is the owner's job.
    pub fn clear(&mut self) {
        self.chromosome = None;
        self.parent = None;
        self.flags.reset();
        self.raw_fitness.clear();
        if let Some(scaled) = self.scaled_fitness.as_mut() {
            scaled.clear();
        }
    }
}

/// Arena of storage objects with a free list.
///
/// Both in-use and pooled objects live in `slots`, so layout updates (new
/// fitness prototypes, tag changes) reach every object in one sweep.
#[derive(Debug)]
pub struct StoragePool {
    slots: Vec<ChromosomeStorage>,
    free: Vec<StorageId>,
    limit: usize,
}

impl StoragePool {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pooled_count(&self) -> usize {
        self.free.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Take a recycled slot, if any.
    pub fn acquire_recycled(&mut self) -> Option<StorageId> {
        self.free.pop()
    }

    /// Reserve the id for a new slot. Fails when the pool is at its limit;
    /// the caller recovers by raising the limit.
    pub fn reserve(&mut self) -> Result<StorageId> {
        if self.slots.len() >= self.limit {
            return Err(Error::PoolExhausted {
                capacity: self.limit,
            });
        }
        Ok(self.slots.len())
    }

    pub fn insert(&mut self, storage: ChromosomeStorage) -> StorageId {
        let id = storage.id();
        debug_assert_eq!(id, self.slots.len());
        self.slots.push(storage);
        id
    }

    pub fn raise_limit(&mut self) {
        self.limit *= 2;
        log::debug!("storage pool limit raised to {}", self.limit);
    }

    pub fn release(&mut self, id: StorageId) {
        self.slots[id].clear();
        self.free.push(id);
    }

    pub fn get(&self, id: StorageId) -> &ChromosomeStorage {
        &self.slots[id]
    }

    pub fn get_mut(&mut self, id: StorageId) -> &mut ChromosomeStorage {
        &mut self.slots[id]
    }

    /// Visit every storage object, in use or pooled.
    pub fn update_all(&mut self, mut update: impl FnMut(&mut ChromosomeStorage)) {
        self.slots.iter_mut().for_each(&mut update);
    }

    pub fn slots(&self) -> &[ChromosomeStorage] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [ChromosomeStorage] {
        &mut self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::ScalarFitness;

    fn storage(id: StorageId) -> ChromosomeStorage {
        ChromosomeStorage::new(id, &ScalarFitness::new(0.0), None)
    }

    #[test]
    fn flags_are_bit_independent() {
        let flags = StorageFlags::default();
        flags.set(NEW_CHROMOSOME | REMOVE_CHROMOSOME);
        flags.clear(NEW_CHROMOSOME);
        assert!(!flags.any(NEW_CHROMOSOME));
        assert!(flags.any(REMOVE_CHROMOSOME));
    }

    #[test]
    fn flag_manager_hands_out_distinct_user_bits() {
        let mut manager = FlagManager::new();
        let first = manager.acquire().unwrap();
        let second = manager.acquire().unwrap();
        assert_ne!(first, second);
        assert_eq!(first & (NEW_CHROMOSOME | REMOVE_CHROMOSOME), 0);

        manager.release(first).unwrap();
        let third = manager.acquire().unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn pool_recycles_released_slots() {
        let mut pool = StoragePool::new(4);
        let id = pool.reserve().unwrap();
        pool.insert(storage(id));

        assert!(pool.acquire_recycled().is_none());
        pool.release(id);
        assert_eq!(pool.acquire_recycled(), Some(id));
    }

    #[test]
    fn pool_reports_exhaustion_at_limit() {
        let mut pool = StoragePool::new(1);
        let id = pool.reserve().unwrap();
        pool.insert(storage(id));

        assert!(matches!(pool.reserve(), Err(Error::PoolExhausted { .. })));
        pool.raise_limit();
        assert!(pool.reserve().is_ok());
    }

    #[test]
    fn scaled_fitness_follows_prototype() {
        let mut storage = storage(0);
        assert!(storage.fitness(FitnessKind::Scaled).is_err());

        storage
            .set_fitness_object(Some(&ScalarFitness::new(0.0)), FitnessKind::Scaled)
            .unwrap();
        assert!(storage.fitness(FitnessKind::Scaled).is_ok());

        storage.set_fitness_object(None, FitnessKind::Scaled).unwrap();
        assert!(!storage.has_scaled_fitness());
    }
}
