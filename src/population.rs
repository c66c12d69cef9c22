//! The population: chromosome storage, bookkeeping and operation plumbing.
//!
//! A population owns its storage pool, the live member order, the two
//! per-generation side groups (new and removed chromosomes), both tag
//! managers, flags, statistics, trackers and the event manager. Operators
//! read chromosomes through storage references and communicate through
//! tags; the population keeps the bookkeeping consistent: every removal
//! lands in the removed group, every insertion in the new group, and
//! `next_generation` rolls statistics and clears both groups at the
//! generation boundary.
//!
//! The member sequence is conceptually split into *permanent space* and a
//! *crowding space* suffix that replacement operations may overfill
//! temporarily; `trim_to_permanent` restores capacity after scaling
//! decided who survives.

use crate::branch::Branches;
use crate::chromosome::{Chromosome, ChromosomePtr, Initializer, MatingSetup};
use crate::errors::{Error, Result};
use crate::evaluation::FitnessOperation;
use crate::events::{EventData, EventManager, PopulationEvent};
use crate::fitness::comparators::FitnessComparator;
use crate::fitness::{Fitness, FitnessKind};
use crate::group::ChromosomeGroup;
use crate::sorting::merge_sort_by;
use crate::statistics::trackers::{StatTracker, TrackerId, OPERATION_COUNT_TRACKER, OPERATION_TIME_TRACKER};
use crate::statistics::{self, Statistics, ValueId};
use crate::storage::{
    ChromosomeStorage, FlagManager, StorageId, StoragePool, NEW_CHROMOSOME, REMOVE_CHROMOSOME,
};
use crate::tags::{TagBox, TagBuffer, TagHandle, TagId, TagLifecycle, TagManager};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use thread_local::ThreadLocal;

/// Which spaces get filled from the initialization operation.
#[derive(Copy, Clone, Debug)]
pub struct FillOptions {
    /// Fill permanent space on `initialize`.
    pub on_init: bool,
    /// Fill growth after a size increase through `set_params`.
    pub on_size_change: bool,
    /// Include the crowding space when filling.
    pub crowding_space: bool,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            on_init: true,
            on_size_change: true,
            crowding_space: false,
        }
    }
}

/// Size and fill policy of a population.
#[derive(Clone, Debug)]
pub struct PopulationParams {
    population_size: usize,
    crowding_size: usize,
    fill_options: FillOptions,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            population_size: 10,
            crowding_size: 0,
            fill_options: FillOptions::default(),
        }
    }
}

impl PopulationParams {
    pub fn new(population_size: usize, crowding_size: usize, fill_options: FillOptions) -> Result<Self> {
        if population_size == 0 {
            return Err(Error::ArgumentOutOfRange {
                argument: "population_size",
                reason: "the population must hold at least one chromosome",
            });
        }
        if crowding_size >= population_size {
            return Err(Error::ArgumentOutOfRange {
                argument: "crowding_size",
                reason: "crowding space must be smaller than the population",
            });
        }
        Ok(Self {
            population_size,
            crowding_size,
            fill_options,
        })
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn crowding_size(&self) -> usize {
        self.crowding_size
    }

    /// Capacity excluding the crowding suffix.
    pub fn permanent_space_size(&self) -> usize {
        self.population_size - self.crowding_size
    }

    pub fn fill_options(&self) -> FillOptions {
        self.fill_options
    }
}

/// Population state flags, cleared (except `INITIALIZED`) at every
/// generation boundary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PopulationFlags(u32);

impl PopulationFlags {
    pub const INITIALIZED: u32 = 1;
    pub const FITNESS_OPERATION_CHANGED: u32 = 1 << 1;
    pub const FITNESS_COMPARATOR_CHANGED: u32 = 1 << 2;
    pub const SCALED_FITNESS_PROTOTYPE_CHANGED: u32 = 1 << 3;
    pub const COMPLETE_FITNESS_UPDATE: u32 = 1 << 4;
    pub const COMPLETE_SCALED_FITNESS_UPDATE: u32 = 1 << 5;
    pub const SIZE_CHANGED: u32 = 1 << 6;

    pub fn set(&mut self, bits: u32) {
        self.0 |= bits;
    }

    pub fn clear(&mut self, bits: u32) {
        self.0 &= !bits;
    }

    pub fn any(&self, bits: u32) -> bool {
        self.0 & bits != 0
    }

    pub fn all(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// Keep only the bits in `mask`.
    pub fn retain(&mut self, mask: u32) {
        self.0 &= mask;
    }
}

struct TrackerEntry {
    updated: bool,
    tracker: Arc<dyn StatTracker>,
}

/// Builder for [`Population`]. The initializer, fitness operation and
/// fitness comparator are mandatory.
#[derive(Default)]
pub struct PopulationBuilder {
    params: PopulationParams,
    initializer: Option<Box<dyn Initializer>>,
    fitness_operation: Option<Box<dyn FitnessOperation>>,
    fitness_comparator: Option<Box<dyn FitnessComparator>>,
    seed: u64,
}

impl PopulationBuilder {
    pub fn with_params(mut self, params: PopulationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_initializer(mut self, initializer: Box<dyn Initializer>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn with_fitness_operation(mut self, operation: Box<dyn FitnessOperation>) -> Self {
        self.fitness_operation = Some(operation);
        self
    }

    pub fn with_fitness_comparator(mut self, comparator: Box<dyn FitnessComparator>) -> Self {
        self.fitness_comparator = Some(comparator);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<Population> {
        let initializer = self.initializer.ok_or(Error::NullArgument("initializer"))?;
        let fitness_operation = self
            .fitness_operation
            .ok_or(Error::NullArgument("fitness operation"))?;
        let fitness_comparator = self
            .fitness_comparator
            .ok_or(Error::NullArgument("fitness comparator"))?;

        let fitness_prototype = fitness_operation.create_fitness();
        let pool_limit = self.params.population_size() * 4 + 8;

        let mut flags = PopulationFlags::default();
        flags.set(PopulationFlags::FITNESS_OPERATION_CHANGED);

        Ok(Population {
            params: self.params,
            initializer,
            fitness_operation,
            fitness_prototype,
            scaled_prototype: None,
            fitness_comparator,
            order: Vec::new(),
            helper: Vec::new(),
            pool: StoragePool::new(pool_limit),
            new_chromosomes: ChromosomeGroup::new(true, 0, NEW_CHROMOSOME, false),
            removed_chromosomes: ChromosomeGroup::new(true, 0, 0, true),
            chromosome_tag_manager: TagManager::new(),
            population_tag_manager: TagManager::new(),
            population_tags: TagBuffer::new(),
            flags,
            flag_manager: FlagManager::new(),
            statistics: Statistics::new(),
            events: EventManager::new(),
            trackers: FxHashMap::default(),
            rng: SmallRng::seed_from_u64(self.seed),
        })
    }
}

pub struct Population {
    params: PopulationParams,
    initializer: Box<dyn Initializer>,
    fitness_operation: Box<dyn FitnessOperation>,
    fitness_prototype: Box<dyn Fitness>,
    scaled_prototype: Option<Box<dyn Fitness>>,
    fitness_comparator: Box<dyn FitnessComparator>,
    order: Vec<StorageId>,
    helper: Vec<StorageId>,
    pool: StoragePool,
    new_chromosomes: ChromosomeGroup,
    removed_chromosomes: ChromosomeGroup,
    chromosome_tag_manager: TagManager,
    population_tag_manager: TagManager,
    population_tags: TagBuffer,
    flags: PopulationFlags,
    flag_manager: FlagManager,
    statistics: Statistics,
    events: EventManager,
    trackers: FxHashMap<TrackerId, TrackerEntry>,
    rng: SmallRng,
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("size", &self.order.len())
            .field("params", &self.params)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Population {
    pub fn builder() -> PopulationBuilder {
        PopulationBuilder::default()
    }

    // ----- membership and access -------------------------------------

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn params(&self) -> &PopulationParams {
        &self.params
    }

    pub fn ids(&self) -> &[StorageId] {
        &self.order
    }

    pub fn id_at(&self, index: usize) -> StorageId {
        self.order[index]
    }

    pub fn at(&self, index: usize) -> &ChromosomeStorage {
        self.pool.get(self.order[index])
    }

    pub fn at_mut(&mut self, index: usize) -> &mut ChromosomeStorage {
        self.pool.get_mut(self.order[index])
    }

    pub fn storage(&self, id: StorageId) -> &ChromosomeStorage {
        self.pool.get(id)
    }

    pub fn storage_mut(&mut self, id: StorageId) -> &mut ChromosomeStorage {
        self.pool.get_mut(id)
    }

    pub fn pool(&self) -> &StoragePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut StoragePool {
        &mut self.pool
    }

    /// Unused capacity, optionally counting the crowding suffix.
    pub fn free_space(&self, include_crowding_space: bool) -> usize {
        let capacity = if include_crowding_space {
            self.params.population_size()
        } else {
            self.params.permanent_space_size()
        };
        capacity.saturating_sub(self.order.len())
    }

    /// Whether chromosomes currently occupy the crowding suffix.
    pub fn is_crowded(&self) -> bool {
        self.order.len() > self.params.permanent_space_size()
    }

    pub fn new_chromosomes(&self) -> &ChromosomeGroup {
        &self.new_chromosomes
    }

    pub fn removed_chromosomes(&self) -> &ChromosomeGroup {
        &self.removed_chromosomes
    }

    pub fn flags(&self) -> PopulationFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut PopulationFlags {
        &mut self.flags
    }

    pub fn flag_manager_mut(&mut self) -> &mut FlagManager {
        &mut self.flag_manager
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut Statistics {
        &mut self.statistics
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn initializer(&self) -> &dyn Initializer {
        self.initializer.as_ref()
    }

    pub fn fitness_operation(&self) -> &dyn FitnessOperation {
        self.fitness_operation.as_ref()
    }

    pub fn fitness_comparator(&self) -> &dyn FitnessComparator {
        self.fitness_comparator.as_ref()
    }

    /// Number of objectives of the raw fitness shape.
    pub fn objective_count(&self) -> usize {
        self.fitness_prototype.component_count()
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    // ----- lifecycle -------------------------------------------------

    /// Allocate the backing arrays and fill the population according to
    /// its fill policy.
    pub fn initialize(&mut self) -> Result<()> {
        if self.flags.any(PopulationFlags::INITIALIZED) {
            return Err(Error::InvalidOperation("population is already initialized"));
        }

        self.statistics.reset_timer();
        self.order.reserve(self.params.population_size());

        if self.params.fill_options().on_init {
            let mut fill_size = self.params.population_size();
            if !self.params.fill_options().crowding_space {
                fill_size -= self.params.crowding_size();
            }
            for _ in 0..fill_size {
                let id = self.make_from_prototype()?;
                self.order.push(id);
                self.new_chromosomes.add(&self.pool, id)?;
            }
        }

        self.flags.set(PopulationFlags::INITIALIZED);
        log::debug!("population initialized with {} chromosomes", self.order.len());
        Ok(())
    }

    /// Recycle every chromosome and mark the population uninitialized.
    pub fn clear(&mut self, clear_stats: bool) {
        self.new_chromosomes.clear(&mut self.pool, true);
        self.removed_chromosomes.clear(&mut self.pool, false);

        for id in self.order.drain(..) {
            self.pool.release(id);
        }

        if clear_stats {
            self.statistics.clear();
        }
        self.flags.clear(PopulationFlags::INITIALIZED);
    }

    /// Insert a storage object holding a chromosome. The chromosome joins
    /// the new-this-generation group.
    pub fn insert(&mut self, id: StorageId) -> Result<()> {
        if self.order.len() >= self.params.population_size() {
            return Err(Error::InvalidOperation("population is full"));
        }
        self.order.push(id);
        self.new_chromosomes.add(&self.pool, id)?;
        Ok(())
    }

    pub fn insert_many(&mut self, ids: &[StorageId]) -> Result<()> {
        for id in ids {
            self.insert(*id)?;
        }
        Ok(())
    }

    /// Remove the chromosome at one position, preserving order.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        if index >= self.order.len() {
            return Err(Error::ArgumentOutOfRange {
                argument: "index",
                reason: "beyond the current population size",
            });
        }
        let id = self.order.remove(index);
        self.remove_bookkeeping(id);
        Ok(())
    }

    /// Remove the chromosomes at the given indices, which must be in
    /// ascending order.
    pub fn remove_sorted(&mut self, indices: &[usize]) -> Result<()> {
        if indices.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::ArgumentOutOfRange {
                argument: "indices",
                reason: "must be strictly ascending",
            });
        }
        if let Some(last) = indices.last() {
            if *last >= self.order.len() {
                return Err(Error::ArgumentOutOfRange {
                    argument: "indices",
                    reason: "beyond the current population size",
                });
            }
        }

        let removed: Vec<StorageId> = indices.iter().map(|index| self.order[*index]).collect();

        let mut next = 0;
        let mut kept = 0;
        for index in 0..self.order.len() {
            if next < indices.len() && indices[next] == index {
                next += 1;
            } else {
                self.order[kept] = self.order[index];
                kept += 1;
            }
        }
        self.order.truncate(kept);

        for id in removed {
            self.remove_bookkeeping(id);
        }
        Ok(())
    }

    /// Remove the chromosomes at the given indices, in any order.
    pub fn remove_unsorted(&mut self, indices: &[usize]) -> Result<()> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        self.remove_sorted(&sorted)
    }

    /// Remove every chromosome whose `REMOVE_CHROMOSOME` flag is set.
    pub fn remove_marked(&mut self) {
        let mut removed = Vec::new();
        let mut kept = 0;
        for index in 0..self.order.len() {
            let id = self.order[index];
            if self.pool.get(id).flags().any(REMOVE_CHROMOSOME) {
                removed.push(id);
            } else {
                self.order[kept] = id;
                kept += 1;
            }
        }
        self.order.truncate(kept);
        for id in removed {
            self.remove_bookkeeping(id);
        }
    }

    /// Swap the chromosome at `index` for a new one; the old chromosome
    /// moves to the removed group.
    pub fn replace(&mut self, index: usize, new_id: StorageId) -> Result<()> {
        if index >= self.order.len() {
            return Err(Error::ArgumentOutOfRange {
                argument: "index",
                reason: "beyond the current population size",
            });
        }
        let old = self.order[index];
        self.order[index] = new_id;
        self.remove_bookkeeping(old);
        self.new_chromosomes.add(&self.pool, new_id)?;
        Ok(())
    }

    /// Drop `trim_size` chromosomes from the tail of the sequence.
    pub fn trim(&mut self, trim_size: usize) {
        for _ in 0..trim_size.min(self.order.len()) {
            if let Some(id) = self.order.pop() {
                self.remove_bookkeeping(id);
            }
        }
    }

    /// Drop the tail down to permanent-space capacity.
    pub fn trim_to_permanent(&mut self) {
        let permanent = self.params.permanent_space_size();
        if self.order.len() > permanent {
            self.trim(self.order.len() - permanent);
        }
    }

    fn remove_bookkeeping(&mut self, id: StorageId) {
        if self.pool.get(id).flags().any(NEW_CHROMOSOME) {
            self.new_chromosomes.remove_by_id(&mut self.pool, id, true);
        }
        let _ = self.removed_chromosomes.add(&self.pool, id);
    }

    // ----- sorting and shuffling -------------------------------------

    /// Sort the whole population with an arbitrary criterion.
    pub fn sort_by(
        &mut self,
        mut compare: impl FnMut(&ChromosomeStorage, &ChromosomeStorage) -> Ordering,
    ) {
        let Self {
            order, helper, pool, ..
        } = self;
        merge_sort_by(order, helper, |a, b| compare(pool.get(*a), pool.get(*b)));
    }

    /// Sort a subrange; disjoint ranges may be sorted by different
    /// branches of the same pass.
    pub fn sort_range_by(
        &mut self,
        range: Range<usize>,
        mut compare: impl FnMut(&ChromosomeStorage, &ChromosomeStorage) -> Ordering,
    ) {
        let Self {
            order, helper, pool, ..
        } = self;
        merge_sort_by(&mut order[range], helper, |a, b| {
            compare(pool.get(*a), pool.get(*b))
        });
    }

    /// Sort by the population's default fitness comparator over the chosen
    /// fitness kind; best first.
    pub fn sort_by_fitness(&mut self, kind: FitnessKind) -> Result<()> {
        let Self {
            order,
            helper,
            pool,
            fitness_comparator,
            ..
        } = self;
        let mut missing_fitness = false;
        merge_sort_by(order, helper, |a, b| {
            match (pool.get(*a).fitness(kind), pool.get(*b).fitness(kind)) {
                (Ok(first), Ok(second)) => fitness_comparator.compare(first, second),
                _ => {
                    missing_fitness = true;
                    Ordering::Equal
                }
            }
        });
        if missing_fitness {
            return Err(Error::NullArgument("scaled fitness prototype"));
        }
        Ok(())
    }

    pub fn shuffle(&mut self) {
        let Self { order, rng, .. } = self;
        order.shuffle(rng);
    }

    // ----- fitness ---------------------------------------------------

    /// Clone of the population's fitness prototype for the given kind.
    pub fn create_fitness_object(&self, kind: FitnessKind) -> Option<Box<dyn Fitness>> {
        match kind {
            FitnessKind::Raw => Some(self.fitness_prototype.clone_boxed()),
            FitnessKind::Scaled => self.scaled_prototype.as_ref().map(|p| p.clone_boxed()),
        }
    }

    pub fn scaled_prototype(&self) -> Option<&dyn Fitness> {
        self.scaled_prototype.as_deref()
    }

    /// Evaluate one storage object's raw fitness. Returns `false` when the
    /// fitness operation only supports whole-population evaluation.
    pub fn calculate_fitness(&mut self, id: StorageId) -> Result<bool> {
        if !self.fitness_operation.supports_individual_evaluation() {
            return Ok(false);
        }
        let chromosome = self.pool.get(id).chromosome_ptr()?;
        let Self {
            fitness_operation,
            pool,
            ..
        } = self;
        fitness_operation.evaluate(chromosome.as_ref(), pool.get_mut(id).raw_fitness_mut());
        Ok(true)
    }

    /// Evaluate a free-standing chromosome into `fitness`.
    pub fn calculate_fitness_into(
        &mut self,
        chromosome: &dyn Chromosome,
        fitness: &mut dyn Fitness,
    ) -> bool {
        if !self.fitness_operation.supports_individual_evaluation() {
            return false;
        }
        self.fitness_operation.evaluate(chromosome, fitness);
        true
    }

    /// Parallel per-chromosome re-evaluation of the whole population, one
    /// operation clone per worker thread.
    pub fn evaluate_all_individual(&mut self) {
        let Self {
            fitness_operation,
            pool,
            ..
        } = self;
        let operation: &dyn FitnessOperation = fitness_operation.as_ref();
        let local: ThreadLocal<RefCell<Box<dyn FitnessOperation>>> = ThreadLocal::new();

        pool.slots_mut()
            .par_iter_mut()
            .filter(|storage| storage.is_in_use())
            .for_each(|storage| {
                let mut operation = local
                    .get_or(|| RefCell::new(operation.clone_boxed()))
                    .borrow_mut();
                if let Ok(chromosome) = storage.chromosome_ptr() {
                    operation.evaluate(chromosome.as_ref(), storage.raw_fitness_mut());
                }
            });
    }

    /// One whole-population sweep for operations without individual
    /// evaluation.
    pub fn evaluate_whole_population(&mut self) -> Result<()> {
        let Self {
            fitness_operation,
            pool,
            ..
        } = self;
        fitness_operation.evaluate_population(pool.slots_mut())
    }

    /// Compare two fitness values with the population's default
    /// comparator. `Less` means the first is better.
    pub fn compare_fitness(&self, first: &dyn Fitness, second: &dyn Fitness) -> Ordering {
        self.fitness_comparator.compare(first, second)
    }

    /// Compare two members' raw fitness by position.
    pub fn compare_fitness_at(&self, first: usize, second: usize) -> Ordering {
        self.fitness_comparator
            .compare(self.at(first).raw_fitness(), self.at(second).raw_fitness())
    }

    /// Compare two storage objects' raw fitness by id.
    pub fn compare_storages(&self, first: StorageId, second: StorageId) -> Ordering {
        self.fitness_comparator.compare(
            self.pool.get(first).raw_fitness(),
            self.pool.get(second).raw_fitness(),
        )
    }

    // ----- storage pool ----------------------------------------------

    /// Get a prepared storage object from the pool, growing it when
    /// exhausted.
    pub fn acquire_storage(&mut self) -> Result<StorageId> {
        if let Some(id) = self.pool.acquire_recycled() {
            let Self {
                chromosome_tag_manager,
                pool,
                ..
            } = self;
            chromosome_tag_manager.prepare_buffer(pool.get_mut(id).tags_mut());
            return Ok(id);
        }

        let id = match self.pool.reserve() {
            Ok(id) => id,
            Err(Error::PoolExhausted { .. }) => {
                self.pool.raise_limit();
                self.pool.reserve()?
            }
            Err(error) => return Err(error),
        };

        let mut storage = ChromosomeStorage::new(
            id,
            self.fitness_prototype.as_ref(),
            self.scaled_prototype.as_deref(),
        );
        self.chromosome_tag_manager.init_buffer(storage.tags_mut());
        self.pool.insert(storage);
        Ok(id)
    }

    pub fn release_storage(&mut self, id: StorageId) {
        self.pool.release(id);
    }

    /// Build a chromosome from the initialization operation, fitness
    /// included.
    pub fn make_from_prototype(&mut self) -> Result<StorageId> {
        let id = self.acquire_storage()?;
        let chromosome = {
            let Self {
                initializer, rng, ..
            } = self;
            initializer.make(rng)
        };
        self.pool.get_mut(id).set_chromosome(chromosome, None);
        self.calculate_fitness(id)?;
        Ok(id)
    }

    /// Visit every storage object, in use or pooled.
    pub fn update_storage_objects(&mut self, update: impl FnMut(&mut ChromosomeStorage)) {
        self.pool.update_all(update);
    }

    // ----- generations -----------------------------------------------

    /// Close the generation: evaluate trackers that have not run yet, roll
    /// statistics, clear the side groups (recycling removed chromosomes),
    /// raise `NewGeneration` and drop the per-generation flags.
    pub fn next_generation(&mut self, branches: &Branches) -> Result<()> {
        let pending: Vec<Arc<dyn StatTracker>> = self
            .trackers
            .values()
            .filter(|entry| !entry.updated)
            .map(|entry| Arc::clone(&entry.tracker))
            .collect();
        for tracker in pending {
            tracker.evaluate(self, branches)?;
        }

        self.statistics.next();
        self.new_chromosomes.clear(&mut self.pool, true);
        self.removed_chromosomes.clear(&mut self.pool, false);

        self.raise(PopulationEvent::NewGeneration);
        self.flags.retain(PopulationFlags::INITIALIZED);

        for entry in self.trackers.values_mut() {
            entry.updated = false;
        }

        log::trace!("generation {} closed", self.statistics.generation());
        Ok(())
    }

    // ----- setup changes ---------------------------------------------

    /// Resize the population. Shrinking moves the casualties to the
    /// removed group; growth is refilled from the initializer when the
    /// fill policy allows it.
    pub fn set_params(&mut self, params: PopulationParams) -> Result<()> {
        if self.flags.any(PopulationFlags::INITIALIZED) {
            let new_size = params.population_size();
            let mut target = new_size;
            if !params.fill_options().crowding_space {
                target -= params.crowding_size();
            }
            if !params.fill_options().on_size_change {
                target = target.min(self.order.len());
            }

            while self.order.len() > target {
                if let Some(id) = self.order.pop() {
                    self.remove_bookkeeping(id);
                }
            }

            if new_size != self.params.population_size() {
                self.flags.set(PopulationFlags::SIZE_CHANGED);
            }
            self.params = params;

            while self.order.len() < target {
                let id = self.make_from_prototype()?;
                self.order.push(id);
                self.new_chromosomes.add(&self.pool, id)?;
            }
        } else {
            self.params = params;
        }

        self.raise(PopulationEvent::ParametersChanged);
        Ok(())
    }

    /// Install a new fitness operation; refreshes the raw fitness objects
    /// of every live and pooled storage.
    pub fn set_fitness_operation(&mut self, operation: Box<dyn FitnessOperation>) {
        self.fitness_operation = operation;
        self.fitness_prototype = self.fitness_operation.create_fitness();

        let Self {
            pool,
            fitness_prototype,
            ..
        } = self;
        pool.update_all(|storage| {
            let _ = storage.set_fitness_object(Some(fitness_prototype.as_ref()), FitnessKind::Raw);
        });

        self.flags.set(PopulationFlags::FITNESS_OPERATION_CHANGED);
        self.raise(PopulationEvent::FitnessOperationChanged);
    }

    /// Install (or drop) the scaled fitness prototype; every storage gets
    /// a fresh scaled fitness object cloned from it.
    pub fn set_scaled_fitness_prototype(&mut self, prototype: Option<Box<dyn Fitness>>) {
        self.scaled_prototype = prototype;

        let Self {
            pool,
            scaled_prototype,
            ..
        } = self;
        pool.update_all(|storage| {
            let _ = storage.set_fitness_object(scaled_prototype.as_deref(), FitnessKind::Scaled);
        });

        self.flags
            .set(PopulationFlags::SCALED_FITNESS_PROTOTYPE_CHANGED);
        self.raise(PopulationEvent::ScaledFitnessPrototypeChanged);
    }

    pub fn set_fitness_comparator(&mut self, comparator: Box<dyn FitnessComparator>) {
        self.fitness_comparator = comparator;
        self.flags.set(PopulationFlags::FITNESS_COMPARATOR_CHANGED);
        self.raise(PopulationEvent::FitnessComparatorChanged);
    }

    fn raise(&self, event: PopulationEvent) {
        self.events.raise(EventData {
            event,
            generation: self.statistics.generation(),
            population_size: self.order.len(),
        });
    }

    // ----- chromosome tags -------------------------------------------

    /// Add a chromosome tag: registers the id and installs the tag into
    /// every live and pooled storage object.
    pub fn add_chromosome_tag<T: 'static>(
        &mut self,
        id: TagId,
        lifecycle: Box<dyn TagLifecycle>,
    ) -> Result<TagHandle<T>> {
        let slot = self.chromosome_tag_manager.register(id, lifecycle)?;
        let Self {
            chromosome_tag_manager,
            pool,
            ..
        } = self;
        let lifecycle = chromosome_tag_manager.lifecycle(id)?;
        pool.update_all(|storage| storage.tags_mut().set(slot, lifecycle.create()));
        Ok(TagHandle::new(slot))
    }

    /// Remove a chromosome tag from the layout and from every storage.
    pub fn remove_chromosome_tag(&mut self, id: TagId) -> Result<()> {
        let slot = self.chromosome_tag_manager.unregister(id)?;
        self.pool.update_all(|storage| {
            let _ = storage.tags_mut().remove(slot);
        });
        Ok(())
    }

    /// Swap a tag's lifecycle (e.g. for a new branch count) and refresh
    /// the tag in every storage.
    pub fn update_chromosome_tag_lifecycle(
        &mut self,
        id: TagId,
        lifecycle: Box<dyn TagLifecycle>,
    ) -> Result<()> {
        let slot = self.chromosome_tag_manager.replace_lifecycle(id, lifecycle)?;
        let Self {
            chromosome_tag_manager,
            pool,
            ..
        } = self;
        let lifecycle = chromosome_tag_manager.lifecycle(id)?;
        pool.update_all(|storage| {
            let _ = storage
                .tags_mut()
                .update(slot, &|tag| lifecycle.prepare(tag));
        });
        Ok(())
    }

    /// Apply an ad-hoc update to one chromosome tag across all storages.
    pub fn update_chromosome_tag(&mut self, id: TagId, update: &dyn Fn(&mut TagBox)) -> Result<()> {
        let slot = self.chromosome_tag_manager.slot_of(id)?;
        self.pool.update_all(|storage| {
            let _ = storage.tags_mut().update(slot, update);
        });
        Ok(())
    }

    pub fn chromosome_tag_handle<T>(&self, id: TagId) -> Result<TagHandle<T>> {
        self.chromosome_tag_manager.handle(id)
    }

    pub fn chromosome_tag_manager(&self) -> &TagManager {
        &self.chromosome_tag_manager
    }

    // ----- population tags -------------------------------------------

    pub fn add_population_tag<T: 'static>(
        &mut self,
        id: TagId,
        lifecycle: Box<dyn TagLifecycle>,
    ) -> Result<TagHandle<T>> {
        let slot = self.population_tag_manager.register(id, lifecycle)?;
        let lifecycle = self.population_tag_manager.lifecycle(id)?;
        self.population_tags.set(slot, lifecycle.create());
        Ok(TagHandle::new(slot))
    }

    pub fn remove_population_tag(&mut self, id: TagId) -> Result<()> {
        let slot = self.population_tag_manager.unregister(id)?;
        self.population_tags.remove(slot)
    }

    pub fn population_tag_handle<T>(&self, id: TagId) -> Result<TagHandle<T>> {
        self.population_tag_manager.handle(id)
    }

    pub fn population_tag<T: 'static>(&self, handle: TagHandle<T>) -> Result<&T> {
        self.population_tags.get(handle)
    }

    pub fn population_tag_mut<T: 'static>(&mut self, handle: TagHandle<T>) -> Result<&mut T> {
        self.population_tags.get_mut(handle)
    }

    /// Move a population tag value out for the duration of an operation;
    /// the slot holds the default value until `put_population_tag`.
    pub fn take_population_tag<T: Default + Send + Sync + 'static>(
        &mut self,
        handle: TagHandle<T>,
    ) -> Result<T> {
        Ok(std::mem::take(self.population_tags.get_mut(handle)?))
    }

    pub fn put_population_tag<T: Send + Sync + 'static>(
        &mut self,
        handle: TagHandle<T>,
        value: T,
    ) -> Result<()> {
        self.population_tags.put(handle, value)
    }

    // ----- trackers --------------------------------------------------

    pub fn register_tracker(&mut self, tracker: Arc<dyn StatTracker>) -> Result<()> {
        let id = tracker.id();
        if self.trackers.contains_key(&id) {
            return Err(Error::InvalidOperation(
                "a tracker is already registered under this id",
            ));
        }
        tracker.bind(&mut self.statistics)?;
        self.trackers.insert(
            id,
            TrackerEntry {
                updated: false,
                tracker,
            },
        );
        Ok(())
    }

    pub fn unregister_tracker(&mut self, id: TrackerId) -> Result<()> {
        let entry = self
            .trackers
            .remove(&id)
            .ok_or(Error::InvalidOperation("no tracker under this id"))?;
        entry.tracker.unbind(&mut self.statistics)
    }

    pub fn is_tracker_registered(&self, id: TrackerId) -> bool {
        self.trackers.contains_key(&id)
    }

    /// Evaluate one tracker now, at most once per generation.
    pub fn update_tracker(&mut self, id: TrackerId, branches: &Branches) -> Result<()> {
        let entry = self
            .trackers
            .get(&id)
            .ok_or(Error::InvalidOperation("no tracker under this id"))?;
        if entry.updated {
            return Ok(());
        }
        let tracker = Arc::clone(&entry.tracker);
        tracker.evaluate(self, branches)?;
        if let Some(entry) = self.trackers.get_mut(&id) {
            entry.updated = true;
        }
        Ok(())
    }
}

/// Counters a crossover buffer maintains while producing offspring.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationCounters {
    pub matings: i64,
    pub crossovers: i64,
    pub mutations: i64,
    pub accepted_mutations: i64,
}

impl OperationCounters {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Per-branch staging area for mating.
///
/// Selected parents queue up in the parent group; once `parent_count` of
/// them are present, `mate` produces offspring as full storage objects
/// drawn from the population's pool, evaluates them, and leaves them in
/// the offspring group for the caller to transfer. The parent back-link of
/// every offspring points at its storage in the parent group.
#[derive(Debug, Default)]
pub struct CrossoverBuffer {
    parents: ChromosomeGroup,
    offspring: ChromosomeGroup,
    scratch: Option<Box<dyn Fitness>>,
    counters: OperationCounters,
}

impl CrossoverBuffer {
    pub fn new(parent_count: usize, offspring_count: usize) -> Self {
        let mut offspring = ChromosomeGroup::new(false, offspring_count, 0, false);
        offspring.set_recycling(true);
        Self {
            parents: ChromosomeGroup::new(false, parent_count, 0, false),
            offspring,
            scratch: None,
            counters: OperationCounters::default(),
        }
    }

    pub fn parents(&self) -> &ChromosomeGroup {
        &self.parents
    }

    pub fn offspring(&self) -> &ChromosomeGroup {
        &self.offspring
    }

    pub fn offspring_mut(&mut self) -> &mut ChromosomeGroup {
        &mut self.offspring
    }

    pub fn counters(&self) -> OperationCounters {
        self.counters
    }

    pub fn parent_count(&self) -> usize {
        self.parents.capacity()
    }

    /// Queue a parent. Returns `true` once the buffer holds a full parent
    /// group.
    pub fn add_parent(&mut self, population: &Population, id: StorageId) -> Result<bool> {
        self.parents.add(population.pool(), id)?;
        Ok(self.parents.len() == self.parents.capacity())
    }

    /// Produce one offspring storage object. `chromosome == None` copies
    /// the parent's genotype instead of recombining.
    pub fn store_offspring(
        &mut self,
        population: &mut Population,
        chromosome: Option<ChromosomePtr>,
        parent_index: usize,
    ) -> Result<usize> {
        let parent_id = self.parents.get(parent_index);
        let is_crossover = chromosome.is_some();
        let genotype = match chromosome {
            Some(chromosome) => chromosome,
            None => population.storage(parent_id).chromosome_ptr()?,
        };

        let id = population.acquire_storage()?;
        population
            .storage_mut(id)
            .set_chromosome(genotype, Some(parent_id));
        population.calculate_fitness(id)?;

        if is_crossover {
            self.counters.crossovers = 1;
        }

        match self.offspring.add(population.pool(), id)? {
            Some(position) => Ok(position),
            None => Err(Error::InvalidOperation("offspring is already buffered")),
        }
    }

    /// Unconditionally install a mutated genotype into an offspring slot.
    pub fn replace_offspring(
        &mut self,
        population: &mut Population,
        index: usize,
        chromosome: ChromosomePtr,
    ) -> Result<()> {
        self.counters.mutations += 1;
        self.counters.accepted_mutations += 1;

        let id = self.offspring.get(index);
        let parent = population.storage(id).parent();
        population.storage_mut(id).set_chromosome(chromosome, parent);
        population.calculate_fitness(id)?;
        Ok(())
    }

    /// Install a mutated genotype only when it improves raw fitness.
    /// Without individual evaluation the mutation is always accepted and
    /// the population-level sweep settles fitness later.
    pub fn replace_if_better(
        &mut self,
        population: &mut Population,
        index: usize,
        chromosome: ChromosomePtr,
    ) -> Result<bool> {
        self.counters.mutations += 1;

        let mut scratch = match self.scratch.take() {
            Some(scratch) => scratch,
            None => {
                let Some(prototype) = population.create_fitness_object(FitnessKind::Raw) else {
                    return Err(Error::NullArgument("raw fitness prototype"));
                };
                prototype
            }
        };

        let id = self.offspring.get(index);
        let accepted = if population.calculate_fitness_into(chromosome.as_ref(), scratch.as_mut()) {
            if population.compare_fitness(scratch.as_ref(), population.storage(id).raw_fitness())
                == Ordering::Less
            {
                self.counters.accepted_mutations += 1;
                let parent = population.storage(id).parent();
                population.storage_mut(id).set_chromosome(chromosome, parent);
                population
                    .storage_mut(id)
                    .raw_fitness_mut()
                    .assign(scratch.as_ref());
                true
            } else {
                false
            }
        } else {
            self.counters.accepted_mutations += 1;
            let parent = population.storage(id).parent();
            population.storage_mut(id).set_chromosome(chromosome, parent);
            true
        };

        self.scratch = Some(scratch);
        Ok(accepted)
    }

    /// Run crossover and mutation over the buffered parent group.
    pub fn mate(
        &mut self,
        population: &mut Population,
        mating: &MatingSetup,
        rng: &mut SmallRng,
    ) -> Result<()> {
        self.counters.matings += 1;

        let parents: Vec<ChromosomePtr> = self
            .parents
            .iter()
            .map(|id| population.storage(id).chromosome_ptr())
            .collect::<Result<_>>()?;

        let offspring_count = mating.offspring_count();
        if rng.gen::<f32>() < mating.config.crossover_probability {
            let produced = mating.crossover.crossover(&parents, rng);
            for (index, genotype) in produced.into_iter().take(offspring_count).enumerate() {
                self.store_offspring(population, Some(genotype), index % parents.len())?;
            }
        } else {
            for index in 0..offspring_count {
                self.store_offspring(population, None, index % parents.len())?;
            }
        }

        for index in 0..self.offspring.len() {
            if rng.gen::<f32>() < mating.config.mutation_probability {
                let current = population
                    .storage(self.offspring.get(index))
                    .chromosome_ptr()?;
                let mutated = mating.mutation.mutate(current.as_ref(), rng);
                if mating.config.improving_mutations_only {
                    self.replace_if_better(population, index, mutated)?;
                } else {
                    self.replace_offspring(population, index, mutated)?;
                }
            }
        }
        Ok(())
    }

    /// Empty the buffer and reset its counters. Leftover offspring are
    /// recycled; parents stay owned by the population.
    pub fn clear(&mut self, population: &mut Population) {
        self.parents.clear(population.pool_mut(), true);
        self.offspring.clear(population.pool_mut(), false);
        self.counters.clear();
    }
}

/// Wall-clock instrumentation for one operator run. Active only when the
/// operation-time tracker is registered; the longest branch wins through
/// the `Max` combiner.
#[derive(Debug)]
pub struct OperationTimer {
    start: Option<Instant>,
    id: ValueId,
}

impl OperationTimer {
    pub fn start(population: &Population, id: ValueId) -> Self {
        let enabled = population.is_tracker_registered(OPERATION_TIME_TRACKER);
        Self {
            start: enabled.then(Instant::now),
            id,
        }
    }

    pub fn finish(self, population: &mut Population) -> Result<()> {
        if let Some(start) = self.start {
            population
                .statistics_mut()
                .merge_time(self.id, start.elapsed())?;
        }
        Ok(())
    }
}

/// Per-branch operation counters collected during selection and coupling,
/// merged into the statistics in one reduction.
#[derive(Debug)]
pub struct CouplingCounters {
    timer: OperationTimer,
    matings: i64,
    crossovers: i64,
    mutations: i64,
    accepted_mutations: i64,
    selections: i64,
}

impl CouplingCounters {
    pub fn start(population: &Population, time_id: ValueId) -> Self {
        Self {
            timer: OperationTimer::start(population, time_id),
            matings: 0,
            crossovers: 0,
            mutations: 0,
            accepted_mutations: 0,
            selections: 0,
        }
    }

    pub fn collect_crossover_buffer(&mut self, buffer: &CrossoverBuffer) {
        let counters = buffer.counters();
        self.matings += counters.matings;
        self.crossovers += counters.crossovers;
        self.mutations += counters.mutations;
        self.accepted_mutations += counters.accepted_mutations;
    }

    pub fn inc_selection(&mut self) {
        self.selections += 1;
    }

    pub fn flush(self, population: &mut Population) -> Result<()> {
        if population.is_tracker_registered(OPERATION_COUNT_TRACKER) {
            let statistics = population.statistics_mut();
            statistics.merge_int(statistics::MATING_COUNT, self.matings)?;
            statistics.merge_int(statistics::CROSSOVER_COUNT, self.crossovers)?;
            statistics.merge_int(statistics::MUTATION_COUNT, self.mutations)?;
            statistics.merge_int(statistics::ACCEPTED_MUTATION_COUNT, self.accepted_mutations)?;
            statistics.merge_int(statistics::SELECTION_COUNT, self.selections)?;
        }
        self.timer.finish(population)
    }
}
