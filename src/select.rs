//! Selection operations.
//!
//! A selection fills its output group with parents picked from the
//! population, or, when a crossover-buffer tag is configured, feeds picked
//! parents through per-branch crossover buffers and emits finished
//! offspring instead. Duplicate control is optional: with a selected-tag
//! configured, an atomic compare-and-set on the chromosome keeps a member
//! from being picked twice in one pass.

mod bottom;
mod random;
mod roulette;
mod top;
mod tournament;
pub mod wrapper;

pub use self::bottom::BottomSelection;
pub use self::random::RandomSelection;
pub use self::roulette::RouletteWheelSelection;
pub use self::top::TopSelection;
pub use self::tournament::{TournamentDraw, TournamentSelection};

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::{Error, Result};
use crate::fitness::FitnessKind;
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, CrossoverBuffer, Population};
use crate::statistics;
use crate::storage::StorageId;
use crate::tags::{TagHandle, TagId, TypedTagLifecycle};
use rand::rngs::SmallRng;
use rand::Rng;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait Select: Debug + Send + Sync {
    /// Number of picks this selection performs per run.
    fn selection_count(&self) -> usize;

    /// Population tag under which the per-branch crossover buffers live.
    /// `None` means the selection emits parents, not offspring.
    fn crossover_buffers_tag(&self) -> Option<TagId> {
        None
    }

    /// Chromosome tag used to suppress duplicate picks.
    fn selected_tag(&self) -> Option<TagId> {
        None
    }

    /// Wire the output group and the per-branch buffers into the
    /// population.
    fn prepare(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: Option<&MatingSetup>,
        branches: &Branches,
    ) -> Result<()> {
        prepare_selection(self, population, output, mating, branches)
    }

    /// Undo `prepare`: drop buffers and tags, empty the output.
    fn clear(&self, population: &mut Population, output: &mut ChromosomeGroup) -> Result<()> {
        clear_selection(self, population, output)
    }

    /// Refresh per-branch state after the branch count changed.
    fn update(
        &self,
        population: &mut Population,
        mating: Option<&MatingSetup>,
        branches: &Branches,
    ) -> Result<()> {
        update_selection(self, population, mating, branches)
    }

    fn run(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: Option<&MatingSetup>,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()>;
}

fn make_buffers(mating: Option<&MatingSetup>, count: usize) -> Result<Vec<CrossoverBuffer>> {
    let mating = mating.ok_or(Error::NullArgument("mating setup"))?;
    Ok((0..count)
        .map(|_| CrossoverBuffer::new(mating.parent_count(), mating.offspring_count()))
        .collect())
}

pub(crate) fn prepare_selection<S: Select + ?Sized>(
    select: &S,
    population: &mut Population,
    output: &mut ChromosomeGroup,
    mating: Option<&MatingSetup>,
    branches: &Branches,
) -> Result<()> {
    output.clear(population.pool_mut(), false);
    // offspring placed into the output are owned by it; plain parents stay
    // owned by the population
    output.set_recycling(select.crossover_buffers_tag().is_some());

    if let Some(tag) = select.crossover_buffers_tag() {
        let handle = population.add_population_tag::<Vec<CrossoverBuffer>>(
            tag,
            Box::new(TypedTagLifecycle::<Vec<CrossoverBuffer>>::default()),
        )?;
        let buffers = make_buffers(mating, branches.count())?;
        population.put_population_tag(handle, buffers)?;
    }

    if let Some(tag) = select.selected_tag() {
        population.add_chromosome_tag::<AtomicUsize>(
            tag,
            Box::new(TypedTagLifecycle::<AtomicUsize>::default()),
        )?;
    }
    Ok(())
}

pub(crate) fn clear_selection<S: Select + ?Sized>(
    select: &S,
    population: &mut Population,
    output: &mut ChromosomeGroup,
) -> Result<()> {
    output.clear(population.pool_mut(), false);
    if let Some(tag) = select.crossover_buffers_tag() {
        population.remove_population_tag(tag)?;
    }
    if let Some(tag) = select.selected_tag() {
        population.remove_chromosome_tag(tag)?;
    }
    Ok(())
}

pub(crate) fn update_selection<S: Select + ?Sized>(
    select: &S,
    population: &mut Population,
    mating: Option<&MatingSetup>,
    branches: &Branches,
) -> Result<()> {
    if let Some(tag) = select.crossover_buffers_tag() {
        let handle = population.population_tag_handle::<Vec<CrossoverBuffer>>(tag)?;
        let buffers = make_buffers(mating, branches.count())?;
        population.put_population_tag(handle, buffers)?;
    }
    Ok(())
}

/// Per-branch crossover buffers, moved out of the population tag for the
/// duration of a run.
pub(crate) struct BranchBuffers {
    handle: TagHandle<Vec<CrossoverBuffer>>,
    pub buffers: Vec<CrossoverBuffer>,
}

pub(crate) fn take_buffers<S: Select + ?Sized>(
    select: &S,
    population: &mut Population,
) -> Result<Option<BranchBuffers>> {
    match select.crossover_buffers_tag() {
        None => Ok(None),
        Some(tag) => {
            let handle = population.population_tag_handle::<Vec<CrossoverBuffer>>(tag)?;
            let buffers = population.take_population_tag(handle)?;
            Ok(Some(BranchBuffers { handle, buffers }))
        }
    }
}

pub(crate) fn put_buffers(
    population: &mut Population,
    taken: Option<BranchBuffers>,
) -> Result<()> {
    if let Some(taken) = taken {
        population.put_population_tag(taken.handle, taken.buffers)?;
    }
    Ok(())
}

pub(crate) fn selected_handle<S: Select + ?Sized>(
    select: &S,
    population: &Population,
) -> Result<Option<TagHandle<AtomicUsize>>> {
    select
        .selected_tag()
        .map(|tag| population.chromosome_tag_handle(tag))
        .transpose()
}

/// Pick the member at `index` unless the duplicate tag says it is already
/// taken.
pub(crate) fn try_select(
    population: &Population,
    index: usize,
    selected: Option<TagHandle<AtomicUsize>>,
) -> Result<Option<StorageId>> {
    let id = population.id_at(index);
    match selected {
        None => Ok(Some(id)),
        Some(handle) => {
            let tag = population.storage(id).tags().get(handle)?;
            let fresh = tag
                .compare_exchange(0, 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok();
            Ok(fresh.then_some(id))
        }
    }
}

/// Reset the duplicate tags touched by a pass.
pub(crate) fn clear_selected_flags(
    population: &Population,
    selected: Option<TagHandle<AtomicUsize>>,
) -> Result<()> {
    if let Some(handle) = selected {
        for index in 0..population.len() {
            population
                .at(index)
                .tags()
                .get(handle)?
                .store(0, Ordering::Relaxed);
        }
    }
    Ok(())
}

/// Route one pick into the output, via the branch's crossover buffer when
/// mating is configured.
pub(crate) fn store_selected(
    population: &mut Population,
    output: &mut ChromosomeGroup,
    buffer: Option<&mut CrossoverBuffer>,
    mating: Option<&MatingSetup>,
    counters: &mut CouplingCounters,
    rng: &mut SmallRng,
    id: StorageId,
) -> Result<()> {
    match buffer {
        Some(buffer) => {
            if buffer.add_parent(population, id)? {
                let mating = mating.ok_or(Error::NullArgument("mating setup"))?;
                buffer.mate(population, mating, rng)?;
                while let Some(child) = buffer
                    .offspring_mut()
                    .pop_last(population.pool_mut(), true)
                {
                    output.add(population.pool(), child)?;
                }
                counters.collect_crossover_buffer(buffer);
                buffer.clear(population);
            }
        }
        None => {
            output.add(population.pool(), id)?;
        }
    }
    Ok(())
}

/// Cumulative roulette-wheel scan over the scaled probability bases: the
/// pick is the first index where the running sum reaches the target.
pub(crate) fn roulette_scan(population: &Population, target: f32) -> Result<usize> {
    let size = population.len();
    let mut running = 0.0;
    for index in 0..size - 1 {
        running += population
            .at(index)
            .fitness(FitnessKind::Scaled)?
            .probability_base();
        if running >= target {
            return Ok(index);
        }
    }
    Ok(size - 1)
}

/// Roulette pick with a random target in `[0, total)`. A non-positive
/// total degrades to a uniform pick.
pub(crate) fn roulette_index(
    population: &Population,
    total_probability: f32,
    rng: &mut SmallRng,
) -> Result<usize> {
    if total_probability <= 0.0 {
        return Ok(rng.gen_range(0..population.len()));
    }
    let target = rng.gen::<f32>() * total_probability;
    roulette_scan(population, target)
}

/// Sum of scaled probability bases, read off the statistics when the
/// scaled fitness tracker maintains it, computed directly otherwise.
pub(crate) fn total_scaled_probability(population: &Population) -> Result<f32> {
    if let Ok(Some(total)) = population
        .statistics()
        .fitness(statistics::TOTAL_FITNESS_SCALED)
    {
        return Ok(total.probability_base());
    }

    let mut total = 0.0;
    for index in 0..population.len() {
        total += population
            .at(index)
            .fitness(FitnessKind::Scaled)?
            .probability_base();
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{Chromosome, ChromosomePtr, Initializer};
    use crate::evaluation::FitnessOperation;
    use crate::fitness::comparators::ScalarComparator;
    use crate::fitness::{downcast_mut, Fitness, FitnessOrdering, ScalarFitness};
    use crate::population::{FillOptions, Population, PopulationParams};
    use std::any::Any;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Unit;

    impl Chromosome for Unit {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Clone, Debug)]
    struct UnitInitializer;

    impl Initializer for UnitInitializer {
        fn make(&self, _rng: &mut SmallRng) -> ChromosomePtr {
            Arc::new(Unit)
        }

        fn clone_boxed(&self) -> Box<dyn Initializer> {
            Box::new(self.clone())
        }
    }

    #[derive(Clone, Debug)]
    struct UnitFitness;

    impl FitnessOperation for UnitFitness {
        fn clone_boxed(&self) -> Box<dyn FitnessOperation> {
            Box::new(self.clone())
        }

        fn create_fitness(&self) -> Box<dyn Fitness> {
            Box::new(ScalarFitness::default())
        }

        fn evaluate(&mut self, _chromosome: &dyn Chromosome, fitness: &mut dyn Fitness) {
            if let Ok(fitness) = downcast_mut::<ScalarFitness>(fitness) {
                fitness.set_value(1.0);
            }
        }
    }

    fn population_with_equal_bases(size: usize) -> Population {
        let fill = FillOptions {
            on_init: false,
            on_size_change: false,
            crowding_space: false,
        };
        let mut population = Population::builder()
            .with_params(PopulationParams::new(size, 0, fill).unwrap())
            .with_initializer(Box::new(UnitInitializer))
            .with_fitness_operation(Box::new(UnitFitness))
            .with_fitness_comparator(Box::new(ScalarComparator::new(FitnessOrdering::Maximize)))
            .build()
            .unwrap();
        population.initialize().unwrap();
        population.set_scaled_fitness_prototype(Some(Box::new(ScalarFitness::new(0.0))));

        for _ in 0..size {
            let id = population.make_from_prototype().unwrap();
            population.insert(id).unwrap();
            let scaled = population
                .storage_mut(id)
                .fitness_mut(FitnessKind::Scaled)
                .unwrap();
            downcast_mut::<ScalarFitness>(scaled).unwrap().set_value(1.0);
        }
        population
    }

    #[test]
    fn roulette_scan_picks_where_the_running_sum_reaches_the_target() {
        // bases [1, 1, 1, 1], total 4: a target of 2.5 crosses at index 2
        let population = population_with_equal_bases(4);
        assert_eq!(roulette_scan(&population, 2.5).unwrap(), 2);
        assert_eq!(roulette_scan(&population, 0.0).unwrap(), 0);
        assert_eq!(roulette_scan(&population, 3.9).unwrap(), 3);
    }

    #[test]
    fn total_probability_is_computed_without_a_tracker() {
        let population = population_with_equal_bases(4);
        assert_eq!(total_scaled_probability(&population).unwrap(), 4.0);
    }
}
