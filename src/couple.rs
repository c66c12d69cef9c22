//! Coupling operations.
//!
//! A coupling consumes an input group of chromosomes, typically the output
//! of a selection, and produces exactly `number_of_offspring` offspring in
//! its output group by mating parent tuples through per-branch crossover
//! buffers.

mod cross;
mod simple;
pub mod wrapper;

pub use self::cross::CrossCoupling;
pub use self::simple::SimpleCoupling;

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::{Error, Result};
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, CrossoverBuffer, Population};
use crate::statistics;
use crate::storage::StorageId;
use crate::tags::{TagId, TypedTagLifecycle};
use std::fmt::Debug;

pub trait Couple: Debug + Send + Sync {
    /// Exact number of offspring a run places into the output group.
    fn number_of_offspring(&self) -> usize;

    /// Population tag under which the per-branch crossover buffers live.
    fn crossover_buffers_tag(&self) -> TagId;

    fn prepare(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: &MatingSetup,
        branches: &Branches,
    ) -> Result<()> {
        output.clear(population.pool_mut(), false);
        output.set_recycling(true);

        let handle = population.add_population_tag::<Vec<CrossoverBuffer>>(
            self.crossover_buffers_tag(),
            Box::new(TypedTagLifecycle::<Vec<CrossoverBuffer>>::default()),
        )?;
        population.put_population_tag(handle, make_buffers(mating, branches.count()))?;
        Ok(())
    }

    fn clear(&self, population: &mut Population, output: &mut ChromosomeGroup) -> Result<()> {
        output.clear(population.pool_mut(), false);
        population.remove_population_tag(self.crossover_buffers_tag())
    }

    fn update(
        &self,
        population: &mut Population,
        mating: &MatingSetup,
        branches: &Branches,
    ) -> Result<()> {
        let handle = population
            .population_tag_handle::<Vec<CrossoverBuffer>>(self.crossover_buffers_tag())?;
        population.put_population_tag(handle, make_buffers(mating, branches.count()))?;
        Ok(())
    }

    /// Mate parents from `input` until the output holds exactly
    /// `number_of_offspring` chromosomes. An empty input is a no-op.
    fn run(
        &self,
        population: &mut Population,
        input: &ChromosomeGroup,
        output: &mut ChromosomeGroup,
        mating: &MatingSetup,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()>;
}

fn make_buffers(mating: &MatingSetup, count: usize) -> Vec<CrossoverBuffer> {
    (0..count)
        .map(|_| CrossoverBuffer::new(mating.parent_count(), mating.offspring_count()))
        .collect()
}

/// Shared mating loop: split the matings across branches, feed parents by
/// the picker (`(mating_index, slot, input_len) -> input position`),
/// transfer finished offspring, trim any overshoot.
pub(crate) fn run_coupling<C: Couple + ?Sized>(
    couple: &C,
    population: &mut Population,
    input: &ChromosomeGroup,
    output: &mut ChromosomeGroup,
    mating: &MatingSetup,
    branches: &Branches,
    streams: &mut RandomStreams,
    picker: impl Fn(usize, usize, usize) -> usize,
) -> Result<()> {
    let mut counters = CouplingCounters::start(population, statistics::COUPLING_TIME);
    output.clear(population.pool_mut(), false);

    if input.is_empty() {
        return counters.flush(population);
    }

    let total = couple.number_of_offspring();
    let per_mating = mating.offspring_count().max(1);
    let matings = (total + per_mating - 1) / per_mating;

    let handle =
        population.population_tag_handle::<Vec<CrossoverBuffer>>(couple.crossover_buffers_tag())?;
    let mut buffers = population.take_population_tag(handle)?;
    if buffers.len() != branches.count() {
        buffers = make_buffers(mating, branches.count());
    }

    let inner = |population: &mut Population,
                 output: &mut ChromosomeGroup,
                 buffers: &mut Vec<CrossoverBuffer>,
                 counters: &mut CouplingCounters,
                 streams: &mut RandomStreams|
     -> Result<()> {
        let input_ids: Vec<StorageId> = input.ids();
        for branch in branches.iter() {
            let buffer = &mut buffers[branch.index];
            for mating_index in branch.split_work(matings) {
                for slot in 0..mating.parent_count() {
                    let parent = input_ids[picker(mating_index, slot, input_ids.len())];
                    buffer.add_parent(population, parent)?;
                }
                buffer.mate(population, mating, streams.branch(branch.index))?;
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
        Ok(())
    };

    let result = inner(population, output, &mut buffers, &mut counters, streams);
    match result {
        Ok(()) => {
            // the last mating may have overshot the requested count
            output.trim(population.pool_mut(), total, false);
        }
        Err(_) => {
            output.clear(population.pool_mut(), false);
            for buffer in &mut buffers {
                buffer.clear(population);
            }
        }
    }

    population.put_population_tag(handle, buffers)?;
    counters.flush(population)?;
    result
}
