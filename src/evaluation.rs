//! Raw fitness assignment.
//!
//! The fitness operation is supplied by the problem definition. Operations
//! that support individual evaluation are called per chromosome, in
//! parallel, with one clone of the operation per worker thread; operations
//! that can only judge a population as a whole get the full member slice
//! in one call.
//!
//! The assignment stage runs first in every generation. Normally there is
//! nothing to do, because new chromosomes were evaluated when they entered
//! their storage objects; after the population's fitness operation changed,
//! the stage re-evaluates everything and marks the generation as a
//! complete fitness update.

use crate::branch::Branches;
use crate::chromosome::Chromosome;
use crate::errors::{Error, Result};
use crate::fitness::Fitness;
use crate::population::{Population, PopulationFlags};
use crate::storage::ChromosomeStorage;
use std::fmt::Debug;

/// Problem-side evaluation of chromosomes.
pub trait FitnessOperation: Debug + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn FitnessOperation>;

    /// Prototype of the fitness objects this operation fills in.
    fn create_fitness(&self) -> Box<dyn Fitness>;

    /// Whether chromosomes can be evaluated one at a time. Operations
    /// returning `false` are only usable through
    /// [`evaluate_population`](FitnessOperation::evaluate_population).
    fn supports_individual_evaluation(&self) -> bool {
        true
    }

    /// Evaluate one chromosome into `fitness`. Takes `&mut self` so an
    /// operation can reuse scratch allocations across calls; parallel
    /// sweeps hand each worker thread its own clone.
    fn evaluate(&mut self, chromosome: &dyn Chromosome, fitness: &mut dyn Fitness);

    /// Whole-population sweep over the storage arena. `members` contains
    /// pooled entries too; implementations skip entries that are not
    /// [in use](ChromosomeStorage::is_in_use).
    fn evaluate_population(&mut self, members: &mut [ChromosomeStorage]) -> Result<()> {
        let _ = members;
        Err(Error::FitnessEvaluationUnsupported)
    }
}

impl Clone for Box<dyn FitnessOperation> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// First stage of a generation.
///
/// When the fitness operation changed, every chromosome is re-evaluated
/// (per chromosome and parallel when the operation allows it, as one sweep
/// otherwise); the change flag is then traded for
/// `COMPLETE_FITNESS_UPDATE`, which downstream scaling and trackers read
/// for one generation. Without a change there is nothing to evaluate here:
/// chromosomes are evaluated when they enter storage.
pub fn assign_raw_fitness(population: &mut Population, _branches: &Branches) -> Result<()> {
    if !population
        .flags()
        .any(PopulationFlags::FITNESS_OPERATION_CHANGED)
    {
        return Ok(());
    }

    if population.fitness_operation().supports_individual_evaluation() {
        population.evaluate_all_individual();
    } else {
        population.evaluate_whole_population()?;
    }

    let flags = population.flags_mut();
    flags.clear(PopulationFlags::FITNESS_OPERATION_CHANGED);
    flags.set(PopulationFlags::COMPLETE_FITNESS_UPDATE);
    Ok(())
}
