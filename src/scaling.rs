//! Scaling operations: raw fitness to scaled fitness.
//!
//! A scaling operation owns the scaled-fitness prototype of the population
//! and the tags it works through. Single-objective scaling (fitness
//! sharing) spreads selection pressure across similar chromosomes;
//! multi-objective scaling turns Pareto structure into a comparable scaled
//! value through front ranks (NSGA), hypergrid density (PESA), archive
//! acceptance (PAES) or strength and clustering (SPEA).
//!
//! Every operation follows the same phase discipline: per-branch passes
//! write branch-private partial state (partial sums, dominance lists,
//! cached minima); reductions and removal decisions run in single-owner
//! sections between passes.

pub mod nsga;
pub mod nsga2;
pub mod paes;
pub mod pesa;
pub mod sharing;
pub mod spea;
pub mod spea2;
pub mod wrapper;

pub use self::nsga::NsgaScaling;
pub use self::nsga2::{CrowdedComparator, CrowdedFitness, Nsga2Scaling};
pub use self::paes::{PaesReplacement, PaesSelection};
pub use self::pesa::PesaScaling;
pub use self::sharing::FitnessSharingScaling;
pub use self::spea::SpeaScaling;
pub use self::spea2::Spea2Scaling;

use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::fitness::Fitness;
use crate::population::{Population, PopulationFlags};
use crate::storage::StorageId;
use crate::tags::SizableTag;
use std::cmp::Ordering;
use std::fmt::Debug;

pub trait Scaling: Debug + Send + Sync {
    /// Prototype of the scaled fitness representation this operation
    /// writes.
    fn scaled_prototype(&self) -> Box<dyn Fitness>;

    /// Install the scaled prototype and the operation's tags.
    fn prepare(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.set_scaled_fitness_prototype(Some(self.scaled_prototype()));
        self.prepare_tags(population, branches)
    }

    fn prepare_tags(&self, _population: &mut Population, _branches: &Branches) -> Result<()> {
        Ok(())
    }

    /// Drop the operation's tags and the scaled prototype.
    fn clear(&self, population: &mut Population) -> Result<()> {
        self.clear_tags(population)?;
        population.set_scaled_fitness_prototype(None);
        Ok(())
    }

    fn clear_tags(&self, _population: &mut Population) -> Result<()> {
        Ok(())
    }

    /// Refresh per-branch sized state after the branch count changed.
    fn update(&self, _population: &mut Population, _branches: &Branches) -> Result<()> {
        Ok(())
    }

    fn run(
        &self,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()>;
}

/// Per-branch partial lists of dominated peers, filled during a dominance
/// pass and drained by the strength/front computation.
#[derive(Clone, Debug, Default)]
pub struct DominanceList(pub Vec<Vec<StorageId>>);

impl DominanceList {
    pub fn total_len(&self) -> usize {
        self.0.iter().map(Vec::len).sum()
    }
}

impl SizableTag for DominanceList {
    fn with_len(len: usize) -> Self {
        Self(vec![Vec::new(); len])
    }

    fn set_len(&mut self, len: usize) {
        self.0.resize(len, Vec::new());
    }

    fn reset(&mut self) {
        self.0.iter_mut().for_each(Vec::clear);
    }
}

/// Upper-triangle pair pass split by branch: branch `b` owns the rows of
/// its work split; for each owned row `i` the closure sees every pair
/// `(i, j)`, `i < j`.
pub(crate) fn for_each_pair(
    branches: &Branches,
    len: usize,
    mut visit: impl FnMut(usize, usize, usize) -> Result<()>,
) -> Result<()> {
    for branch in branches.iter() {
        for row in branch.split_pairs(len) {
            for column in row + 1..len {
                visit(branch.index, row, column)?;
            }
        }
    }
    Ok(())
}

/// Mark `COMPLETE_SCALED_FITNESS_UPDATE`: the operation rewrote every
/// scaled fitness value this generation.
pub(crate) fn mark_rescaled(population: &mut Population) {
    population
        .flags_mut()
        .set(PopulationFlags::COMPLETE_SCALED_FITNESS_UPDATE);
}

/// `Ordering::Less` means `row` dominates, `Greater` means `column`
/// dominates, per the population's dominance comparator.
pub(crate) fn dominance(population: &Population, row: usize, column: usize) -> Ordering {
    population.compare_fitness_at(row, column)
}
