//! Replacement operations.
//!
//! A replacement integrates a group of candidate chromosomes (usually
//! coupling output) into the population. All variants share the input
//! preparation: with a chromosome comparator configured, candidates equal
//! to an existing member are screened out first, then the input is trimmed
//! to the allowed replacement size.

mod crowding;
mod parent;
mod population_wide;
mod random;
pub mod wrapper;
mod worst;

pub use self::crowding::CrowdingReplacement;
pub use self::parent::ParentReplacement;
pub use self::population_wide::PopulationReplacement;
pub use self::random::RandomReplacement;
pub use self::worst::WorstReplacement;

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::Population;
use crate::storage::REMOVE_CHROMOSOME;
use std::fmt::Debug;

pub trait Replace: Debug + Send + Sync {
    /// Upper bound on how many population members one run may replace.
    fn replacement_size(&self) -> usize;

    /// Comparator used to screen duplicate candidates; `None` disables
    /// screening.
    fn chromosome_comparator(&self) -> Option<&dyn ChromosomeComparator> {
        None
    }

    fn prepare(
        &self,
        _input: &mut ChromosomeGroup,
        _population: &mut Population,
        _branches: &Branches,
    ) -> Result<()> {
        Ok(())
    }

    fn clear(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
    ) -> Result<()> {
        input.clear(population.pool_mut(), false);
        Ok(())
    }

    fn update(&self, _population: &mut Population, _branches: &Branches) -> Result<()> {
        Ok(())
    }

    fn run(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()>;
}

/// Mark input candidates whose genotype already exists in the population
/// (or earlier in the input) for removal. Branches each screen a
/// contiguous share of the input.
pub(crate) fn identify_duplicates(
    input: &ChromosomeGroup,
    population: &Population,
    comparator: Option<&dyn ChromosomeComparator>,
    branches: &Branches,
) -> Result<()> {
    let Some(comparator) = comparator else {
        return Ok(());
    };

    for branch in branches.iter() {
        for index in branch.split_work(input.len()) {
            let candidate = population.storage(input.get(index));
            if candidate.flags().any(REMOVE_CHROMOSOME) {
                continue;
            }
            let Some(chromosome) = candidate.chromosome() else {
                continue;
            };

            let duplicate = (0..population.len()).any(|member| {
                population
                    .at(member)
                    .chromosome()
                    .is_some_and(|existing| comparator.equal(chromosome.as_ref(), existing.as_ref()))
            });
            if duplicate {
                candidate.flags().set(REMOVE_CHROMOSOME);
            }
        }
    }
    Ok(())
}

/// Drop screened candidates and trim the input to the allowed size.
pub(crate) fn prepare_input(
    input: &mut ChromosomeGroup,
    population: &mut Population,
    replacement_size: usize,
) {
    input.remove_marked(population.pool_mut(), false);
    let size = replacement_size
        .min(population.len())
        .min(input.len());
    input.trim(population.pool_mut(), size, false);
}

/// Move every input candidate into the population. The input group gives
/// up ownership without recycling.
pub(crate) fn transfer_input(
    input: &mut ChromosomeGroup,
    population: &mut Population,
) -> Result<()> {
    let ids = input.ids();
    population.insert_many(&ids)?;
    input.clear(population.pool_mut(), true);
    Ok(())
}
