pub use super::crowding::CrowdingReplacement as ReplaceCrowding;
pub use super::parent::ParentReplacement as ReplaceParent;
pub use super::population_wide::PopulationReplacement as ReplacePopulation;
pub use super::random::RandomReplacement as ReplaceRandom;
pub use super::worst::WorstReplacement as ReplaceWorst;
pub use super::Replace;

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::Population;

#[derive(Clone, Debug)]
pub enum Wrapper {
    Worst(ReplaceWorst),
    Crowding(ReplaceCrowding),
    Random(ReplaceRandom),
    Parent(ReplaceParent),
    Population(ReplacePopulation),
}

impl Replace for Wrapper {
    fn replacement_size(&self) -> usize {
        match self {
            Wrapper::Worst(replace) => replace.replacement_size(),
            Wrapper::Crowding(replace) => replace.replacement_size(),
            Wrapper::Random(replace) => replace.replacement_size(),
            Wrapper::Parent(replace) => replace.replacement_size(),
            Wrapper::Population(replace) => replace.replacement_size(),
        }
    }

    fn chromosome_comparator(&self) -> Option<&dyn ChromosomeComparator> {
        match self {
            Wrapper::Worst(replace) => replace.chromosome_comparator(),
            Wrapper::Crowding(replace) => replace.chromosome_comparator(),
            Wrapper::Random(replace) => replace.chromosome_comparator(),
            Wrapper::Parent(replace) => replace.chromosome_comparator(),
            Wrapper::Population(replace) => replace.chromosome_comparator(),
        }
    }

    fn prepare(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        branches: &Branches,
    ) -> Result<()> {
        match self {
            Wrapper::Worst(replace) => replace.prepare(input, population, branches),
            Wrapper::Crowding(replace) => replace.prepare(input, population, branches),
            Wrapper::Random(replace) => replace.prepare(input, population, branches),
            Wrapper::Parent(replace) => replace.prepare(input, population, branches),
            Wrapper::Population(replace) => replace.prepare(input, population, branches),
        }
    }

    fn clear(&self, input: &mut ChromosomeGroup, population: &mut Population) -> Result<()> {
        match self {
            Wrapper::Worst(replace) => replace.clear(input, population),
            Wrapper::Crowding(replace) => replace.clear(input, population),
            Wrapper::Random(replace) => replace.clear(input, population),
            Wrapper::Parent(replace) => replace.clear(input, population),
            Wrapper::Population(replace) => replace.clear(input, population),
        }
    }

    fn run(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        match self {
            Wrapper::Worst(replace) => replace.run(input, population, branches, streams),
            Wrapper::Crowding(replace) => replace.run(input, population, branches, streams),
            Wrapper::Random(replace) => replace.run(input, population, branches, streams),
            Wrapper::Parent(replace) => replace.run(input, population, branches, streams),
            Wrapper::Population(replace) => replace.run(input, population, branches, streams),
        }
    }
}

impl From<ReplaceWorst> for Wrapper {
    fn from(replace: ReplaceWorst) -> Self {
        Wrapper::Worst(replace)
    }
}
impl From<ReplaceCrowding> for Wrapper {
    fn from(replace: ReplaceCrowding) -> Self {
        Wrapper::Crowding(replace)
    }
}
impl From<ReplaceRandom> for Wrapper {
    fn from(replace: ReplaceRandom) -> Self {
        Wrapper::Random(replace)
    }
}
impl From<ReplaceParent> for Wrapper {
    fn from(replace: ReplaceParent) -> Self {
        Wrapper::Parent(replace)
    }
}
impl From<ReplacePopulation> for Wrapper {
    fn from(replace: ReplacePopulation) -> Self {
        Wrapper::Population(replace)
    }
}
