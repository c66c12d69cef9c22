use super::{run_coupling, Couple};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::Population;
use crate::tags::TagId;

/// Mates consecutive parent tuples: mating `m` uses input members
/// `m * parent_count, m * parent_count + 1, ...`, wrapping around the
/// input.
#[derive(Clone, Debug)]
pub struct SimpleCoupling {
    pub number_of_offspring: usize,
    pub crossover_buffers_tag: TagId,
}

impl SimpleCoupling {
    pub fn new(number_of_offspring: usize, crossover_buffers_tag: TagId) -> Self {
        Self {
            number_of_offspring,
            crossover_buffers_tag,
        }
    }
}

impl Couple for SimpleCoupling {
    fn number_of_offspring(&self) -> usize {
        self.number_of_offspring
    }

    fn crossover_buffers_tag(&self) -> TagId {
        self.crossover_buffers_tag
    }

    fn run(
        &self,
        population: &mut Population,
        input: &ChromosomeGroup,
        output: &mut ChromosomeGroup,
        mating: &MatingSetup,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let parent_count = mating.parent_count();
        run_coupling(
            self,
            population,
            input,
            output,
            mating,
            branches,
            streams,
            move |mating_index, slot, len| (mating_index * parent_count + slot) % len,
        )
    }
}
