use super::{run_coupling, Couple};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::Population;
use crate::tags::TagId;

/// Mates members from opposite halves of the input: mating `m` pairs
/// member `m` with the member half the input away, so the first and second
/// half of a selection result recombine with each other.
#[derive(Clone, Debug)]
pub struct CrossCoupling {
    pub number_of_offspring: usize,
    pub crossover_buffers_tag: TagId,
}

impl CrossCoupling {
    pub fn new(number_of_offspring: usize, crossover_buffers_tag: TagId) -> Self {
        Self {
            number_of_offspring,
            crossover_buffers_tag,
        }
    }
}

impl Couple for CrossCoupling {
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
        run_coupling(
            self,
            population,
            input,
            output,
            mating,
            branches,
            streams,
            |mating_index, slot, len| {
                let half = (len / 2).max(1);
                (mating_index + slot * half) % len
            },
        )
    }
}
