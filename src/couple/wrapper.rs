pub use super::cross::CrossCoupling as CoupleCross;
pub use super::simple::SimpleCoupling as CoupleSimple;
pub use super::Couple;

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::Population;
use crate::tags::TagId;

#[derive(Clone, Debug)]
pub enum Wrapper {
    Simple(CoupleSimple),
    Cross(CoupleCross),
}

impl Couple for Wrapper {
    fn number_of_offspring(&self) -> usize {
        match self {
            Wrapper::Simple(couple) => couple.number_of_offspring(),
            Wrapper::Cross(couple) => couple.number_of_offspring(),
        }
    }

    fn crossover_buffers_tag(&self) -> TagId {
        match self {
            Wrapper::Simple(couple) => couple.crossover_buffers_tag(),
            Wrapper::Cross(couple) => couple.crossover_buffers_tag(),
        }
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
        match self {
            Wrapper::Simple(couple) => {
                couple.run(population, input, output, mating, branches, streams)
            }
            Wrapper::Cross(couple) => {
                couple.run(population, input, output, mating, branches, streams)
            }
        }
    }
}

impl From<CoupleSimple> for Wrapper {
    fn from(couple: CoupleSimple) -> Self {
        Wrapper::Simple(couple)
    }
}
impl From<CoupleCross> for Wrapper {
    fn from(couple: CoupleCross) -> Self {
        Wrapper::Cross(couple)
    }
}
