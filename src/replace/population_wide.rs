use super::{transfer_input, Replace};
use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;

/// Replaces the whole generation except an elite prefix of the
/// fitness-sorted population.
#[derive(Clone, Debug)]
pub struct PopulationReplacement {
    pub elitism: usize,
}

impl PopulationReplacement {
    pub fn new(elitism: usize) -> Self {
        Self { elitism }
    }
}

impl Replace for PopulationReplacement {
    fn replacement_size(&self) -> usize {
        usize::MAX
    }

    fn run(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        _branches: &Branches,
        _streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::REPLACEMENT_TIME);

        population.trim(population.len().saturating_sub(self.elitism));

        let size = population.free_space(true).min(input.len());
        input.trim(population.pool_mut(), size, false);
        transfer_input(input, population)?;

        timer.finish(population)
    }
}
