use super::{identify_duplicates, prepare_input, transfer_input, Replace};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::fitness::FitnessKind;
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;

/// Replaces the worst members: sorts the population by raw fitness, drops
/// the tail and inserts the candidates.
#[derive(Clone, Debug)]
pub struct WorstReplacement {
    pub replacement_size: usize,
    pub chromosome_comparator: Option<Box<dyn ChromosomeComparator>>,
}

impl WorstReplacement {
    pub fn new(replacement_size: usize) -> Self {
        Self {
            replacement_size,
            chromosome_comparator: None,
        }
    }
}

impl Replace for WorstReplacement {
    fn replacement_size(&self) -> usize {
        self.replacement_size
    }

    fn chromosome_comparator(&self) -> Option<&dyn ChromosomeComparator> {
        self.chromosome_comparator.as_deref()
    }

    fn run(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        branches: &Branches,
        _streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::REPLACEMENT_TIME);

        identify_duplicates(input, population, self.chromosome_comparator(), branches)?;
        prepare_input(input, population, self.replacement_size);

        population.sort_by_fitness(FitnessKind::Raw)?;
        population.remove_marked();
        population.trim(input.len());
        transfer_input(input, population)?;

        timer.finish(population)
    }
}
