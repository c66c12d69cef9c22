use super::{identify_duplicates, prepare_input, transfer_input, Replace};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;
use crate::storage::REMOVE_CHROMOSOME;

/// Each offspring displaces the population member it was bred from,
/// following the parent back-link of its storage object. Offspring
/// without a surviving parent link are inserted without displacing
/// anyone.
#[derive(Clone, Debug)]
pub struct ParentReplacement {
    pub replacement_size: usize,
    pub chromosome_comparator: Option<Box<dyn ChromosomeComparator>>,
}

impl ParentReplacement {
    pub fn new(replacement_size: usize) -> Self {
        Self {
            replacement_size,
            chromosome_comparator: None,
        }
    }
}

impl Replace for ParentReplacement {
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

        for index in 0..input.len() {
            if let Some(parent) = population.storage(input.get(index)).parent() {
                population.storage(parent).flags().set(REMOVE_CHROMOSOME);
            }
        }

        population.remove_marked();
        transfer_input(input, population)?;

        timer.finish(population)
    }
}
