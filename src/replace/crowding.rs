use super::{identify_duplicates, prepare_input, transfer_input, Replace};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;

/// Appends candidates to the crowding space without displacing anyone.
/// The population temporarily overfills; the scaling operation decides who
/// survives and the caller trims back to permanent capacity afterwards.
#[derive(Clone, Debug)]
pub struct CrowdingReplacement {
    pub replacement_size: usize,
    pub chromosome_comparator: Option<Box<dyn ChromosomeComparator>>,
}

impl CrowdingReplacement {
    pub fn new(replacement_size: usize) -> Self {
        Self {
            replacement_size,
            chromosome_comparator: None,
        }
    }
}

impl Replace for CrowdingReplacement {
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

        // cap at the free crowding capacity that remains after the trim
        population.remove_marked();
        population.trim_to_permanent();
        let capacity = self.replacement_size.min(population.free_space(true));
        prepare_input(input, population, capacity);

        transfer_input(input, population)?;

        timer.finish(population)
    }
}
