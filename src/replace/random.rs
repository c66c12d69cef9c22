use super::{identify_duplicates, prepare_input, Replace};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;
use crate::tags::{TagId, TypedTagLifecycle};

/// Replaces members at random positions, optionally protecting an elite
/// prefix of the fitness-sorted population.
#[derive(Clone, Debug)]
pub struct RandomReplacement {
    pub replacement_size: usize,
    pub elitism: usize,
    pub indices_buffer_tag: TagId,
    pub chromosome_comparator: Option<Box<dyn ChromosomeComparator>>,
}

impl RandomReplacement {
    pub fn new(replacement_size: usize, elitism: usize, indices_buffer_tag: TagId) -> Self {
        Self {
            replacement_size,
            elitism,
            indices_buffer_tag,
            chromosome_comparator: None,
        }
    }
}

impl Replace for RandomReplacement {
    fn replacement_size(&self) -> usize {
        self.replacement_size
    }

    fn chromosome_comparator(&self) -> Option<&dyn ChromosomeComparator> {
        self.chromosome_comparator.as_deref()
    }

    fn prepare(
        &self,
        _input: &mut ChromosomeGroup,
        population: &mut Population,
        _branches: &Branches,
    ) -> Result<()> {
        population.add_population_tag::<Vec<usize>>(
            self.indices_buffer_tag,
            Box::new(TypedTagLifecycle::<Vec<usize>>::default()),
        )?;
        Ok(())
    }

    fn clear(&self, input: &mut ChromosomeGroup, population: &mut Population) -> Result<()> {
        input.clear(population.pool_mut(), false);
        population.remove_population_tag(self.indices_buffer_tag)
    }

    fn run(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::REPLACEMENT_TIME);

        identify_duplicates(input, population, self.chromosome_comparator(), branches)?;
        let replaceable = population.len().saturating_sub(self.elitism);
        prepare_input(input, population, self.replacement_size.min(replaceable));

        if !input.is_empty() {
            let mut indices: Vec<usize> =
                rand::seq::index::sample(streams.branch(0), replaceable, input.len())
                    .iter()
                    .map(|index| index + self.elitism)
                    .collect();
            indices.sort_unstable();

            let handle = population.population_tag_handle::<Vec<usize>>(self.indices_buffer_tag)?;
            population.put_population_tag(handle, indices.clone())?;

            let candidates = input.ids();
            for (position, id) in indices.into_iter().zip(candidates) {
                population.replace(position, id)?;
            }
            input.clear(population.pool_mut(), true);
        }

        timer.finish(population)
    }
}
