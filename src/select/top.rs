use super::{put_buffers, store_selected, take_buffers, Select};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, Population};
use crate::statistics;
use crate::tags::TagId;

/// Selects the first `count` chromosomes of the population, which the
/// pipeline keeps sorted best-first at this point of the generation.
#[derive(Clone, Debug)]
pub struct TopSelection {
    pub count: usize,
    pub crossover_buffers_tag: Option<TagId>,
}

impl TopSelection {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            crossover_buffers_tag: None,
        }
    }

    /// Produce offspring through per-branch crossover buffers stored under
    /// the given population tag.
    pub fn with_mating(count: usize, crossover_buffers_tag: TagId) -> Self {
        Self {
            count,
            crossover_buffers_tag: Some(crossover_buffers_tag),
        }
    }
}

impl Select for TopSelection {
    fn selection_count(&self) -> usize {
        self.count
    }

    fn crossover_buffers_tag(&self) -> Option<TagId> {
        self.crossover_buffers_tag
    }

    fn run(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: Option<&MatingSetup>,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let mut counters = CouplingCounters::start(population, statistics::SELECTION_TIME);
        output.clear(population.pool_mut(), false);

        let mut taken = take_buffers(self, population)?;
        let total = self.count.min(population.len());

        let mut inner = || -> Result<()> {
            for branch in branches.iter() {
                let rng_index = branch.index;
                for index in branch.split_work(total) {
                    let id = population.id_at(index);
                    let buffer = taken
                        .as_mut()
                        .map(|taken| &mut taken.buffers[branch.index]);
                    store_selected(
                        population,
                        output,
                        buffer,
                        mating,
                        &mut counters,
                        streams.branch(rng_index),
                        id,
                    )?;
                    counters.inc_selection();
                }
            }
            Ok(())
        };

        let result = inner();
        if result.is_err() {
            output.clear(population.pool_mut(), false);
            if let Some(taken) = taken.as_mut() {
                for buffer in &mut taken.buffers {
                    buffer.clear(population);
                }
            }
        }
        put_buffers(population, taken)?;
        counters.flush(population)?;
        result
    }
}
