use super::{put_buffers, store_selected, take_buffers, Select};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::Result;
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, Population};
use crate::statistics;
use crate::tags::TagId;

/// Selects the last `count` chromosomes of the fitness-sorted population.
#[derive(Clone, Debug)]
pub struct BottomSelection {
    pub count: usize,
    pub crossover_buffers_tag: Option<TagId>,
}

impl BottomSelection {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            crossover_buffers_tag: None,
        }
    }
}

impl Select for BottomSelection {
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
        let offset = population.len() - total;

        let mut inner = || -> Result<()> {
            for branch in branches.iter() {
                for index in branch.split_work(total) {
                    let id = population.id_at(offset + index);
                    let buffer = taken
                        .as_mut()
                        .map(|taken| &mut taken.buffers[branch.index]);
                    store_selected(
                        population,
                        output,
                        buffer,
                        mating,
                        &mut counters,
                        streams.branch(branch.index),
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
