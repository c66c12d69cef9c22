use super::{
    clear_selected_flags, put_buffers, roulette_index, selected_handle, store_selected,
    take_buffers, total_scaled_probability, try_select, Select,
};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::{Error, Result};
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, Population};
use crate::statistics;
use crate::tags::TagId;

/// Fitness-proportionate selection over the scaled probability bases.
///
/// Equal bases reduce to uniform selection; a zero probability total falls
/// back to uniform picks outright.
#[derive(Clone, Debug)]
pub struct RouletteWheelSelection {
    pub count: usize,
    pub selected_tag: Option<TagId>,
    pub crossover_buffers_tag: Option<TagId>,
}

impl RouletteWheelSelection {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            selected_tag: None,
            crossover_buffers_tag: None,
        }
    }

    pub fn with_mating(count: usize, crossover_buffers_tag: TagId) -> Self {
        Self {
            count,
            selected_tag: None,
            crossover_buffers_tag: Some(crossover_buffers_tag),
        }
    }
}

impl Select for RouletteWheelSelection {
    fn selection_count(&self) -> usize {
        self.count
    }

    fn crossover_buffers_tag(&self) -> Option<TagId> {
        self.crossover_buffers_tag
    }

    fn selected_tag(&self) -> Option<TagId> {
        self.selected_tag
    }

    fn run(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: Option<&MatingSetup>,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        if population.is_empty() {
            return Ok(());
        }
        if self.selected_tag.is_some() && self.count > population.len() {
            return Err(Error::ArgumentOutOfRange {
                argument: "count",
                reason: "cannot pick more distinct chromosomes than the population holds",
            });
        }

        let mut counters = CouplingCounters::start(population, statistics::SELECTION_TIME);
        output.clear(population.pool_mut(), false);

        let mut taken = take_buffers(self, population)?;
        let selected = selected_handle(self, population)?;
        let total_probability = total_scaled_probability(population)?;

        let mut inner = || -> Result<()> {
            for branch in branches.iter() {
                let mut remaining = branch.split_work(self.count).len();
                while remaining > 0 {
                    let index =
                        roulette_index(population, total_probability, streams.branch(branch.index))?;
                    counters.inc_selection();
                    if let Some(id) = try_select(population, index, selected)? {
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
                        remaining -= 1;
                    }
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
        clear_selected_flags(population, selected)?;
        put_buffers(population, taken)?;
        counters.flush(population)?;
        result
    }
}
