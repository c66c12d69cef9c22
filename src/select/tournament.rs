use super::{
    clear_selected_flags, put_buffers, roulette_index, selected_handle, store_selected,
    take_buffers, total_scaled_probability, try_select, Select,
};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::{Error, Result};
use crate::fitness::FitnessKind;
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, Population};
use crate::statistics;
use crate::storage::StorageId;
use crate::tags::TagId;
use rand::Rng;
use std::cmp::Ordering;

/// How tournament contestants are drawn.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TournamentDraw {
    #[default]
    Uniform,
    Roulette,
}

/// k-fold tournament: draw `tournament_size` contestants and keep the one
/// with the best scaled fitness.
#[derive(Clone, Debug)]
pub struct TournamentSelection {
    pub count: usize,
    pub tournament_size: usize,
    pub draw: TournamentDraw,
    pub selected_tag: Option<TagId>,
    pub crossover_buffers_tag: Option<TagId>,
}

impl TournamentSelection {
    pub fn new(count: usize, tournament_size: usize, draw: TournamentDraw) -> Self {
        Self {
            count,
            tournament_size: tournament_size.max(1),
            draw,
            selected_tag: None,
            crossover_buffers_tag: None,
        }
    }
}

impl Select for TournamentSelection {
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
        if self.selected_tag.is_some() && self.count * self.tournament_size > population.len() {
            return Err(Error::ArgumentOutOfRange {
                argument: "count",
                reason: "tournament draws exceed the number of distinct chromosomes",
            });
        }

        let mut counters = CouplingCounters::start(population, statistics::SELECTION_TIME);
        output.clear(population.pool_mut(), false);

        let mut taken = take_buffers(self, population)?;
        let selected = selected_handle(self, population)?;
        let total_probability = match self.draw {
            TournamentDraw::Roulette => total_scaled_probability(population)?,
            TournamentDraw::Uniform => 0.0,
        };

        let mut inner = || -> Result<()> {
            for branch in branches.iter() {
                let picks = branch.split_work(self.count).len();
                for _ in 0..picks {
                    let mut winner: Option<StorageId> = None;
                    for _ in 0..self.tournament_size {
                        let contender = loop {
                            let index = match self.draw {
                                TournamentDraw::Uniform => streams
                                    .branch(branch.index)
                                    .gen_range(0..population.len()),
                                TournamentDraw::Roulette => roulette_index(
                                    population,
                                    total_probability,
                                    streams.branch(branch.index),
                                )?,
                            };
                            counters.inc_selection();
                            if let Some(id) = try_select(population, index, selected)? {
                                break id;
                            }
                        };

                        winner = Some(match winner {
                            None => contender,
                            Some(current) => {
                                let challenger_wins = population.compare_fitness(
                                    population
                                        .storage(contender)
                                        .fitness(FitnessKind::Scaled)?,
                                    population.storage(current).fitness(FitnessKind::Scaled)?,
                                ) == Ordering::Less;
                                if challenger_wins {
                                    contender
                                } else {
                                    current
                                }
                            }
                        });
                    }

                    if let Some(winner) = winner {
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
                            winner,
                        )?;
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
