//! Pareto archived evolution strategy (PAES).
//!
//! PAES runs a (1+1) strategy against an archive held in the population.
//! Selection produces at most one candidate: the current solution's
//! mutation, or a prototype chromosome on the first generation.
//! Replacement owns the archive: the candidate is compared against every
//! archived chromosome, dominated entries fall out, and a neutral
//! candidate competes on hypergrid crowding with the current solution.

use crate::branch::{Branches, RandomStreams};
use crate::chromosome::MatingSetup;
use crate::errors::{Error, Result};
use crate::grid::{build_density, compare_cells, CrowdingStorage, HyperBox, HyperBoxInfo, HyperGrid};
use crate::group::ChromosomeGroup;
use crate::population::{CouplingCounters, OperationTimer, Population};
use crate::replace::Replace;
use crate::select::{self, Select};
use crate::statistics;
use crate::storage::{StorageId, REMOVE_CHROMOSOME};
use crate::tags::{SizableTagLifecycle, TagHandle, TagId, TypedTagLifecycle};
use std::cmp::Ordering;

const DOMINATED: u8 = 0x1;
const DOMINANT: u8 = 0x2;

/// Produces the single candidate of a PAES generation: a mutated copy of
/// the current solution, or a fresh prototype chromosome when the archive
/// is still empty.
#[derive(Clone, Debug)]
pub struct PaesSelection {
    pub crossover_buffers_tag: TagId,
    pub current_solution_tag: TagId,
}

impl Select for PaesSelection {
    fn selection_count(&self) -> usize {
        1
    }

    fn crossover_buffers_tag(&self) -> Option<TagId> {
        Some(self.crossover_buffers_tag)
    }

    fn run(
        &self,
        population: &mut Population,
        output: &mut ChromosomeGroup,
        mating: Option<&MatingSetup>,
        _branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let mut counters = CouplingCounters::start(population, statistics::SELECTION_TIME);
        output.clear(population.pool_mut(), false);

        let current_handle: TagHandle<Option<StorageId>> =
            population.population_tag_handle(self.current_solution_tag)?;

        if population.is_empty() {
            // seed the strategy with a prototype chromosome
            let id = population.make_from_prototype()?;
            output.add(population.pool(), id)?;
            population.put_population_tag(current_handle, Some(id))?;
        } else {
            let mating = mating.ok_or(Error::NullArgument("mating setup"))?;
            let current = population
                .population_tag(current_handle)?
                .ok_or(Error::NullArgument("current solution"))?;

            let mut taken =
                select::take_buffers(self, population)?.ok_or(Error::NullArgument("crossover buffers"))?;

            let produced = {
                let buffer = &mut taken.buffers[0];
                (|| -> Result<StorageId> {
                    buffer.add_parent(population, current)?;
                    buffer.store_offspring(population, None, 0)?;
                    let copied = population
                        .storage(buffer.offspring().get(0))
                        .chromosome_ptr()?;
                    let mutated = mating.mutation.mutate(copied.as_ref(), streams.branch(0));
                    buffer.replace_offspring(population, 0, mutated)?;
                    buffer
                        .offspring_mut()
                        .pop_last(population.pool_mut(), true)
                        .ok_or(Error::InvalidOperation("mating produced no offspring"))
                })()
            };

            match produced {
                Ok(child) => {
                    output.add(population.pool(), child)?;
                    counters.collect_crossover_buffer(&taken.buffers[0]);
                    taken.buffers[0].clear(population);
                }
                Err(error) => {
                    taken.buffers[0].clear(population);
                    output.clear(population.pool_mut(), false);
                    select::put_buffers(population, Some(taken))?;
                    counters.flush(population)?;
                    return Err(error);
                }
            }

            select::put_buffers(population, Some(taken))?;
        }

        counters.inc_selection();
        counters.flush(population)
    }
}

/// Archive replacement of PAES.
#[derive(Clone, Debug)]
pub struct PaesReplacement {
    pub grid: HyperGrid,
    pub hyperbox_tag: TagId,
    pub hyperbox_info_tag: TagId,
    pub current_solution_tag: TagId,
    pub crowding_tag: TagId,
    pub info_buffer_tag: TagId,
}

impl PaesReplacement {
    fn cell_count(
        &self,
        population: &Population,
        infos: &[HyperBoxInfo],
        info_ref: TagHandle<Option<usize>>,
        id: StorageId,
    ) -> Result<usize> {
        Ok(match *population.storage(id).tags().get(info_ref)? {
            Some(index) => infos[index].count,
            None => 0,
        })
    }
}

impl Replace for PaesReplacement {
    fn replacement_size(&self) -> usize {
        1
    }

    fn prepare(
        &self,
        _input: &mut ChromosomeGroup,
        population: &mut Population,
        _branches: &Branches,
    ) -> Result<()> {
        population.add_chromosome_tag::<HyperBox>(
            self.hyperbox_tag,
            Box::new(SizableTagLifecycle::<HyperBox>::new(self.grid.objectives())),
        )?;
        population.add_chromosome_tag::<Option<usize>>(
            self.hyperbox_info_tag,
            Box::new(TypedTagLifecycle::<Option<usize>>::default()),
        )?;
        population.add_population_tag::<Option<StorageId>>(
            self.current_solution_tag,
            Box::new(TypedTagLifecycle::<Option<StorageId>>::default()),
        )?;
        population.add_population_tag::<CrowdingStorage>(
            self.crowding_tag,
            Box::new(TypedTagLifecycle::<CrowdingStorage>::default()),
        )?;
        population.add_population_tag::<Vec<HyperBoxInfo>>(
            self.info_buffer_tag,
            Box::new(TypedTagLifecycle::<Vec<HyperBoxInfo>>::default()),
        )?;
        Ok(())
    }

    fn clear(&self, input: &mut ChromosomeGroup, population: &mut Population) -> Result<()> {
        input.clear(population.pool_mut(), false);
        population.remove_chromosome_tag(self.hyperbox_tag)?;
        population.remove_chromosome_tag(self.hyperbox_info_tag)?;
        population.remove_population_tag(self.current_solution_tag)?;
        population.remove_population_tag(self.crowding_tag)?;
        population.remove_population_tag(self.info_buffer_tag)
    }

    fn run(
        &self,
        input: &mut ChromosomeGroup,
        population: &mut Population,
        branches: &Branches,
        _streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::REPLACEMENT_TIME);

        let Some(candidate) = input.pop_last(population.pool_mut(), true) else {
            return timer.finish(population);
        };

        let cells: TagHandle<HyperBox> = population.chromosome_tag_handle(self.hyperbox_tag)?;
        let info_ref: TagHandle<Option<usize>> =
            population.chromosome_tag_handle(self.hyperbox_info_tag)?;
        let current_handle: TagHandle<Option<StorageId>> =
            population.population_tag_handle(self.current_solution_tag)?;
        let crowding_handle = population.population_tag_handle(self.crowding_tag)?;
        let infos_handle = population.population_tag_handle(self.info_buffer_tag)?;

        let newly_seeded = population.is_empty();
        population.insert(candidate)?;

        // candidate versus every archived chromosome
        let mut dominance_state = 0u8;
        for index in 0..population.len() {
            let id = population.id_at(index);
            if id == candidate {
                continue;
            }
            match population.compare_storages(candidate, id) {
                Ordering::Less => {
                    population.storage(id).flags().set(REMOVE_CHROMOSOME);
                    dominance_state |= DOMINANT;
                }
                Ordering::Greater => dominance_state |= DOMINATED,
                Ordering::Equal => {}
            }
        }

        let mut infos: Vec<HyperBoxInfo> = population.take_population_tag(infos_handle)?;
        let mut crowding: CrowdingStorage = population.take_population_tag(crowding_handle)?;
        let mut sorted_ids: Vec<StorageId> = Vec::new();

        if dominance_state == 0 {
            // neutral candidate: crowding decides, so rebuild the grid
            for index in 0..population.len() {
                let mut cell = HyperBox::default();
                self.grid
                    .cell_of(population.at(index).raw_fitness(), &mut cell);
                *population.at_mut(index).tags_mut().get_mut(cells)? = cell;
            }

            sorted_ids = population.ids().to_vec();
            sorted_ids.sort_by(|a, b| {
                let left = population.storage(*a).tags().get(cells);
                let right = population.storage(*b).tags().get(cells);
                match (left, right) {
                    (Ok(left), Ok(right)) => compare_cells(left, right),
                    _ => Ordering::Equal,
                }
            });

            let sorted_cells: Vec<HyperBox> = sorted_ids
                .iter()
                .map(|id| {
                    population
                        .storage(*id)
                        .tags()
                        .get(cells)
                        .ok()
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            let (built, assignment) = build_density(&sorted_cells);
            infos = built;
            for (position, info_index) in assignment.iter().enumerate() {
                *population
                    .storage_mut(sorted_ids[position])
                    .tags_mut()
                    .get_mut(info_ref)? = Some(*info_index);
            }

            crowding.resize(branches.count());
            crowding.restart();
            for branch in branches.iter() {
                crowding.clear_branch(branch.index);
                for info_index in branch.split_work(infos.len()) {
                    crowding.offer(branch.index, info_index, infos[info_index].count);
                }
            }
        }

        let current = *population.population_tag(current_handle)?;

        if dominance_state & DOMINATED == 0 {
            if dominance_state & DOMINANT == 0 && !newly_seeded {
                // pick from the most crowded cell; the pick participates
                // in the acceptance rule even when capacity spares it
                let mut picked: Option<StorageId> = None;
                if let Some(target) = crowding.reduce() {
                    let info = &infos[target];
                    let mut victim = sorted_ids[info.start];
                    let over_capacity =
                        population.len() > population.params().permanent_space_size();
                    if over_capacity {
                        let protected = Some(victim) == current || victim == candidate;
                        if protected && info.span > 1 {
                            victim = sorted_ids[info.start + 1];
                        }
                        population.storage(victim).flags().set(REMOVE_CHROMOSOME);
                        infos[target].remove_member();
                    }
                    picked = Some(victim);
                }

                // accept the candidate when it sits in a less crowded cell
                // than the current solution, or the current solution fell
                let accept = match current {
                    Some(current_id) => {
                        let candidate_count =
                            self.cell_count(population, &infos, info_ref, candidate)?;
                        let current_count =
                            self.cell_count(population, &infos, info_ref, current_id)?;
                        (candidate_count < current_count || picked == Some(current_id))
                            && picked != Some(candidate)
                    }
                    None => true,
                };
                if accept {
                    population.put_population_tag(current_handle, Some(candidate))?;
                }
            } else {
                // the candidate displaced archive members, adopt it
                population.put_population_tag(current_handle, Some(candidate))?;
            }
        } else {
            population.storage(candidate).flags().set(REMOVE_CHROMOSOME);
        }

        population.remove_marked();

        // the current solution must never dangle
        let current = *population.population_tag(current_handle)?;
        let current_gone = current
            .map(|id| !population.ids().contains(&id))
            .unwrap_or(true);
        if current_gone {
            let replacement = population.ids().first().copied();
            population.put_population_tag(current_handle, replacement)?;
        }

        population.put_population_tag(infos_handle, infos)?;
        population.put_population_tag(crowding_handle, crowding)?;
        timer.finish(population)
    }
}
