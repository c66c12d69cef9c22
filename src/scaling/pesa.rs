//! Pareto envelope-based selection (PESA, and the region-based PESA-II
//! variant).
//!
//! One dominance pass flags dominated chromosomes; the nondominated rest
//! is mapped onto the hypergrid and sorted by cell coordinates so each
//! occupied cell becomes a contiguous run with a density record. While the
//! nondominated set exceeds permanent capacity, a random chromosome of the
//! globally most crowded cell is marked for removal; each branch caches
//! its own most crowded candidate and only rescans when the global pick
//! invalidated it. The scaled fitness is the reciprocal cell occupancy.

use super::{dominance, for_each_pair, mark_rescaled, Scaling};
use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::fitness::{downcast_mut, Fitness, FitnessKind, ScalarFitness};
use crate::grid::{build_density, compare_cells, CrowdingStorage, HyperBox, HyperBoxInfo, HyperGrid};
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;
use crate::storage::REMOVE_CHROMOSOME;
use crate::tags::{SizableTagLifecycle, TagHandle, TagId, TypedTagLifecycle};
use rand::Rng;
use std::cmp::Ordering;

#[derive(Clone, Debug)]
pub struct PesaScaling {
    /// Share the cell fitness among its members (`1 / count`); without
    /// region sharing crowded cells are punished quadratically
    /// (`1 / count^2`).
    pub region_sharing: bool,
    pub grid: HyperGrid,
    pub dominated_tag: TagId,
    pub hyperbox_tag: TagId,
    pub hyperbox_info_tag: TagId,
    pub nondominated_tag: TagId,
    pub crowding_tag: TagId,
    pub info_buffer_tag: TagId,
}

impl Scaling for PesaScaling {
    fn scaled_prototype(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn prepare_tags(&self, population: &mut Population, _branches: &Branches) -> Result<()> {
        population.add_chromosome_tag::<bool>(
            self.dominated_tag,
            Box::new(TypedTagLifecycle::<bool>::default()),
        )?;
        population.add_chromosome_tag::<HyperBox>(
            self.hyperbox_tag,
            Box::new(SizableTagLifecycle::<HyperBox>::new(self.grid.objectives())),
        )?;
        population.add_chromosome_tag::<Option<usize>>(
            self.hyperbox_info_tag,
            Box::new(TypedTagLifecycle::<Option<usize>>::default()),
        )?;
        population.add_population_tag::<ChromosomeGroup>(
            self.nondominated_tag,
            Box::new(TypedTagLifecycle::<ChromosomeGroup>::default()),
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

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        population.remove_chromosome_tag(self.dominated_tag)?;
        population.remove_chromosome_tag(self.hyperbox_tag)?;
        population.remove_chromosome_tag(self.hyperbox_info_tag)?;
        population.remove_population_tag(self.nondominated_tag)?;
        population.remove_population_tag(self.crowding_tag)?;
        population.remove_population_tag(self.info_buffer_tag)
    }

    fn run(
        &self,
        population: &mut Population,
        branches: &Branches,
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::SCALING_TIME);

        let dominated: TagHandle<bool> = population.chromosome_tag_handle(self.dominated_tag)?;
        let cells: TagHandle<HyperBox> = population.chromosome_tag_handle(self.hyperbox_tag)?;
        let info_ref: TagHandle<Option<usize>> =
            population.chromosome_tag_handle(self.hyperbox_info_tag)?;
        let nondominated_handle = population.population_tag_handle(self.nondominated_tag)?;
        let crowding_handle = population.population_tag_handle(self.crowding_tag)?;
        let infos_handle = population.population_tag_handle(self.info_buffer_tag)?;

        mark_rescaled(population);

        let mut nondominated: ChromosomeGroup =
            population.take_population_tag(nondominated_handle)?;
        nondominated.clear(population.pool_mut(), true);
        let mut crowding: CrowdingStorage = population.take_population_tag(crowding_handle)?;
        crowding.resize(branches.count());
        crowding.restart();

        // hyperbox coordinates and dominance in one sweep over the pairs
        for index in 0..population.len() {
            let cell_of = {
                let mut cell = HyperBox::default();
                self.grid
                    .cell_of(population.at(index).raw_fitness(), &mut cell);
                cell
            };
            let tags = population.at_mut(index).tags_mut();
            *tags.get_mut(cells)? = cell_of;
            *tags.get_mut(dominated)? = false;
            *tags.get_mut(info_ref)? = None;
        }
        for_each_pair(branches, population.len(), |_, row, column| {
            if *population.at(row).tags().get(dominated)?
                && *population.at(column).tags().get(dominated)?
            {
                return Ok(());
            }
            match dominance(population, row, column) {
                Ordering::Less => *population.at_mut(column).tags_mut().get_mut(dominated)? = true,
                Ordering::Greater => *population.at_mut(row).tags_mut().get_mut(dominated)? = true,
                Ordering::Equal => {}
            }
            Ok(())
        })?;

        for index in 0..population.len() {
            if !*population.at(index).tags().get(dominated)? {
                let id = population.id_at(index);
                nondominated.add(population.pool(), id)?;
            }
        }

        // contiguous cells through a coordinate sort, then density records
        nondominated.sort(population.pool(), |a, b| {
            let left = a.tags().get_by_slot::<HyperBox>(cells.slot());
            let right = b.tags().get_by_slot::<HyperBox>(cells.slot());
            match (left, right) {
                (Ok(left), Ok(right)) => compare_cells(left, right),
                _ => Ordering::Equal,
            }
        });

        let sorted_cells: Vec<HyperBox> = nondominated
            .iter()
            .map(|id| {
                population
                    .storage(id)
                    .tags()
                    .get(cells)
                    .ok()
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();
        let (mut infos, assignment) = build_density(&sorted_cells);
        for (position, info_index) in assignment.iter().enumerate() {
            let id = nondominated.get(position);
            *population.storage_mut(id).tags_mut().get_mut(info_ref)? = Some(*info_index);
        }

        // eliminate from the most crowded cells down to permanent capacity
        let capacity = population.params().permanent_space_size();
        let mut alive = nondominated.len();
        while alive > capacity {
            for branch in branches.iter() {
                if crowding.requires_update(branch.index) {
                    crowding.clear_branch(branch.index);
                    for info_index in branch.split_work(infos.len()) {
                        crowding.offer(branch.index, info_index, infos[info_index].count);
                    }
                }
            }

            let Some(target) = crowding.reduce() else {
                break;
            };
            let info = &mut infos[target];
            let victim = loop {
                let position =
                    info.start + streams.branch(0).gen_range(0..info.span);
                let id = nondominated.get(position);
                if !population.storage(id).flags().any(REMOVE_CHROMOSOME) {
                    break id;
                }
            };
            population.storage(victim).flags().set(REMOVE_CHROMOSOME);
            info.remove_member();
            alive -= 1;
        }

        // reciprocal cell occupancy becomes the scaled fitness
        for index in 0..population.len() {
            let value = if *population.at(index).tags().get(dominated)? {
                0.0
            } else {
                match *population.at(index).tags().get(info_ref)? {
                    Some(info_index) => {
                        let count = infos[info_index].count.max(1) as f32;
                        if self.region_sharing {
                            1.0 / count
                        } else {
                            1.0 / (count * count)
                        }
                    }
                    None => 0.0,
                }
            };
            let scaled = population.at_mut(index).fitness_mut(FitnessKind::Scaled)?;
            downcast_mut::<ScalarFitness>(scaled)?.set_value(value);
            *population.at_mut(index).tags_mut().get_mut(dominated)? = false;
        }

        nondominated.clear(population.pool_mut(), true);
        population.put_population_tag(nondominated_handle, nondominated)?;
        population.put_population_tag(crowding_handle, crowding)?;
        population.put_population_tag(infos_handle, infos)?;
        timer.finish(population)
    }
}
