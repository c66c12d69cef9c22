//! Single-objective fitness sharing.
//!
//! Each chromosome accrues a sharing sum over its neighbours within the
//! cutoff radius; the scaled fitness divides the raw probability base by
//! `1 + sum`, so clustered chromosomes share their selection pressure.
//! The sums live in a per-chromosome, per-branch tag and update
//! incrementally from the new/removed side groups between full rebuilds.

use super::{for_each_pair, mark_rescaled, Scaling};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::fitness::{downcast_mut, Fitness, FitnessKind, ScalarFitness};
use crate::population::{OperationTimer, Population, PopulationFlags};
use crate::statistics;
use crate::storage::{StorageId, NEW_CHROMOSOME};
use crate::tags::{PartialSum, SizableTag, SizableTagLifecycle, TagHandle, TagId};

/// Sharing kernel: `1 - (d / cutoff)^alpha` inside the radius, zero
/// outside.
fn kernel(distance: f32, cutoff: f32, alpha: f32) -> f32 {
    if distance < cutoff {
        1.0 - (distance / cutoff).powf(alpha)
    } else {
        0.0
    }
}

#[derive(Clone, Debug)]
pub struct FitnessSharingScaling {
    /// Distance cutoff of the sharing kernel.
    pub cutoff: f32,
    /// Shape of the kernel inside the cutoff.
    pub alpha: f32,
    pub partial_sum_tag: TagId,
    pub comparator: Box<dyn ChromosomeComparator>,
}

impl FitnessSharingScaling {
    pub fn new(
        cutoff: f32,
        alpha: f32,
        partial_sum_tag: TagId,
        comparator: Box<dyn ChromosomeComparator>,
    ) -> Self {
        Self {
            cutoff,
            alpha,
            partial_sum_tag,
            comparator,
        }
    }

    fn pair_kernel(&self, population: &Population, first: StorageId, second: StorageId) -> Result<f32> {
        let a = population.storage(first).chromosome_ptr()?;
        let b = population.storage(second).chromosome_ptr()?;
        Ok(kernel(
            self.comparator.distance(a.as_ref(), b.as_ref()),
            self.cutoff,
            self.alpha,
        ))
    }
}

impl Scaling for FitnessSharingScaling {
    fn scaled_prototype(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn prepare_tags(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.add_chromosome_tag::<PartialSum>(
            self.partial_sum_tag,
            Box::new(SizableTagLifecycle::<PartialSum>::new(branches.count())),
        )?;
        Ok(())
    }

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        population.remove_chromosome_tag(self.partial_sum_tag)
    }

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.update_chromosome_tag_lifecycle(
            self.partial_sum_tag,
            Box::new(SizableTagLifecycle::<PartialSum>::new(branches.count())),
        )
    }

    fn run(
        &self,
        population: &mut Population,
        branches: &Branches,
        _streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::SCALING_TIME);
        let sums: TagHandle<PartialSum> =
            population.chromosome_tag_handle(self.partial_sum_tag)?;

        let rebuild = population.flags().any(
            PopulationFlags::COMPLETE_FITNESS_UPDATE
                | PopulationFlags::SCALED_FITNESS_PROTOTYPE_CHANGED
                | PopulationFlags::FITNESS_COMPARATOR_CHANGED,
        ) || population.len()
            < population.new_chromosomes().len() + population.removed_chromosomes().len();

        if rebuild {
            for index in 0..population.len() {
                population.at_mut(index).tags_mut().get_mut(sums)?.reset();
            }

            for_each_pair(branches, population.len(), |branch, row, column| {
                let shared =
                    self.pair_kernel(population, population.id_at(row), population.id_at(column))?;
                population.at_mut(row).tags_mut().get_mut(sums)?.0[branch] += shared;
                population.at_mut(column).tags_mut().get_mut(sums)?.0[branch] += shared;
                Ok(())
            })?;

            mark_rescaled(population);
        } else {
            // fresh arrivals start from a clean slate
            let new_ids: Vec<StorageId> = population.new_chromosomes().ids();
            for id in &new_ids {
                population.storage_mut(*id).tags_mut().get_mut(sums)?.reset();
            }

            // retract the contribution of everything that left
            for branch in branches.iter() {
                let removed_group = population.removed_chromosomes();
                let removed: Vec<StorageId> = branch
                    .split_work(removed_group.len())
                    .map(|index| removed_group.get(index))
                    .collect();
                for gone in removed {
                    for index in 0..population.len() {
                        let member = population.id_at(index);
                        if population.storage(member).flags().any(NEW_CHROMOSOME) {
                            continue;
                        }
                        let shared = self.pair_kernel(population, gone, member)?;
                        population
                            .storage_mut(member)
                            .tags_mut()
                            .get_mut(sums)?
                            .0[branch.index] -= shared;
                    }
                }
            }

            // new against settled members, both directions
            for branch in branches.iter() {
                let arrivals: Vec<StorageId> = branch
                    .split_work(new_ids.len())
                    .map(|index| new_ids[index])
                    .collect();
                for fresh in arrivals {
                    for index in 0..population.len() {
                        let member = population.id_at(index);
                        if population.storage(member).flags().any(NEW_CHROMOSOME) {
                            continue;
                        }
                        let shared = self.pair_kernel(population, fresh, member)?;
                        population.storage_mut(fresh).tags_mut().get_mut(sums)?.0
                            [branch.index] += shared;
                        population.storage_mut(member).tags_mut().get_mut(sums)?.0
                            [branch.index] += shared;
                    }
                }
            }

            // new against new
            for_each_pair(branches, new_ids.len(), |branch, row, column| {
                let shared = self.pair_kernel(population, new_ids[row], new_ids[column])?;
                population
                    .storage_mut(new_ids[row])
                    .tags_mut()
                    .get_mut(sums)?
                    .0[branch] += shared;
                population
                    .storage_mut(new_ids[column])
                    .tags_mut()
                    .get_mut(sums)?
                    .0[branch] += shared;
                Ok(())
            })?;
        }

        for index in 0..population.len() {
            let divisor = 1.0 + population.at(index).tags().get(sums)?.total();
            let base = population.at(index).raw_fitness().probability_base();
            let scaled = population.at_mut(index).fitness_mut(FitnessKind::Scaled)?;
            downcast_mut::<ScalarFitness>(scaled)?.set_value(base / divisor);
        }

        timer.finish(population)
    }
}
