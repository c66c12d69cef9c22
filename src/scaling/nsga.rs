//! Nondominated sorting with dummy fitness and per-front sharing
//! (NSGA-I).
//!
//! Fronts are peeled off one by one: the currently nondominated,
//! unprocessed chromosomes form the next front and receive a dummy scaled
//! fitness, sharing is applied within the front, and the dummy value for
//! the following front drops below the smallest value just assigned so
//! front order always survives scaling. When the next front's dummy would
//! go non-positive, all processed chromosomes shift upward by a
//! compensating adjustment.

use super::{dominance, for_each_pair, mark_rescaled, Scaling};
use crate::branch::{Branches, RandomStreams};
use crate::chromosome::ChromosomeComparator;
use crate::errors::Result;
use crate::fitness::{downcast, downcast_mut, Fitness, FitnessKind, ScalarFitness};
use crate::group::ChromosomeGroup;
use crate::population::{OperationTimer, Population};
use crate::statistics;
use crate::tags::{PartialSum, SizableTag, SizableTagLifecycle, TagHandle, TagId, TypedTagLifecycle};
use std::cmp::Ordering;

#[derive(Clone, Debug)]
pub struct NsgaScaling {
    /// Fraction of the initial dummy fitness the value drops per front.
    pub delta_factor: f32,
    /// Sharing cutoff within a front.
    pub cutoff: f32,
    /// Sharing kernel shape.
    pub alpha: f32,
    pub dominated_tag: TagId,
    pub processed_tag: TagId,
    pub partial_sum_tag: TagId,
    pub front_buffer_tag: TagId,
    pub comparator: Box<dyn ChromosomeComparator>,
}

impl NsgaScaling {
    fn share(&self, population: &Population, first: usize, second: usize) -> Result<f32> {
        let a = population.storage(first).chromosome_ptr()?;
        let b = population.storage(second).chromosome_ptr()?;
        let distance = self.comparator.distance(a.as_ref(), b.as_ref());
        Ok(if distance < self.cutoff {
            1.0 - (distance / self.cutoff).powf(self.alpha)
        } else {
            0.0
        })
    }
}

impl Scaling for NsgaScaling {
    fn scaled_prototype(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn prepare_tags(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.add_chromosome_tag::<bool>(
            self.dominated_tag,
            Box::new(TypedTagLifecycle::<bool>::default()),
        )?;
        population.add_chromosome_tag::<bool>(
            self.processed_tag,
            Box::new(TypedTagLifecycle::<bool>::default()),
        )?;
        population.add_chromosome_tag::<PartialSum>(
            self.partial_sum_tag,
            Box::new(SizableTagLifecycle::<PartialSum>::new(branches.count())),
        )?;
        population.add_population_tag::<ChromosomeGroup>(
            self.front_buffer_tag,
            Box::new(TypedTagLifecycle::<ChromosomeGroup>::default()),
        )?;
        Ok(())
    }

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        population.remove_chromosome_tag(self.dominated_tag)?;
        population.remove_chromosome_tag(self.processed_tag)?;
        population.remove_chromosome_tag(self.partial_sum_tag)?;
        population.remove_population_tag(self.front_buffer_tag)
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

        let dominated: TagHandle<bool> = population.chromosome_tag_handle(self.dominated_tag)?;
        let processed: TagHandle<bool> = population.chromosome_tag_handle(self.processed_tag)?;
        let sums: TagHandle<PartialSum> =
            population.chromosome_tag_handle(self.partial_sum_tag)?;
        let buffer_handle = population.population_tag_handle(self.front_buffer_tag)?;

        mark_rescaled(population);

        let mut front_buffer: ChromosomeGroup = population.take_population_tag(buffer_handle)?;
        front_buffer.clear(population.pool_mut(), true);

        let mut dummy = population.len() as f32;
        let delta = self.delta_factor * dummy;

        for index in 0..population.len() {
            let tags = population.at_mut(index).tags_mut();
            *tags.get_mut(processed)? = false;
            *tags.get_mut(dominated)? = false;
            tags.get_mut(sums)?.reset();
        }

        let mut front_start = 0;
        while front_start < population.len() {
            // dominance among unprocessed chromosomes picks the next front
            for_each_pair(branches, population.len(), |_, row, column| {
                if *population.at(row).tags().get(processed)?
                    || *population.at(column).tags().get(processed)?
                {
                    return Ok(());
                }
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
                let in_front = !*population.at(index).tags().get(dominated)?
                    && !*population.at(index).tags().get(processed)?;
                if in_front {
                    let id = population.id_at(index);
                    let storage = population.at_mut(index);
                    downcast_mut::<ScalarFitness>(storage.fitness_mut(FitnessKind::Scaled)?)?
                        .set_value(dummy);
                    *storage.tags_mut().get_mut(processed)? = true;
                    front_buffer.add(population.pool(), id)?;
                }
                *population.at_mut(index).tags_mut().get_mut(dominated)? = false;
            }

            // sharing restricted to the chromosomes of this front
            let front: Vec<usize> = (front_start..front_buffer.len())
                .map(|position| front_buffer.get(position))
                .collect();
            for_each_pair(branches, front.len(), |branch, row, column| {
                let shared = self.share(population, front[row], front[column])?;
                population.storage_mut(front[row]).tags_mut().get_mut(sums)?.0[branch] += shared;
                population
                    .storage_mut(front[column])
                    .tags_mut()
                    .get_mut(sums)?
                    .0[branch] += shared;
                Ok(())
            })?;
            for id in &front {
                let divisor = 1.0 + population.storage(*id).tags().get(sums)?.total();
                let scaled = population.storage_mut(*id).fitness_mut(FitnessKind::Scaled)?;
                let fitness = downcast_mut::<ScalarFitness>(scaled)?;
                fitness.set_value(fitness.value() / divisor);
            }

            // smallest value assigned so far, reduced over branch minima
            let mut branch_minima = vec![dummy; branches.count()];
            for branch in branches.iter() {
                for position in branch.split_work(front_buffer.len()) {
                    let id = front_buffer.get(position);
                    let value =
                        downcast::<ScalarFitness>(population.storage(id).fitness(FitnessKind::Scaled)?)?
                            .value();
                    if value < branch_minima[branch.index] {
                        branch_minima[branch.index] = value;
                    }
                }
            }
            dummy = branch_minima.iter().copied().fold(dummy, f32::min);

            // keep the next front's dummy positive by lifting everyone
            let mut adjustment = 0.0;
            if dummy < delta {
                adjustment = 2.0 * delta - dummy;
                for position in 0..front_buffer.len() {
                    let id = front_buffer.get(position);
                    let scaled = population.storage_mut(id).fitness_mut(FitnessKind::Scaled)?;
                    let fitness = downcast_mut::<ScalarFitness>(scaled)?;
                    fitness.set_value(fitness.value() + adjustment);
                }
            }
            dummy += adjustment - delta;

            front_start = front_buffer.len();
        }

        front_buffer.clear(population.pool_mut(), true);
        population.put_population_tag(buffer_handle, front_buffer)?;
        timer.finish(population)
    }
}
