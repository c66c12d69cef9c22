//! Fast nondominated sorting with crowding distance (NSGA-II).
//!
//! One dominance pass fills per-branch dominance lists and an atomic
//! dominated-by counter per chromosome. Fronts then unfold iteratively:
//! the counter-zero set is front 0; walking a front's dominance lists and
//! decrementing the counters releases the next front. The scaled fitness
//! is a two-component value of front rank and crowding distance, ordered
//! rank first.

use super::{dominance, for_each_pair, mark_rescaled, DominanceList, Scaling};
use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::fitness::comparators::FitnessComparator;
use crate::fitness::{downcast_mut, Fitness, FitnessKind, FitnessOrdering};
use crate::population::{OperationTimer, Population};
use crate::sorting::merge_sort_by;
use crate::statistics;
use crate::storage::StorageId;
use crate::tags::{SizableTag, SizableTagLifecycle, TagHandle, TagId, TypedTagLifecycle};
use std::any::Any;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Scaled fitness of NSGA-II: front rank (higher is an earlier front) and
/// crowding distance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrowdedFitness {
    rank: f32,
    crowding: f32,
}

impl CrowdedFitness {
    pub fn rank(&self) -> f32 {
        self.rank
    }

    pub fn set_rank(&mut self, rank: f32) {
        self.rank = rank;
    }

    pub fn crowding(&self) -> f32 {
        self.crowding
    }

    pub fn set_crowding(&mut self, crowding: f32) {
        self.crowding = crowding;
    }
}

impl Fitness for CrowdedFitness {
    fn clone_boxed(&self) -> Box<dyn Fitness> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn probability_base(&self) -> f32 {
        self.rank
    }

    fn component_count(&self) -> usize {
        2
    }

    fn component(&self, index: usize) -> f32 {
        match index {
            0 => self.rank,
            _ => self.crowding,
        }
    }

    fn distance(&self, other: &dyn Fitness) -> f32 {
        let rank = self.rank - other.component(0);
        let crowding = self.crowding - other.component(1);
        (rank * rank + crowding * crowding).sqrt()
    }

    fn accumulate(&mut self, other: &dyn Fitness) {
        self.rank += other.component(0);
        self.crowding += other.component(1);
    }

    fn subtract(&mut self, other: &dyn Fitness) {
        self.rank -= other.component(0);
        self.crowding -= other.component(1);
    }

    fn scaled_by(&self, factor: f32) -> Box<dyn Fitness> {
        Box::new(Self {
            rank: self.rank * factor,
            crowding: self.crowding * factor,
        })
    }

    fn clear(&mut self) {
        self.rank = 0.0;
        self.crowding = 0.0;
    }
}

/// Orders crowded fitness values: earlier front first, larger crowding
/// distance first within a front.
#[derive(Clone, Debug, Default)]
pub struct CrowdedComparator;

impl FitnessComparator for CrowdedComparator {
    fn clone_boxed(&self) -> Box<dyn FitnessComparator> {
        Box::new(self.clone())
    }

    fn compare(&self, first: &dyn Fitness, second: &dyn Fitness) -> Ordering {
        let by_rank = second
            .component(0)
            .partial_cmp(&first.component(0))
            .unwrap_or(Ordering::Equal);
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        second
            .component(1)
            .partial_cmp(&first.component(1))
            .unwrap_or(Ordering::Equal)
    }

    fn ordering(&self) -> FitnessOrdering {
        FitnessOrdering::Maximize
    }
}

/// Working buffers of the front iteration, kept as a population tag so the
/// allocations survive across generations.
#[derive(Debug, Default)]
pub struct Nsga2Front {
    queue: Vec<StorageId>,
    sorted: Vec<Vec<StorageId>>,
    spreads: Vec<f32>,
    helper: Vec<StorageId>,
}

#[derive(Clone, Debug)]
pub struct Nsga2Scaling {
    pub dominated_count_tag: TagId,
    pub dominance_list_tag: TagId,
    pub front_tag: TagId,
}

impl Nsga2Scaling {
    pub fn new(dominated_count_tag: TagId, dominance_list_tag: TagId, front_tag: TagId) -> Self {
        Self {
            dominated_count_tag,
            dominance_list_tag,
            front_tag,
        }
    }
}

impl Scaling for Nsga2Scaling {
    fn scaled_prototype(&self) -> Box<dyn Fitness> {
        Box::new(CrowdedFitness::default())
    }

    fn prepare_tags(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.add_chromosome_tag::<AtomicUsize>(
            self.dominated_count_tag,
            Box::new(TypedTagLifecycle::<AtomicUsize>::default()),
        )?;
        population.add_chromosome_tag::<DominanceList>(
            self.dominance_list_tag,
            Box::new(SizableTagLifecycle::<DominanceList>::new(branches.count())),
        )?;
        population.add_population_tag::<Nsga2Front>(
            self.front_tag,
            Box::new(TypedTagLifecycle::<Nsga2Front>::default()),
        )?;
        Ok(())
    }

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        population.remove_chromosome_tag(self.dominated_count_tag)?;
        population.remove_chromosome_tag(self.dominance_list_tag)?;
        population.remove_population_tag(self.front_tag)
    }

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.update_chromosome_tag_lifecycle(
            self.dominance_list_tag,
            Box::new(SizableTagLifecycle::<DominanceList>::new(branches.count())),
        )
    }

    fn run(
        &self,
        population: &mut Population,
        branches: &Branches,
        _streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::SCALING_TIME);

        let counts: TagHandle<AtomicUsize> =
            population.chromosome_tag_handle(self.dominated_count_tag)?;
        let lists: TagHandle<DominanceList> =
            population.chromosome_tag_handle(self.dominance_list_tag)?;
        let front_handle = population.population_tag_handle(self.front_tag)?;

        mark_rescaled(population);
        let objectives = population.objective_count();
        let mut front: Nsga2Front = population.take_population_tag(front_handle)?;
        front.queue.clear();
        front.sorted.resize(objectives, Vec::new());
        front.spreads.resize(objectives, 0.0);

        for index in 0..population.len() {
            let tags = population.at_mut(index).tags_mut();
            tags.get_mut(counts)?.store(0, AtomicOrdering::Relaxed);
            let list = tags.get_mut(lists)?;
            list.set_len(branches.count());
            list.reset();
        }

        // pass 1: dominance lists and dominated-by counters
        for_each_pair(branches, population.len(), |branch, row, column| {
            match dominance(population, row, column) {
                Ordering::Less => {
                    let dominated = population.id_at(column);
                    population.at(column).tags().get(counts)?.fetch_add(1, AtomicOrdering::Relaxed);
                    population.at_mut(row).tags_mut().get_mut(lists)?.0[branch].push(dominated);
                }
                Ordering::Greater => {
                    let dominated = population.id_at(row);
                    population.at(row).tags().get(counts)?.fetch_add(1, AtomicOrdering::Relaxed);
                    population.at_mut(column).tags_mut().get_mut(lists)?.0[branch].push(dominated);
                }
                Ordering::Equal => {}
            }
            Ok(())
        })?;

        // pass 2: the counter-zero set is the first front
        let mut rank = population.len() as f32;
        for index in 0..population.len() {
            let id = population.id_at(index);
            let nondominated =
                population.at(index).tags().get(counts)?.load(AtomicOrdering::Relaxed) == 0;
            let scaled = population.at_mut(index).fitness_mut(FitnessKind::Scaled)?;
            let fitness = downcast_mut::<CrowdedFitness>(scaled)?;
            fitness.set_crowding(0.0);
            if nondominated {
                fitness.set_rank(rank);
                front.queue.push(id);
            }
        }

        while !front.queue.is_empty() {
            // per-objective sorted views of the current front
            for objective in 0..objectives {
                let sorted = &mut front.sorted[objective];
                sorted.clear();
                sorted.extend_from_slice(&front.queue);
                merge_sort_by(sorted, &mut front.helper, |a, b| {
                    population
                        .storage(*a)
                        .raw_fitness()
                        .component(objective)
                        .partial_cmp(&population.storage(*b).raw_fitness().component(objective))
                        .unwrap_or(Ordering::Equal)
                });

                let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
                    continue;
                };
                front.spreads[objective] = population
                    .storage(last)
                    .raw_fitness()
                    .component_distance(population.storage(first).raw_fitness(), objective);

                for id in [first, last] {
                    let scaled = population.storage_mut(id).fitness_mut(FitnessKind::Scaled)?;
                    downcast_mut::<CrowdedFitness>(scaled)?.set_crowding(f32::INFINITY);
                }
            }
            front.queue.clear();

            // crowding distance of the interior chromosomes
            for objective in 0..objectives {
                let spread = front.spreads[objective];
                if spread == 0.0 {
                    continue;
                }
                let sorted = &front.sorted[objective];
                for position in 1..sorted.len().saturating_sub(1) {
                    let gap = population
                        .storage(sorted[position + 1])
                        .raw_fitness()
                        .component_distance(
                            population.storage(sorted[position - 1]).raw_fitness(),
                            objective,
                        );
                    let scaled = population
                        .storage_mut(sorted[position])
                        .fitness_mut(FitnessKind::Scaled)?;
                    let fitness = downcast_mut::<CrowdedFitness>(scaled)?;
                    let updated = fitness.crowding() + gap / spread;
                    fitness.set_crowding(updated);
                }
            }

            // release the next front by draining the dominance lists
            rank -= 1.0;
            let members: Vec<StorageId> = front.sorted[0].clone();
            for member in members {
                // the lists reset on the next run; taking them empties the
                // tag for this generation
                let drained = std::mem::take(
                    &mut population.storage_mut(member).tags_mut().get_mut(lists)?.0,
                );
                for list in &drained {
                    for dominated in list {
                        let remaining = population
                            .storage(*dominated)
                            .tags()
                            .get(counts)?
                            .fetch_sub(1, AtomicOrdering::Relaxed);
                        if remaining == 1 {
                            let scaled = population
                                .storage_mut(*dominated)
                                .fitness_mut(FitnessKind::Scaled)?;
                            downcast_mut::<CrowdedFitness>(scaled)?.set_rank(rank);
                            front.queue.push(*dominated);
                        }
                    }
                }
            }
        }

        population.put_population_tag(front_handle, front)?;
        timer.finish(population)
    }
}
