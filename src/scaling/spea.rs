//! Strength Pareto evolutionary algorithm (SPEA-I).
//!
//! Nondominated chromosomes receive a strength equal to the number of
//! peers they dominate; dominated chromosomes accumulate the strengths of
//! their dominators. The nondominated set then shrinks through average
//! linkage clustering until it fits the permanent space: the closest pair
//! of clusters merges, each branch caching the closest pair of its
//! partition and rescanning only when the merge touched its candidates.
//! Each surviving cluster keeps the member closest to its center.

use super::{dominance, for_each_pair, mark_rescaled, DominanceList, Scaling};
use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::fitness::{downcast_mut, Fitness, FitnessKind, ScalarFitness};
use crate::population::{OperationTimer, Population};
use crate::statistics;
use crate::storage::{StorageId, REMOVE_CHROMOSOME};
use crate::tags::{SizableTag, SizableTagLifecycle, TagHandle, TagId, TypedTagLifecycle};
use ordered_float::OrderedFloat;
use rand::Rng;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Average linkage between two clusters over raw fitness distance.
fn cluster_distance(population: &Population, first: &[StorageId], second: &[StorageId]) -> f32 {
    let mut total = 0.0;
    for a in first {
        for b in second {
            total += population
                .storage(*a)
                .raw_fitness()
                .distance(population.storage(*b).raw_fitness());
        }
    }
    total / (first.len() * second.len()) as f32
}

#[derive(Copy, Clone, Debug)]
struct ClusterPair {
    first: usize,
    second: usize,
    distance: f32,
}

impl ClusterPair {
    fn infinite() -> Self {
        Self {
            first: usize::MAX,
            second: usize::MAX,
            distance: f32::INFINITY,
        }
    }
}

/// Cluster buffer of the reduction, kept as a population tag.
#[derive(Debug, Default)]
pub struct ClusterStorage {
    clusters: Vec<Vec<StorageId>>,
    branch_min: Vec<ClusterPair>,
}

impl ClusterStorage {
    fn reset(&mut self, branch_count: usize) {
        self.clusters.clear();
        self.branch_min.clear();
        self.branch_min
            .resize(branch_count, ClusterPair::infinite());
    }

    fn create_cluster(&mut self, member: StorageId) {
        self.clusters.push(vec![member]);
    }

    fn live_count(&self) -> usize {
        self.clusters.iter().filter(|c| !c.is_empty()).count()
    }

    fn offer(&mut self, branch: usize, first: usize, second: usize, distance: f32) {
        if distance < self.branch_min[branch].distance {
            self.branch_min[branch] = ClusterPair {
                first,
                second,
                distance,
            };
        }
    }

    fn reduce(&self) -> Option<ClusterPair> {
        self.branch_min
            .iter()
            .filter(|pair| pair.first != usize::MAX)
            .min_by_key(|pair| OrderedFloat(pair.distance))
            .copied()
    }
}

#[derive(Clone, Debug)]
pub struct SpeaScaling {
    pub dominance_list_tag: TagId,
    pub strength_tag: TagId,
    pub dominated_tag: TagId,
    pub cluster_storage_tag: TagId,
}

impl Scaling for SpeaScaling {
    fn scaled_prototype(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn prepare_tags(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.add_chromosome_tag::<DominanceList>(
            self.dominance_list_tag,
            Box::new(SizableTagLifecycle::<DominanceList>::new(branches.count())),
        )?;
        population.add_chromosome_tag::<AtomicUsize>(
            self.strength_tag,
            Box::new(TypedTagLifecycle::<AtomicUsize>::default()),
        )?;
        population.add_chromosome_tag::<bool>(
            self.dominated_tag,
            Box::new(TypedTagLifecycle::<bool>::default()),
        )?;
        population.add_population_tag::<ClusterStorage>(
            self.cluster_storage_tag,
            Box::new(TypedTagLifecycle::<ClusterStorage>::default()),
        )?;
        Ok(())
    }

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        population.remove_chromosome_tag(self.dominance_list_tag)?;
        population.remove_chromosome_tag(self.strength_tag)?;
        population.remove_chromosome_tag(self.dominated_tag)?;
        population.remove_population_tag(self.cluster_storage_tag)
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
        streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::SCALING_TIME);

        let lists: TagHandle<DominanceList> =
            population.chromosome_tag_handle(self.dominance_list_tag)?;
        let strengths: TagHandle<AtomicUsize> =
            population.chromosome_tag_handle(self.strength_tag)?;
        let dominated: TagHandle<bool> = population.chromosome_tag_handle(self.dominated_tag)?;
        let clusters_handle = population.population_tag_handle(self.cluster_storage_tag)?;

        mark_rescaled(population);
        let mut clusters: ClusterStorage = population.take_population_tag(clusters_handle)?;
        clusters.reset(branches.count());

        for index in 0..population.len() {
            let tags = population.at_mut(index).tags_mut();
            let list = tags.get_mut(lists)?;
            list.set_len(branches.count());
            list.reset();
            tags.get_mut(strengths)?.store(0, AtomicOrdering::Relaxed);
            *tags.get_mut(dominated)? = false;
        }

        // dominance pass: partial dominated lists per branch
        for_each_pair(branches, population.len(), |branch, row, column| {
            if *population.at(row).tags().get(dominated)?
                && *population.at(column).tags().get(dominated)?
            {
                return Ok(());
            }
            match dominance(population, row, column) {
                Ordering::Less => {
                    let loser = population.id_at(column);
                    population.at_mut(row).tags_mut().get_mut(lists)?.0[branch].push(loser);
                    *population.at_mut(column).tags_mut().get_mut(dominated)? = true;
                }
                Ordering::Greater => {
                    let loser = population.id_at(row);
                    population.at_mut(column).tags_mut().get_mut(lists)?.0[branch].push(loser);
                    *population.at_mut(row).tags_mut().get_mut(dominated)? = true;
                }
                Ordering::Equal => {}
            }
            Ok(())
        })?;

        // strength assignment; every nondominated chromosome seeds a
        // cluster
        let population_size = population.len();
        for index in 0..population_size {
            let drained = std::mem::take(&mut population.at_mut(index).tags_mut().get_mut(lists)?.0);
            if !*population.at(index).tags().get(dominated)? {
                let strength: usize = drained.iter().map(Vec::len).sum();
                population
                    .at(index)
                    .tags()
                    .get(strengths)?
                    .store(strength, AtomicOrdering::Relaxed);
                for list in &drained {
                    for loser in list {
                        population
                            .storage(*loser)
                            .tags()
                            .get(strengths)?
                            .fetch_add(strength, AtomicOrdering::Relaxed);
                    }
                }
                let id = population.id_at(index);
                clusters.create_cluster(id);
            }
        }

        // fitness from strength
        for index in 0..population_size {
            let strength = population
                .at(index)
                .tags()
                .get(strengths)?
                .load(AtomicOrdering::Relaxed) as f32;
            let value = if *population.at(index).tags().get(dominated)? {
                population_size as f32 / (population_size as f32 + strength)
            } else {
                1.0 + strength
            };
            let scaled = population.at_mut(index).fitness_mut(FitnessKind::Scaled)?;
            downcast_mut::<ScalarFitness>(scaled)?.set_value(value);
            population
                .at(index)
                .tags()
                .get(strengths)?
                .store(0, AtomicOrdering::Relaxed);
            *population.at_mut(index).tags_mut().get_mut(dominated)? = false;
        }

        // cluster reduction down to permanent capacity
        let required = population.params().permanent_space_size();
        let mut merged_into: Option<usize> = None;
        while clusters.live_count() > required {
            for branch in branches.iter() {
                let rescan = match merged_into {
                    None => true,
                    Some(merged) => {
                        let cached = clusters.branch_min[branch.index];
                        cached.first == usize::MAX
                            || cached.first == merged
                            || cached.second == merged
                            || clusters.clusters[cached.first].is_empty()
                            || clusters.clusters[cached.second].is_empty()
                    }
                };

                if rescan {
                    clusters.branch_min[branch.index] = ClusterPair::infinite();
                    for first in branch.split_work(clusters.clusters.len()) {
                        if clusters.clusters[first].is_empty() {
                            continue;
                        }
                        for second in 0..clusters.clusters.len() {
                            if first == second || clusters.clusters[second].is_empty() {
                                continue;
                            }
                            let distance = cluster_distance(
                                population,
                                &clusters.clusters[first],
                                &clusters.clusters[second],
                            );
                            clusters.offer(branch.index, first, second, distance);
                        }
                    }
                } else if let Some(merged) = merged_into {
                    // only the merged cluster moved; test it against the
                    // branch's partition
                    for first in branch.split_work(clusters.clusters.len()) {
                        if first == merged || clusters.clusters[first].is_empty() {
                            continue;
                        }
                        let distance = cluster_distance(
                            population,
                            &clusters.clusters[first],
                            &clusters.clusters[merged],
                        );
                        clusters.offer(branch.index, first, merged, distance);
                    }
                }
            }

            let Some(pair) = clusters.reduce() else {
                break;
            };
            let absorbed = std::mem::take(&mut clusters.clusters[pair.second]);
            clusters.clusters[pair.first].extend(absorbed);
            merged_into = Some(pair.first);
        }

        // keep each cluster's center, mark the rest for removal
        for cluster in &clusters.clusters {
            if cluster.len() < 2 {
                continue;
            }
            let center = if cluster.len() == 2 {
                cluster[usize::from(streams.branch(0).gen::<bool>())]
            } else {
                let mut best = cluster[0];
                let mut best_distance = f32::INFINITY;
                for candidate in cluster {
                    let mut total = 0.0;
                    for other in cluster {
                        if candidate != other {
                            total += population
                                .storage(*candidate)
                                .raw_fitness()
                                .distance(population.storage(*other).raw_fitness());
                        }
                    }
                    let average = total / (cluster.len() - 1) as f32;
                    if average < best_distance {
                        best_distance = average;
                        best = *candidate;
                    }
                }
                best
            };

            for member in cluster {
                if *member != center {
                    population.storage(*member).flags().set(REMOVE_CHROMOSOME);
                }
            }
        }

        clusters.clusters.clear();
        population.put_population_tag(clusters_handle, clusters)?;
        timer.finish(population)
    }
}
