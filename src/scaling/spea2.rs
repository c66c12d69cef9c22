//! Improved strength Pareto evolutionary algorithm (SPEA-II).
//!
//! Strength doubles as in SPEA-I, but density comes from the distance to
//! the kth nearest neighbour: every chromosome keeps a sorted neighbour
//! list over raw fitness distances. Environmental selection repeatedly
//! removes the chromosome whose nearest neighbour is closest (ties broken
//! by the next neighbours), invalidating the removed index in every list
//! instead of rebuilding them.

use super::{dominance, for_each_pair, mark_rescaled, DominanceList, Scaling};
use crate::branch::{Branches, RandomStreams};
use crate::errors::Result;
use crate::fitness::{downcast_mut, Fitness, FitnessKind, ScalarFitness};
use crate::population::{OperationTimer, Population};
use crate::sorting::merge_sort_by;
use crate::statistics;
use crate::storage::REMOVE_CHROMOSOME;
use crate::tags::{SizableTag, SizableTagLifecycle, TagHandle, TagId, TypedTagLifecycle};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

const SELF_MARK: f32 = -1.0;
const REMOVED_MARK: f32 = -2.0;

/// Sorted distances of one chromosome to every other population member,
/// indexed by population position.
#[derive(Clone, Debug, Default)]
pub struct NeighbourBuffer {
    order: Vec<usize>,
    helper: Vec<usize>,
    distances: Vec<f32>,
    count: usize,
}

impl NeighbourBuffer {
    fn prepare(&mut self, count: usize, own_position: usize) {
        self.set_len(count);
        self.count = count;
        self.distances[..count].iter_mut().for_each(|d| *d = 0.0);
        self.distances[own_position] = SELF_MARK;
    }

    fn insert(&mut self, position: usize, distance: f32) {
        self.distances[position] = distance;
    }

    fn sort(&mut self) {
        self.order.clear();
        self.order.extend(0..self.count);
        let distances = &self.distances;
        merge_sort_by(&mut self.order, &mut self.helper, |a, b| {
            OrderedFloat(distances[*a]).cmp(&OrderedFloat(distances[*b]))
        });
    }

    fn mark_removed(&mut self, position: usize) {
        self.distances[position] = REMOVED_MARK;
    }

    /// Distance at `rank` of the sorted list; self and removed entries
    /// sort first and count as ranks, mirroring the list layout the
    /// fitness formula indexes into.
    fn distance_at_rank(&self, rank: usize) -> f32 {
        match self.order.get(rank) {
            Some(position) => self.distances[*position],
            None => 0.0,
        }
    }

    /// Closest surviving neighbour.
    fn nearest(&self) -> Option<(usize, f32)> {
        for rank in 0..self.count {
            let position = self.order[rank];
            let distance = self.distances[position];
            if distance >= 0.0 {
                return Some((position, distance));
            }
        }
        None
    }

    /// Lexicographic comparison of the surviving neighbour distance
    /// sequences, for nearest-pair ties.
    fn compare_sequences(&self, other: &Self) -> Ordering {
        let mut mine = self.order.iter().map(|p| self.distances[*p]).filter(|d| *d >= 0.0);
        let mut theirs = other
            .order
            .iter()
            .map(|p| other.distances[*p])
            .filter(|d| *d >= 0.0);
        loop {
            match (mine.next(), theirs.next()) {
                (Some(a), Some(b)) => match a.partial_cmp(&b).unwrap_or(Ordering::Equal) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                },
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (None, None) => return Ordering::Equal,
            }
        }
    }
}

impl SizableTag for NeighbourBuffer {
    fn with_len(len: usize) -> Self {
        Self {
            order: Vec::with_capacity(len),
            helper: Vec::new(),
            distances: vec![0.0; len],
            count: 0,
        }
    }

    fn set_len(&mut self, len: usize) {
        self.distances.resize(len, 0.0);
    }

    fn reset(&mut self) {
        self.order.clear();
        self.count = 0;
        self.distances.iter_mut().for_each(|d| *d = 0.0);
    }
}

#[derive(Copy, Clone, Debug)]
struct NearestPair {
    position: usize,
    neighbour: usize,
    distance: f32,
}

impl NearestPair {
    fn empty() -> Self {
        Self {
            position: usize::MAX,
            neighbour: usize::MAX,
            distance: f32::INFINITY,
        }
    }
}

/// Per-branch nearest-pair cache of the environmental selection.
#[derive(Clone, Debug, Default)]
pub struct DistanceStorage {
    branch_min: Vec<NearestPair>,
    global: Option<usize>,
}

impl DistanceStorage {
    fn reset(&mut self, branch_count: usize) {
        self.branch_min.clear();
        self.branch_min.resize(branch_count, NearestPair::empty());
        self.global = None;
    }

    fn requires_update(&self, branch: usize) -> bool {
        match self.global {
            None => true,
            Some(global) => {
                let cached = self.branch_min[branch];
                cached.position == usize::MAX
                    || cached.position == global
                    || cached.neighbour == global
            }
        }
    }

    fn reduce(&mut self) -> Option<usize> {
        self.global = self
            .branch_min
            .iter()
            .filter(|pair| pair.position != usize::MAX)
            .min_by_key(|pair| OrderedFloat(pair.distance))
            .map(|pair| pair.position);
        self.global
    }
}

#[derive(Clone, Debug)]
pub struct Spea2Scaling {
    /// Which neighbour's distance feeds the density term. Rank 0 of the
    /// sorted list is the chromosome itself.
    pub k: usize,
    pub dominance_list_tag: TagId,
    pub strength_tag: TagId,
    pub dominated_tag: TagId,
    pub neighbours_tag: TagId,
    pub distance_storage_tag: TagId,
}

impl Scaling for Spea2Scaling {
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
        population.add_chromosome_tag::<NeighbourBuffer>(
            self.neighbours_tag,
            Box::new(SizableTagLifecycle::<NeighbourBuffer>::new(
                population.params().population_size(),
            )),
        )?;
        population.add_population_tag::<DistanceStorage>(
            self.distance_storage_tag,
            Box::new(TypedTagLifecycle::<DistanceStorage>::default()),
        )?;
        Ok(())
    }

    fn clear_tags(&self, population: &mut Population) -> Result<()> {
        population.remove_chromosome_tag(self.dominance_list_tag)?;
        population.remove_chromosome_tag(self.strength_tag)?;
        population.remove_chromosome_tag(self.dominated_tag)?;
        population.remove_chromosome_tag(self.neighbours_tag)?;
        population.remove_population_tag(self.distance_storage_tag)
    }

    fn update(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        population.update_chromosome_tag_lifecycle(
            self.dominance_list_tag,
            Box::new(SizableTagLifecycle::<DominanceList>::new(branches.count())),
        )?;
        let size = population.params().population_size();
        population.update_chromosome_tag_lifecycle(
            self.neighbours_tag,
            Box::new(SizableTagLifecycle::<NeighbourBuffer>::new(size)),
        )
    }

    fn run(
        &self,
        population: &mut Population,
        branches: &Branches,
        _streams: &mut RandomStreams,
    ) -> Result<()> {
        let timer = OperationTimer::start(population, statistics::SCALING_TIME);

        let lists: TagHandle<DominanceList> =
            population.chromosome_tag_handle(self.dominance_list_tag)?;
        let strengths: TagHandle<AtomicUsize> =
            population.chromosome_tag_handle(self.strength_tag)?;
        let dominated: TagHandle<bool> = population.chromosome_tag_handle(self.dominated_tag)?;
        let neighbours: TagHandle<NeighbourBuffer> =
            population.chromosome_tag_handle(self.neighbours_tag)?;
        let storage_handle = population.population_tag_handle(self.distance_storage_tag)?;

        mark_rescaled(population);
        let mut nearest: DistanceStorage = population.take_population_tag(storage_handle)?;
        nearest.reset(branches.count());

        let size = population.len();
        for index in 0..size {
            let tags = population.at_mut(index).tags_mut();
            let list = tags.get_mut(lists)?;
            list.set_len(branches.count());
            list.reset();
            tags.get_mut(strengths)?.store(0, AtomicOrdering::Relaxed);
            *tags.get_mut(dominated)? = false;
            tags.get_mut(neighbours)?.prepare(size, index);
        }

        // dominance and pairwise distances in one pass
        for_each_pair(branches, size, |branch, row, column| {
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

            let distance = population
                .at(row)
                .raw_fitness()
                .distance(population.at(column).raw_fitness());
            population
                .at_mut(row)
                .tags_mut()
                .get_mut(neighbours)?
                .insert(column, distance);
            population
                .at_mut(column)
                .tags_mut()
                .get_mut(neighbours)?
                .insert(row, distance);
            Ok(())
        })?;

        // strengths, sorted neighbour lists, nondominated census
        let mut nondominated_count = 0usize;
        for index in 0..size {
            population.at_mut(index).tags_mut().get_mut(neighbours)?.sort();

            let drained = std::mem::take(&mut population.at_mut(index).tags_mut().get_mut(lists)?.0);
            let strength: usize = drained.iter().map(Vec::len).sum();
            for list in &drained {
                for loser in list {
                    population
                        .storage(*loser)
                        .tags()
                        .get(strengths)?
                        .fetch_add(strength, AtomicOrdering::Relaxed);
                }
            }

            if !*population.at(index).tags().get(dominated)? {
                nondominated_count += 1;
            }
        }

        // fitness: kth-neighbour density, strength for the dominated
        for index in 0..size {
            let kth = 1.0
                + population
                    .at(index)
                    .tags()
                    .get(neighbours)?
                    .distance_at_rank(self.k);
            let strength = population
                .at(index)
                .tags()
                .get(strengths)?
                .load(AtomicOrdering::Relaxed) as f32;
            let value = if *population.at(index).tags().get(dominated)? {
                1.0 / (1.0 / kth + strength)
            } else {
                kth
            };
            let scaled = population.at_mut(index).fitness_mut(FitnessKind::Scaled)?;
            downcast_mut::<ScalarFitness>(scaled)?.set_value(value);
            population
                .at(index)
                .tags()
                .get(strengths)?
                .store(0, AtomicOrdering::Relaxed);
        }

        // environmental selection: drop the most crowded nondominated
        // chromosome until the set fits
        let required = population.params().permanent_space_size();
        let mut alive = nondominated_count;
        while alive > required {
            for branch in branches.iter() {
                if !nearest.requires_update(branch.index) {
                    continue;
                }
                nearest.branch_min[branch.index] = NearestPair::empty();
                for index in branch.split_work(size) {
                    if *population.at(index).tags().get(dominated)?
                        || population.at(index).flags().any(REMOVE_CHROMOSOME)
                    {
                        continue;
                    }
                    let buffer = population.at(index).tags().get(neighbours)?;
                    let Some((neighbour, distance)) = buffer.nearest() else {
                        continue;
                    };

                    let cached = nearest.branch_min[branch.index];
                    let closer = distance < cached.distance
                        || (distance == cached.distance
                            && cached.position != usize::MAX
                            && buffer.compare_sequences(
                                population
                                    .at(cached.position)
                                    .tags()
                                    .get(neighbours)?,
                            ) == Ordering::Less);
                    if closer {
                        nearest.branch_min[branch.index] = NearestPair {
                            position: index,
                            neighbour,
                            distance,
                        };
                    }
                }
            }

            let Some(victim) = nearest.reduce() else {
                break;
            };
            population.at(victim).flags().set(REMOVE_CHROMOSOME);
            alive -= 1;

            for index in 0..size {
                population
                    .at_mut(index)
                    .tags_mut()
                    .get_mut(neighbours)?
                    .mark_removed(victim);
            }
        }

        population.put_population_tag(storage_handle, nearest)?;
        timer.finish(population)
    }
}
