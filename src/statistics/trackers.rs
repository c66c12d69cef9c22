//! Statistics trackers.
//!
//! A tracker binds a set of well-known values into a population's
//! statistics object and refreshes them once per generation. Fitness and
//! deviation trackers update incrementally from the new/removed side
//! groups and fall back to a full sweep when the fitness landscape moved
//! under them (operation change, complete update, or churn touching most
//! of the population).

use crate::branch::Branches;
use crate::errors::{Error, Result};
use crate::fitness::{Fitness, FitnessKind};
use crate::population::{Population, PopulationFlags};
use crate::statistics::{self, Combiner, Evaluator, Statistics, ValueId};
use std::fmt::Debug;

/// Stable identifier of a tracker registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackerId(pub u32);

pub const POPULATION_SIZE_TRACKER: TrackerId = TrackerId(1);
pub const RAW_FITNESS_TRACKER: TrackerId = TrackerId(2);
pub const SCALED_FITNESS_TRACKER: TrackerId = TrackerId(3);
pub const RAW_DEVIATION_TRACKER: TrackerId = TrackerId(4);
pub const SCALED_DEVIATION_TRACKER: TrackerId = TrackerId(5);
pub const OPERATION_COUNT_TRACKER: TrackerId = TrackerId(6);
pub const OPERATION_TIME_TRACKER: TrackerId = TrackerId(7);

/// Create a well-known value with its default combiner or evaluator.
pub fn register_default_value(statistics: &mut Statistics, id: ValueId) -> Result<()> {
    use crate::statistics::*;

    match id {
        POPULATION_SIZE => statistics.add_int_value(id, Combiner::Replace, false),
        BEST_FITNESS | WORST_FITNESS | BEST_FITNESS_SCALED | WORST_FITNESS_SCALED => {
            statistics.add_fitness_value(id, false)
        }
        // totals persist across generations for incremental updates
        TOTAL_FITNESS | TOTAL_FITNESS_SCALED => statistics.add_fitness_value(id, false),
        AVG_FITNESS => statistics.add_evaluated_fitness_value(
            id,
            Evaluator::Ratio {
                value: TOTAL_FITNESS,
                count: POPULATION_SIZE,
            },
        ),
        AVG_FITNESS_SCALED => statistics.add_evaluated_fitness_value(
            id,
            Evaluator::Ratio {
                value: TOTAL_FITNESS_SCALED,
                count: POPULATION_SIZE,
            },
        ),
        VARIANCE_BASE | VARIANCE_BASE_SCALED => {
            statistics.add_float_value(id, Combiner::Sum, false)
        }
        VARIANCE => statistics.add_evaluated_float_value(
            id,
            Evaluator::Ratio {
                value: VARIANCE_BASE,
                count: POPULATION_SIZE,
            },
        ),
        VARIANCE_SCALED => statistics.add_evaluated_float_value(
            id,
            Evaluator::Ratio {
                value: VARIANCE_BASE_SCALED,
                count: POPULATION_SIZE,
            },
        ),
        DEVIATION => {
            statistics.add_evaluated_float_value(id, Evaluator::Sqrt { value: VARIANCE })
        }
        DEVIATION_SCALED => {
            statistics.add_evaluated_float_value(id, Evaluator::Sqrt { value: VARIANCE_SCALED })
        }
        MATING_COUNT | CROSSOVER_COUNT | MUTATION_COUNT | ACCEPTED_MUTATION_COUNT
        | SELECTION_COUNT => statistics.add_int_value(id, Combiner::Sum, true),
        SELECTION_TIME | COUPLING_TIME | REPLACEMENT_TIME | SCALING_TIME | GENERATION_TIME => {
            statistics.add_time_value(id, Combiner::Max, true)
        }
        _ => Err(Error::ArgumentOutOfRange {
            argument: "value_id",
            reason: "no default exists for this value id",
        }),
    }
}

pub trait StatTracker: Debug + Send + Sync {
    fn id(&self) -> TrackerId;

    /// Ids of the values this tracker owns inside the statistics object.
    fn bound_values(&self) -> &[ValueId];

    /// Insert the tracked values. Rolls back already inserted values when
    /// one registration fails.
    fn bind(&self, statistics: &mut Statistics) -> Result<()> {
        let values = self.bound_values();
        for (index, id) in values.iter().enumerate() {
            if let Err(error) = register_default_value(statistics, *id) {
                for bound in &values[..index] {
                    let _ = statistics.remove_value(*bound);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn unbind(&self, statistics: &mut Statistics) -> Result<()> {
        for id in self.bound_values() {
            statistics.remove_value(*id)?;
        }
        Ok(())
    }

    /// Refresh the tracked values from population data. Branches
    /// accumulate partials over their ranges; the reduction runs once.
    /// Safe to call more than once per generation.
    fn evaluate(&self, population: &mut Population, branches: &Branches) -> Result<()>;
}

/// Tracks the number of chromosomes in the population.
#[derive(Clone, Debug, Default)]
pub struct PopulationSizeTracker;

const SIZE_VALUES: [ValueId; 1] = [statistics::POPULATION_SIZE];

impl StatTracker for PopulationSizeTracker {
    fn id(&self) -> TrackerId {
        POPULATION_SIZE_TRACKER
    }

    fn bound_values(&self) -> &[ValueId] {
        &SIZE_VALUES
    }

    fn evaluate(&self, population: &mut Population, _branches: &Branches) -> Result<()> {
        let size = population.len() as i64;
        population
            .statistics_mut()
            .set_int(statistics::POPULATION_SIZE, size)
    }
}

const RAW_FITNESS_VALUES: [ValueId; 4] = [
    statistics::BEST_FITNESS,
    statistics::WORST_FITNESS,
    statistics::TOTAL_FITNESS,
    statistics::AVG_FITNESS,
];

const SCALED_FITNESS_VALUES: [ValueId; 4] = [
    statistics::BEST_FITNESS_SCALED,
    statistics::WORST_FITNESS_SCALED,
    statistics::TOTAL_FITNESS_SCALED,
    statistics::AVG_FITNESS_SCALED,
];

fn changed_flag(kind: FitnessKind) -> u32 {
    match kind {
        FitnessKind::Raw => PopulationFlags::FITNESS_OPERATION_CHANGED,
        FitnessKind::Scaled => PopulationFlags::SCALED_FITNESS_PROTOTYPE_CHANGED,
    }
}

fn complete_flag(kind: FitnessKind) -> u32 {
    match kind {
        FitnessKind::Raw => PopulationFlags::COMPLETE_FITNESS_UPDATE,
        FitnessKind::Scaled => PopulationFlags::COMPLETE_SCALED_FITNESS_UPDATE,
    }
}

/// Full sweep when the fitness landscape changed, or when the side groups
/// cover most of the population anyway.
fn needs_complete_update(population: &Population, kind: FitnessKind) -> bool {
    population
        .flags()
        .any(complete_flag(kind) | changed_flag(kind))
        || population.len()
            < population.new_chromosomes().len() + population.removed_chromosomes().len()
}

/// Tracks best, worst, total and average fitness, raw or scaled.
///
/// The total updates incrementally: contributions of this generation's new
/// chromosomes are added and removed ones subtracted, per branch, before a
/// single reduction. Best and worst are read off the edges of the
/// population, which the pipeline keeps sorted by fitness at this point of
/// the generation.
#[derive(Clone, Debug)]
pub struct FitnessTracker {
    kind: FitnessKind,
}

impl FitnessTracker {
    pub fn raw() -> Self {
        Self {
            kind: FitnessKind::Raw,
        }
    }

    pub fn scaled() -> Self {
        Self {
            kind: FitnessKind::Scaled,
        }
    }

    fn values(&self) -> &'static [ValueId; 4] {
        match self.kind {
            FitnessKind::Raw => &RAW_FITNESS_VALUES,
            FitnessKind::Scaled => &SCALED_FITNESS_VALUES,
        }
    }
}

impl StatTracker for FitnessTracker {
    fn id(&self) -> TrackerId {
        match self.kind {
            FitnessKind::Raw => RAW_FITNESS_TRACKER,
            FitnessKind::Scaled => SCALED_FITNESS_TRACKER,
        }
    }

    fn bound_values(&self) -> &[ValueId] {
        self.values()
    }

    fn evaluate(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        let [best_id, worst_id, total_id, _] = *self.values();

        let prototype = population
            .create_fitness_object(self.kind)
            .ok_or(Error::NullArgument("scaled fitness prototype"))?;

        if population.flags().any(changed_flag(self.kind)) {
            for id in self.values() {
                population.statistics_mut().clear_value(*id)?;
            }
        }

        let complete = needs_complete_update(population, self.kind);

        let mut partials: Vec<Box<dyn Fitness>> = branches
            .iter()
            .map(|_| {
                let mut zero = prototype.clone_boxed();
                zero.clear();
                zero
            })
            .collect();

        if complete {
            for branch in branches.iter() {
                let partial = &mut partials[branch.index];
                for index in branch.split_work(population.len()) {
                    partial.accumulate(population.at(index).fitness(self.kind)?);
                }
            }
        } else {
            if let Some(previous) = population.statistics().fitness(total_id)? {
                partials[0].accumulate(previous);
            }
            for branch in branches.iter() {
                let new_group = population.new_chromosomes();
                let new_ids: Vec<_> = branch
                    .split_work(new_group.len())
                    .map(|index| new_group.get(index))
                    .collect();
                let removed_group = population.removed_chromosomes();
                let removed_ids: Vec<_> = branch
                    .split_work(removed_group.len())
                    .map(|index| removed_group.get(index))
                    .collect();

                let partial = &mut partials[branch.index];
                for id in new_ids {
                    partial.accumulate(population.storage(id).fitness(self.kind)?);
                }
                for id in removed_ids {
                    partial.subtract(population.storage(id).fitness(self.kind)?);
                }
            }
        }

        // reduction
        let mut total = prototype.clone_boxed();
        total.clear();
        for partial in &partials {
            total.accumulate(partial.as_ref());
        }

        if !population.is_empty() {
            let best = population.at(0).fitness(self.kind)?.clone_boxed();
            let worst = population
                .at(population.len() - 1)
                .fitness(self.kind)?
                .clone_boxed();
            population.statistics_mut().set_fitness(best_id, best)?;
            population.statistics_mut().set_fitness(worst_id, worst)?;
        }

        population.statistics_mut().set_fitness(total_id, total)?;
        population.statistics_mut().refresh_evaluated();
        Ok(())
    }
}

const RAW_DEVIATION_VALUES: [ValueId; 3] = [
    statistics::VARIANCE_BASE,
    statistics::VARIANCE,
    statistics::DEVIATION,
];

const SCALED_DEVIATION_VALUES: [ValueId; 3] = [
    statistics::VARIANCE_BASE_SCALED,
    statistics::VARIANCE_SCALED,
    statistics::DEVIATION_SCALED,
];

/// Tracks fitness variance and deviation, raw or scaled, with the same
/// incremental/complete policy as the fitness tracker. Uses the average
/// maintained by the corresponding fitness tracker.
#[derive(Clone, Debug)]
pub struct DeviationTracker {
    kind: FitnessKind,
}

impl DeviationTracker {
    pub fn raw() -> Self {
        Self {
            kind: FitnessKind::Raw,
        }
    }

    pub fn scaled() -> Self {
        Self {
            kind: FitnessKind::Scaled,
        }
    }

    fn values(&self) -> &'static [ValueId; 3] {
        match self.kind {
            FitnessKind::Raw => &RAW_DEVIATION_VALUES,
            FitnessKind::Scaled => &SCALED_DEVIATION_VALUES,
        }
    }

    fn average_source(&self) -> ValueId {
        match self.kind {
            FitnessKind::Raw => statistics::AVG_FITNESS,
            FitnessKind::Scaled => statistics::AVG_FITNESS_SCALED,
        }
    }
}

impl StatTracker for DeviationTracker {
    fn id(&self) -> TrackerId {
        match self.kind {
            FitnessKind::Raw => RAW_DEVIATION_TRACKER,
            FitnessKind::Scaled => SCALED_DEVIATION_TRACKER,
        }
    }

    fn bound_values(&self) -> &[ValueId] {
        self.values()
    }

    fn evaluate(&self, population: &mut Population, branches: &Branches) -> Result<()> {
        let [base_id, _, _] = *self.values();

        if population.flags().any(changed_flag(self.kind)) {
            for id in self.values() {
                population.statistics_mut().clear_value(*id)?;
            }
        }

        population.statistics_mut().refresh_evaluated();
        let average = population
            .statistics()
            .fitness(self.average_source())
            .ok()
            .flatten()
            .map(Fitness::probability_base)
            .unwrap_or(0.0);

        let complete = needs_complete_update(population, self.kind);
        let mut partials = vec![0.0f32; branches.count()];

        let spread = |fitness: &dyn Fitness| {
            let diff = fitness.probability_base() - average;
            diff * diff
        };

        if complete {
            for branch in branches.iter() {
                let mut sum = 0.0;
                for index in branch.split_work(population.len()) {
                    sum += spread(population.at(index).fitness(self.kind)?);
                }
                partials[branch.index] = sum;
            }
        } else {
            partials[0] = population.statistics().float(base_id)?;
            for branch in branches.iter() {
                let new_group = population.new_chromosomes();
                let new_ids: Vec<_> = branch
                    .split_work(new_group.len())
                    .map(|index| new_group.get(index))
                    .collect();
                let removed_group = population.removed_chromosomes();
                let removed_ids: Vec<_> = branch
                    .split_work(removed_group.len())
                    .map(|index| removed_group.get(index))
                    .collect();

                let mut sum = 0.0;
                for id in new_ids {
                    sum += spread(population.storage(id).fitness(self.kind)?);
                }
                for id in removed_ids {
                    sum -= spread(population.storage(id).fitness(self.kind)?);
                }
                partials[branch.index] += sum;
            }
        }

        let base: f32 = partials.iter().sum();
        population.statistics_mut().set_float(base_id, base)?;
        population.statistics_mut().refresh_evaluated();
        Ok(())
    }
}

const COUNT_VALUES: [ValueId; 5] = [
    statistics::MATING_COUNT,
    statistics::CROSSOVER_COUNT,
    statistics::MUTATION_COUNT,
    statistics::ACCEPTED_MUTATION_COUNT,
    statistics::SELECTION_COUNT,
];

/// Registers the operation counters. Selection, coupling and replacement
/// merge their crossover-buffer counters into these values as they run;
/// nothing is left to do at generation end.
#[derive(Clone, Debug, Default)]
pub struct OperationCountTracker;

impl StatTracker for OperationCountTracker {
    fn id(&self) -> TrackerId {
        OPERATION_COUNT_TRACKER
    }

    fn bound_values(&self) -> &[ValueId] {
        &COUNT_VALUES
    }

    fn evaluate(&self, _population: &mut Population, _branches: &Branches) -> Result<()> {
        Ok(())
    }
}

const TIME_VALUES: [ValueId; 5] = [
    statistics::SELECTION_TIME,
    statistics::COUPLING_TIME,
    statistics::REPLACEMENT_TIME,
    statistics::SCALING_TIME,
    statistics::GENERATION_TIME,
];

/// Registers the operation timers and closes the generation clock.
#[derive(Clone, Debug, Default)]
pub struct OperationTimeTracker;

impl StatTracker for OperationTimeTracker {
    fn id(&self) -> TrackerId {
        OPERATION_TIME_TRACKER
    }

    fn bound_values(&self) -> &[ValueId] {
        &TIME_VALUES
    }

    fn evaluate(&self, population: &mut Population, _branches: &Branches) -> Result<()> {
        let elapsed = population.statistics().elapsed();
        let statistics = population.statistics_mut();
        statistics.merge_time(statistics::GENERATION_TIME, elapsed)?;
        statistics.reset_timer();
        Ok(())
    }
}
