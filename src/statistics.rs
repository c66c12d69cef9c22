//! Versioned statistical values.
//!
//! A population's statistics object holds values under stable ids. Each
//! value keeps a short history ring: `next` closes the current generation
//! entry and opens a fresh one. Values are either *stored* (written by
//! trackers and operators, merged through a combiner) or *evaluated*
//! (recomputed from other values, e.g. the average fitness from the total
//! and the population size).

pub mod trackers;

use crate::errors::{Error, Result};
use crate::fitness::Fitness;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Stable identifier of one statistical value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

pub const POPULATION_SIZE: ValueId = ValueId(0);
pub const BEST_FITNESS: ValueId = ValueId(1);
pub const WORST_FITNESS: ValueId = ValueId(2);
pub const TOTAL_FITNESS: ValueId = ValueId(3);
pub const AVG_FITNESS: ValueId = ValueId(4);
pub const BEST_FITNESS_SCALED: ValueId = ValueId(5);
pub const WORST_FITNESS_SCALED: ValueId = ValueId(6);
pub const TOTAL_FITNESS_SCALED: ValueId = ValueId(7);
pub const AVG_FITNESS_SCALED: ValueId = ValueId(8);
pub const VARIANCE_BASE: ValueId = ValueId(9);
pub const VARIANCE_BASE_SCALED: ValueId = ValueId(10);
pub const VARIANCE: ValueId = ValueId(11);
pub const VARIANCE_SCALED: ValueId = ValueId(12);
pub const DEVIATION: ValueId = ValueId(13);
pub const DEVIATION_SCALED: ValueId = ValueId(14);
pub const MATING_COUNT: ValueId = ValueId(15);
pub const CROSSOVER_COUNT: ValueId = ValueId(16);
pub const MUTATION_COUNT: ValueId = ValueId(17);
pub const ACCEPTED_MUTATION_COUNT: ValueId = ValueId(18);
pub const SELECTION_COUNT: ValueId = ValueId(19);
pub const SELECTION_TIME: ValueId = ValueId(20);
pub const COUPLING_TIME: ValueId = ValueId(21);
pub const REPLACEMENT_TIME: ValueId = ValueId(22);
pub const SCALING_TIME: ValueId = ValueId(23);
pub const GENERATION_TIME: ValueId = ValueId(24);

/// How per-branch partial results merge into the stored value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Combiner {
    /// Last write wins.
    #[default]
    Replace,
    /// Commutative sum of contributions.
    Sum,
    /// Largest contribution wins. Used for operation times, where the
    /// longest branch defines the wall-clock cost.
    Max,
}

/// Derivation rules for evaluated values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Evaluator {
    /// `value / count`, where `count` is an integer value (typically the
    /// population size). Works for fitness and float sources alike.
    Ratio { value: ValueId, count: ValueId },
    /// `sqrt(value)` of a float source.
    Sqrt { value: ValueId },
}

const DEFAULT_HISTORY_DEPTH: usize = 10;

#[derive(Clone, Debug)]
struct History<T> {
    current: Option<T>,
    entries: VecDeque<T>,
    depth: usize,
}

impl<T: Clone> History<T> {
    fn new(depth: usize) -> Self {
        Self {
            current: None,
            entries: VecDeque::new(),
            depth,
        }
    }

    fn advance(&mut self, reset: bool) {
        if let Some(value) = self.current.clone() {
            self.entries.push_front(value);
            self.entries.truncate(self.depth);
        }
        if reset {
            self.current = None;
        }
    }

    fn clear(&mut self) {
        self.current = None;
        self.entries.clear();
    }

    fn previous(&self, back: usize) -> Option<&T> {
        self.entries.get(back)
    }
}

enum Record {
    Int {
        history: History<i64>,
        combiner: Combiner,
        accumulating: bool,
    },
    Float {
        history: History<f32>,
        combiner: Combiner,
        accumulating: bool,
    },
    Fitness {
        history: History<Box<dyn Fitness>>,
        accumulating: bool,
    },
    Time {
        history: History<Duration>,
        combiner: Combiner,
        accumulating: bool,
    },
    EvaluatedFitness {
        evaluator: Evaluator,
        history: History<Box<dyn Fitness>>,
    },
    EvaluatedFloat {
        evaluator: Evaluator,
        history: History<f32>,
    },
}

impl Record {
    fn advance(&mut self) {
        match self {
            Record::Int {
                history,
                accumulating,
                ..
            } => history.advance(*accumulating),
            Record::Float {
                history,
                accumulating,
                ..
            } => history.advance(*accumulating),
            Record::Fitness {
                history,
                accumulating,
            } => history.advance(*accumulating),
            Record::Time {
                history,
                accumulating,
                ..
            } => history.advance(*accumulating),
            Record::EvaluatedFitness { history, .. } => history.advance(false),
            Record::EvaluatedFloat { history, .. } => history.advance(false),
        }
    }

    fn clear(&mut self) {
        match self {
            Record::Int { history, .. } => history.clear(),
            Record::Float { history, .. } => history.clear(),
            Record::Fitness { history, .. } => history.clear(),
            Record::Time { history, .. } => history.clear(),
            Record::EvaluatedFitness { history, .. } => history.clear(),
            Record::EvaluatedFloat { history, .. } => history.clear(),
        }
    }
}

fn missing(id: ValueId) -> Error {
    Error::ArgumentOutOfRange {
        argument: "value_id",
        reason: value_name(id),
    }
}

fn value_name(id: ValueId) -> &'static str {
    match id {
        POPULATION_SIZE => "POPULATION_SIZE is not registered",
        BEST_FITNESS => "BEST_FITNESS is not registered",
        WORST_FITNESS => "WORST_FITNESS is not registered",
        TOTAL_FITNESS => "TOTAL_FITNESS is not registered",
        AVG_FITNESS => "AVG_FITNESS is not registered",
        _ => "no statistical value is registered under this id",
    }
}

/// Statistics object of one population.
pub struct Statistics {
    records: FxHashMap<ValueId, Record>,
    generation: usize,
    timer_start: Instant,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            records: FxHashMap::default(),
            generation: 0,
            timer_start: Instant::now(),
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn has_value(&self, id: ValueId) -> bool {
        self.records.contains_key(&id)
    }

    fn insert(&mut self, id: ValueId, record: Record) -> Result<()> {
        if self.records.contains_key(&id) {
            return Err(Error::InvalidOperation(
                "a statistical value is already registered under this id",
            ));
        }
        self.records.insert(id, record);
        Ok(())
    }

    pub fn add_int_value(&mut self, id: ValueId, combiner: Combiner, accumulating: bool) -> Result<()> {
        self.insert(
            id,
            Record::Int {
                history: History::new(DEFAULT_HISTORY_DEPTH),
                combiner,
                accumulating,
            },
        )
    }

    pub fn add_float_value(
        &mut self,
        id: ValueId,
        combiner: Combiner,
        accumulating: bool,
    ) -> Result<()> {
        self.insert(
            id,
            Record::Float {
                history: History::new(DEFAULT_HISTORY_DEPTH),
                combiner,
                accumulating,
            },
        )
    }

    pub fn add_fitness_value(&mut self, id: ValueId, accumulating: bool) -> Result<()> {
        self.insert(
            id,
            Record::Fitness {
                history: History::new(DEFAULT_HISTORY_DEPTH),
                accumulating,
            },
        )
    }

    pub fn add_time_value(&mut self, id: ValueId, combiner: Combiner, accumulating: bool) -> Result<()> {
        self.insert(
            id,
            Record::Time {
                history: History::new(DEFAULT_HISTORY_DEPTH),
                combiner,
                accumulating,
            },
        )
    }

    pub fn add_evaluated_fitness_value(&mut self, id: ValueId, evaluator: Evaluator) -> Result<()> {
        self.insert(
            id,
            Record::EvaluatedFitness {
                evaluator,
                history: History::new(DEFAULT_HISTORY_DEPTH),
            },
        )
    }

    pub fn add_evaluated_float_value(&mut self, id: ValueId, evaluator: Evaluator) -> Result<()> {
        self.insert(
            id,
            Record::EvaluatedFloat {
                evaluator,
                history: History::new(DEFAULT_HISTORY_DEPTH),
            },
        )
    }

    pub fn remove_value(&mut self, id: ValueId) -> Result<()> {
        self.records.remove(&id).map(|_| ()).ok_or(missing(id))
    }

    pub fn int(&self, id: ValueId) -> Result<i64> {
        match self.records.get(&id) {
            Some(Record::Int { history, .. }) => Ok(history.current.unwrap_or(0)),
            Some(_) => Err(missing(id)),
            None => Err(missing(id)),
        }
    }

    pub fn set_int(&mut self, id: ValueId, value: i64) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Int { history, .. }) => {
                history.current = Some(value);
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    /// Merge a per-branch partial into the current value through the
    /// registered combiner.
    pub fn merge_int(&mut self, id: ValueId, value: i64) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Int {
                history, combiner, ..
            }) => {
                history.current = Some(match (*combiner, history.current) {
                    (Combiner::Sum, Some(current)) => current + value,
                    (Combiner::Max, Some(current)) => current.max(value),
                    _ => value,
                });
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn float(&self, id: ValueId) -> Result<f32> {
        match self.records.get(&id) {
            Some(Record::Float { history, .. }) | Some(Record::EvaluatedFloat { history, .. }) => {
                Ok(history.current.unwrap_or(0.0))
            }
            _ => Err(missing(id)),
        }
    }

    pub fn set_float(&mut self, id: ValueId, value: f32) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Float { history, .. }) => {
                history.current = Some(value);
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn merge_float(&mut self, id: ValueId, value: f32) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Float {
                history, combiner, ..
            }) => {
                history.current = Some(match (*combiner, history.current) {
                    (Combiner::Sum, Some(current)) => current + value,
                    (Combiner::Max, Some(current)) => current.max(value),
                    _ => value,
                });
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn fitness(&self, id: ValueId) -> Result<Option<&dyn Fitness>> {
        match self.records.get(&id) {
            Some(Record::Fitness { history, .. })
            | Some(Record::EvaluatedFitness { history, .. }) => {
                Ok(history.current.as_deref())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn set_fitness(&mut self, id: ValueId, value: Box<dyn Fitness>) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Fitness { history, .. }) => {
                history.current = Some(value);
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    /// Sum a contribution into a fitness value, initializing from the
    /// contribution's shape when the value is still empty.
    pub fn accumulate_fitness(&mut self, id: ValueId, value: &dyn Fitness) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Fitness { history, .. }) => {
                match history.current.as_mut() {
                    Some(current) => current.accumulate(value),
                    None => history.current = Some(value.clone_boxed()),
                }
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn subtract_fitness(&mut self, id: ValueId, value: &dyn Fitness) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Fitness { history, .. }) => {
                match history.current.as_mut() {
                    Some(current) => current.subtract(value),
                    None => {
                        let mut negated = value.clone_boxed();
                        negated.clear();
                        negated.subtract(value);
                        history.current = Some(negated);
                    }
                }
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn time(&self, id: ValueId) -> Result<Duration> {
        match self.records.get(&id) {
            Some(Record::Time { history, .. }) => {
                Ok(history.current.unwrap_or(Duration::ZERO))
            }
            _ => Err(missing(id)),
        }
    }

    pub fn merge_time(&mut self, id: ValueId, value: Duration) -> Result<()> {
        match self.records.get_mut(&id) {
            Some(Record::Time {
                history, combiner, ..
            }) => {
                history.current = Some(match (*combiner, history.current) {
                    (Combiner::Sum, Some(current)) => current + value,
                    (Combiner::Max, Some(current)) => current.max(value),
                    _ => value,
                });
                Ok(())
            }
            _ => Err(missing(id)),
        }
    }

    pub fn previous_int(&self, id: ValueId, back: usize) -> Result<Option<i64>> {
        match self.records.get(&id) {
            Some(Record::Int { history, .. }) => Ok(history.previous(back).copied()),
            _ => Err(missing(id)),
        }
    }

    pub fn previous_fitness(&self, id: ValueId, back: usize) -> Result<Option<&dyn Fitness>> {
        match self.records.get(&id) {
            Some(Record::Fitness { history, .. })
            | Some(Record::EvaluatedFitness { history, .. }) => {
                Ok(history.previous(back).map(|value| value.as_ref()))
            }
            _ => Err(missing(id)),
        }
    }

    /// Recompute every evaluated value from its sources. Ratio values are
    /// computed before square roots so chained derivations see fresh
    /// inputs.
    pub fn refresh_evaluated(&mut self) {
        let ids: Vec<ValueId> = self.records.keys().copied().collect();

        for sqrt_pass in [false, true] {
            for id in &ids {
                let computed = match self.records.get(id) {
                    Some(Record::EvaluatedFitness { evaluator, .. }) if !sqrt_pass => {
                        match *evaluator {
                            Evaluator::Ratio { value, count } => {
                                let count = self.int(count).unwrap_or(0);
                                if count > 0 {
                                    self.fitness(value).ok().flatten().map(|fitness| {
                                        Computed::Fitness(fitness.scaled_by(1.0 / count as f32))
                                    })
                                } else {
                                    None
                                }
                            }
                            Evaluator::Sqrt { .. } => None,
                        }
                    }
                    Some(Record::EvaluatedFloat { evaluator, .. }) => match *evaluator {
                        Evaluator::Ratio { value, count } if !sqrt_pass => {
                            let count = self.int(count).unwrap_or(0);
                            (count > 0)
                                .then(|| self.float(value).unwrap_or(0.0) / count as f32)
                                .map(Computed::Float)
                        }
                        Evaluator::Sqrt { value } if sqrt_pass => self
                            .float(value)
                            .ok()
                            .map(|value| Computed::Float(value.max(0.0).sqrt())),
                        _ => None,
                    },
                    _ => None,
                };

                match (computed, self.records.get_mut(id)) {
                    (Some(Computed::Fitness(value)), Some(Record::EvaluatedFitness { history, .. })) => {
                        history.current = Some(value);
                    }
                    (Some(Computed::Float(value)), Some(Record::EvaluatedFloat { history, .. })) => {
                        history.current = Some(value);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Close the current generation entry of every value and start the
    /// next one. Accumulating values restart from empty.
    pub fn next(&mut self) {
        self.refresh_evaluated();
        for record in self.records.values_mut() {
            record.advance();
        }
        self.generation += 1;
    }

    pub fn clear_value(&mut self, id: ValueId) -> Result<()> {
        self.records.get_mut(&id).map(Record::clear).ok_or(missing(id))
    }

    pub fn clear(&mut self) {
        for record in self.records.values_mut() {
            record.clear();
        }
        self.generation = 0;
    }

    pub fn reset_timer(&mut self) {
        self.timer_start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.timer_start.elapsed()
    }
}

enum Computed {
    Fitness(Box<dyn Fitness>),
    Float(f32),
}

impl fmt::Debug for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statistics")
            .field("values", &self.records.len())
            .field("generation", &self.generation)
            .finish()
    }
}
