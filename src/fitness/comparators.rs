//! Comparators that impose a total order, or a dominance relation, on
//! fitness values.
//!
//! The contract everywhere in the engine: `Ordering::Less` means the first
//! value is *better*.

use super::{Fitness, FitnessOrdering};
use std::cmp::Ordering;
use std::fmt::Debug;

pub trait FitnessComparator: Debug + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn FitnessComparator>;

    /// `Less` if `first` is better, `Greater` if `second` is better,
    /// `Equal` for ties (and, under dominance, for incomparable pairs).
    fn compare(&self, first: &dyn Fitness, second: &dyn Fitness) -> Ordering;

    /// Optimization direction the comparator was configured with.
    fn ordering(&self) -> FitnessOrdering;
}

impl Clone for Box<dyn FitnessComparator> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

fn directed(raw: Ordering, ordering: FitnessOrdering) -> Ordering {
    match ordering {
        FitnessOrdering::Maximize => raw.reverse(),
        FitnessOrdering::Minimize => raw,
    }
}

/// Orders fitness values by their probability base.
#[derive(Clone, Debug, Default)]
pub struct ScalarComparator {
    pub ordering: FitnessOrdering,
}

impl ScalarComparator {
    pub fn new(ordering: FitnessOrdering) -> Self {
        Self { ordering }
    }
}

impl FitnessComparator for ScalarComparator {
    fn clone_boxed(&self) -> Box<dyn FitnessComparator> {
        Box::new(self.clone())
    }

    fn compare(&self, first: &dyn Fitness, second: &dyn Fitness) -> Ordering {
        let raw = first
            .probability_base()
            .partial_cmp(&second.probability_base())
            .unwrap_or(Ordering::Equal);
        directed(raw, self.ordering)
    }

    fn ordering(&self) -> FitnessOrdering {
        self.ordering
    }
}

/// Component-wise Pareto dominance.
///
/// `first` dominates `second` when it is at least as good in every
/// objective and strictly better in at least one. Incomparable pairs
/// compare as `Equal`.
#[derive(Clone, Debug, Default)]
pub struct ParetoComparator {
    pub ordering: FitnessOrdering,
}

impl ParetoComparator {
    pub fn new(ordering: FitnessOrdering) -> Self {
        Self { ordering }
    }
}

impl FitnessComparator for ParetoComparator {
    fn clone_boxed(&self) -> Box<dyn FitnessComparator> {
        Box::new(self.clone())
    }

    fn compare(&self, first: &dyn Fitness, second: &dyn Fitness) -> Ordering {
        let mut first_better = false;
        let mut second_better = false;

        for index in 0..first.component_count() {
            let raw = first
                .component(index)
                .partial_cmp(&second.component(index))
                .unwrap_or(Ordering::Equal);
            match directed(raw, self.ordering) {
                Ordering::Less => first_better = true,
                Ordering::Greater => second_better = true,
                Ordering::Equal => {}
            }
        }

        match (first_better, second_better) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    fn ordering(&self) -> FitnessOrdering {
        self.ordering
    }
}

/// Orders by a single objective component. Used to sort a pareto front
/// along one axis of objective space.
#[derive(Clone, Debug)]
pub struct ComponentComparator {
    pub index: usize,
    pub ordering: FitnessOrdering,
}

impl ComponentComparator {
    pub fn new(index: usize, ordering: FitnessOrdering) -> Self {
        Self { index, ordering }
    }
}

impl FitnessComparator for ComponentComparator {
    fn clone_boxed(&self) -> Box<dyn FitnessComparator> {
        Box::new(self.clone())
    }

    fn compare(&self, first: &dyn Fitness, second: &dyn Fitness) -> Ordering {
        let raw = first
            .component(self.index)
            .partial_cmp(&second.component(self.index))
            .unwrap_or(Ordering::Equal);
        directed(raw, self.ordering)
    }

    fn ordering(&self) -> FitnessOrdering {
        self.ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::{ScalarFitness, VectorFitness};

    #[test]
    fn scalar_comparator_respects_direction() {
        let better = ScalarFitness::new(5.0);
        let worse = ScalarFitness::new(2.0);

        let maximize = ScalarComparator::new(FitnessOrdering::Maximize);
        assert_eq!(maximize.compare(&better, &worse), Ordering::Less);

        let minimize = ScalarComparator::new(FitnessOrdering::Minimize);
        assert_eq!(minimize.compare(&better, &worse), Ordering::Greater);
    }

    #[test]
    fn pareto_comparator_detects_dominance() {
        let comparator = ParetoComparator::new(FitnessOrdering::Minimize);

        let dominant = VectorFitness::new(vec![1.0, 2.0]);
        let dominated = VectorFitness::new(vec![2.0, 2.0]);
        let incomparable = VectorFitness::new(vec![0.5, 9.0]);

        assert_eq!(comparator.compare(&dominant, &dominated), Ordering::Less);
        assert_eq!(comparator.compare(&dominated, &dominant), Ordering::Greater);
        assert_eq!(
            comparator.compare(&dominant, &incomparable),
            Ordering::Equal
        );
    }

    #[test]
    fn component_comparator_reads_one_axis() {
        let comparator = ComponentComparator::new(1, FitnessOrdering::Minimize);
        let a = VectorFitness::new(vec![9.0, 1.0]);
        let b = VectorFitness::new(vec![0.0, 2.0]);
        assert_eq!(comparator.compare(&a, &b), Ordering::Less);
    }
}
