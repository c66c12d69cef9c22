//! Fitness objects and their comparators.
//!
//! A fitness is an opaque value owned by a chromosome storage object. The
//! engine manipulates it through this trait only: accumulation for running
//! totals, a scalar *probability base* for roulette selection and variance,
//! a distance to another fitness of the same shape, and per-objective
//! component reads for multi-objective scaling.
//!
//! Ordering is never a property of the fitness itself; it comes from a
//! [`FitnessComparator`](comparators::FitnessComparator), so the same value
//! can be maximized, minimized or ranked by Pareto dominance depending on
//! the population setup.

pub mod comparators;
mod scalar;
mod vector;

pub use self::scalar::ScalarFitness;
pub use self::vector::VectorFitness;

use crate::errors::{Error, Result};
use std::any::Any;
use std::fmt::Debug;

/// Which of the two fitness values owned by a storage object is meant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FitnessKind {
    Raw,
    Scaled,
}

/// Direction of optimization for scalar-ordered comparators.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FitnessOrdering {
    #[default]
    Maximize,
    Minimize,
}

pub trait Fitness: Debug + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn Fitness>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Scalar projection used for weighted-random selection and for
    /// variance and deviation statistics.
    fn probability_base(&self) -> f32;

    /// Number of objective components. Single-objective values report 1.
    fn component_count(&self) -> usize;

    /// Value of one objective component.
    fn component(&self, index: usize) -> f32;

    /// Euclidean distance to another fitness of the same shape.
    fn distance(&self, other: &dyn Fitness) -> f32;

    /// Absolute difference along a single objective.
    fn component_distance(&self, other: &dyn Fitness, index: usize) -> f32 {
        (self.component(index) - other.component(index)).abs()
    }

    /// `self += other`, component-wise. Used by running totals.
    fn accumulate(&mut self, other: &dyn Fitness);

    /// `self -= other`, component-wise. Used by incremental totals.
    fn subtract(&mut self, other: &dyn Fitness);

    /// A copy multiplied by `factor`, e.g. an average from a total.
    fn scaled_by(&self, factor: f32) -> Box<dyn Fitness>;

    /// Overwrite this value with another of the same shape.
    fn assign(&mut self, other: &dyn Fitness) {
        self.clear();
        self.accumulate(other);
    }

    /// Reset to the zero value of this shape.
    fn clear(&mut self);
}

impl Clone for Box<dyn Fitness> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Typed view of a fitness object.
pub fn downcast<T: Fitness + 'static>(fitness: &dyn Fitness) -> Result<&T> {
    fitness
        .as_any()
        .downcast_ref::<T>()
        .ok_or(Error::InvalidTagType {
            slot: 0,
            requested: std::any::type_name::<T>(),
        })
}

/// Typed mutable view of a fitness object.
pub fn downcast_mut<T: Fitness + 'static>(fitness: &mut dyn Fitness) -> Result<&mut T> {
    fitness
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or(Error::InvalidTagType {
            slot: 0,
            requested: std::any::type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_fitness_clones_independently() {
        let original: Box<dyn Fitness> = Box::new(ScalarFitness::new(2.0));
        let mut copy = original.clone();
        copy.accumulate(original.as_ref());
        assert_eq!(copy.probability_base(), 4.0);
        assert_eq!(original.probability_base(), 2.0);
    }

    #[test]
    fn downcast_rejects_wrong_shape() {
        let fitness: Box<dyn Fitness> = Box::new(ScalarFitness::new(1.0));
        assert!(downcast::<VectorFitness>(fitness.as_ref()).is_err());
        assert!(downcast::<ScalarFitness>(fitness.as_ref()).is_ok());
    }
}
