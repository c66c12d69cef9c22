//! Capability traits through which the engine consumes chromosomes.
//!
//! The engine never looks inside a genotype. Encodings live outside the
//! crate and plug in by implementing the traits below; genotypes are shared
//! through [`ChromosomePtr`] because crossover buffers and freshly produced
//! offspring may briefly hold the same genotype reference.

use rand::rngs::SmallRng;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Opaque genotype. Reference-counted sharing, no interior mutability:
/// operators produce new genotypes instead of editing existing ones.
pub trait Chromosome: Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub type ChromosomePtr = Arc<dyn Chromosome>;

/// Produces chromosomes from a prototype or configuration.
pub trait Initializer: Debug + Send + Sync {
    fn make(&self, rng: &mut SmallRng) -> ChromosomePtr;

    fn clone_boxed(&self) -> Box<dyn Initializer>;
}

impl Clone for Box<dyn Initializer> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Produces a mutated copy of a chromosome.
///
/// Mutation is value-producing rather than in-place, so a provisional
/// mutation is simply a candidate pointer: the mating protocol either
/// installs it (accepted) or drops it (rejected) after comparing fitness.
pub trait Mutation: Debug + Send + Sync {
    fn mutate(&self, chromosome: &dyn Chromosome, rng: &mut SmallRng) -> ChromosomePtr;

    fn clone_boxed(&self) -> Box<dyn Mutation>;
}

impl Clone for Box<dyn Mutation> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Recombines `parent_count` chromosomes into `offspring_count` offspring.
pub trait Crossover: Debug + Send + Sync {
    fn parent_count(&self) -> usize;

    fn offspring_count(&self) -> usize;

    fn crossover(&self, parents: &[ChromosomePtr], rng: &mut SmallRng) -> Vec<ChromosomePtr>;

    fn clone_boxed(&self) -> Box<dyn Crossover>;
}

impl Clone for Box<dyn Crossover> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Equivalence and distance between genotypes.
///
/// `distance` is a normalized difference in `[0, 1]` when the encoding can
/// provide one; fitness sharing feeds it through the sharing kernel.
pub trait ChromosomeComparator: Debug + Send + Sync {
    fn equal(&self, first: &dyn Chromosome, second: &dyn Chromosome) -> bool;

    fn distance(&self, first: &dyn Chromosome, second: &dyn Chromosome) -> f32;

    fn clone_boxed(&self) -> Box<dyn ChromosomeComparator>;
}

impl Clone for Box<dyn ChromosomeComparator> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// How mating combines crossover and mutation inside a crossover buffer.
#[derive(Clone, Debug)]
pub struct MatingConfig {
    /// Probability that a full parent group is recombined. Below the roll
    /// the offspring start as plain parent copies.
    pub crossover_probability: f32,
    /// Per-offspring mutation probability.
    pub mutation_probability: f32,
    /// Keep a mutation only when it improves raw fitness.
    pub improving_mutations_only: bool,
}

impl Default for MatingConfig {
    fn default() -> Self {
        Self {
            crossover_probability: 1.0,
            mutation_probability: 0.0,
            improving_mutations_only: false,
        }
    }
}

/// Crossover and mutation operators plus the probabilities that drive them.
/// One setup is shared by every branch performing mating.
#[derive(Clone, Debug)]
pub struct MatingSetup {
    pub crossover: Box<dyn Crossover>,
    pub mutation: Box<dyn Mutation>,
    pub config: MatingConfig,
}

impl MatingSetup {
    pub fn new(
        crossover: Box<dyn Crossover>,
        mutation: Box<dyn Mutation>,
        config: MatingConfig,
    ) -> Self {
        Self {
            crossover,
            mutation,
            config,
        }
    }

    pub fn parent_count(&self) -> usize {
        self.crossover.parent_count()
    }

    pub fn offspring_count(&self) -> usize {
        self.crossover.offspring_count()
    }
}
