pub mod build;
pub mod inspect;

#[allow(unused_imports)]
pub use approx::assert_relative_eq;
#[allow(unused_imports)]
pub use genetic_population::branch::{Branches, RandomStreams};
#[allow(unused_imports)]
pub use genetic_population::population::{FillOptions, Population, PopulationParams};
#[allow(unused_imports)]
pub use rand::rngs::SmallRng;
#[allow(unused_imports)]
pub use rand::SeedableRng;

use genetic_population::chromosome::{
    Chromosome, ChromosomeComparator, ChromosomePtr, Crossover, Initializer, Mutation,
};
use genetic_population::errors::Result;
use genetic_population::evaluation::FitnessOperation;
use genetic_population::fitness::{downcast_mut, Fitness, ScalarFitness, VectorFitness};
use genetic_population::storage::ChromosomeStorage;
use rand::Rng;
use std::any::Any;
use std::sync::Arc;

/// Test genotype: a point in objective space.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub genes: Vec<f32>,
}

impl Chromosome for Point {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[allow(dead_code)]
pub fn point(genes: Vec<f32>) -> ChromosomePtr {
    Arc::new(Point { genes })
}

#[allow(dead_code)]
pub fn genes_of(chromosome: &dyn Chromosome) -> &[f32] {
    chromosome
        .as_any()
        .downcast_ref::<Point>()
        .map(|point| point.genes.as_slice())
        .unwrap_or(&[])
}

/// Initializer producing random points in `[0, range)`.
#[derive(Clone, Debug)]
pub struct RandomPointInitializer {
    pub dimensions: usize,
    pub range: f32,
}

impl Initializer for RandomPointInitializer {
    fn make(&self, rng: &mut SmallRng) -> ChromosomePtr {
        let genes = (0..self.dimensions)
            .map(|_| rng.gen::<f32>() * self.range)
            .collect();
        point(genes)
    }

    fn clone_boxed(&self) -> Box<dyn Initializer> {
        Box::new(self.clone())
    }
}

/// Scalar fitness: sum of the genes.
#[derive(Clone, Debug)]
pub struct SumFitness;

impl FitnessOperation for SumFitness {
    fn clone_boxed(&self) -> Box<dyn FitnessOperation> {
        Box::new(self.clone())
    }

    fn create_fitness(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn evaluate(&mut self, chromosome: &dyn Chromosome, fitness: &mut dyn Fitness) {
        let value = genes_of(chromosome).iter().sum();
        if let Ok(fitness) = downcast_mut::<ScalarFitness>(fitness) {
            fitness.set_value(value);
        }
    }
}

/// Scalar fitness without individual evaluation: the whole-population
/// sweep assigns the gene sum to every member.
#[derive(Clone, Debug)]
pub struct BatchSumFitness;

impl FitnessOperation for BatchSumFitness {
    fn clone_boxed(&self) -> Box<dyn FitnessOperation> {
        Box::new(self.clone())
    }

    fn create_fitness(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn supports_individual_evaluation(&self) -> bool {
        false
    }

    fn evaluate(&mut self, _chromosome: &dyn Chromosome, _fitness: &mut dyn Fitness) {}

    fn evaluate_population(&mut self, members: &mut [ChromosomeStorage]) -> Result<()> {
        for storage in members.iter_mut().filter(|storage| storage.is_in_use()) {
            let value: f32 = storage
                .chromosome()
                .map(|chromosome| genes_of(chromosome.as_ref()).iter().sum())
                .unwrap_or(0.0);
            if let Ok(fitness) = downcast_mut::<ScalarFitness>(storage.raw_fitness_mut()) {
                fitness.set_value(value);
            }
        }
        Ok(())
    }
}

/// Multi-objective fitness: the genes are the objectives.
#[derive(Clone, Debug)]
pub struct IdentityFitness {
    pub objectives: usize,
}

impl FitnessOperation for IdentityFitness {
    fn clone_boxed(&self) -> Box<dyn FitnessOperation> {
        Box::new(self.clone())
    }

    fn create_fitness(&self) -> Box<dyn Fitness> {
        Box::new(VectorFitness::with_objectives(self.objectives))
    }

    fn evaluate(&mut self, chromosome: &dyn Chromosome, fitness: &mut dyn Fitness) {
        if let Ok(fitness) = downcast_mut::<VectorFitness>(fitness) {
            for (index, gene) in genes_of(chromosome).iter().enumerate().take(self.objectives) {
                fitness.set(index, *gene);
            }
        }
    }
}

/// Euclidean genotype comparator.
#[derive(Clone, Debug)]
pub struct EuclideanComparator;

impl ChromosomeComparator for EuclideanComparator {
    fn equal(&self, first: &dyn Chromosome, second: &dyn Chromosome) -> bool {
        genes_of(first) == genes_of(second)
    }

    fn distance(&self, first: &dyn Chromosome, second: &dyn Chromosome) -> f32 {
        genes_of(first)
            .iter()
            .zip(genes_of(second))
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    fn clone_boxed(&self) -> Box<dyn ChromosomeComparator> {
        Box::new(self.clone())
    }
}

/// Two parents, two offspring: both offspring are the elementwise mean.
#[derive(Clone, Debug)]
pub struct MeanCrossover;

impl Crossover for MeanCrossover {
    fn parent_count(&self) -> usize {
        2
    }

    fn offspring_count(&self) -> usize {
        2
    }

    fn crossover(&self, parents: &[ChromosomePtr], _rng: &mut SmallRng) -> Vec<ChromosomePtr> {
        let first = genes_of(parents[0].as_ref());
        let second = genes_of(parents[1].as_ref());
        let mean: Vec<f32> = first
            .iter()
            .zip(second)
            .map(|(a, b)| (a + b) / 2.0)
            .collect();
        vec![point(mean.clone()), point(mean)]
    }

    fn clone_boxed(&self) -> Box<dyn Crossover> {
        Box::new(self.clone())
    }
}

/// Adds a fixed offset to every gene.
#[derive(Clone, Debug)]
pub struct NudgeMutation {
    pub delta: f32,
}

impl Mutation for NudgeMutation {
    fn mutate(&self, chromosome: &dyn Chromosome, _rng: &mut SmallRng) -> ChromosomePtr {
        let genes = genes_of(chromosome)
            .iter()
            .map(|gene| gene + self.delta)
            .collect();
        point(genes)
    }

    fn clone_boxed(&self) -> Box<dyn Mutation> {
        Box::new(self.clone())
    }
}
