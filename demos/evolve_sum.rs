//! Single-objective demo: maximize the gene sum of a real-valued vector.
//!
//! Wires the full pipeline by hand the way a hosting workflow would:
//! fitness assignment, fitness sharing, roulette selection with mating,
//! worst replacement, generation turnover with statistics trackers.

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::chromosome::{
    Chromosome, ChromosomeComparator, ChromosomePtr, Crossover, Initializer, MatingConfig,
    MatingSetup, Mutation,
};
use genetic_population::errors::Result;
use genetic_population::evaluation::{assign_raw_fitness, FitnessOperation};
use genetic_population::fitness::comparators::ScalarComparator;
use genetic_population::fitness::{downcast_mut, Fitness, FitnessKind, FitnessOrdering, ScalarFitness};
use genetic_population::group::ChromosomeGroup;
use genetic_population::population::{FillOptions, Population, PopulationParams};
use genetic_population::replace::{Replace, WorstReplacement};
use genetic_population::scaling::{FitnessSharingScaling, Scaling};
use genetic_population::select::{RouletteWheelSelection, Select};
use genetic_population::statistics::trackers::{
    FitnessTracker, PopulationSizeTracker, StatTracker, POPULATION_SIZE_TRACKER,
    RAW_FITNESS_TRACKER,
};
use genetic_population::statistics::BEST_FITNESS;
use genetic_population::tags::TagId;
use rand::rngs::SmallRng;
use rand::Rng;
use std::any::Any;
use std::sync::Arc;

const GENES: usize = 8;
const BUFFERS_TAG: TagId = TagId(1);
const PARTIAL_SUM_TAG: TagId = TagId(2);

#[derive(Clone, Debug)]
struct RealVector {
    genes: Vec<f32>,
}

impl Chromosome for RealVector {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn genes_of(chromosome: &dyn Chromosome) -> &[f32] {
    chromosome
        .as_any()
        .downcast_ref::<RealVector>()
        .map(|vector| vector.genes.as_slice())
        .unwrap_or(&[])
}

#[derive(Clone, Debug)]
struct RandomVector;

impl Initializer for RandomVector {
    fn make(&self, rng: &mut SmallRng) -> ChromosomePtr {
        let genes = (0..GENES).map(|_| rng.gen::<f32>() * 10.0).collect();
        Arc::new(RealVector { genes })
    }

    fn clone_boxed(&self) -> Box<dyn Initializer> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Debug)]
struct GeneSum;

impl FitnessOperation for GeneSum {
    fn clone_boxed(&self) -> Box<dyn FitnessOperation> {
        Box::new(self.clone())
    }

    fn create_fitness(&self) -> Box<dyn Fitness> {
        Box::new(ScalarFitness::default())
    }

    fn evaluate(&mut self, chromosome: &dyn Chromosome, fitness: &mut dyn Fitness) {
        let sum = genes_of(chromosome).iter().sum();
        if let Ok(fitness) = downcast_mut::<ScalarFitness>(fitness) {
            fitness.set_value(sum);
        }
    }
}

#[derive(Clone, Debug)]
struct VectorDistance;

impl ChromosomeComparator for VectorDistance {
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

#[derive(Clone, Debug)]
struct BlendCrossover;

impl Crossover for BlendCrossover {
    fn parent_count(&self) -> usize {
        2
    }

    fn offspring_count(&self) -> usize {
        2
    }

    fn crossover(&self, parents: &[ChromosomePtr], rng: &mut SmallRng) -> Vec<ChromosomePtr> {
        let first = genes_of(parents[0].as_ref());
        let second = genes_of(parents[1].as_ref());
        (0..2)
            .map(|_| {
                let genes = first
                    .iter()
                    .zip(second)
                    .map(|(a, b)| {
                        let weight = rng.gen::<f32>();
                        a * weight + b * (1.0 - weight)
                    })
                    .collect();
                Arc::new(RealVector { genes }) as ChromosomePtr
            })
            .collect()
    }

    fn clone_boxed(&self) -> Box<dyn Crossover> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Debug)]
struct JitterMutation;

impl Mutation for JitterMutation {
    fn mutate(&self, chromosome: &dyn Chromosome, rng: &mut SmallRng) -> ChromosomePtr {
        let genes = genes_of(chromosome)
            .iter()
            .map(|gene| (gene + rng.gen::<f32>() - 0.5).clamp(0.0, 10.0))
            .collect();
        Arc::new(RealVector { genes })
    }

    fn clone_boxed(&self) -> Box<dyn Mutation> {
        Box::new(self.clone())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let branches = Branches::new(4)?;
    let mut streams = RandomStreams::new(2024, &branches);

    let mut population = Population::builder()
        .with_params(PopulationParams::new(60, 0, FillOptions::default())?)
        .with_initializer(Box::new(RandomVector))
        .with_fitness_operation(Box::new(GeneSum))
        .with_fitness_comparator(Box::new(ScalarComparator::new(FitnessOrdering::Maximize)))
        .with_seed(2024)
        .build()?;
    population.initialize()?;

    population.register_tracker(Arc::new(PopulationSizeTracker) as Arc<dyn StatTracker>)?;
    population.register_tracker(Arc::new(FitnessTracker::raw()))?;

    let scaling = FitnessSharingScaling::new(4.0, 1.0, PARTIAL_SUM_TAG, Box::new(VectorDistance));
    scaling.prepare(&mut population, &branches)?;

    let mating = MatingSetup::new(
        Box::new(BlendCrossover),
        Box::new(JitterMutation),
        MatingConfig {
            crossover_probability: 0.9,
            mutation_probability: 0.3,
            improving_mutations_only: false,
        },
    );
    let selection = RouletteWheelSelection::with_mating(30, BUFFERS_TAG);
    let mut offspring = ChromosomeGroup::sizable_new();
    selection.prepare(&mut population, &mut offspring, Some(&mating), &branches)?;
    let replacement = WorstReplacement::new(20);

    for generation in 0..40 {
        assign_raw_fitness(&mut population, &branches)?;
        scaling.run(&mut population, &branches, &mut streams)?;
        population.sort_by_fitness(FitnessKind::Raw)?;

        population.update_tracker(POPULATION_SIZE_TRACKER, &branches)?;
        population.update_tracker(RAW_FITNESS_TRACKER, &branches)?;
        if let Some(best) = population.statistics().fitness(BEST_FITNESS)? {
            println!("generation {generation:>3}: best {:.3}", best.probability_base());
        }

        selection.run(
            &mut population,
            &mut offspring,
            Some(&mating),
            &branches,
            &mut streams,
        )?;
        replacement.run(&mut offspring, &mut population, &branches, &mut streams)?;
        population.next_generation(&branches)?;
    }

    selection.clear(&mut population, &mut offspring)?;
    scaling.clear(&mut population)?;
    Ok(())
}
