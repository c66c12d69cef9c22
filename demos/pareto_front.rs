//! Multi-objective demo: approximate the Pareto front of a two-objective
//! trade-off with NSGA-II scaling and crowded truncation.

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::chromosome::{
    Chromosome, ChromosomePtr, Crossover, Initializer, MatingConfig, MatingSetup, Mutation,
};
use genetic_population::errors::Result;
use genetic_population::evaluation::{assign_raw_fitness, FitnessOperation};
use genetic_population::fitness::comparators::ParetoComparator;
use genetic_population::fitness::{downcast_mut, Fitness, FitnessKind, FitnessOrdering, VectorFitness};
use genetic_population::group::ChromosomeGroup;
use genetic_population::population::{FillOptions, Population, PopulationParams};
use genetic_population::replace::{CrowdingReplacement, Replace};
use genetic_population::scaling::{CrowdedComparator, Nsga2Scaling, Scaling};
use genetic_population::select::{RandomSelection, Select};
use genetic_population::tags::TagId;
use rand::rngs::SmallRng;
use rand::Rng;
use std::any::Any;
use std::sync::Arc;

const BUFFERS_TAG: TagId = TagId(1);

/// One decision variable; the objectives pull it toward opposite ends.
#[derive(Clone, Debug)]
struct Knob {
    value: f32,
}

impl Chromosome for Knob {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn value_of(chromosome: &dyn Chromosome) -> f32 {
    chromosome
        .as_any()
        .downcast_ref::<Knob>()
        .map(|knob| knob.value)
        .unwrap_or(0.0)
}

#[derive(Clone, Debug)]
struct RandomKnob;

impl Initializer for RandomKnob {
    fn make(&self, rng: &mut SmallRng) -> ChromosomePtr {
        Arc::new(Knob {
            value: rng.gen::<f32>() * 2.0,
        })
    }

    fn clone_boxed(&self) -> Box<dyn Initializer> {
        Box::new(self.clone())
    }
}

/// The classic Schaffer problem: minimize `x^2` and `(x - 2)^2`.
#[derive(Clone, Debug)]
struct Schaffer;

impl FitnessOperation for Schaffer {
    fn clone_boxed(&self) -> Box<dyn FitnessOperation> {
        Box::new(self.clone())
    }

    fn create_fitness(&self) -> Box<dyn Fitness> {
        Box::new(VectorFitness::with_objectives(2))
    }

    fn evaluate(&mut self, chromosome: &dyn Chromosome, fitness: &mut dyn Fitness) {
        let x = value_of(chromosome);
        if let Ok(fitness) = downcast_mut::<VectorFitness>(fitness) {
            fitness.set(0, x * x);
            fitness.set(1, (x - 2.0) * (x - 2.0));
        }
    }
}

#[derive(Clone, Debug)]
struct MidpointCrossover;

impl Crossover for MidpointCrossover {
    fn parent_count(&self) -> usize {
        2
    }

    fn offspring_count(&self) -> usize {
        1
    }

    fn crossover(&self, parents: &[ChromosomePtr], _rng: &mut SmallRng) -> Vec<ChromosomePtr> {
        let middle = (value_of(parents[0].as_ref()) + value_of(parents[1].as_ref())) / 2.0;
        vec![Arc::new(Knob { value: middle })]
    }

    fn clone_boxed(&self) -> Box<dyn Crossover> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Debug)]
struct KnobJitter;

impl Mutation for KnobJitter {
    fn mutate(&self, chromosome: &dyn Chromosome, rng: &mut SmallRng) -> ChromosomePtr {
        Arc::new(Knob {
            value: (value_of(chromosome) + (rng.gen::<f32>() - 0.5) * 0.2).clamp(-1.0, 3.0),
        })
    }

    fn clone_boxed(&self) -> Box<dyn Mutation> {
        Box::new(self.clone())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let branches = Branches::new(2)?;
    let mut streams = RandomStreams::new(7, &branches);

    let mut population = Population::builder()
        .with_params(PopulationParams::new(48, 16, FillOptions::default())?)
        .with_initializer(Box::new(RandomKnob))
        .with_fitness_operation(Box::new(Schaffer))
        .with_fitness_comparator(Box::new(ParetoComparator::new(FitnessOrdering::Minimize)))
        .with_seed(7)
        .build()?;
    population.initialize()?;

    let scaling = Nsga2Scaling::new(TagId(10), TagId(11), TagId(12));
    scaling.prepare(&mut population, &branches)?;

    let mating = MatingSetup::new(
        Box::new(MidpointCrossover),
        Box::new(KnobJitter),
        MatingConfig {
            crossover_probability: 0.8,
            mutation_probability: 0.5,
            improving_mutations_only: false,
        },
    );
    let selection = RandomSelection {
        count: 16,
        selected_tag: None,
        crossover_buffers_tag: Some(BUFFERS_TAG),
    };
    let mut offspring = ChromosomeGroup::sizable_new();
    selection.prepare(&mut population, &mut offspring, Some(&mating), &branches)?;
    let replacement = CrowdingReplacement::new(16);

    for _ in 0..60 {
        assign_raw_fitness(&mut population, &branches)?;

        selection.run(
            &mut population,
            &mut offspring,
            Some(&mating),
            &branches,
            &mut streams,
        )?;
        replacement.run(&mut offspring, &mut population, &branches, &mut streams)?;

        scaling.run(&mut population, &branches, &mut streams)?;
        population.set_fitness_comparator(Box::new(CrowdedComparator));
        population.sort_by_fitness(FitnessKind::Scaled)?;
        population.trim_to_permanent();
        population.set_fitness_comparator(Box::new(ParetoComparator::new(
            FitnessOrdering::Minimize,
        )));

        population.next_generation(&branches)?;
    }

    println!("approximated front (x, f1, f2):");
    for index in 0..population.len() {
        let fitness = population.at(index).raw_fitness();
        let x = population
            .at(index)
            .chromosome()
            .map(|chromosome| value_of(chromosome.as_ref()))
            .unwrap_or(f32::NAN);
        println!(
            "  {x:>6.3}  {:>7.3}  {:>7.3}",
            fitness.component(0),
            fitness.component(1)
        );
    }

    scaling.clear(&mut population)?;
    selection.clear(&mut population, &mut offspring)?;
    Ok(())
}
