use super::{
    EuclideanComparator, IdentityFitness, RandomPointInitializer, SumFitness,
};
use genetic_population::chromosome::{MatingConfig, MatingSetup};
use genetic_population::fitness::comparators::{ParetoComparator, ScalarComparator};
use genetic_population::fitness::FitnessOrdering;
use genetic_population::population::{FillOptions, Population, PopulationFlags, PopulationParams};
use genetic_population::storage::StorageId;

/// Fill policy that leaves population contents entirely to the test.
#[allow(dead_code)]
pub fn manual_fill() -> FillOptions {
    FillOptions {
        on_init: false,
        on_size_change: false,
        crowding_space: false,
    }
}

/// Empty single-objective population (gene-sum fitness, maximizing).
#[allow(dead_code)]
pub fn scalar_population(population_size: usize, crowding_size: usize) -> Population {
    let params = PopulationParams::new(population_size, crowding_size, manual_fill())
        .expect("valid parameters");
    let mut population = Population::builder()
        .with_params(params)
        .with_initializer(Box::new(RandomPointInitializer {
            dimensions: 1,
            range: 1.0,
        }))
        .with_fitness_operation(Box::new(SumFitness))
        .with_fitness_comparator(Box::new(ScalarComparator::new(FitnessOrdering::Maximize)))
        .with_seed(7)
        .build()
        .expect("buildable population");
    population.initialize().expect("initialize");
    // arrival-time evaluation covers the fresh members
    population
        .flags_mut()
        .clear(PopulationFlags::FITNESS_OPERATION_CHANGED);
    population
}

/// Empty multi-objective population (identity fitness, minimizing Pareto
/// dominance).
#[allow(dead_code)]
pub fn pareto_population(
    population_size: usize,
    crowding_size: usize,
    objectives: usize,
) -> Population {
    let params = PopulationParams::new(population_size, crowding_size, manual_fill())
        .expect("valid parameters");
    let mut population = Population::builder()
        .with_params(params)
        .with_initializer(Box::new(RandomPointInitializer {
            dimensions: objectives,
            range: 1.0,
        }))
        .with_fitness_operation(Box::new(IdentityFitness { objectives }))
        .with_fitness_comparator(Box::new(ParetoComparator::new(FitnessOrdering::Minimize)))
        .with_seed(7)
        .build()
        .expect("buildable population");
    population.initialize().expect("initialize");
    population
        .flags_mut()
        .clear(PopulationFlags::FITNESS_OPERATION_CHANGED);
    population
}

/// Insert one point chromosome, fitness evaluated on the way in.
#[allow(dead_code)]
pub fn insert_point(population: &mut Population, genes: Vec<f32>) -> StorageId {
    let id = population.acquire_storage().expect("storage available");
    population
        .storage_mut(id)
        .set_chromosome(super::point(genes), None);
    population.calculate_fitness(id).expect("fitness");
    population.insert(id).expect("population has room");
    id
}

/// Insert a batch of scalar members whose fitness equals the given value.
#[allow(dead_code)]
pub fn insert_values(population: &mut Population, values: &[f32]) -> Vec<StorageId> {
    values
        .iter()
        .map(|value| insert_point(population, vec![*value]))
        .collect()
}

/// Insert a batch of multi-objective members.
#[allow(dead_code)]
pub fn insert_points(population: &mut Population, points: &[&[f32]]) -> Vec<StorageId> {
    points
        .iter()
        .map(|genes| insert_point(population, genes.to_vec()))
        .collect()
}

/// Default mating setup: mean crossover, nudge mutation disabled.
#[allow(dead_code)]
pub fn mating() -> MatingSetup {
    MatingSetup::new(
        Box::new(super::MeanCrossover),
        Box::new(super::NudgeMutation { delta: 0.0 }),
        MatingConfig::default(),
    )
}

/// Euclidean genotype comparator, boxed.
#[allow(dead_code)]
pub fn comparator() -> Box<EuclideanComparator> {
    Box::new(EuclideanComparator)
}
