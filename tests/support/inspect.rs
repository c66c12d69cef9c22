use genetic_population::fitness::FitnessKind;
use genetic_population::population::Population;

/// Raw probability bases in population order.
#[allow(dead_code)]
pub fn raw_values(population: &Population) -> Vec<f32> {
    (0..population.len())
        .map(|index| population.at(index).raw_fitness().probability_base())
        .collect()
}

/// Scaled probability bases in population order.
#[allow(dead_code)]
pub fn scaled_values(population: &Population) -> Vec<f32> {
    (0..population.len())
        .map(|index| {
            population
                .at(index)
                .fitness(FitnessKind::Scaled)
                .map(|fitness| fitness.probability_base())
                .unwrap_or(f32::NAN)
        })
        .collect()
}

/// One scaled component for every member, e.g. NSGA-II ranks.
#[allow(dead_code)]
pub fn scaled_component(population: &Population, component: usize) -> Vec<f32> {
    (0..population.len())
        .map(|index| {
            population
                .at(index)
                .fitness(FitnessKind::Scaled)
                .map(|fitness| fitness.component(component))
                .unwrap_or(f32::NAN)
        })
        .collect()
}

/// First genes of the members, a cheap genotype fingerprint.
#[allow(dead_code)]
pub fn first_genes(population: &Population) -> Vec<f32> {
    (0..population.len())
        .map(|index| {
            population
                .at(index)
                .chromosome()
                .map(|chromosome| super::genes_of(chromosome.as_ref()).first().copied())
                .flatten()
                .unwrap_or(f32::NAN)
        })
        .collect()
}
