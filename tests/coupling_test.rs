mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::chromosome::{MatingConfig, MatingSetup};
use genetic_population::couple::{Couple, SimpleCoupling};
use genetic_population::group::ChromosomeGroup;
use genetic_population::statistics::trackers::OperationCountTracker;
use genetic_population::statistics::{CROSSOVER_COUNT, MATING_COUNT, MUTATION_COUNT};
use genetic_population::tags::TagId;
use std::sync::Arc;
use support::build;

const BUFFERS_TAG: TagId = TagId(60);

#[test]
fn coupling_produces_exactly_the_requested_offspring() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(2, &branches);
    let mut population = build::scalar_population(16, 0);
    let parents = build::insert_values(&mut population, &[1.0, 3.0, 5.0, 7.0]);

    let mut input = ChromosomeGroup::sizable_new();
    for id in parents {
        input.add(population.pool(), id).unwrap();
    }

    let mating = build::mating();
    let couple = SimpleCoupling::new(6, BUFFERS_TAG);
    let mut output = ChromosomeGroup::sizable_new();
    couple
        .prepare(&mut population, &mut output, &mating, &branches)
        .unwrap();
    couple
        .run(
            &mut population,
            &input,
            &mut output,
            &mating,
            &branches,
            &mut streams,
        )
        .unwrap();

    assert_eq!(output.len(), 6);
    for id in output.iter() {
        let storage = population.storage(id);
        assert!(storage.parent().is_some());
        assert!(storage.raw_fitness().probability_base() > 0.0);
    }
    couple.clear(&mut population, &mut output).unwrap();
}

#[test]
fn coupling_counters_reach_the_statistics() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(2, &branches);
    let mut population = build::scalar_population(16, 0);
    population
        .register_tracker(Arc::new(OperationCountTracker))
        .unwrap();
    let parents = build::insert_values(&mut population, &[2.0, 4.0]);

    let mut input = ChromosomeGroup::sizable_new();
    for id in parents {
        input.add(population.pool(), id).unwrap();
    }

    let mating = MatingSetup::new(
        Box::new(support::MeanCrossover),
        Box::new(support::NudgeMutation { delta: 0.5 }),
        MatingConfig {
            crossover_probability: 1.0,
            mutation_probability: 1.0,
            improving_mutations_only: false,
        },
    );

    let couple = SimpleCoupling::new(2, BUFFERS_TAG);
    let mut output = ChromosomeGroup::sizable_new();
    couple
        .prepare(&mut population, &mut output, &mating, &branches)
        .unwrap();
    couple
        .run(
            &mut population,
            &input,
            &mut output,
            &mating,
            &branches,
            &mut streams,
        )
        .unwrap();

    let stats = population.statistics();
    assert_eq!(stats.int(MATING_COUNT).unwrap(), 1);
    assert_eq!(stats.int(CROSSOVER_COUNT).unwrap(), 1);
    assert_eq!(stats.int(MUTATION_COUNT).unwrap(), 2);

    // the nudge moved both offspring off the parent mean
    for id in output.iter() {
        assert_eq!(
            population.storage(id).raw_fitness().probability_base(),
            3.5
        );
    }
    couple.clear(&mut population, &mut output).unwrap();
}

#[test]
fn empty_input_is_a_no_op() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(2, &branches);
    let mut population = build::scalar_population(8, 0);

    let input = ChromosomeGroup::sizable_new();
    let mating = build::mating();
    let couple = SimpleCoupling::new(4, BUFFERS_TAG);
    let mut output = ChromosomeGroup::sizable_new();
    couple
        .prepare(&mut population, &mut output, &mating, &branches)
        .unwrap();
    couple
        .run(
            &mut population,
            &input,
            &mut output,
            &mating,
            &branches,
            &mut streams,
        )
        .unwrap();

    assert_eq!(output.len(), 0);
    couple.clear(&mut population, &mut output).unwrap();
}
