mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::chromosome::{MatingConfig, MatingSetup};
use genetic_population::grid::HyperGrid;
use genetic_population::group::ChromosomeGroup;
use genetic_population::population::Population;
use genetic_population::replace::Replace;
use genetic_population::scaling::{PaesReplacement, PaesSelection};
use genetic_population::select::Select;
use genetic_population::tags::TagId;
use support::build;

const BUFFERS_TAG: TagId = TagId(130);
const CURRENT_TAG: TagId = TagId(131);

fn operators() -> (PaesSelection, PaesReplacement, MatingSetup) {
    let selection = PaesSelection {
        crossover_buffers_tag: BUFFERS_TAG,
        current_solution_tag: CURRENT_TAG,
    };
    let replacement = PaesReplacement {
        grid: HyperGrid::uniform(2, 0.0, 8.0, 4).unwrap(),
        hyperbox_tag: TagId(132),
        hyperbox_info_tag: TagId(133),
        current_solution_tag: CURRENT_TAG,
        crowding_tag: TagId(134),
        info_buffer_tag: TagId(135),
    };
    let mating = MatingSetup::new(
        Box::new(support::MeanCrossover),
        Box::new(support::NudgeMutation { delta: -0.5 }),
        MatingConfig {
            crossover_probability: 0.0,
            mutation_probability: 1.0,
            improving_mutations_only: false,
        },
    );
    (selection, replacement, mating)
}

fn archive_population() -> Population {
    build::pareto_population(6, 2, 2)
}

fn run_generation(
    population: &mut Population,
    selection: &PaesSelection,
    replacement: &PaesReplacement,
    mating: &MatingSetup,
    streams: &mut RandomStreams,
) {
    let branches = Branches::single();
    let mut staged = ChromosomeGroup::new(true, 0, 0, true);
    selection
        .run(population, &mut staged, Some(mating), &branches, streams)
        .unwrap();
    replacement
        .run(&mut staged, population, &branches, streams)
        .unwrap();
    population.next_generation(&branches).unwrap();
}

#[test]
fn the_first_generation_seeds_the_archive() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(18, &branches);
    let mut population = archive_population();

    let (selection, replacement, mating) = operators();
    let mut staged = ChromosomeGroup::new(true, 0, 0, true);
    replacement
        .prepare(&mut staged, &mut population, &branches)
        .unwrap();
    selection
        .prepare(&mut population, &mut staged, Some(&mating), &branches)
        .unwrap();

    run_generation(
        &mut population,
        &selection,
        &replacement,
        &mating,
        &mut streams,
    );

    assert_eq!(population.len(), 1);
    let current_handle = population
        .population_tag_handle::<Option<genetic_population::storage::StorageId>>(CURRENT_TAG)
        .unwrap();
    let current = *population.population_tag(current_handle).unwrap();
    assert_eq!(current, Some(population.id_at(0)));
}

#[test]
fn a_dominating_candidate_takes_over_the_archive() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(19, &branches);
    let mut population = archive_population();

    let (selection, replacement, mating) = operators();
    let mut staged = ChromosomeGroup::new(true, 0, 0, true);
    replacement
        .prepare(&mut staged, &mut population, &branches)
        .unwrap();
    selection
        .prepare(&mut population, &mut staged, Some(&mating), &branches)
        .unwrap();

    // generation 1 seeds; the mutation then nudges every gene down, which
    // dominates under minimization, so each candidate displaces the
    // archive member it came from
    for _ in 0..4 {
        run_generation(
            &mut population,
            &selection,
            &replacement,
            &mating,
            &mut streams,
        );
        assert_eq!(population.len(), 1);
    }

    let current_handle = population
        .population_tag_handle::<Option<genetic_population::storage::StorageId>>(CURRENT_TAG)
        .unwrap();
    let current = *population.population_tag(current_handle).unwrap();
    assert!(current.is_some());
}
