mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::evaluation::assign_raw_fitness;
use genetic_population::fitness::comparators::ScalarComparator;
use genetic_population::fitness::{FitnessKind, FitnessOrdering};
use genetic_population::group::ChromosomeGroup;
use genetic_population::population::{FillOptions, Population, PopulationParams};
use genetic_population::replace::{Replace, WorstReplacement};
use genetic_population::scaling::{FitnessSharingScaling, Nsga2Scaling, Scaling};
use genetic_population::select::{RouletteWheelSelection, Select};
use genetic_population::statistics::trackers::{
    FitnessTracker, OperationCountTracker, OperationTimeTracker, PopulationSizeTracker,
    POPULATION_SIZE_TRACKER, RAW_FITNESS_TRACKER,
};
use genetic_population::statistics::{BEST_FITNESS, SELECTION_TIME};
use genetic_population::tags::TagId;
use std::sync::Arc;
use support::{build, inspect, RandomPointInitializer, SumFitness};

const BUFFERS_TAG: TagId = TagId(150);
const PARTIAL_SUM_TAG: TagId = TagId(151);

/// Several generations of the full single-objective pipeline: fitness
/// assignment, sharing, selection with mating, worst replacement,
/// generation turnover.
#[test]
fn the_single_objective_pipeline_improves_monotonically() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(33, &branches);

    let params = PopulationParams::new(12, 0, FillOptions::default()).unwrap();
    let mut population = Population::builder()
        .with_params(params)
        .with_initializer(Box::new(RandomPointInitializer {
            dimensions: 3,
            range: 5.0,
        }))
        .with_fitness_operation(Box::new(SumFitness))
        .with_fitness_comparator(Box::new(ScalarComparator::new(FitnessOrdering::Maximize)))
        .with_seed(33)
        .build()
        .unwrap();
    population.initialize().unwrap();

    for tracker in [
        Arc::new(PopulationSizeTracker) as Arc<dyn genetic_population::statistics::trackers::StatTracker>,
        Arc::new(FitnessTracker::raw()),
        Arc::new(OperationCountTracker),
        Arc::new(OperationTimeTracker),
    ] {
        population.register_tracker(tracker).unwrap();
    }

    let scaling = FitnessSharingScaling::new(2.0, 1.0, PARTIAL_SUM_TAG, build::comparator());
    scaling.prepare(&mut population, &branches).unwrap();

    let mating = build::mating();
    let selection = RouletteWheelSelection::with_mating(8, BUFFERS_TAG);
    let mut offspring = ChromosomeGroup::sizable_new();
    selection
        .prepare(&mut population, &mut offspring, Some(&mating), &branches)
        .unwrap();
    let replacement = WorstReplacement::new(4);

    let mut best_per_generation = Vec::new();
    for _ in 0..5 {
        assign_raw_fitness(&mut population, &branches).unwrap();
        scaling.run(&mut population, &branches, &mut streams).unwrap();
        population.sort_by_fitness(FitnessKind::Raw).unwrap();

        population
            .update_tracker(POPULATION_SIZE_TRACKER, &branches)
            .unwrap();
        population
            .update_tracker(RAW_FITNESS_TRACKER, &branches)
            .unwrap();
        best_per_generation.push(
            population
                .statistics()
                .fitness(BEST_FITNESS)
                .unwrap()
                .unwrap()
                .probability_base(),
        );

        selection
            .run(
                &mut population,
                &mut offspring,
                Some(&mating),
                &branches,
                &mut streams,
            )
            .unwrap();
        replacement
            .run(&mut offspring, &mut population, &branches, &mut streams)
            .unwrap();

        population.next_generation(&branches).unwrap();
    }

    assert_eq!(population.len(), 12);
    // worst replacement never displaces the best member, so the best
    // fitness cannot regress
    for window in best_per_generation.windows(2) {
        assert!(window[1] >= window[0], "{best_per_generation:?}");
    }
    assert!(population.statistics().time(SELECTION_TIME).is_ok());

    selection.clear(&mut population, &mut offspring).unwrap();
    scaling.clear(&mut population).unwrap();
}

/// The multi-objective loop: NSGA-II scaling, crowded trim back to
/// capacity each generation.
#[test]
fn the_nsga2_pipeline_keeps_the_first_front() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(34, &branches);
    let mut population = build::pareto_population(8, 2, 2);

    build::insert_points(
        &mut population,
        &[
            &[1.0, 6.0],
            &[2.0, 4.0],
            &[4.0, 2.0],
            &[6.0, 1.0],
            &[5.0, 5.0],
            &[7.0, 6.0],
        ],
    );

    let scaling = Nsga2Scaling::new(TagId(160), TagId(161), TagId(162));
    scaling.prepare(&mut population, &branches).unwrap();

    for _ in 0..3 {
        scaling.run(&mut population, &branches, &mut streams).unwrap();

        population.set_fitness_comparator(Box::new(
            genetic_population::scaling::CrowdedComparator,
        ));
        population.sort_by_fitness(FitnessKind::Scaled).unwrap();
        population.trim_to_permanent();
        population.set_fitness_comparator(Box::new(
            genetic_population::fitness::comparators::ParetoComparator::new(
                FitnessOrdering::Minimize,
            ),
        ));

        population.next_generation(&branches).unwrap();
    }

    // capacity restored, and the surviving set is mutually nondominated
    assert_eq!(population.len(), 6);
    let ranks = inspect::scaled_component(&population, 0);
    for index in 1..population.len() {
        assert!(ranks[0] >= ranks[index]);
    }

    scaling.clear(&mut population).unwrap();
}
