mod support;

use genetic_population::branch::Branches;
use genetic_population::fitness::FitnessKind;
use genetic_population::statistics::trackers::{
    DeviationTracker, FitnessTracker, OperationCountTracker, OperationTimeTracker,
    PopulationSizeTracker, RAW_DEVIATION_TRACKER, RAW_FITNESS_TRACKER,
};
use genetic_population::statistics::{
    self, AVG_FITNESS, BEST_FITNESS, DEVIATION, POPULATION_SIZE, SELECTION_TIME, TOTAL_FITNESS,
    VARIANCE, WORST_FITNESS,
};
use std::sync::Arc;
use std::time::Duration;
use support::{assert_relative_eq, build, inspect};

fn tracked_population() -> genetic_population::population::Population {
    let mut population = build::scalar_population(16, 0);
    population
        .register_tracker(Arc::new(PopulationSizeTracker))
        .unwrap();
    population
        .register_tracker(Arc::new(FitnessTracker::raw()))
        .unwrap();
    population
        .register_tracker(Arc::new(DeviationTracker::raw()))
        .unwrap();
    population
}

#[test]
fn population_size_is_tracked() {
    let branches = Branches::single();
    let mut population = tracked_population();
    build::insert_values(&mut population, &[1.0, 2.0, 3.0]);

    population
        .update_tracker(
            genetic_population::statistics::trackers::POPULATION_SIZE_TRACKER,
            &branches,
        )
        .unwrap();
    assert_eq!(population.statistics().int(POPULATION_SIZE).unwrap(), 3);
}

#[test]
fn best_and_worst_follow_the_sorted_population() {
    let branches = Branches::new(2).unwrap();
    let mut population = tracked_population();
    build::insert_values(&mut population, &[2.0, 8.0, 5.0, 1.0]);

    population.sort_by_fitness(FitnessKind::Raw).unwrap();
    population
        .update_tracker(
            genetic_population::statistics::trackers::POPULATION_SIZE_TRACKER,
            &branches,
        )
        .unwrap();
    population
        .update_tracker(RAW_FITNESS_TRACKER, &branches)
        .unwrap();

    let stats = population.statistics();
    let best = stats.fitness(BEST_FITNESS).unwrap().unwrap();
    let worst = stats.fitness(WORST_FITNESS).unwrap().unwrap();
    let total = stats.fitness(TOTAL_FITNESS).unwrap().unwrap();
    let average = stats.fitness(AVG_FITNESS).unwrap().unwrap();

    assert_eq!(best.probability_base(), 8.0);
    assert_eq!(worst.probability_base(), 1.0);
    assert_relative_eq!(total.probability_base(), 16.0);
    assert_relative_eq!(average.probability_base(), 4.0);
}

#[test]
fn incremental_total_matches_a_full_sweep() {
    let branches = Branches::new(3).unwrap();
    let mut population = tracked_population();
    build::insert_values(&mut population, &[2.0, 8.0, 5.0, 1.0]);
    population.sort_by_fitness(FitnessKind::Raw).unwrap();

    for id in [
        genetic_population::statistics::trackers::POPULATION_SIZE_TRACKER,
        RAW_FITNESS_TRACKER,
        RAW_DEVIATION_TRACKER,
    ] {
        population.update_tracker(id, &branches).unwrap();
    }
    population.next_generation(&branches).unwrap();

    // churn: one leaves, one arrives
    population.remove_at(3).unwrap();
    build::insert_values(&mut population, &[6.0]);
    population.sort_by_fitness(FitnessKind::Raw).unwrap();

    for id in [
        genetic_population::statistics::trackers::POPULATION_SIZE_TRACKER,
        RAW_FITNESS_TRACKER,
    ] {
        population.update_tracker(id, &branches).unwrap();
    }

    let expected: f32 = inspect::raw_values(&population).iter().sum();
    let tracked = population
        .statistics()
        .fitness(TOTAL_FITNESS)
        .unwrap()
        .unwrap()
        .probability_base();
    assert_relative_eq!(tracked, expected, epsilon = 1e-5 * expected.abs());
}

#[test]
fn variance_and_deviation_cross_check_against_a_streaming_oracle() {
    let branches = Branches::new(2).unwrap();
    let mut population = tracked_population();
    let values = [2.0f32, 8.0, 5.0, 1.0, 9.0, 3.0];
    build::insert_values(&mut population, &values);
    population.sort_by_fitness(FitnessKind::Raw).unwrap();

    for id in [
        genetic_population::statistics::trackers::POPULATION_SIZE_TRACKER,
        RAW_FITNESS_TRACKER,
        RAW_DEVIATION_TRACKER,
    ] {
        population.update_tracker(id, &branches).unwrap();
    }

    let oracle_stddev = stats::stddev(values.iter().map(|value| *value as f64)) as f32;
    let tracked_deviation = population.statistics().float(DEVIATION).unwrap();
    assert_relative_eq!(tracked_deviation, oracle_stddev, epsilon = 1e-4);

    let tracked_variance = population.statistics().float(VARIANCE).unwrap();
    assert_relative_eq!(
        tracked_variance,
        oracle_stddev * oracle_stddev,
        epsilon = 1e-3
    );
}

#[test]
fn operation_time_keeps_the_longest_branch() {
    let branches = Branches::single();
    let mut population = build::scalar_population(8, 0);
    population
        .register_tracker(Arc::new(OperationTimeTracker))
        .unwrap();
    population
        .register_tracker(Arc::new(OperationCountTracker))
        .unwrap();

    // two branches report their selection time; the longest one wins
    let statistics = population.statistics_mut();
    statistics
        .merge_time(SELECTION_TIME, Duration::from_millis(10))
        .unwrap();
    statistics
        .merge_time(SELECTION_TIME, Duration::from_millis(15))
        .unwrap();
    assert_eq!(
        statistics.time(SELECTION_TIME).unwrap(),
        Duration::from_millis(15)
    );

    population
        .update_tracker(
            genetic_population::statistics::trackers::OPERATION_TIME_TRACKER,
            &branches,
        )
        .unwrap();
    assert!(population
        .statistics()
        .time(statistics::GENERATION_TIME)
        .unwrap()
        > Duration::ZERO);
}

#[test]
fn unregistering_a_tracker_removes_its_values() {
    let mut population = build::scalar_population(8, 0);
    population
        .register_tracker(Arc::new(PopulationSizeTracker))
        .unwrap();
    assert!(population.statistics().has_value(POPULATION_SIZE));

    population
        .unregister_tracker(genetic_population::statistics::trackers::POPULATION_SIZE_TRACKER)
        .unwrap();
    assert!(!population.statistics().has_value(POPULATION_SIZE));
}
