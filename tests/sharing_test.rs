mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::scaling::{FitnessSharingScaling, Scaling};
use genetic_population::tags::TagId;
use support::{assert_relative_eq, build, inspect};

const PARTIAL_SUM_TAG: TagId = TagId(70);

fn sharing() -> FitnessSharingScaling {
    FitnessSharingScaling::new(1.0, 1.0, PARTIAL_SUM_TAG, build::comparator())
}

#[test]
fn sharing_divides_by_the_accumulated_kernel() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(4, &branches);
    let mut population = build::scalar_population(8, 0);

    // one-dimensional points at 0.0, 0.5 and 0.8 with unit raw fitness:
    // pairwise distances 0.5, 0.8 and 0.3 against a unit cutoff
    build::insert_points(&mut population, &[&[0.0], &[0.5], &[0.8]]);
    for index in 0..population.len() {
        use genetic_population::fitness::{downcast_mut, ScalarFitness};
        downcast_mut::<ScalarFitness>(population.at_mut(index).raw_fitness_mut())
            .unwrap()
            .set_value(1.0);
    }

    let scaling = sharing();
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    // kernel sums: [0.5 + 0.2, 0.5 + 0.7, 0.2 + 0.7]
    let scaled = inspect::scaled_values(&population);
    assert_relative_eq!(scaled[0], 1.0 / (1.0 + 0.7), epsilon = 1e-5);
    assert_relative_eq!(scaled[1], 1.0 / (1.0 + 1.2), epsilon = 1e-5);
    assert_relative_eq!(scaled[2], 1.0 / (1.0 + 0.9), epsilon = 1e-5);

    scaling.clear(&mut population).unwrap();
}

#[test]
fn incremental_update_matches_a_rebuild() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(4, &branches);

    // incremental population: settle a generation, then churn
    let mut incremental = build::scalar_population(8, 0);
    build::insert_points(&mut incremental, &[&[0.0], &[0.4], &[0.9]]);
    let scaling = sharing();
    scaling.prepare(&mut incremental, &branches).unwrap();
    scaling
        .run(&mut incremental, &branches, &mut streams)
        .unwrap();
    incremental.next_generation(&branches).unwrap();

    incremental.remove_at(1).unwrap();
    build::insert_points(&mut incremental, &[&[0.2], &[0.7]]);
    scaling
        .run(&mut incremental, &branches, &mut streams)
        .unwrap();

    // reference population: the same final members, built in one shot
    let mut reference = build::scalar_population(8, 0);
    build::insert_points(&mut reference, &[&[0.0], &[0.9], &[0.2], &[0.7]]);
    let reference_scaling = sharing();
    reference_scaling.prepare(&mut reference, &branches).unwrap();
    reference_scaling
        .run(&mut reference, &branches, &mut streams)
        .unwrap();

    let incremental_scaled = inspect::scaled_values(&incremental);
    let reference_scaled = inspect::scaled_values(&reference);
    for (a, b) in incremental_scaled.iter().zip(&reference_scaled) {
        assert_relative_eq!(*a, *b, epsilon = 1e-5);
    }
}
