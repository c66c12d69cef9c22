mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::scaling::{NsgaScaling, Scaling};
use genetic_population::tags::TagId;
use support::{build, inspect};

fn nsga() -> NsgaScaling {
    NsgaScaling {
        delta_factor: 0.1,
        cutoff: 10.0,
        alpha: 1.0,
        dominated_tag: TagId(80),
        processed_tag: TagId(81),
        partial_sum_tag: TagId(82),
        front_buffer_tag: TagId(83),
        comparator: build::comparator(),
    }
}

#[test]
fn earlier_fronts_keep_higher_dummy_fitness() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(6, &branches);
    let mut population = build::pareto_population(8, 0, 2);

    // two clean fronts: the second is a shifted copy of the first
    build::insert_points(
        &mut population,
        &[&[1.0, 4.0], &[2.0, 3.0], &[4.0, 1.0], &[5.0, 8.0], &[6.0, 7.0], &[8.0, 5.0]],
    );

    let scaling = nsga();
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    let scaled = inspect::scaled_values(&population);
    for value in &scaled {
        assert!(*value > 0.0, "dummy fitness must stay positive: {scaled:?}");
    }

    let front_floor = scaled[..3].iter().copied().fold(f32::INFINITY, f32::min);
    let next_ceiling = scaled[3..].iter().copied().fold(0.0f32, f32::max);
    assert!(
        front_floor > next_ceiling,
        "front order must survive sharing: {scaled:?}"
    );

    scaling.clear(&mut population).unwrap();
}

#[test]
fn identical_chromosomes_share_their_dummy_fitness() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(6, &branches);
    let mut population = build::pareto_population(8, 0, 2);

    build::insert_points(&mut population, &[&[1.0, 1.0], &[1.0, 1.0]]);

    let scaling = nsga();
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    // both are nondominated and at zero distance: the kernel is 1, so the
    // dummy fitness halves
    let scaled = inspect::scaled_values(&population);
    assert_eq!(scaled[0], scaled[1]);
    assert_eq!(scaled[0], 1.0);

    scaling.clear(&mut population).unwrap();
}
