mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::scaling::{Scaling, SpeaScaling};
use genetic_population::storage::REMOVE_CHROMOSOME;
use genetic_population::tags::TagId;
use support::{assert_relative_eq, build, inspect};

fn spea() -> SpeaScaling {
    SpeaScaling {
        dominance_list_tag: TagId(110),
        strength_tag: TagId(111),
        dominated_tag: TagId(112),
        cluster_storage_tag: TagId(113),
    }
}

#[test]
fn strength_drives_the_scaled_fitness() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(14, &branches);
    let mut population = build::pareto_population(8, 0, 2);

    // two nondominated members, each dominating one straggler
    build::insert_points(
        &mut population,
        &[&[1.0, 1.0], &[0.5, 6.0], &[2.0, 2.0], &[0.6, 6.5]],
    );

    let scaling = spea();
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    let scaled = inspect::scaled_values(&population);
    // nondominated: 1 + strength
    assert_relative_eq!(scaled[0], 1.0 + 1.0);
    assert_relative_eq!(scaled[1], 1.0 + 1.0);
    // dominated: N / (N + accumulated dominator strengths)
    assert_relative_eq!(scaled[2], 4.0 / (4.0 + 1.0));
    assert_relative_eq!(scaled[3], 4.0 / (4.0 + 1.0));

    scaling.clear(&mut population).unwrap();
}

#[test]
fn clustering_reduces_the_nondominated_set_to_capacity() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(14, &branches);
    // permanent capacity 2
    let mut population = build::pareto_population(5, 3, 2);

    // four nondominated members in two tight pairs
    build::insert_points(
        &mut population,
        &[&[1.0, 8.0], &[1.1, 7.9], &[8.0, 1.0], &[8.1, 0.9]],
    );

    let scaling = spea();
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    let marked: Vec<usize> = (0..population.len())
        .filter(|index| population.at(*index).flags().any(REMOVE_CHROMOSOME))
        .collect();
    assert_eq!(marked.len(), 2);

    // one survivor per pair
    let pair_of = |index: usize| index / 2;
    assert_ne!(pair_of(marked[0]), pair_of(marked[1]));

    population.remove_marked();
    assert_eq!(population.len(), 2);

    scaling.clear(&mut population).unwrap();
}
