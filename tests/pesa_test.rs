mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::grid::HyperGrid;
use genetic_population::scaling::{PesaScaling, Scaling};
use genetic_population::storage::REMOVE_CHROMOSOME;
use genetic_population::tags::TagId;
use support::{assert_relative_eq, build, inspect};

fn pesa(region_sharing: bool) -> PesaScaling {
    PesaScaling {
        region_sharing,
        grid: HyperGrid::uniform(2, 0.0, 8.0, 2).unwrap(),
        dominated_tag: TagId(100),
        hyperbox_tag: TagId(101),
        hyperbox_info_tag: TagId(102),
        nondominated_tag: TagId(103),
        crowding_tag: TagId(104),
        info_buffer_tag: TagId(105),
    }
}

#[test]
fn the_most_crowded_cell_loses_a_member() {
    let branches = Branches::new(2).unwrap();
    let mut streams = RandomStreams::new(12, &branches);
    // capacity 4, five nondominated members in cells [3, 1, 1]
    let mut population = build::pareto_population(6, 2, 2);

    // three points share the low-low cell; the trade-off points sit alone
    build::insert_points(
        &mut population,
        &[
            &[1.0, 3.0],
            &[2.0, 2.0],
            &[3.0, 1.0],
            &[0.5, 7.0],
            &[7.0, 0.5],
        ],
    );

    let scaling = pesa(true);
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    let marked: Vec<usize> = (0..population.len())
        .filter(|index| population.at(*index).flags().any(REMOVE_CHROMOSOME))
        .collect();
    assert_eq!(marked.len(), 1);
    // the casualty comes from the crowded cell, never from a singleton
    assert!(marked[0] < 3);

    // region sharing: survivors of the two-strong cell score 1/2, the
    // singletons a full 1
    let scaled = inspect::scaled_values(&population);
    for index in 0..3 {
        if index != marked[0] {
            assert_relative_eq!(scaled[index], 0.5);
        }
    }
    assert_relative_eq!(scaled[3], 1.0);
    assert_relative_eq!(scaled[4], 1.0);

    population.remove_marked();
    assert_eq!(population.len(), 4);

    scaling.clear(&mut population).unwrap();
}

#[test]
fn without_region_sharing_cell_occupancy_is_squared() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(12, &branches);
    let mut population = build::pareto_population(8, 0, 2);

    // both nondominated members share one cell; capacity is not exceeded
    build::insert_points(&mut population, &[&[1.0, 3.0], &[3.0, 1.0]]);

    let scaling = pesa(false);
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    let scaled = inspect::scaled_values(&population);
    assert_relative_eq!(scaled[0], 0.25);
    assert_relative_eq!(scaled[1], 0.25);

    scaling.clear(&mut population).unwrap();
}

#[test]
fn dominated_members_score_zero() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(12, &branches);
    let mut population = build::pareto_population(8, 0, 2);

    build::insert_points(&mut population, &[&[1.0, 1.0], &[5.0, 5.0]]);

    let scaling = pesa(true);
    scaling.prepare(&mut population, &branches).unwrap();
    scaling.run(&mut population, &branches, &mut streams).unwrap();

    let scaled = inspect::scaled_values(&population);
    assert_relative_eq!(scaled[0], 1.0);
    assert_relative_eq!(scaled[1], 0.0);

    scaling.clear(&mut population).unwrap();
}
