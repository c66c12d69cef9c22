mod support;

use genetic_population::branch::Branches;
use genetic_population::errors::Error;
use genetic_population::evaluation::assign_raw_fitness;
use genetic_population::fitness::FitnessKind;
use genetic_population::population::{PopulationFlags, PopulationParams};
use genetic_population::storage::{NEW_CHROMOSOME, REMOVE_CHROMOSOME};
use support::{build, inspect};

#[test]
fn initialize_twice_is_rejected() {
    let mut population = build::scalar_population(8, 0);
    assert!(matches!(
        population.initialize(),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn insert_tracks_new_chromosomes() {
    let mut population = build::scalar_population(8, 0);
    let ids = build::insert_values(&mut population, &[1.0, 2.0, 3.0]);

    assert_eq!(population.len(), 3);
    assert_eq!(population.new_chromosomes().len(), 3);
    for id in ids {
        assert!(population.storage(id).flags().any(NEW_CHROMOSOME));
    }
}

#[test]
fn insert_beyond_capacity_fails() {
    let mut population = build::scalar_population(2, 0);
    build::insert_values(&mut population, &[1.0, 2.0]);

    let id = population.acquire_storage().unwrap();
    population
        .storage_mut(id)
        .set_chromosome(support::point(vec![9.0]), None);
    assert!(matches!(
        population.insert(id),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn removal_moves_chromosomes_to_the_removed_group() {
    let mut population = build::scalar_population(8, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0, 4.0]);

    population.remove_at(1).unwrap();
    assert_eq!(inspect::raw_values(&population), vec![1.0, 3.0, 4.0]);
    assert_eq!(population.removed_chromosomes().len(), 1);

    // a chromosome that arrived and left in the same generation is in
    // neither side group twice
    let new_ids: Vec<_> = population.new_chromosomes().ids();
    let removed_ids: Vec<_> = population.removed_chromosomes().ids();
    assert!(new_ids.iter().all(|id| !removed_ids.contains(id)));
}

#[test]
fn remove_sorted_and_unsorted_agree() {
    let mut first = build::scalar_population(8, 0);
    build::insert_values(&mut first, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    first.remove_sorted(&[0, 2, 4]).unwrap();

    let mut second = build::scalar_population(8, 0);
    build::insert_values(&mut second, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    second.remove_unsorted(&[4, 0, 2]).unwrap();

    assert_eq!(
        inspect::raw_values(&first),
        inspect::raw_values(&second)
    );
    assert_eq!(inspect::raw_values(&first), vec![2.0, 4.0]);
}

#[test]
fn remove_marked_compacts_in_order() {
    let mut population = build::scalar_population(8, 0);
    let ids = build::insert_values(&mut population, &[1.0, 2.0, 3.0, 4.0]);

    population.storage(ids[0]).flags().set(REMOVE_CHROMOSOME);
    population.storage(ids[3]).flags().set(REMOVE_CHROMOSOME);
    population.remove_marked();

    assert_eq!(inspect::raw_values(&population), vec![2.0, 3.0]);
    assert_eq!(population.removed_chromosomes().len(), 2);
}

#[test]
fn replace_swaps_in_place() {
    let mut population = build::scalar_population(8, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0]);

    let incoming = population.acquire_storage().unwrap();
    population
        .storage_mut(incoming)
        .set_chromosome(support::point(vec![9.0]), None);
    population.calculate_fitness(incoming).unwrap();
    population.replace(1, incoming).unwrap();

    assert_eq!(inspect::raw_values(&population), vec![1.0, 9.0, 3.0]);
    assert_eq!(population.removed_chromosomes().len(), 1);
}

#[test]
fn sorting_by_fitness_is_idempotent() {
    let mut population = build::scalar_population(8, 0);
    build::insert_values(&mut population, &[2.0, 5.0, 1.0, 4.0]);

    population.sort_by_fitness(FitnessKind::Raw).unwrap();
    assert_eq!(inspect::raw_values(&population), vec![5.0, 4.0, 2.0, 1.0]);

    population.sort_by_fitness(FitnessKind::Raw).unwrap();
    assert_eq!(inspect::raw_values(&population), vec![5.0, 4.0, 2.0, 1.0]);
}

#[test]
fn trim_to_permanent_drops_the_crowding_suffix() {
    let mut population = build::scalar_population(6, 2);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert!(population.is_crowded());

    population.trim_to_permanent();
    assert_eq!(population.len(), 4);
    assert!(!population.is_crowded());
    assert_eq!(population.removed_chromosomes().len(), 2);
}

#[test]
fn next_generation_clears_side_groups_and_flags() {
    let branches = Branches::single();
    let mut population = build::scalar_population(8, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0]);
    population.remove_at(0).unwrap();

    population.flags_mut().set(PopulationFlags::COMPLETE_FITNESS_UPDATE);
    population.next_generation(&branches).unwrap();

    assert_eq!(population.new_chromosomes().len(), 0);
    assert_eq!(population.removed_chromosomes().len(), 0);
    assert!(population.flags().any(PopulationFlags::INITIALIZED));
    assert!(!population
        .flags()
        .any(PopulationFlags::COMPLETE_FITNESS_UPDATE));

    // a second call within the fresh generation changes nothing further
    population.next_generation(&branches).unwrap();
    assert_eq!(population.new_chromosomes().len(), 0);
}

#[test]
fn growing_parameters_refills_when_allowed() {
    let mut population = build::scalar_population(4, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0, 4.0]);

    let grown = PopulationParams::new(
        6,
        0,
        genetic_population::population::FillOptions {
            on_init: false,
            on_size_change: true,
            crowding_space: false,
        },
    )
    .unwrap();
    population.set_params(grown).unwrap();

    assert_eq!(population.len(), 6);
    assert!(population.flags().any(PopulationFlags::SIZE_CHANGED));
}

#[test]
fn shrinking_parameters_captures_casualties() {
    let mut population = build::scalar_population(6, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    let shrunk = PopulationParams::new(3, 0, build::manual_fill()).unwrap();
    population.set_params(shrunk).unwrap();

    assert_eq!(population.len(), 3);
    assert_eq!(population.removed_chromosomes().len(), 3);
}

#[test]
fn changed_fitness_operation_triggers_a_full_sweep() {
    let branches = Branches::new(2).unwrap();
    let mut population = build::scalar_population(4, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0]);
    // arrival evaluation already ran; drop the construction-time flag
    population
        .flags_mut()
        .clear(PopulationFlags::FITNESS_OPERATION_CHANGED);

    population.set_fitness_operation(Box::new(support::SumFitness));
    assert!(population
        .flags()
        .any(PopulationFlags::FITNESS_OPERATION_CHANGED));
    // the refreshed prototypes wiped the stored values
    assert_eq!(inspect::raw_values(&population), vec![0.0, 0.0, 0.0]);

    assign_raw_fitness(&mut population, &branches).unwrap();
    assert_eq!(inspect::raw_values(&population), vec![1.0, 2.0, 3.0]);
    assert!(population
        .flags()
        .any(PopulationFlags::COMPLETE_FITNESS_UPDATE));
    assert!(!population
        .flags()
        .any(PopulationFlags::FITNESS_OPERATION_CHANGED));
}

#[test]
fn whole_population_evaluation_is_the_fallback() {
    let branches = Branches::single();
    let mut population = build::scalar_population(4, 0);
    build::insert_values(&mut population, &[1.5, 2.5]);

    population.set_fitness_operation(Box::new(support::BatchSumFitness));
    assign_raw_fitness(&mut population, &branches).unwrap();
    assert_eq!(inspect::raw_values(&population), vec![1.5, 2.5]);
}

#[test]
fn clear_recycles_everything() {
    let mut population = build::scalar_population(8, 0);
    build::insert_values(&mut population, &[1.0, 2.0, 3.0]);

    population.clear(true);
    assert_eq!(population.len(), 0);
    assert!(!population.flags().any(PopulationFlags::INITIALIZED));
    assert_eq!(population.pool().pooled_count(), 3);

    population.initialize().unwrap();
    build::insert_values(&mut population, &[4.0]);
    assert_eq!(population.len(), 1);
}
