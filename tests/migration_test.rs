mod support;

use genetic_population::branch::{Branches, RandomStreams};
use genetic_population::errors::Error;
use genetic_population::migration::{
    Adoption, Migration, MigrationPort, ReplacementAdoption, SelectionMigration,
};
use genetic_population::replace::WorstReplacement;
use genetic_population::select::TopSelection;
use genetic_population::tags::TagId;
use support::{build, inspect};

const MIGRATION_OUTPUT_TAG: TagId = TagId(140);
const ADOPTION_INPUT_TAG: TagId = TagId(141);

#[test]
fn the_port_is_bounded() {
    let mut port = MigrationPort::new(2);
    port.insert(support::point(vec![1.0])).unwrap();
    port.insert(support::point(vec![2.0])).unwrap();
    assert!(matches!(
        port.insert(support::point(vec![3.0])),
        Err(Error::InvalidOperation(_))
    ));
    assert!(port.is_full());

    assert_eq!(port.drain().len(), 2);
    assert!(port.is_empty());
}

#[test]
fn emigrants_flow_through_the_port_into_the_target_population() {
    let branches = Branches::single();
    let mut streams = RandomStreams::new(21, &branches);
    let mut port = MigrationPort::new(4);

    // source: the two best members emigrate
    let mut source = build::scalar_population(8, 0);
    build::insert_values(&mut source, &[9.0, 7.0, 5.0, 3.0]);
    let migration = SelectionMigration::new(TopSelection::new(2), MIGRATION_OUTPUT_TAG);
    migration.prepare(&mut source, &mut port, &branches).unwrap();
    migration
        .run(&mut source, &mut port, &branches, &mut streams)
        .unwrap();
    assert_eq!(port.len(), 2);
    // migration moves genotype references; the source keeps its members
    assert_eq!(source.len(), 4);

    // target: immigrants displace the worst members
    let mut target = build::scalar_population(8, 0);
    build::insert_values(&mut target, &[4.0, 3.0, 2.0, 1.0]);
    let adoption = ReplacementAdoption::new(WorstReplacement::new(2), ADOPTION_INPUT_TAG);
    adoption.prepare(&mut port, &mut target, &branches).unwrap();
    adoption
        .run(&mut port, &mut target, &branches, &mut streams)
        .unwrap();

    assert!(port.is_empty());
    assert_eq!(target.len(), 4);
    let values = inspect::raw_values(&target);
    assert!(values.contains(&9.0));
    assert!(values.contains(&7.0));
    assert!(!values.contains(&2.0));
    assert!(!values.contains(&1.0));

    migration.clear(&mut source, &mut port).unwrap();
    adoption.clear(&mut port, &mut target).unwrap();
}
