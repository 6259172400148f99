mod common;

use common::{HERO, HERO_POWER, POWER, count, engine, names};
use relgraph::prelude::*;
use relgraph_sqlite::SqliteConnection;

fn league() -> Engine<SqliteConnection> {
    let engine = engine();
    engine
        .connection()
        .execute_raw(
            "INSERT INTO heroes (id, name) VALUES (1, 'Superman'), (2, 'Batman');
             INSERT INTO powers (id, name) VALUES (1, 'Flight'), (2, 'Strength'), (3, 'Money'), (4, 'Speed');",
        )
        .unwrap();
    engine
}

#[test]
fn sqlite_linked_entities_load_through_the_association() {
    let engine = league();
    assert_eq!(engine.link(&HERO_POWER, 1, 1).unwrap(), 1);
    engine.link(&HERO_POWER, 1, 2).unwrap();
    engine.link(&HERO_POWER, 2, 3).unwrap();
    let mut graph = EntityGraph::new();

    let superman = engine
        .load_by_id(&mut graph, &HERO, 1, &LoadOptions::new())
        .unwrap()
        .unwrap();
    let powers = graph.related(superman, "powers").to_vec();
    assert_eq!(names(&graph, &powers, "name"), ["Flight", "Strength"]);
    for &power in &powers {
        assert_eq!(graph.related(power, "heroes"), [superman]);
    }

    let heroes = engine
        .load_list_for_side(&mut graph, &HERO_POWER, Side::B, 3, &LoadOptions::new().shallow())
        .unwrap();
    assert_eq!(names(&graph, &heroes, "name"), ["Batman"]);
}

#[test]
fn sqlite_unlink_removes_the_pairing() {
    let engine = league();
    engine.link(&HERO_POWER, 1, 1).unwrap();
    engine.link(&HERO_POWER, 1, 2).unwrap();

    assert_eq!(engine.unlink(&HERO_POWER, 1, 1).unwrap(), 1);
    assert_eq!(engine.unlink(&HERO_POWER, 1, 1).unwrap(), 0);

    let mut graph = EntityGraph::new();
    let powers = engine
        .load_list_for_side(&mut graph, &HERO_POWER, Side::A, 1, &LoadOptions::new())
        .unwrap();
    assert_eq!(names(&graph, &powers, "name"), ["Strength"]);
}

#[test]
fn sqlite_batch_links_are_atomic() {
    let engine = league();

    let keys = engine.link_multiple_b(&HERO_POWER, 2, &[3, 4]).unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(count(&engine, "hero_powers"), 2);

    let err = engine.link_multiple_b(&HERO_POWER, 1, &[1, 99]).unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert_eq!(count(&engine, "hero_powers"), 2);

    engine.link_multiple_a(&HERO_POWER, &[1, 2], 1).unwrap();
    assert_eq!(count(&engine, "hero_powers"), 4);
    assert_eq!(engine.unlink_multiple_a(&HERO_POWER, &[1, 2], 1).unwrap(), 2);
    assert_eq!(engine.unlink_multiple_b(&HERO_POWER, 2, &[3, 4, 1]).unwrap(), 2);
    assert_eq!(count(&engine, "hero_powers"), 0);
}

#[test]
fn sqlite_load_for_finds_the_pairing_row() {
    let engine = league();
    engine.link(&HERO_POWER, 2, 3).unwrap();
    let mut graph = EntityGraph::new();

    let pairing = engine
        .load_for(&mut graph, &HERO_POWER, 2, 3, &LoadOptions::new())
        .unwrap()
        .expect("pairing row");
    let batman = graph.reference(pairing, "hero").unwrap();
    assert_eq!(graph.identity(batman), Some(2));
    assert!(
        engine
            .load_for(&mut graph, &HERO_POWER, 1, 3, &LoadOptions::new())
            .unwrap()
            .is_none()
    );

    engine.link(&HERO_POWER, 2, 3).unwrap();
    let err = engine
        .load_for(&mut graph, &HERO_POWER, 2, 3, &LoadOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotUnique);
    let rows = engine
        .load_list_for(&mut graph, &HERO_POWER, 2, 3, &LoadOptions::new().shallow())
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(graph.slot(rows[0], "power"), Some(&Slot::Key(3)));
}

#[test]
fn sqlite_unlinked_rows_via_not_exists() {
    let engine = league();
    engine.link_multiple_b(&HERO_POWER, 1, &[1, 2]).unwrap();
    engine.link(&HERO_POWER, 2, 3).unwrap();
    let mut graph = EntityGraph::new();

    let criteria = Criteria::new(&POWER)
        .add(Expression::is_not_in(&POWER, &HERO_POWER, Side::B).unwrap())
        .unwrap();
    let unused = engine
        .load_list_by_criteria(&mut graph, &criteria, &LoadOptions::new())
        .unwrap();
    assert_eq!(names(&graph, &unused, "name"), ["Speed"]);
    assert!(graph.related(unused[0], "heroes").is_empty());

    assert!(Expression::is_not_in(&HERO, &HERO_POWER, Side::B).is_err());
}
