mod common;

use common::{ADDRESS, STUDENT, USER, count, engine, seed_users, text};
use relgraph::prelude::*;

#[test]
fn sqlite_insert_assigns_generated_key() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let gordon = graph.insert(
        Entity::new(&USER)
            .with("username", "Gordon")
            .unwrap()
            .with("carCount", 42)
            .unwrap()
            .with("password", "crowbar")
            .unwrap(),
    );
    engine.insert(&mut graph, gordon).expect("insert Gordon");
    assert_eq!(graph.identity(gordon), Some(1));

    let mut fresh = EntityGraph::new();
    let options = LoadOptions::new().fields(&["username", "carCount", "password"]);
    let loaded = engine.load_by_id(&mut fresh, &USER, 1, &options).unwrap().unwrap();
    assert_eq!(text(&fresh, loaded, "username"), "Gordon");
    assert_eq!(fresh.scalar(loaded, "carCount"), Some(&ScalarValue::Int(42)));
    assert_eq!(text(&fresh, loaded, "password"), "crowbar");
}

#[test]
fn sqlite_insert_with_key_and_update_without_key_are_rejected() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let keyed = graph.insert(
        Entity::new(&USER)
            .with("id", 5_i64)
            .unwrap()
            .with("username", "Eli")
            .unwrap(),
    );
    let err = engine.insert(&mut graph, keyed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let unsaved = graph.insert(Entity::new(&USER).with("username", "Judith").unwrap());
    let err = engine.update(&mut graph, unsaved).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    assert_eq!(count(&engine, "users"), 0);
}

#[test]
fn sqlite_save_inserts_then_updates() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let rapture = graph.insert(Entity::new(&ADDRESS).with("city", "Rapture").unwrap());
    engine.save(&mut graph, rapture).unwrap();
    assert_eq!(graph.identity(rapture), Some(1));

    graph.set(rapture, "city", "Columbia").unwrap();
    engine.save(&mut graph, rapture).unwrap();
    assert_eq!(count(&engine, "addresses"), 1);

    let mut fresh = EntityGraph::new();
    let loaded = engine
        .load_by_id(&mut fresh, &ADDRESS, 1, &LoadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(text(&fresh, loaded, "city"), "Columbia");
}

#[test]
fn sqlite_update_fields_writes_only_the_selection() {
    let engine = engine();
    seed_users(&engine);
    let mut graph = EntityGraph::new();

    let gordon = engine
        .load_by_id(&mut graph, &USER, 1, &LoadOptions::new())
        .unwrap()
        .unwrap();
    graph.set(gordon, "username", "Freeman").unwrap();
    graph.set(gordon, "carCount", 0).unwrap();
    engine.update_fields(&mut graph, gordon, &["username"], false).unwrap();

    let mut fresh = EntityGraph::new();
    let loaded = engine
        .load_by_id(&mut fresh, &USER, 1, &LoadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(text(&fresh, loaded, "username"), "Freeman");
    assert_eq!(fresh.scalar(loaded, "carCount"), Some(&ScalarValue::Int(42)));
}

#[test]
fn sqlite_many_to_one_writes_the_related_key() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let rapture = graph.insert(Entity::new(&ADDRESS).with("city", "Rapture").unwrap());
    let ryan = graph.insert(
        Entity::new(&USER)
            .with("username", "Ryan")
            .unwrap()
            .with_reference("address", rapture)
            .unwrap(),
    );
    let err = engine.save(&mut graph, ryan).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(count(&engine, "users"), 0);

    engine.save_all(&mut graph, &[rapture, ryan]).unwrap();
    let mut fresh = EntityGraph::new();
    let loaded = engine
        .load_by_id(&mut fresh, &USER, 1, &LoadOptions::new().shallow())
        .unwrap()
        .unwrap();
    assert_eq!(fresh.slot(loaded, "address"), Some(&Slot::Key(1)));

    graph.set_slot(ryan, "address", Slot::Null).unwrap();
    engine.save(&mut graph, ryan).unwrap();
    let loaded = engine
        .load_by_id(&mut fresh, &USER, 1, &LoadOptions::new().shallow())
        .unwrap()
        .unwrap();
    assert_eq!(fresh.slot(loaded, "address"), Some(&Slot::Null));
}

#[test]
fn sqlite_save_all_rolls_back_on_failure() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let gordon = graph.insert(Entity::new(&USER).with("username", "Gordon").unwrap());
    let lost = graph.insert(
        Entity::new(&USER)
            .with("username", "Lost")
            .unwrap()
            .with_key("address", 99)
            .unwrap(),
    );
    let err = engine.save_all(&mut graph, &[gordon, lost]).unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert_eq!(count(&engine, "users"), 0);
}

#[test]
fn sqlite_sub_entity_insert_writes_the_parent_first() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let user = graph.insert(
        Entity::new(&USER)
            .with("username", "Alyx")
            .unwrap()
            .with("type", ScalarValue::Enum(1))
            .unwrap(),
    );
    let student = graph.insert(
        Entity::new(&STUDENT)
            .with_reference("user", user)
            .unwrap()
            .with("school", "Black Mesa")
            .unwrap(),
    );
    engine.insert(&mut graph, student).expect("insert student");

    assert_eq!(graph.identity(user), Some(1));
    assert_eq!(graph.identity(student), Some(1));
    assert_eq!(count(&engine, "users"), 1);
    assert_eq!(count(&engine, "students"), 1);

    let mut fresh = EntityGraph::new();
    let loaded = engine
        .load_by_id(&mut fresh, &STUDENT, 1, &LoadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(text(&fresh, loaded, "username"), "Alyx");
    assert_eq!(text(&fresh, loaded, "school"), "Black Mesa");
    assert_eq!(fresh.scalar(loaded, "type"), Some(&ScalarValue::Enum(1)));
}

#[test]
fn sqlite_sub_entity_without_parent_cannot_be_inserted() {
    let engine = engine();
    let mut graph = EntityGraph::new();

    let orphan = graph.insert(Entity::new(&STUDENT).with("school", "Nova Prospekt").unwrap());
    let err = engine.insert(&mut graph, orphan).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(count(&engine, "students"), 0);
}

#[test]
fn sqlite_sub_entity_update_reaches_the_parent_row() {
    let engine = engine();
    seed_users(&engine);
    engine
        .connection()
        .execute_raw("INSERT INTO students (user_id, school) VALUES (2, 'Black Mesa');")
        .unwrap();
    let mut graph = EntityGraph::new();

    let alyx = engine
        .load_by_id(&mut graph, &STUDENT, 2, &LoadOptions::new())
        .unwrap()
        .unwrap();
    graph.set(alyx, "username", "Alyx Vance").unwrap();
    engine.update_fields(&mut graph, alyx, &["username"], false).unwrap();

    let mut fresh = EntityGraph::new();
    let loaded = engine
        .load_by_id(&mut fresh, &USER, 2, &LoadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(text(&fresh, loaded, "username"), "Alyx");

    graph.set(alyx, "school", "White Forest").unwrap();
    engine.update(&mut graph, alyx).unwrap();

    let loaded = engine
        .load_by_id(&mut fresh, &STUDENT, 2, &LoadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(text(&fresh, loaded, "username"), "Alyx Vance");
    assert_eq!(text(&fresh, loaded, "school"), "White Forest");
}

#[test]
fn sqlite_saving_a_sub_entity_of_an_existing_parent_adds_its_row() {
    let engine = engine();
    seed_users(&engine);
    let mut graph = EntityGraph::new();

    let barney = engine
        .load_by_id(&mut graph, &USER, 3, &LoadOptions::new())
        .unwrap()
        .unwrap();
    let student = graph.insert(
        Entity::new(&STUDENT)
            .with_reference("user", barney)
            .unwrap()
            .with("school", "Citadel")
            .unwrap(),
    );
    engine.save(&mut graph, student).unwrap();
    assert_eq!(count(&engine, "users"), 3);
    assert_eq!(count(&engine, "students"), 1);

    graph.set(student, "school", "Kleiner Lab").unwrap();
    graph.set(student, "carCount", 12).unwrap();
    engine.save(&mut graph, student).unwrap();
    assert_eq!(count(&engine, "students"), 1);

    let mut fresh = EntityGraph::new();
    let loaded = engine
        .load_by_id(&mut fresh, &STUDENT, 3, &LoadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(text(&fresh, loaded, "school"), "Kleiner Lab");
    assert_eq!(text(&fresh, loaded, "username"), "Barney");
    assert_eq!(fresh.scalar(loaded, "carCount"), Some(&ScalarValue::Int(12)));
}
