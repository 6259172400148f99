#![allow(dead_code)]

use relgraph::prelude::*;
use relgraph_sqlite::SqliteConnection;

pub static ADDRESS: EntityMeta = EntityMeta::root(
    "Address",
    "addresses",
    "id",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::scalar("city", "city", ScalarKind::Text),
        FieldDescriptor::one_to_many("users", || &USER, "address"),
    ],
);

pub static USER: EntityMeta = EntityMeta::root(
    "User",
    "users",
    "id",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::scalar("username", "username", ScalarKind::Text),
        FieldDescriptor::scalar("type", "type", ScalarKind::Enum),
        FieldDescriptor::scalar("carCount", "car_count", ScalarKind::Int),
        FieldDescriptor::scalar("cash", "cash", ScalarKind::Float),
        FieldDescriptor::many_to_one("address", "address_id", || &ADDRESS),
        FieldDescriptor::scalar("password", "password", ScalarKind::Text).hidden(),
    ],
);

pub static STUDENT: EntityMeta = EntityMeta::sub(
    "Student",
    "students",
    "user",
    &[
        FieldDescriptor::parent_link("user", "user_id", || &USER),
        FieldDescriptor::scalar("school", "school", ScalarKind::Text),
        FieldDescriptor::scalar("enrolled", "enrolled", ScalarKind::Date),
    ],
);

pub static HERO: EntityMeta = EntityMeta::root(
    "Hero",
    "heroes",
    "id",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::scalar("name", "name", ScalarKind::Text),
        FieldDescriptor::many_to_many("powers", || &HERO_POWER, Side::A),
    ],
);

pub static POWER: EntityMeta = EntityMeta::root(
    "Power",
    "powers",
    "id",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::scalar("name", "name", ScalarKind::Text),
        FieldDescriptor::many_to_many("heroes", || &HERO_POWER, Side::B),
    ],
);

pub static HERO_POWER: EntityMeta = EntityMeta::association(
    "HeroPower",
    "hero_powers",
    "id",
    "hero",
    "power",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::many_to_one("hero", "hero_id", || &HERO),
        FieldDescriptor::many_to_one("power", "power_id", || &POWER),
    ],
);

pub static HUSBAND: EntityMeta = EntityMeta::root(
    "Husband",
    "husbands",
    "id",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::scalar("name", "name", ScalarKind::Text),
        FieldDescriptor::many_to_one("wife", "wife_id", || &WIFE),
    ],
);

pub static WIFE: EntityMeta = EntityMeta::root(
    "Wife",
    "wives",
    "id",
    &[
        FieldDescriptor::scalar("id", "id", ScalarKind::Int),
        FieldDescriptor::scalar("name", "name", ScalarKind::Text),
        FieldDescriptor::many_to_one("husband", "husband_id", || &HUSBAND),
    ],
);

const SCHEMA: &str = "
    CREATE TABLE addresses (
        id INTEGER PRIMARY KEY,
        city TEXT NOT NULL
    );
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        type INTEGER NOT NULL DEFAULT 0,
        car_count INTEGER NOT NULL DEFAULT 0,
        cash REAL NOT NULL DEFAULT 0,
        address_id INTEGER REFERENCES addresses(id),
        password TEXT
    );
    CREATE TABLE students (
        user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        school TEXT,
        enrolled TEXT
    );
    CREATE TABLE heroes (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE powers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE hero_powers (
        id INTEGER PRIMARY KEY,
        hero_id INTEGER NOT NULL REFERENCES heroes(id),
        power_id INTEGER NOT NULL REFERENCES powers(id)
    );
    CREATE TABLE husbands (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        wife_id INTEGER REFERENCES wives(id)
    );
    CREATE TABLE wives (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        husband_id INTEGER REFERENCES husbands(id)
    );
";

pub fn registry() -> Registry {
    [
        &ADDRESS, &USER, &STUDENT, &HERO, &POWER, &HERO_POWER, &HUSBAND, &WIFE,
    ]
    .into_iter()
    .try_fold(Registry::new(), Registry::with)
    .expect("register test entities")
}

/// Engine over a fresh in-memory database with foreign keys enforced.
pub fn engine() -> Engine<SqliteConnection> {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(SCHEMA).expect("create schema");
    Engine::new(conn, registry())
}

/// Gordon, Alyx and Barney with ids 1, 2 and 3.
pub fn seed_users(engine: &Engine<SqliteConnection>) {
    engine
        .connection()
        .execute_raw(
            "INSERT INTO users (id, username, type, car_count, cash, password) VALUES
                (1, 'Gordon', 0, 42, 67.42, 'crowbar'),
                (2, 'Alyx', 1, 3, 42.67, 'dog'),
                (3, 'Barney', 2, 11, 0.0, 'beer');",
        )
        .expect("seed users");
}

pub fn text(graph: &EntityGraph, entity: EntityId, field: &str) -> String {
    graph
        .scalar(entity, field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn names(graph: &EntityGraph, entities: &[EntityId], field: &str) -> Vec<String> {
    entities.iter().map(|&e| text(graph, e, field)).collect()
}

pub fn count(engine: &Engine<SqliteConnection>, table: &str) -> i64 {
    let rows = engine
        .connection()
        .query_plain(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .expect("count rows");
    rows[0].get_named::<i64>("n").expect("count column")
}
