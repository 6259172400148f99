//! relgraph - entity graphs over relational tables.
//!
//! relgraph maps statically declared entity types onto tables and moves whole object
//! graphs in and out of them:
//!
//! - Static metadata describing scalar, many-to-one, one-to-many, many-to-many and
//!   parent-link fields
//! - A criteria builder compiling typed restrictions into joins, WHERE, ORDER BY and
//!   LIMIT clauses
//! - Recursive loading with a per-call identity map, so cycles terminate and every row
//!   is materialized once
//! - Inserts and updates across sub-entity chains
//! - Deletes that first clear mutual foreign keys
//!
//! # Quick Start
//!
//! ```
//! use relgraph::prelude::*;
//! use relgraph_sqlite::SqliteConnection;
//!
//! static USER: EntityMeta = EntityMeta::root("User", "users", "id", &[
//!     FieldDescriptor::scalar("id", "id", ScalarKind::Int),
//!     FieldDescriptor::scalar("username", "username", ScalarKind::Text),
//!     FieldDescriptor::scalar("carCount", "car_count", ScalarKind::Int),
//! ]);
//!
//! # fn main() -> relgraph::Result<()> {
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw(
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT, car_count INTEGER)",
//! )?;
//! let engine = Engine::new(conn, Registry::new().with(&USER)?);
//!
//! let mut graph = EntityGraph::new();
//! let gordon = graph.insert(Entity::new(&USER).with("username", "Gordon")?.with("carCount", 42)?);
//! engine.save(&mut graph, gordon)?;
//! assert_eq!(graph.identity(gordon), Some(1));
//!
//! let criteria = Criteria::new(&USER).add(Expression::between(&USER, "carCount", 10, 50)?)?;
//! let found = engine.load_list_by_criteria(&mut graph, &criteria, &LoadOptions::new())?;
//! assert_eq!(found.len(), 1);
//! assert_eq!(graph.scalar(found[0], "username").and_then(|v| v.as_str()), Some("Gordon"));
//! # Ok(())
//! # }
//! ```

mod association;
mod delete;
pub mod engine;
mod fields;
mod load;
pub mod serialize;
mod write;

pub use engine::{Engine, LoadOptions};

pub use relgraph_core::{
    CollectionId, Connection, EngineConfig, Entity, EntityGraph, EntityId, EntityMeta,
    EntityShape, Error, ErrorKind, FieldDescriptor, FieldKind, Formats, IncludeDefaults,
    PointingBack, Registry, Result, ScalarKind, ScalarValue, Side, Slot, Txn,
};
pub use relgraph_query::{Criteria, Expression, GroupOperator, Operand, Target};
pub use relgraph_session::{Admission, CollectionKind, Session};

/// Everything needed to declare entity types and run the engine.
pub mod prelude {
    pub use crate::engine::{Engine, LoadOptions};
    pub use crate::serialize::to_json;
    pub use relgraph_core::{
        Connection, EngineConfig, Entity, EntityGraph, EntityId, EntityMeta, Error, ErrorKind,
        FieldDescriptor, Registry, Result, ScalarKind, ScalarValue, Side, Slot,
    };
    pub use relgraph_query::{Criteria, Expression, GroupOperator, Operand, Target};
}
