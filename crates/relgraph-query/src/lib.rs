//! Criteria builder for relgraph.
//!
//! `relgraph-query` is the **query construction layer**. It turns restrictions over
//! statically described entity types into SQL fragments plus typed bind parameters:
//!
//! - **Expressions**: `Expression::equal`, `between`, `contains`, `any`, `is_not_in`, ...
//!   each produce a boolean term with the joins it needs.
//! - **Criteria**: ANDed expressions, ordering and limit over one entity type.
//! - **Join naming**: joins required by several expressions are emitted once, under
//!   aliases handed out by a `JoinNamer`.
//!
//! The graph engine in the `relgraph` crate embeds prepared criteria into its SELECT
//! statements.

pub mod criteria;
pub mod expr;
pub mod join;
pub mod sql;
pub mod target;

pub use criteria::{Criteria, GroupOperator, PreparedCriteria};
pub use expr::{Expression, Operand, Param};
pub use join::{JoinKind, JoinNamer, JoinStep, Place};
pub use sql::{column_ref, quote_identifier};
pub use target::{Resolved, Target};
