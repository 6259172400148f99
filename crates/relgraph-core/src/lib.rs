//! Core types for relgraph.
//!
//! This crate provides the foundations shared by the query builder, the session and
//! the graph engine:
//!
//! - `EntityMeta` / `FieldDescriptor` static descriptions of entity types
//! - `Registry` of declared types and derived facts about them
//! - `EntityGraph` arena holding entity instances and relationship collections
//! - `ScalarKind` / `ScalarValue` conversion between stored and native values
//! - `Connection` trait for the SQL client

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod meta;
pub mod registry;
pub mod row;
pub mod scalar;
pub mod value;

pub use config::{EngineConfig, Formats, IncludeDefaults};
pub use connection::{Connection, Txn};
pub use entity::{CollectionId, Entity, EntityGraph, EntityId, Slot};
pub use error::{
    ConfigError, ConnectionError, ConversionError, Error, ErrorKind, NotUniqueError, QueryError,
    QueryErrorKind, Result, UnsupportedFieldType,
};
pub use meta::{Chain, EntityMeta, EntityShape, FieldDescriptor, FieldKind, MetaFn, Side};
pub use registry::{PointingBack, Registry};
pub use row::{ColumnInfo, FromValue, Row};
pub use scalar::{ScalarKind, ScalarValue};
pub use value::{BindType, Params, Value};
