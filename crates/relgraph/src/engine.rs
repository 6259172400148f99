//! The engine handle and per-call load options.

use relgraph_core::{
    BindType, Connection, EngineConfig, EntityGraph, EntityId, EntityMeta, Error, IncludeDefaults,
    Params, Registry, Result, Value,
};
use std::sync::Arc;

/// Field selection and relationship inclusion for one load.
///
/// Unset inclusion flags fall back to the engine's [`IncludeDefaults`].
///
/// ```
/// use relgraph::LoadOptions;
///
/// let options = LoadOptions::new().fields(&["username", "cash"]).one_to_many(false);
/// assert_eq!(options.selected(), Some(&["username".to_string(), "cash".to_string()][..]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    fields: Option<Vec<String>>,
    exclude: Vec<String>,
    many_to_one: Option<bool>,
    one_to_many: Option<bool>,
    many_to_many: Option<bool>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load exactly these fields (plus the identity). Fields inherited from a parent
    /// type are loaded through the parent.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    /// Leave these scalar fields out of the SELECT.
    pub fn exclude(mut self, fields: &[&str]) -> Self {
        self.exclude = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    pub fn many_to_one(mut self, include: bool) -> Self {
        self.many_to_one = Some(include);
        self
    }

    pub fn one_to_many(mut self, include: bool) -> Self {
        self.one_to_many = Some(include);
        self
    }

    pub fn many_to_many(mut self, include: bool) -> Self {
        self.many_to_many = Some(include);
        self
    }

    /// Follow no relationship at all.
    pub fn shallow(self) -> Self {
        self.many_to_one(false).one_to_many(false).many_to_many(false)
    }

    pub fn selected(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn excluded(&self) -> &[String] {
        &self.exclude
    }

    pub(crate) fn include(&self, defaults: IncludeDefaults) -> IncludeDefaults {
        IncludeDefaults {
            many_to_one: self.many_to_one.unwrap_or(defaults.many_to_one),
            one_to_many: self.one_to_many.unwrap_or(defaults.one_to_many),
            many_to_many: self.many_to_many.unwrap_or(defaults.many_to_many),
        }
    }
}

/// Maps registered entity types onto the tables behind one connection.
///
/// Every public operation runs to completion on the calling thread with its own
/// session. Entities are read into and written from an
/// [`EntityGraph`](relgraph_core::EntityGraph) owned by the caller.
pub struct Engine<C: Connection> {
    pub(crate) conn: C,
    pub(crate) registry: Arc<Registry>,
    pub(crate) config: EngineConfig,
}

impl<C: Connection> Engine<C> {
    pub fn new(conn: C, registry: impl Into<Arc<Registry>>) -> Self {
        Self {
            conn,
            registry: registry.into(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_connection(self) -> C {
        self.conn
    }

    pub(crate) fn require(&self, meta: &EntityMeta) -> Result<()> {
        self.registry.require(meta)
    }

    /// Type of an entity of `graph`, which must be registered with this engine.
    pub(crate) fn meta_of(&self, graph: &EntityGraph, entity: EntityId) -> Result<&'static EntityMeta> {
        let meta = graph
            .get(entity)
            .ok_or_else(|| Error::invalid_argument(format!("no entity {:?} in this graph", entity)))?
            .meta();
        self.require(meta)?;
        Ok(meta)
    }
}

/// Single bind of an identity key.
pub(crate) fn key_params(key: i64) -> Params {
    let mut params = Params::new();
    params.push(Value::BigInt(key), BindType::Integer);
    params
}
