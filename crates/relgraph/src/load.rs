//! Read path: SELECT, materialize, follow relationships.
//!
//! Rows become entities through the session, which admits each (type, identity) once.
//! Relationships are followed only for newly admitted entities, and collections are
//! reserved in the session before they are filled, so cyclic schemas terminate and
//! every reference to the same row is the same [`EntityId`].

use crate::engine::{Engine, LoadOptions};
use crate::fields;
use relgraph_core::{
    Connection, ConversionError, Entity, EntityGraph, EntityId, EntityMeta, Error, FieldDescriptor,
    FieldKind, IncludeDefaults, Params, Result, Row, ScalarValue, Slot, Value,
};
use relgraph_query::{Criteria, Expression, Operand, column_ref, quote_identifier};
use relgraph_session::{CollectionKind, Session};

/// What one (possibly nested) load reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Request<'a> {
    pub fields: Option<&'a [String]>,
    pub exclude: &'a [String],
    pub include: IncludeDefaults,
}

impl<'a> Request<'a> {
    pub(crate) fn new(options: &'a LoadOptions, defaults: IncludeDefaults) -> Self {
        Self {
            fields: options.selected(),
            exclude: options.excluded(),
            include: options.include(defaults),
        }
    }

    /// Related entities load their default fields with the same inclusion flags.
    pub(crate) fn nested(self) -> Request<'static> {
        Request {
            fields: None,
            exclude: &[],
            include: self.include,
        }
    }
}

/// Criteria selecting one entity by identity.
pub(crate) fn id_criteria(meta: &'static EntityMeta, id: i64) -> Result<Criteria> {
    Criteria::new(meta).add(Expression::equal(meta, meta.id_field_name(), Operand::Key(id))?)
}

fn select_column(table: &str, column: &str, alias: &str) -> String {
    format!("{} AS {}", column_ref(table, column), quote_identifier(alias))
}

impl<C: Connection> Engine<C> {
    /// Load one entity by identity. Returns `None` when no row matches.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = meta.name, id))]
    pub fn load_by_id(
        &self,
        graph: &mut EntityGraph,
        meta: &'static EntityMeta,
        id: i64,
        options: &LoadOptions,
    ) -> Result<Option<EntityId>> {
        self.require(meta)?;
        let mut session = Session::new();
        let request = Request::new(options, self.config.include);
        self.load_by_id_internal(graph, &mut session, meta, id, request)
    }

    /// Load the single entity matching `criteria`. More than one match fails with
    /// `NotUnique`.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = criteria.entity().name))]
    pub fn load_by_criteria(
        &self,
        graph: &mut EntityGraph,
        criteria: &Criteria,
        options: &LoadOptions,
    ) -> Result<Option<EntityId>> {
        self.require(criteria.entity())?;
        let mut session = Session::new();
        let request = Request::new(options, self.config.include);
        let loaded =
            self.load_internal(graph, &mut session, criteria.entity(), Some(criteria), request, true)?;
        Ok(loaded.into_iter().next())
    }

    /// Load every entity matching `criteria`, in criteria order (identity order when the
    /// criteria has none).
    #[tracing::instrument(level = "debug", skip_all, fields(entity = criteria.entity().name))]
    pub fn load_list_by_criteria(
        &self,
        graph: &mut EntityGraph,
        criteria: &Criteria,
        options: &LoadOptions,
    ) -> Result<Vec<EntityId>> {
        self.require(criteria.entity())?;
        let mut session = Session::new();
        let request = Request::new(options, self.config.include);
        self.load_internal(graph, &mut session, criteria.entity(), Some(criteria), request, false)
    }

    /// Load every row of a type.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = meta.name))]
    pub fn load_all(
        &self,
        graph: &mut EntityGraph,
        meta: &'static EntityMeta,
        options: &LoadOptions,
    ) -> Result<Vec<EntityId>> {
        self.require(meta)?;
        let mut session = Session::new();
        let request = Request::new(options, self.config.include);
        self.load_internal(graph, &mut session, meta, None, request, false)
    }

    /// Whether any row matches `criteria`. Ordering and limit are ignored.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = criteria.entity().name))]
    pub fn exists_by_criteria(&self, criteria: &Criteria) -> Result<bool> {
        let meta = criteria.entity();
        self.require(meta)?;
        let prepared = criteria.prepare(&self.config.formats)?;
        let sql = format!(
            "SELECT 1 FROM {}{}{} LIMIT 1",
            quote_identifier(meta.table),
            prepared.joins,
            prepared.where_clause
        );
        Ok(!self.run_query(&sql, &prepared.params)?.is_empty())
    }

    /// Number of rows matching `criteria`. Ordering and limit are ignored.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = criteria.entity().name))]
    pub fn count_by_criteria(&self, criteria: &Criteria) -> Result<i64> {
        let meta = criteria.entity();
        self.require(meta)?;
        let prepared = criteria.prepare(&self.config.formats)?;
        let sql = format!(
            "SELECT COUNT(*) AS \"count\" FROM {}{}{}",
            quote_identifier(meta.table),
            prepared.joins,
            prepared.where_clause
        );
        match self.run_query(&sql, &prepared.params)?.first() {
            Some(row) => row.get_named::<i64>("count"),
            None => Ok(0),
        }
    }

    pub(crate) fn run_query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        tracing::trace!(sql = %sql, types = params.types(), "query");
        if params.is_empty() {
            self.conn.query_plain(sql)
        } else {
            self.conn.query(sql, params)
        }
    }

    /// Session-first load by identity.
    pub(crate) fn load_by_id_internal(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        meta: &'static EntityMeta,
        id: i64,
        request: Request<'_>,
    ) -> Result<Option<EntityId>> {
        if let Some(hit) = session.lookup(meta, id) {
            return Ok(Some(hit));
        }
        let criteria = id_criteria(meta, id)?;
        let loaded = self.load_internal(graph, session, meta, Some(&criteria), request, true)?;
        Ok(loaded.into_iter().next())
    }

    pub(crate) fn load_internal(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        meta: &'static EntityMeta,
        criteria: Option<&Criteria>,
        request: Request<'_>,
        single: bool,
    ) -> Result<Vec<EntityId>> {
        let routed = fields::for_read(&self.registry, meta, request.fields)?;
        let id_field = meta.id_field()?;
        let table = quote_identifier(meta.table);

        let mut columns = vec![select_column(&table, id_field.require_column()?, id_field.name)];
        let mut scalars = Vec::new();
        let mut references = Vec::new();
        let mut collections = Vec::new();
        for &field in &routed.own {
            if field.name == id_field.name {
                continue;
            }
            match field.kind {
                FieldKind::Scalar(_) if request.exclude.iter().any(|e| e == field.name) => {}
                FieldKind::Scalar(_) => {
                    columns.push(select_column(&table, field.require_column()?, field.name));
                    scalars.push(field);
                }
                FieldKind::ManyToOne => {
                    columns.push(select_column(&table, field.require_column()?, field.name));
                    references.push(field);
                }
                FieldKind::OneToMany if request.include.one_to_many => collections.push(field),
                FieldKind::ManyToMany if request.include.many_to_many => collections.push(field),
                _ => {}
            }
        }

        let default_order = format!(" ORDER BY {}", column_ref(&table, id_field.require_column()?));
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
        let params = match criteria {
            Some(criteria) => {
                if !criteria.entity().same_as(meta) {
                    return Err(Error::invalid_argument(format!(
                        "criteria over {} cannot load {}",
                        criteria.entity().name,
                        meta.name
                    )));
                }
                let prepared = criteria.prepare(&self.config.formats)?;
                sql.push_str(&prepared.joins);
                sql.push_str(&prepared.where_clause);
                if prepared.order_by.is_empty() {
                    sql.push_str(&default_order);
                } else {
                    sql.push_str(&prepared.order_by);
                }
                sql.push_str(&prepared.limit);
                prepared.params
            }
            None => {
                sql.push_str(&default_order);
                Params::new()
            }
        };

        let rows = self.run_query(&sql, &params)?;
        if single && rows.len() > 1 {
            return Err(Error::not_unique(meta.name, rows.len()));
        }
        tracing::debug!(entity = meta.name, rows = rows.len(), "loaded rows");

        let mut loaded = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = row
                .get_by_name(id_field.name)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    Error::invalid_state(format!("{} row without an identity", meta.name))
                })?;
            let entity = self.materialize(meta, id_field, key, row, &scalars, &references)?;

            let admission = session.add(graph, entity, key);
            let id = admission.id();
            loaded.push(id);
            if !admission.is_new() {
                continue;
            }

            if request.include.many_to_one {
                for &field in &references {
                    self.follow_reference(graph, session, id, field, request.nested())?;
                }
            }
            if let Some(link) = meta.parent_link() {
                let parent_request = Request {
                    fields: routed.parent.as_deref(),
                    ..request
                };
                self.follow_parent(graph, session, id, link, key, parent_request)?;
            }
            for &field in &collections {
                match field.kind {
                    FieldKind::OneToMany => {
                        self.load_one_to_many(graph, session, meta, id, field, key, request.nested())?;
                    }
                    _ => {
                        self.load_many_to_many(graph, session, meta, id, field, key, request.nested())?;
                    }
                }
            }
        }
        tracing::trace!(entity = meta.name, session = ?session.stats(), "materialized rows");
        Ok(loaded)
    }

    fn materialize(
        &self,
        meta: &'static EntityMeta,
        id_field: &'static FieldDescriptor,
        key: i64,
        row: &Row,
        scalars: &[&'static FieldDescriptor],
        references: &[&'static FieldDescriptor],
    ) -> Result<Entity> {
        let mut entity = Entity::new(meta);
        let id_slot = match id_field.kind {
            FieldKind::ParentLink => Slot::Key(key),
            _ => Slot::Scalar(ScalarValue::Int(key)),
        };
        entity.set_slot(id_field.name, id_slot)?;

        for field in scalars {
            let Some(kind) = field.scalar_kind() else {
                continue;
            };
            let raw = row.get_by_name(field.name).unwrap_or(&Value::Null);
            let slot = match kind.from_storage(raw, &self.config.formats) {
                Ok(Some(value)) => Slot::Scalar(value),
                Ok(None) => Slot::Null,
                Err(Error::Conversion(err)) => {
                    return Err(Error::Conversion(ConversionError {
                        field: Some(format!("{}.{}", meta.name, field.name)),
                        ..err
                    }));
                }
                Err(err) => return Err(err),
            };
            entity.set_slot(field.name, slot)?;
        }
        for field in references {
            let slot = row
                .get_by_name(field.name)
                .and_then(Value::as_i64)
                .map_or(Slot::Null, Slot::Key);
            entity.set_slot(field.name, slot)?;
        }
        Ok(entity)
    }

    fn follow_reference(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        owner: EntityId,
        field: &'static FieldDescriptor,
        request: Request<'_>,
    ) -> Result<()> {
        let Some(Slot::Key(key)) = graph.get(owner).and_then(|e| e.slot(field.name)).cloned() else {
            return Ok(());
        };
        let target = require_target(field)?;
        match self.load_by_id_internal(graph, session, target, key, request)? {
            Some(related) => graph.set_slot(owner, field.name, Slot::Reference(related)),
            None => {
                tracing::warn!(field = field.name, target = target.name, key, "dangling foreign key");
                Ok(())
            }
        }
    }

    fn follow_parent(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        child: EntityId,
        link: &'static FieldDescriptor,
        key: i64,
        request: Request<'_>,
    ) -> Result<()> {
        let parent_meta = require_target(link)?;
        match self.load_by_id_internal(graph, session, parent_meta, key, request)? {
            Some(parent) => graph.set_slot(child, link.name, Slot::Reference(parent)),
            None => Err(Error::invalid_state(format!(
                "{} {} has no {} row",
                link.name, key, parent_meta.name
            ))),
        }
    }

    fn load_one_to_many(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        meta: &'static EntityMeta,
        owner: EntityId,
        field: &'static FieldDescriptor,
        key: i64,
        request: Request<'_>,
    ) -> Result<()> {
        if let Some(existing) = session.lookup_collection(CollectionKind::OneToMany, meta, field, key) {
            return graph.set_slot(owner, field.name, Slot::Collection(existing));
        }
        let collection =
            session.reserve_collection(graph, CollectionKind::OneToMany, meta, field, key);
        graph.set_slot(owner, field.name, Slot::Collection(collection))?;

        let target = require_target(field)?;
        let owning = field.owning_field.ok_or_else(|| {
            Error::invalid_argument(format!("{}.{} has no owning field", meta.name, field.name))
        })?;
        let criteria = Criteria::new(target).add(Expression::equal(target, owning, Operand::Key(key))?)?;
        let children = self.load_internal(graph, session, target, Some(&criteria), request, false)?;
        for &child in &children {
            graph.set_slot(child, owning, Slot::Reference(owner))?;
        }
        tracing::debug!(entity = meta.name, field = field.name, key, members = children.len(), "filled one-to-many");
        graph.extend_collection(collection, children);
        Ok(())
    }

    fn load_many_to_many(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        meta: &'static EntityMeta,
        owner: EntityId,
        field: &'static FieldDescriptor,
        key: i64,
        request: Request<'_>,
    ) -> Result<()> {
        if let Some(existing) = session.lookup_collection(CollectionKind::ManyToMany, meta, field, key) {
            return graph.set_slot(owner, field.name, Slot::Collection(existing));
        }
        let collection =
            session.reserve_collection(graph, CollectionKind::ManyToMany, meta, field, key);
        graph.set_slot(owner, field.name, Slot::Collection(collection))?;

        let association = require_target(field)?;
        let side = field.side.ok_or_else(|| {
            Error::invalid_argument(format!("{}.{} has no association side", meta.name, field.name))
        })?;
        let members = self.side_list(graph, session, association, side, key, request)?;
        tracing::debug!(entity = meta.name, field = field.name, key, members = members.len(), "filled many-to-many");
        graph.extend_collection(collection, members);
        Ok(())
    }
}

pub(crate) fn require_target(field: &FieldDescriptor) -> Result<&'static EntityMeta> {
    field
        .target()
        .ok_or_else(|| Error::invalid_argument(format!("field '{}' has no target type", field.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_core::{ErrorKind, ScalarKind};

    static TAG: EntityMeta = EntityMeta::root(
        "Tag",
        "tags",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::scalar("label", "label", ScalarKind::Text),
        ],
    );

    #[test]
    fn id_criteria_compares_the_identity_column() {
        let prepared = id_criteria(&TAG, 7)
            .unwrap()
            .prepare(&relgraph_core::Formats::default())
            .unwrap();
        assert_eq!(prepared.where_clause, " WHERE (\"tags\".\"id\" = ?)");
        assert_eq!(prepared.params.values(), &[Value::BigInt(7)]);
    }

    #[test]
    fn select_column_aliases_the_field_name() {
        assert_eq!(
            select_column("\"users\"", "car_count", "carCount"),
            "\"users\".\"car_count\" AS \"carCount\""
        );
    }

    #[test]
    fn nested_requests_reset_the_selection() {
        let options = LoadOptions::new().fields(&["label"]).exclude(&["label"]).one_to_many(false);
        let request = Request::new(&options, IncludeDefaults::default());
        let nested = request.nested();
        assert!(nested.fields.is_none());
        assert!(nested.exclude.is_empty());
        assert!(!nested.include.one_to_many);
        assert!(nested.include.many_to_one);
    }

    #[test]
    fn target_is_required() {
        let err = require_target(&TAG.fields[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
