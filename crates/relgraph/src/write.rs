//! Write path: INSERT and UPDATE across a sub-entity chain.

use crate::engine::{Engine, key_params};
use crate::fields;
use relgraph_core::{
    BindType, Connection, EntityGraph, EntityId, EntityMeta, Error, FieldDescriptor, FieldKind,
    Params, Result, ScalarValue, Slot, Txn, Value,
};
use relgraph_query::quote_identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Insert,
    Update,
}

impl<C: Connection> Engine<C> {
    /// Insert a new entity. A sub-entity whose parent has no key yet inserts the parent
    /// first. Root entities receive their generated primary key.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?entity))]
    pub fn insert(&self, graph: &mut EntityGraph, entity: EntityId) -> Result<()> {
        self.perform_query(graph, WriteKind::Insert, entity, None, Txn::OWNED, false)
    }

    /// Update every assigned field, parents included.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?entity))]
    pub fn update(&self, graph: &mut EntityGraph, entity: EntityId) -> Result<()> {
        self.perform_query(graph, WriteKind::Update, entity, None, Txn::OWNED, true)
    }

    /// Update only `fields`. Inherited fields are written to the parent row when
    /// `update_parents` is set.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?entity, ?fields))]
    pub fn update_fields(
        &self,
        graph: &mut EntityGraph,
        entity: EntityId,
        fields: &[&str],
        update_parents: bool,
    ) -> Result<()> {
        let selection: Vec<String> = fields.iter().map(|f| (*f).to_string()).collect();
        self.perform_query(
            graph,
            WriteKind::Update,
            entity,
            Some(&selection),
            Txn::OWNED,
            update_parents,
        )
    }

    /// Insert or update, whichever the entity needs.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?entity))]
    pub fn save(&self, graph: &mut EntityGraph, entity: EntityId) -> Result<()> {
        self.save_internal(graph, entity, Txn::OWNED)
    }

    /// Save several entities in one transaction.
    #[tracing::instrument(level = "debug", skip_all, fields(count = entities.len()))]
    pub fn save_all(&self, graph: &mut EntityGraph, entities: &[EntityId]) -> Result<()> {
        Txn::OWNED.run(&self.conn, || {
            for &entity in entities {
                self.save_internal(graph, entity, Txn::JOINED)?;
            }
            Ok(())
        })
    }

    fn save_internal(&self, graph: &mut EntityGraph, entity: EntityId, txn: Txn) -> Result<()> {
        let meta = self.meta_of(graph, entity)?;
        match graph.identity(entity) {
            None => self.perform_query(graph, WriteKind::Insert, entity, None, txn, false),
            Some(key) if meta.is_sub() => txn.run(&self.conn, || {
                if self.row_exists(meta, key)? {
                    return self.write_row(graph, WriteKind::Update, entity, None, true);
                }
                if let Some(parent) = graph.parent(entity) {
                    self.save_internal(graph, parent, Txn::JOINED)?;
                }
                self.write_row(graph, WriteKind::Insert, entity, None, false)
            }),
            Some(_) => self.perform_query(graph, WriteKind::Update, entity, None, txn, true),
        }
    }

    pub(crate) fn perform_query(
        &self,
        graph: &mut EntityGraph,
        kind: WriteKind,
        entity: EntityId,
        fields: Option<&[String]>,
        txn: Txn,
        update_parents: bool,
    ) -> Result<()> {
        txn.run(&self.conn, || {
            self.write_row(graph, kind, entity, fields, update_parents)
        })
    }

    fn write_row(
        &self,
        graph: &mut EntityGraph,
        kind: WriteKind,
        entity: EntityId,
        fields: Option<&[String]>,
        update_parents: bool,
    ) -> Result<()> {
        let meta = self.meta_of(graph, entity)?;
        let routed = fields::for_write(meta, fields)?;
        let table = quote_identifier(meta.table);

        match kind {
            WriteKind::Insert => {
                if graph.get(entity).and_then(|e| e.primary_key()).is_some() {
                    return Err(Error::invalid_operation(format!(
                        "cannot insert {}: it already has a primary key",
                        meta.name
                    )));
                }
                if let Some(link) = meta.parent_link() {
                    match graph.get(entity).and_then(|e| e.slot(link.name)).cloned() {
                        Some(Slot::Reference(parent)) if graph.identity(parent).is_none() => {
                            self.write_row(
                                graph,
                                WriteKind::Insert,
                                parent,
                                routed.parent.as_deref(),
                                update_parents,
                            )?;
                        }
                        Some(Slot::Reference(_) | Slot::Key(_)) => {}
                        _ => {
                            return Err(Error::invalid_operation(format!(
                                "cannot insert {}: '{}' is not set",
                                meta.name, link.name
                            )));
                        }
                    }
                }

                let (columns, params) = self.bind_columns(graph, entity, meta, &routed.own, kind)?;
                let sql = if columns.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES", table)
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        table,
                        columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
                        vec!["?"; columns.len()].join(", ")
                    )
                };
                tracing::trace!(sql = %sql, types = params.types(), "insert");
                let key = self.conn.insert(&sql, &params)?;
                if let Some(pk) = meta.primary_key() {
                    graph.set_slot(entity, pk.name, Slot::Scalar(ScalarValue::Int(key)))?;
                }
                tracing::debug!(entity = meta.name, key = graph.identity(entity), "inserted row");
                Ok(())
            }
            WriteKind::Update => {
                let key = graph.identity(entity).ok_or_else(|| {
                    Error::invalid_operation(format!(
                        "cannot update {}: it has no primary key",
                        meta.name
                    ))
                })?;
                if update_parents {
                    if let Some(parent) = graph.parent(entity) {
                        self.write_row(graph, WriteKind::Update, parent, routed.parent.as_deref(), true)?;
                    }
                }

                let (columns, mut params) = self.bind_columns(graph, entity, meta, &routed.own, kind)?;
                if columns.is_empty() {
                    tracing::debug!(entity = meta.name, key, "nothing to update");
                    return Ok(());
                }
                let assignments: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} = ?", quote_identifier(c)))
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    table,
                    assignments.join(", "),
                    quote_identifier(meta.id_column()?)
                );
                params.extend(&key_params(key));
                tracing::trace!(sql = %sql, types = params.types(), "update");
                let affected = self.conn.execute(&sql, &params)?;
                tracing::debug!(entity = meta.name, key, affected, "updated row");
                Ok(())
            }
        }
    }

    /// Columns and binds for the assigned slots among `fields`. Unset slots are left
    /// out; the primary key is never written and the parent link only on insert.
    fn bind_columns(
        &self,
        graph: &EntityGraph,
        entity: EntityId,
        meta: &'static EntityMeta,
        fields: &[&'static FieldDescriptor],
        kind: WriteKind,
    ) -> Result<(Vec<&'static str>, Params)> {
        let record = graph
            .get(entity)
            .ok_or_else(|| Error::invalid_argument(format!("no entity {:?} in this graph", entity)))?;
        let primary_key = meta.primary_key().map(|f| f.name);

        let mut columns = Vec::new();
        let mut params = Params::new();
        for field in fields {
            let Some(slot) = record.slot(field.name) else {
                continue;
            };
            match field.kind {
                FieldKind::Scalar(_) if Some(field.name) == primary_key => {}
                FieldKind::Scalar(_) => match slot {
                    Slot::Scalar(value) => {
                        columns.push(field.require_column()?);
                        params.push(value.to_storage(&self.config.formats)?, value.bind_type());
                    }
                    Slot::Null => {
                        columns.push(field.require_column()?);
                        params.push(Value::Null, BindType::Text);
                    }
                    _ => {}
                },
                FieldKind::ManyToOne => match slot {
                    Slot::Unset => {}
                    Slot::Null => {
                        columns.push(field.require_column()?);
                        params.push(Value::Null, BindType::Integer);
                    }
                    other => {
                        let key = graph.key_of(other).ok_or_else(|| {
                            Error::invalid_operation(format!(
                                "{}.{} references an entity without a key",
                                meta.name, field.name
                            ))
                        })?;
                        columns.push(field.require_column()?);
                        params.push(Value::BigInt(key), BindType::Integer);
                    }
                },
                FieldKind::ParentLink if kind == WriteKind::Insert => {
                    let key = graph.key_of(slot).ok_or_else(|| {
                        Error::invalid_operation(format!(
                            "cannot insert {}: its parent has no key",
                            meta.name
                        ))
                    })?;
                    columns.push(field.require_column()?);
                    params.push(Value::BigInt(key), BindType::Integer);
                }
                _ => {}
            }
        }
        Ok((columns, params))
    }

    /// Whether the own table of `meta` holds a row for `key`.
    pub(crate) fn row_exists(&self, meta: &'static EntityMeta, key: i64) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
            quote_identifier(meta.table),
            quote_identifier(meta.id_column()?)
        );
        Ok(!self.run_query(&sql, &key_params(key))?.is_empty())
    }
}
