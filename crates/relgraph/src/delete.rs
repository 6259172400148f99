//! Delete path, including the mutual foreign-key fixup.
//!
//! Two rows can reference each other: `T.f -> x` and `x.g -> T`. With foreign keys
//! enforced, neither row can be deleted first. Before deleting a row `r` of `T`, every
//! such pair derived for `T` is checked and, when `x.g` really points back at `r`, the
//! back reference is cleared.

use crate::engine::{Engine, key_params};
use relgraph_core::{
    BindType, Connection, EntityGraph, EntityId, EntityMeta, Error, Params, Result, Slot, Txn,
    Value,
};
use relgraph_query::{column_ref, quote_identifier};
use relgraph_session::Session;

impl<C: Connection> Engine<C> {
    /// Delete an entity's rows (its whole parent chain) and clear its key in the graph.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = ?entity))]
    pub fn delete(&self, graph: &mut EntityGraph, entity: EntityId) -> Result<()> {
        let (meta, key) = self.deletion_target(graph, entity)?;
        self.delete_internal(meta, key, Txn::OWNED)?;
        forget_key(graph, entity)
    }

    /// Delete the rows of `meta` identified by `key`.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = meta.name, key))]
    pub fn delete_by_key(&self, meta: &'static EntityMeta, key: i64) -> Result<()> {
        self.require(meta)?;
        self.delete_internal(meta, key, Txn::OWNED)
    }

    /// Delete several entities in one transaction. An entity listed twice is deleted
    /// once.
    #[tracing::instrument(level = "debug", skip_all, fields(count = entities.len()))]
    pub fn delete_all(&self, graph: &mut EntityGraph, entities: &[EntityId]) -> Result<()> {
        let mut seen = Session::new();
        let mut deleted = Vec::with_capacity(entities.len());
        Txn::OWNED.run(&self.conn, || {
            for &entity in entities {
                let (meta, key) = self.deletion_target(graph, entity)?;
                if !seen.register(meta, key, entity).is_new() {
                    continue;
                }
                self.delete_internal(meta, key, Txn::JOINED)?;
                deleted.push(entity);
            }
            Ok(())
        })?;
        for entity in deleted {
            forget_key(graph, entity)?;
        }
        Ok(())
    }

    fn deletion_target(&self, graph: &EntityGraph, entity: EntityId) -> Result<(&'static EntityMeta, i64)> {
        let meta = self.meta_of(graph, entity)?;
        let key = graph.identity(entity).ok_or_else(|| {
            Error::invalid_operation(format!("cannot delete {}: it has no primary key", meta.name))
        })?;
        Ok((meta, key))
    }

    pub(crate) fn delete_internal(&self, meta: &'static EntityMeta, key: i64, txn: Txn) -> Result<()> {
        txn.run(&self.conn, || {
            self.clear_pointing_back(meta, key)?;
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?",
                quote_identifier(meta.table),
                quote_identifier(meta.id_column()?)
            );
            tracing::trace!(sql = %sql, "delete");
            let affected = self.conn.execute(&sql, &key_params(key))?;
            tracing::debug!(entity = meta.name, key, affected, "deleted row");
            match meta.parent() {
                Some(parent) => self.delete_internal(parent, key, Txn::JOINED),
                None => Ok(()),
            }
        })
    }

    fn clear_pointing_back(&self, meta: &'static EntityMeta, key: i64) -> Result<()> {
        let pairs = self.registry.pointing_back(meta);
        if pairs.is_empty() {
            return Ok(());
        }
        let table = quote_identifier(meta.table);
        let id_column = meta.id_column()?;

        for pair in pairs.iter() {
            let sql = format!(
                "SELECT {} AS \"target\" FROM {} WHERE {} = ?",
                column_ref(&table, pair.field.require_column()?),
                table,
                column_ref(&table, id_column)
            );
            let target = self
                .conn
                .query_single(&sql, &key_params(key))?
                .and_then(|row| row.get(0).and_then(Value::as_i64));
            let Some(target) = target else {
                continue;
            };

            let other_table = quote_identifier(pair.other.table);
            let other_id = quote_identifier(pair.other.id_column()?);
            let back = quote_identifier(pair.other_field.require_column()?);
            let mut params = Params::new();
            params.push(Value::BigInt(target), BindType::Integer);
            params.push(Value::BigInt(key), BindType::Integer);
            let sql = format!(
                "SELECT 1 FROM {} WHERE {} = ? AND {} = ? LIMIT 1",
                other_table, other_id, back
            );
            if self.conn.query(&sql, &params)?.is_empty() {
                continue;
            }

            tracing::info!(
                entity = meta.name,
                key,
                other = pair.other.name,
                field = pair.other_field.name,
                target,
                "clearing back reference before delete"
            );
            let sql = format!("UPDATE {} SET {} = NULL WHERE {} = ?", other_table, back, other_id);
            self.conn.execute(&sql, &key_params(target))?;
        }
        Ok(())
    }
}

/// Clear the identity of a deleted entity: the root's primary key, or the link of the
/// nearest sub-entity whose parent is not in the graph.
fn forget_key(graph: &mut EntityGraph, entity: EntityId) -> Result<()> {
    let mut current = entity;
    loop {
        let Some(meta) = graph.get(current).map(|e| e.meta()) else {
            return Ok(());
        };
        match meta.parent_link() {
            Some(link) => match graph.parent(current) {
                Some(parent) => current = parent,
                None => return graph.set_slot(current, link.name, Slot::Null),
            },
            None => {
                return match meta.primary_key() {
                    Some(pk) => graph.set_slot(current, pk.name, Slot::Null),
                    None => Ok(()),
                };
            }
        }
    }
}
