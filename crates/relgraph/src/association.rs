//! Association entities: pairing rows behind many-to-many relationships.
//!
//! An association type has two many-to-one sides, A and B. Loading one side's
//! collection reads the association rows for that side's key and returns the entities
//! on the opposite side.

use crate::engine::{Engine, LoadOptions};
use crate::load::Request;
use relgraph_core::{
    BindType, Connection, EntityGraph, EntityId, EntityMeta, Params, Result, Side, Slot, Txn, Value,
};
use relgraph_query::{Criteria, Expression, Operand, quote_identifier};
use relgraph_session::Session;

impl<C: Connection> Engine<C> {
    /// Entities on the opposite side of every `association` row whose `side` is `id`.
    #[tracing::instrument(level = "debug", skip_all, fields(association = association.name, ?side, id))]
    pub fn load_list_for_side(
        &self,
        graph: &mut EntityGraph,
        association: &'static EntityMeta,
        side: Side,
        id: i64,
        options: &LoadOptions,
    ) -> Result<Vec<EntityId>> {
        self.require(association)?;
        let mut session = Session::new();
        let request = Request::new(options, self.config.include);
        self.side_list(graph, &mut session, association, side, id, request)
    }

    /// Insert one pairing row and return its key.
    #[tracing::instrument(level = "debug", skip_all, fields(association = association.name, a, b))]
    pub fn link(&self, association: &'static EntityMeta, a: i64, b: i64) -> Result<i64> {
        let sql = self.pairing_sql(association)?.insert;
        tracing::trace!(sql = %sql, "link");
        self.conn.insert(&sql, &pair_params(a, b))
    }

    /// Delete the pairing rows of `(a, b)`. Returns the number of rows removed.
    #[tracing::instrument(level = "debug", skip_all, fields(association = association.name, a, b))]
    pub fn unlink(&self, association: &'static EntityMeta, a: i64, b: i64) -> Result<u64> {
        let sql = self.pairing_sql(association)?.delete;
        tracing::trace!(sql = %sql, "unlink");
        self.conn.execute(&sql, &pair_params(a, b))
    }

    /// Pair every key in `many_a` with `b`, in one transaction.
    pub fn link_multiple_a(
        &self,
        association: &'static EntityMeta,
        many_a: &[i64],
        b: i64,
    ) -> Result<Vec<i64>> {
        self.link_batch(association, many_a.iter().map(|&a| (a, b)))
    }

    /// Pair `a` with every key in `many_b`, in one transaction.
    pub fn link_multiple_b(
        &self,
        association: &'static EntityMeta,
        a: i64,
        many_b: &[i64],
    ) -> Result<Vec<i64>> {
        self.link_batch(association, many_b.iter().map(|&b| (a, b)))
    }

    /// Remove the pairings of every key in `many_a` with `b`, in one transaction.
    pub fn unlink_multiple_a(
        &self,
        association: &'static EntityMeta,
        many_a: &[i64],
        b: i64,
    ) -> Result<u64> {
        self.unlink_batch(association, many_a.iter().map(|&a| (a, b)))
    }

    /// Remove the pairings of `a` with every key in `many_b`, in one transaction.
    pub fn unlink_multiple_b(
        &self,
        association: &'static EntityMeta,
        a: i64,
        many_b: &[i64],
    ) -> Result<u64> {
        self.unlink_batch(association, many_b.iter().map(|&b| (a, b)))
    }

    /// The association row pairing `a` with `b`. Several rows fail with `NotUnique`.
    pub fn load_for(
        &self,
        graph: &mut EntityGraph,
        association: &'static EntityMeta,
        a: i64,
        b: i64,
        options: &LoadOptions,
    ) -> Result<Option<EntityId>> {
        self.load_for_by_criteria(graph, &Criteria::new(association), a, b, options)
    }

    /// Like [`Engine::load_for`], further restricted by `criteria`.
    #[tracing::instrument(level = "debug", skip_all, fields(association = criteria.entity().name, a, b))]
    pub fn load_for_by_criteria(
        &self,
        graph: &mut EntityGraph,
        criteria: &Criteria,
        a: i64,
        b: i64,
        options: &LoadOptions,
    ) -> Result<Option<EntityId>> {
        let criteria = pair_criteria(criteria.clone(), a, b)?;
        self.load_by_criteria(graph, &criteria, options)
    }

    /// Every association row pairing `a` with `b`.
    #[tracing::instrument(level = "debug", skip_all, fields(association = association.name, a, b))]
    pub fn load_list_for(
        &self,
        graph: &mut EntityGraph,
        association: &'static EntityMeta,
        a: i64,
        b: i64,
        options: &LoadOptions,
    ) -> Result<Vec<EntityId>> {
        let criteria = pair_criteria(Criteria::new(association), a, b)?;
        self.load_list_by_criteria(graph, &criteria, options)
    }

    pub(crate) fn side_list(
        &self,
        graph: &mut EntityGraph,
        session: &mut Session,
        association: &'static EntityMeta,
        side: Side,
        id: i64,
        request: Request<'_>,
    ) -> Result<Vec<EntityId>> {
        let this_side = association.require_side(side)?;
        let other_side = association.require_side(side.opposite())?;
        let other_meta = crate::load::require_target(other_side)?;
        let criteria =
            Criteria::new(association).add(Expression::equal(association, this_side.name, Operand::Key(id))?)?;

        let nested = request.nested();
        let mut rows_request = request;
        rows_request.include.many_to_one = true;
        let rows =
            self.load_internal(graph, session, association, Some(&criteria), rows_request, false)?;

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let slot = graph.get(row).and_then(|e| e.slot(other_side.name)).cloned();
            let member = match slot {
                Some(Slot::Reference(member)) => Some(member),
                Some(Slot::Key(key)) => {
                    self.load_by_id_internal(graph, session, other_meta, key, nested)?
                }
                _ => None,
            };
            members.extend(member);
        }
        Ok(members)
    }

    /// INSERT and DELETE statements for one pairing row.
    fn pairing_sql(&self, association: &'static EntityMeta) -> Result<Pairing> {
        self.require(association)?;
        let a = quote_identifier(association.require_side(Side::A)?.require_column()?);
        let b = quote_identifier(association.require_side(Side::B)?.require_column()?);
        let table = quote_identifier(association.table);
        Ok(Pairing {
            insert: format!("INSERT INTO {} ({}, {}) VALUES (?, ?)", table, a, b),
            delete: format!("DELETE FROM {} WHERE {} = ? AND {} = ?", table, a, b),
        })
    }

    fn link_batch(
        &self,
        association: &'static EntityMeta,
        pairs: impl Iterator<Item = (i64, i64)>,
    ) -> Result<Vec<i64>> {
        let sql = self.pairing_sql(association)?.insert;
        Txn::OWNED.run(&self.conn, || {
            pairs
                .map(|(a, b)| self.conn.insert(&sql, &pair_params(a, b)))
                .collect()
        })
    }

    fn unlink_batch(
        &self,
        association: &'static EntityMeta,
        pairs: impl Iterator<Item = (i64, i64)>,
    ) -> Result<u64> {
        let sql = self.pairing_sql(association)?.delete;
        Txn::OWNED.run(&self.conn, || {
            let mut removed = 0;
            for (a, b) in pairs {
                removed += self.conn.execute(&sql, &pair_params(a, b))?;
            }
            Ok(removed)
        })
    }
}

struct Pairing {
    insert: String,
    delete: String,
}

fn pair_params(a: i64, b: i64) -> Params {
    let mut params = Params::new();
    params.push(Value::BigInt(a), BindType::Integer);
    params.push(Value::BigInt(b), BindType::Integer);
    params
}

fn pair_criteria(criteria: Criteria, a: i64, b: i64) -> Result<Criteria> {
    let association = criteria.entity();
    let side_a = association.require_side(Side::A)?;
    let side_b = association.require_side(Side::B)?;
    criteria
        .add(Expression::equal(association, side_a.name, Operand::Key(a))?)?
        .add(Expression::equal(association, side_b.name, Operand::Key(b))?)
}
