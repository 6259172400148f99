//! Restriction expressions.
//!
//! An [`Expression`] is a boolean SQL term over one entity type together with the joins
//! it needs and its bind values. Columns inside the term are kept symbolic
//! ([`Place`] + column) until [`Criteria::prepare`](crate::Criteria::prepare) assigns
//! join aliases, so expressions built independently share aliases when they need the
//! same join.
//!
//! Factories return `Result`: a field of the wrong kind is an
//! [`Error::UnsupportedFieldType`], bad arguments are [`Error::InvalidArgument`].

use crate::join::{JoinKind, JoinStep, Place};
use crate::sql::{count_placeholders, escape_like};
use crate::target::{Resolved, Target, resolve};
use relgraph_core::{
    BindType, EntityGraph, EntityId, EntityMeta, Error, FieldKind, Result, ScalarKind, ScalarValue,
    Side, Slot, Value,
};

/// Right-hand side of [`Expression::equal`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    Value(ScalarValue),
    /// A foreign key, for many-to-one and parent-link fields.
    Key(i64),
}

impl From<ScalarValue> for Operand {
    fn from(v: ScalarValue) -> Self {
        Operand::Value(v)
    }
}

impl From<Option<ScalarValue>> for Operand {
    fn from(v: Option<ScalarValue>) -> Self {
        v.map_or(Operand::Null, Operand::Value)
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Value(v.into())
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::Value(v.into())
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Value(v.into())
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Value(v.into())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Value(v.into())
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Value(v.into())
    }
}

/// A bind value. Scalars are converted with the engine's formats at prepare time.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(ScalarValue),
    Raw(Value, BindType),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TermPart {
    Sql(String),
    Column { place: Place, column: &'static str },
}

/// A boolean term over one entity type.
#[derive(Debug, Clone)]
pub struct Expression {
    pub(crate) entity: &'static EntityMeta,
    pub(crate) joins: Vec<JoinStep>,
    pub(crate) term: Vec<TermPart>,
    pub(crate) params: Vec<Param>,
}

impl Expression {
    fn new(entity: &'static EntityMeta, joins: Vec<JoinStep>) -> Self {
        Self {
            entity,
            joins,
            term: Vec::new(),
            params: Vec::new(),
        }
    }

    fn sql(mut self, fragment: impl Into<String>) -> Self {
        match self.term.last_mut() {
            Some(TermPart::Sql(s)) => s.push_str(&fragment.into()),
            _ => self.term.push(TermPart::Sql(fragment.into())),
        }
        self
    }

    fn column(mut self, place: Place, column: &'static str) -> Self {
        self.term.push(TermPart::Column { place, column });
        self
    }

    fn bind(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Append another expression's term and binds, moving its joins after ours.
    fn absorb(mut self, other: Expression) -> Self {
        let offset = self.joins.len();
        self.joins.extend(other.joins.iter().map(|j| j.rebase(offset)));
        for part in other.term {
            self = match part {
                TermPart::Sql(s) => self.sql(s),
                TermPart::Column { place, column } => self.column(place.rebase(offset), column),
            };
        }
        self.params.extend(other.params);
        self
    }

    /// The entity type this expression restricts.
    pub fn entity(&self) -> &'static EntityMeta {
        self.entity
    }

    pub fn joins(&self) -> &[JoinStep] {
        &self.joins
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Compare a field with a value. `Null` compiles to `IS NULL`; many-to-one and
    /// parent-link fields compare their foreign-key column.
    pub fn equal(target: impl Into<Target>, field: &str, value: impl Into<Operand>) -> Result<Self> {
        let target = target.into();
        let (expr, r) = start(target, field)?;
        let column = r.field.require_column().map_err(|_| unsupported(&r, "equal"))?;
        let expr = expr.column(r.place, column);
        match (r.field.kind, value.into()) {
            (_, Operand::Null) => Ok(expr.sql(" IS NULL")),
            (FieldKind::Scalar(kind), Operand::Value(v)) => {
                Ok(expr.sql(" = ?").bind(Param::Scalar(kind.coerce(v)?)))
            }
            (FieldKind::Scalar(kind), Operand::Key(k)) => {
                Ok(expr.sql(" = ?").bind(Param::Scalar(kind.coerce(ScalarValue::Int(k))?)))
            }
            (FieldKind::ManyToOne | FieldKind::ParentLink, Operand::Key(k)) => {
                Ok(expr.sql(" = ?").bind(Param::Scalar(ScalarValue::Int(k))))
            }
            (FieldKind::ManyToOne | FieldKind::ParentLink, Operand::Value(v)) => {
                let key = v.as_i64().ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "{}.{} compares against a key, got a {} value",
                        r.owner.name,
                        r.field.name,
                        v.kind().name()
                    ))
                })?;
                Ok(expr.sql(" = ?").bind(Param::Scalar(ScalarValue::Int(key))))
            }
            _ => Err(unsupported(&r, "equal")),
        }
    }

    /// Compare a many-to-one or parent-link field with an entity of `graph`.
    ///
    /// When the entity carries nothing but its key, this is one foreign-key comparison.
    /// Otherwise every non-null scalar field of the entity (its parent chain included)
    /// yields one expression joined through the relationship.
    pub fn equal_entity(
        target: impl Into<Target>,
        field: &str,
        graph: &EntityGraph,
        entity: EntityId,
    ) -> Result<Vec<Self>> {
        let target = target.into();
        let mut joins = Vec::new();
        let r = resolve(target, Place::Root, field, &mut joins)?;
        if !matches!(r.field.kind, FieldKind::ManyToOne | FieldKind::ParentLink) {
            return Err(unsupported(&r, "equal_entity"));
        }
        let related = r.field.target().ok_or_else(|| unsupported(&r, "equal_entity"))?;
        let instance = graph.get(entity).ok_or_else(|| {
            Error::invalid_argument(format!("no entity {:?} in this graph", entity))
        })?;
        if !instance.meta().is_or_extends(related) {
            return Err(Error::invalid_argument(format!(
                "{}.{} refers to {}, not {}",
                r.owner.name,
                r.field.name,
                related.name,
                instance.meta().name
            )));
        }

        let values = scalar_values(graph, entity);
        let key = graph.identity(entity);
        let key_only = values
            .iter()
            .all(|(owner, name, _)| owner.primary_key().is_some_and(|pk| pk.name == *name));
        if key_only {
            let key = key.ok_or_else(|| {
                Error::invalid_argument(format!(
                    "{} entity has neither a key nor field values to compare",
                    instance.meta().name
                ))
            })?;
            return Ok(vec![Self::equal(target, field, Operand::Key(key))?]);
        }

        let fk_column = r.field.require_column()?;
        joins.push(JoinStep {
            table: related.table,
            kind: JoinKind::Inner,
            base: r.place,
            base_column: fk_column,
            join_column: related.id_column()?,
        });
        let related_place = Place::Join(joins.len() - 1);
        let related_target = Target::of(related).via(instance.meta());

        values
            .into_iter()
            .map(|(_, name, value)| {
                let mut expr_joins = joins.clone();
                let inner = resolve(related_target, related_place, name, &mut expr_joins)?;
                let column = inner.field.require_column()?;
                Ok(Expression::new(target.meta, expr_joins)
                    .column(inner.place, column)
                    .sql(" = ?")
                    .bind(Param::Scalar(value)))
            })
            .collect()
    }

    /// `field >= value`, for numeric and temporal fields.
    pub fn above(target: impl Into<Target>, field: &str, value: impl Into<ScalarValue>) -> Result<Self> {
        let (expr, r, kind) = ordered(target.into(), field, "above")?;
        let column = r.field.require_column()?;
        Ok(expr
            .column(r.place, column)
            .sql(" >= ?")
            .bind(Param::Scalar(kind.coerce(value.into())?)))
    }

    /// `field <= value`, for numeric and temporal fields.
    pub fn below(target: impl Into<Target>, field: &str, value: impl Into<ScalarValue>) -> Result<Self> {
        let (expr, r, kind) = ordered(target.into(), field, "below")?;
        let column = r.field.require_column()?;
        Ok(expr
            .column(r.place, column)
            .sql(" <= ?")
            .bind(Param::Scalar(kind.coerce(value.into())?)))
    }

    /// `field BETWEEN low AND high`, inclusive.
    pub fn between(
        target: impl Into<Target>,
        field: &str,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> Result<Self> {
        let (expr, r, kind) = ordered(target.into(), field, "between")?;
        let column = r.field.require_column()?;
        Ok(expr
            .column(r.place, column)
            .sql(" BETWEEN ? AND ?")
            .bind(Param::Scalar(kind.coerce(low.into())?))
            .bind(Param::Scalar(kind.coerce(high.into())?)))
    }

    /// Temporal field later than the database's current date/time.
    pub fn after_now(target: impl Into<Target>, field: &str) -> Result<Self> {
        now(target.into(), field, ">", "after_now")
    }

    /// Temporal field earlier than the database's current date/time.
    pub fn before_now(target: impl Into<Target>, field: &str) -> Result<Self> {
        now(target.into(), field, "<", "before_now")
    }

    pub fn contains(target: impl Into<Target>, field: &str, needle: &str) -> Result<Self> {
        like(target.into(), field, format!("%{}%", escape_like(needle)), "contains")
    }

    pub fn starts_with(target: impl Into<Target>, field: &str, needle: &str) -> Result<Self> {
        like(target.into(), field, format!("{}%", escape_like(needle)), "starts_with")
    }

    pub fn ends_with(target: impl Into<Target>, field: &str, needle: &str) -> Result<Self> {
        like(target.into(), field, format!("%{}", escape_like(needle)), "ends_with")
    }

    /// OR of the given expressions, which must restrict the same entity type.
    pub fn any(expressions: impl IntoIterator<Item = Expression>) -> Result<Self> {
        group(expressions, " OR ", "any")
    }

    /// AND of the given expressions as one parenthesized term.
    pub fn all(expressions: impl IntoIterator<Item = Expression>) -> Result<Self> {
        group(expressions, " AND ", "all")
    }

    /// A raw SQL term. Columns of the queried table are referenced as
    /// `"<table>"."<column>"`. The number of `?` placeholders must match `binds`.
    pub fn custom(
        meta: &'static EntityMeta,
        term: &str,
        binds: impl IntoIterator<Item = (Value, BindType)>,
    ) -> Result<Self> {
        let binds: Vec<_> = binds.into_iter().collect();
        let placeholders = count_placeholders(term);
        if placeholders != binds.len() {
            return Err(Error::invalid_argument(format!(
                "custom term has {} placeholders but {} binds",
                placeholders,
                binds.len()
            )));
        }
        let mut expr = Expression::new(meta, Vec::new()).sql(term);
        expr.params = binds.into_iter().map(|(v, t)| Param::Raw(v, t)).collect();
        Ok(expr)
    }

    /// Rows of `meta` that no row of `association` links on `side`.
    pub fn is_not_in(
        meta: &'static EntityMeta,
        association: &'static EntityMeta,
        side: Side,
    ) -> Result<Self> {
        let side_field = association.require_side(side)?;
        if !side_field.target().is_some_and(|t| meta.is_or_extends(t)) {
            return Err(Error::invalid_argument(format!(
                "side {:?} of {} does not refer to {}",
                side, association.name, meta.name
            )));
        }
        let table = crate::sql::quote_identifier(association.table);
        let side_column = crate::sql::column_ref(&table, side_field.require_column()?);
        Ok(Expression::new(meta, Vec::new())
            .sql(format!(
                "NOT EXISTS (SELECT 1 FROM {} WHERE {} = ",
                table, side_column
            ))
            .column(Place::Root, meta.id_column()?)
            .sql(")"))
    }

    /// Column reference used by ordering, with the joins needed to reach it.
    pub(crate) fn field_ref(target: Target, field: &str) -> Result<Self> {
        let (expr, r) = start(target, field)?;
        let column = r.field.require_column().map_err(|_| unsupported(&r, "order"))?;
        Ok(expr.column(r.place, column))
    }

    pub(crate) fn join_refs(parts: Vec<Expression>, separator: &str) -> Result<Self> {
        let mut parts = parts.into_iter();
        let first = parts
            .next()
            .ok_or_else(|| Error::invalid_argument("a field group needs at least one field"))?;
        let mut expr = Expression::new(first.entity, Vec::new()).sql("(").absorb(first);
        for part in parts {
            expr = expr.sql(separator).absorb(part);
        }
        Ok(expr.sql(")"))
    }
}

fn start(target: Target, field: &str) -> Result<(Expression, Resolved)> {
    let mut joins = Vec::new();
    let resolved = resolve(target, Place::Root, field, &mut joins)?;
    Ok((Expression::new(target.meta, joins), resolved))
}

fn unsupported(r: &Resolved, operation: &'static str) -> Error {
    Error::unsupported_field(r.owner.name, r.field.name, r.field.kind.name(), operation)
}

fn ordered(
    target: Target,
    field: &str,
    operation: &'static str,
) -> Result<(Expression, Resolved, ScalarKind)> {
    let (expr, r) = start(target, field)?;
    match r.field.scalar_kind() {
        Some(kind) if kind.is_numeric() || kind.is_temporal() => Ok((expr, r, kind)),
        _ => Err(unsupported(&r, operation)),
    }
}

fn now(target: Target, field: &str, op: &str, operation: &'static str) -> Result<Expression> {
    let (expr, r) = start(target, field)?;
    let current = match r.field.scalar_kind() {
        Some(ScalarKind::Date) => "CURRENT_DATE",
        Some(ScalarKind::Time) => "CURRENT_TIME",
        Some(ScalarKind::DateTime) => "CURRENT_TIMESTAMP",
        _ => return Err(unsupported(&r, operation)),
    };
    let column = r.field.require_column()?;
    Ok(expr.column(r.place, column).sql(format!(" {} {}", op, current)))
}

fn like(target: Target, field: &str, pattern: String, operation: &'static str) -> Result<Expression> {
    let (expr, r) = start(target, field)?;
    if !r.field.scalar_kind().is_some_and(ScalarKind::is_textual) {
        return Err(unsupported(&r, operation));
    }
    let column = r.field.require_column()?;
    Ok(expr
        .column(r.place, column)
        .sql(" LIKE ? ESCAPE '\\'")
        .bind(Param::Raw(Value::Text(pattern), BindType::Text)))
}

fn group(
    expressions: impl IntoIterator<Item = Expression>,
    separator: &str,
    operation: &str,
) -> Result<Expression> {
    let mut expressions = expressions.into_iter();
    let first = expressions.next().ok_or_else(|| {
        Error::invalid_argument(format!("{} needs at least one expression", operation))
    })?;
    let entity = first.entity;
    let mut out = Expression::new(entity, Vec::new()).sql("((").absorb(first);
    for expr in expressions {
        if !expr.entity.same_as(entity) {
            return Err(Error::invalid_argument(format!(
                "{} mixes {} and {} expressions",
                operation, entity.name, expr.entity.name
            )));
        }
        out = out.sql(format!("){}(", separator)).absorb(expr);
    }
    Ok(out.sql("))"))
}

/// Non-null scalar field values of an entity and its materialized ancestors.
fn scalar_values(
    graph: &EntityGraph,
    entity: EntityId,
) -> Vec<(&'static EntityMeta, &'static str, ScalarValue)> {
    let mut values = Vec::new();
    let mut current = Some(entity);
    while let Some(id) = current {
        let Some(instance) = graph.get(id) else {
            break;
        };
        for (descriptor, slot) in instance.fields() {
            if let Slot::Scalar(value) = slot {
                values.push((instance.meta(), descriptor.name, value.clone()));
            }
        }
        current = graph.parent(id);
    }
    values
}
