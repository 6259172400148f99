//! Criteria: the restrictions, ordering and limit of one query, and their compilation.

use crate::expr::{Expression, Param, TermPart};
use crate::join::{JoinNamer, Place};
use crate::sql::{column_ref, quote_identifier};
use crate::target::Target;
use relgraph_core::{EntityMeta, Error, Formats, Params, Result};
use std::collections::HashSet;

/// Infix operator combining the fields of an ordering group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOperator {
    And,
    Or,
    Add,
    Multiply,
}

impl GroupOperator {
    const fn as_sql(self) -> &'static str {
        match self {
            GroupOperator::And => " AND ",
            GroupOperator::Or => " OR ",
            GroupOperator::Add => " + ",
            GroupOperator::Multiply => " * ",
        }
    }
}

#[derive(Debug, Clone)]
struct OrderTerm {
    expr: Expression,
    descending: bool,
}

/// Restrictions (ANDed), ordering and limit over one entity type.
///
/// ```
/// use relgraph_core::{EntityMeta, FieldDescriptor, Formats, ScalarKind};
/// use relgraph_query::{Criteria, Expression};
///
/// static USER: EntityMeta = EntityMeta::root("User", "users", "id", &[
///     FieldDescriptor::scalar("id", "id", ScalarKind::Int),
///     FieldDescriptor::scalar("carCount", "car_count", ScalarKind::Int),
/// ]);
///
/// let criteria = Criteria::new(&USER)
///     .add(Expression::between(&USER, "carCount", 10, 50).unwrap())
///     .unwrap()
///     .order_by_descending("carCount")
///     .unwrap()
///     .limit(0, 10)
///     .unwrap();
/// let prepared = criteria.prepare(&Formats::default()).unwrap();
/// assert_eq!(prepared.where_clause, r#" WHERE ("users"."car_count" BETWEEN ? AND ?)"#);
/// assert_eq!(prepared.order_by, r#" ORDER BY "users"."car_count" DESC"#);
/// assert_eq!(prepared.limit, " LIMIT 10 OFFSET 0");
/// assert_eq!(prepared.params.types(), "ii");
/// ```
#[derive(Debug, Clone)]
pub struct Criteria {
    entity: &'static EntityMeta,
    expressions: Vec<Expression>,
    ordering: Vec<OrderTerm>,
    limit: Option<(u64, u64)>,
}

impl Criteria {
    pub fn new(entity: &'static EntityMeta) -> Self {
        Self {
            entity,
            expressions: Vec::new(),
            ordering: Vec::new(),
            limit: None,
        }
    }

    pub fn entity(&self) -> &'static EntityMeta {
        self.entity
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    pub fn has_ordering(&self) -> bool {
        !self.ordering.is_empty()
    }

    pub fn limit_value(&self) -> Option<(u64, u64)> {
        self.limit
    }

    /// Add a restriction over this criteria's entity type.
    pub fn add(mut self, expression: Expression) -> Result<Self> {
        if !expression.entity().same_as(self.entity) {
            return Err(Error::invalid_argument(format!(
                "{} expression added to {} criteria",
                expression.entity().name,
                self.entity.name
            )));
        }
        self.expressions.push(expression);
        Ok(self)
    }

    /// Add several restrictions.
    pub fn add_all(self, expressions: impl IntoIterator<Item = Expression>) -> Result<Self> {
        expressions.into_iter().try_fold(self, Criteria::add)
    }

    pub fn order_by(self, field: &str) -> Result<Self> {
        self.primary(&[field], GroupOperator::And, false)
    }

    pub fn order_by_descending(self, field: &str) -> Result<Self> {
        self.primary(&[field], GroupOperator::And, true)
    }

    /// Primary ordering on several fields combined with `op`.
    pub fn order_by_group(self, fields: &[&str], op: GroupOperator, descending: bool) -> Result<Self> {
        self.primary(fields, op, descending)
    }

    pub fn then_by(self, field: &str) -> Result<Self> {
        self.secondary(&[field], GroupOperator::And, false)
    }

    pub fn then_by_descending(self, field: &str) -> Result<Self> {
        self.secondary(&[field], GroupOperator::And, true)
    }

    pub fn then_by_group(self, fields: &[&str], op: GroupOperator, descending: bool) -> Result<Self> {
        self.secondary(fields, op, descending)
    }

    fn primary(self, fields: &[&str], op: GroupOperator, descending: bool) -> Result<Self> {
        if self.has_ordering() {
            return Err(Error::invalid_state(format!(
                "{} criteria already has a primary ordering; use then_by",
                self.entity.name
            )));
        }
        self.push_order(fields, op, descending)
    }

    fn secondary(self, fields: &[&str], op: GroupOperator, descending: bool) -> Result<Self> {
        if !self.has_ordering() {
            return Err(Error::invalid_state(format!(
                "{} criteria has no primary ordering; use order_by first",
                self.entity.name
            )));
        }
        self.push_order(fields, op, descending)
    }

    fn push_order(mut self, fields: &[&str], op: GroupOperator, descending: bool) -> Result<Self> {
        let target = Target::of(self.entity);
        let expr = match fields {
            [field] => Expression::field_ref(target, field)?,
            _ => {
                let parts = fields
                    .iter()
                    .map(|f| Expression::field_ref(target, f))
                    .collect::<Result<Vec<_>>>()?;
                Expression::join_refs(parts, op.as_sql())?
            }
        };
        self.ordering.push(OrderTerm { expr, descending });
        Ok(self)
    }

    /// Skip `offset` rows and return at most `count`. May be set once.
    pub fn limit(mut self, offset: u64, count: u64) -> Result<Self> {
        if self.limit.is_some() {
            return Err(Error::invalid_state(format!(
                "{} criteria already has a limit",
                self.entity.name
            )));
        }
        self.limit = Some((offset, count));
        Ok(self)
    }

    /// Compile into SQL fragments and bind values.
    ///
    /// The root table is referenced by its quoted name. Every call starts a fresh alias
    /// namer, so the output depends only on the criteria.
    pub fn prepare(&self, formats: &Formats) -> Result<PreparedCriteria> {
        let mut compiler = Compiler {
            root: quote_identifier(self.entity.table),
            namer: JoinNamer::new(),
            emitted: HashSet::new(),
            joins: String::new(),
        };

        let mut params = Params::new();
        let mut terms = Vec::with_capacity(self.expressions.len());
        for expr in &self.expressions {
            terms.push(format!("({})", compiler.render(expr)));
            for param in &expr.params {
                match param {
                    Param::Scalar(v) => params.push(v.to_storage(formats)?, v.bind_type()),
                    Param::Raw(v, t) => params.push(v.clone(), *t),
                }
            }
        }

        let order_terms: Vec<String> = self
            .ordering
            .iter()
            .map(|term| {
                let sql = compiler.render(&term.expr);
                if term.descending {
                    format!("{} DESC", sql)
                } else {
                    sql
                }
            })
            .collect();

        let where_clause = if terms.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", terms.join(" AND "))
        };
        let order_by = if order_terms.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", order_terms.join(", "))
        };
        let limit = self
            .limit
            .map(|(offset, count)| format!(" LIMIT {} OFFSET {}", count, offset))
            .unwrap_or_default();

        let prepared = PreparedCriteria {
            joins: compiler.joins,
            where_clause,
            order_by,
            limit,
            params,
        };
        tracing::trace!(
            entity = self.entity.name,
            joins = %prepared.joins,
            where_clause = %prepared.where_clause,
            "prepared criteria"
        );
        Ok(prepared)
    }
}

struct Compiler {
    root: String,
    namer: JoinNamer,
    emitted: HashSet<String>,
    joins: String,
}

impl Compiler {
    /// Render an expression's term, emitting any join not emitted yet.
    fn render(&mut self, expr: &Expression) -> String {
        let mut aliases: Vec<String> = Vec::with_capacity(expr.joins.len());
        for step in &expr.joins {
            let base = self.qualifier(step.base, &aliases);
            let (alias, _) =
                self.namer
                    .alias(step.table, step.kind, &base, step.base_column, step.join_column);
            if self.emitted.insert(alias.clone()) {
                self.joins.push_str(&format!(
                    " {} {} AS {} ON {} = {}",
                    step.kind.as_str(),
                    quote_identifier(step.table),
                    alias,
                    column_ref(&alias, step.join_column),
                    column_ref(&base, step.base_column)
                ));
            }
            aliases.push(alias);
        }

        let mut out = String::new();
        for part in &expr.term {
            match part {
                TermPart::Sql(s) => out.push_str(s),
                TermPart::Column { place, column } => {
                    out.push_str(&column_ref(&self.qualifier(*place, &aliases), column));
                }
            }
        }
        out
    }

    fn qualifier(&self, place: Place, aliases: &[String]) -> String {
        match place {
            Place::Root => self.root.clone(),
            Place::Join(i) => aliases.get(i).cloned().unwrap_or_else(|| self.root.clone()),
        }
    }
}

/// Compiled criteria. Each clause carries its leading keyword and a leading space, and is
/// empty when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCriteria {
    pub joins: String,
    pub where_clause: String,
    pub order_by: String,
    pub limit: String,
    pub params: Params,
}

impl PreparedCriteria {
    /// Joins, WHERE, ORDER BY and LIMIT in statement order.
    pub fn clauses(&self) -> String {
        format!("{}{}{}{}", self.joins, self.where_clause, self.order_by, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Operand;
    use relgraph_core::{
        BindType, Entity, EntityGraph, ErrorKind, FieldDescriptor, ScalarKind, Side, Value,
    };

    static ADDRESS: EntityMeta = EntityMeta::root(
        "Address",
        "addresses",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::scalar("city", "city", ScalarKind::Text),
        ],
    );

    static USER: EntityMeta = EntityMeta::root(
        "User",
        "users",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::scalar("username", "username", ScalarKind::Text),
            FieldDescriptor::scalar("carCount", "car_count", ScalarKind::Int),
            FieldDescriptor::scalar("cash", "cash", ScalarKind::Float),
            FieldDescriptor::scalar("born", "born", ScalarKind::Date),
            FieldDescriptor::many_to_one("address", "address_id", || &ADDRESS),
            FieldDescriptor::many_to_many("powers", || &HERO_POWER, Side::A),
        ],
    );

    static STUDENT: EntityMeta = EntityMeta::sub(
        "Student",
        "students",
        "user",
        &[
            FieldDescriptor::parent_link("user", "user_id", || &USER),
            FieldDescriptor::scalar("school", "school", ScalarKind::Text),
        ],
    );

    static POWER: EntityMeta = EntityMeta::root(
        "Power",
        "powers",
        "id",
        &[FieldDescriptor::scalar("id", "id", ScalarKind::Int)],
    );

    static HERO_POWER: EntityMeta = EntityMeta::association(
        "HeroPower",
        "hero_powers",
        "id",
        "hero",
        "power",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::many_to_one("hero", "hero_id", || &USER),
            FieldDescriptor::many_to_one("power", "power_id", || &POWER),
        ],
    );

    fn prepare(criteria: &Criteria) -> PreparedCriteria {
        criteria.prepare(&Formats::default()).unwrap()
    }

    #[test]
    fn scalar_comparisons() {
        let criteria = Criteria::new(&USER)
            .add(Expression::equal(&USER, "username", "Gordon").unwrap())
            .unwrap()
            .add(Expression::above(&USER, "cash", 10).unwrap())
            .unwrap()
            .add(Expression::equal(&USER, "address", Operand::Null).unwrap())
            .unwrap();
        let prepared = prepare(&criteria);
        assert_eq!(prepared.joins, "");
        assert_eq!(
            prepared.where_clause,
            r#" WHERE ("users"."username" = ?) AND ("users"."cash" >= ?) AND ("users"."address_id" IS NULL)"#
        );
        assert_eq!(prepared.params.types(), "sd");
        assert_eq!(
            prepared.params.values(),
            &[Value::Text("Gordon".to_string()), Value::Double(10.0)]
        );
    }

    #[test]
    fn many_to_one_compares_the_key_column() {
        let expr = Expression::equal(&USER, "address", Operand::Key(1)).unwrap();
        let prepared = prepare(&Criteria::new(&USER).add(expr).unwrap());
        assert_eq!(prepared.where_clause, r#" WHERE ("users"."address_id" = ?)"#);
        assert_eq!(prepared.params.values(), &[Value::BigInt(1)]);
    }

    #[test]
    fn like_patterns_are_escaped() {
        let criteria = Criteria::new(&USER)
            .add(Expression::contains(&USER, "username", "50%").unwrap())
            .unwrap()
            .add(Expression::starts_with(&USER, "username", "A").unwrap())
            .unwrap()
            .add(Expression::ends_with(&USER, "username", "do").unwrap())
            .unwrap();
        let prepared = prepare(&criteria);
        assert_eq!(
            prepared.where_clause,
            r#" WHERE ("users"."username" LIKE ? ESCAPE '\') AND ("users"."username" LIKE ? ESCAPE '\') AND ("users"."username" LIKE ? ESCAPE '\')"#
        );
        assert_eq!(
            prepared.params.values(),
            &[
                Value::Text("%50\\%%".to_string()),
                Value::Text("A%".to_string()),
                Value::Text("%do".to_string()),
            ]
        );
    }

    #[test]
    fn wrong_field_kinds_are_rejected() {
        let err = Expression::contains(&USER, "carCount", "1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFieldType);
        let err = Expression::between(&USER, "username", 1, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFieldType);
        let err = Expression::after_now(&USER, "cash").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFieldType);
        let err = Expression::equal(&USER, "powers", Operand::Key(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFieldType);
    }

    #[test]
    fn temporal_comparisons() {
        let expr = Expression::before_now(&USER, "born").unwrap();
        let prepared = prepare(&Criteria::new(&USER).add(expr).unwrap());
        assert_eq!(prepared.where_clause, r#" WHERE ("users"."born" < CURRENT_DATE)"#);
        assert!(prepared.params.is_empty());

        let low = chrono::NaiveDate::from_ymd_opt(1960, 1, 1).unwrap();
        let expr = Expression::above(&USER, "born", low).unwrap();
        let prepared = prepare(&Criteria::new(&USER).add(expr).unwrap());
        assert_eq!(prepared.params.values(), &[Value::Text("1960-01-01".to_string())]);
    }

    #[test]
    fn shared_joins_are_emitted_once() {
        let criteria = Criteria::new(&STUDENT)
            .add(Expression::equal(&STUDENT, "username", "Eli").unwrap())
            .unwrap()
            .add(Expression::above(&STUDENT, "carCount", 1).unwrap())
            .unwrap()
            .order_by("username")
            .unwrap();
        let prepared = prepare(&criteria);
        assert_eq!(
            prepared.joins,
            r#" INNER JOIN "users" AS J1 ON J1."id" = "students"."user_id""#
        );
        assert_eq!(
            prepared.where_clause,
            r#" WHERE (J1."username" = ?) AND (J1."car_count" >= ?)"#
        );
        assert_eq!(prepared.order_by, r#" ORDER BY J1."username""#);
    }

    #[test]
    fn sub_type_predicates_join_down() {
        let target = Target::of(&USER).via(&STUDENT);
        let criteria = Criteria::new(&USER)
            .add(Expression::equal(target, "school", "MIT").unwrap())
            .unwrap();
        let prepared = prepare(&criteria);
        assert_eq!(
            prepared.joins,
            r#" INNER JOIN "students" AS J1 ON J1."user_id" = "users"."id""#
        );
        assert_eq!(prepared.where_clause, r#" WHERE (J1."school" = ?)"#);
    }

    #[test]
    fn prepare_is_deterministic() {
        let criteria = Criteria::new(&STUDENT)
            .add(Expression::equal(&STUDENT, "username", "Eli").unwrap())
            .unwrap()
            .limit(5, 10)
            .unwrap();
        assert_eq!(prepare(&criteria), prepare(&criteria));
        assert_eq!(prepare(&criteria).clauses(), prepare(&criteria.clone()).clauses());
    }

    #[test]
    fn any_and_all_group_terms() {
        let gordon = Expression::equal(&USER, "username", "Gordon").unwrap();
        let rich = Expression::all([
            Expression::above(&USER, "cash", 40.0).unwrap(),
            Expression::below(&USER, "carCount", 5).unwrap(),
        ])
        .unwrap();
        let either = Expression::any([gordon, rich]).unwrap();
        let prepared = prepare(&Criteria::new(&USER).add(either).unwrap());
        assert_eq!(
            prepared.where_clause,
            r#" WHERE ((("users"."username" = ?) OR ((("users"."cash" >= ?) AND ("users"."car_count" <= ?)))))"#
        );
        assert_eq!(prepared.params.types(), "sdi");

        assert_eq!(
            Expression::any(Vec::new()).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        let mixed = Expression::any([
            Expression::equal(&USER, "username", "x").unwrap(),
            Expression::equal(&ADDRESS, "city", "y").unwrap(),
        ]);
        assert_eq!(mixed.unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn equal_entity_by_key_or_by_fields() {
        let mut graph = EntityGraph::new();
        let keyed = graph.insert(Entity::new(&ADDRESS).with("id", 1_i64).unwrap());
        let exprs = Expression::equal_entity(&USER, "address", &graph, keyed).unwrap();
        assert_eq!(exprs.len(), 1);
        let prepared = prepare(&Criteria::new(&USER).add_all(exprs).unwrap());
        assert_eq!(prepared.where_clause, r#" WHERE ("users"."address_id" = ?)"#);

        let described = graph.insert(Entity::new(&ADDRESS).with("city", "Rapture").unwrap());
        let exprs = Expression::equal_entity(&USER, "address", &graph, described).unwrap();
        let prepared = prepare(&Criteria::new(&USER).add_all(exprs).unwrap());
        assert_eq!(
            prepared.joins,
            r#" INNER JOIN "addresses" AS J1 ON J1."id" = "users"."address_id""#
        );
        assert_eq!(prepared.where_clause, r#" WHERE (J1."city" = ?)"#);

        let empty = graph.insert(Entity::new(&ADDRESS));
        let err = Expression::equal_entity(&USER, "address", &graph, empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn custom_terms_check_placeholders() {
        let expr = Expression::custom(
            &USER,
            r#""users"."car_count" % ? = 0"#,
            [(Value::BigInt(2), BindType::Integer)],
        )
        .unwrap();
        let prepared = prepare(&Criteria::new(&USER).add(expr).unwrap());
        assert_eq!(prepared.where_clause, r#" WHERE ("users"."car_count" % ? = 0)"#);
        assert_eq!(prepared.params.types(), "i");

        let err = Expression::custom(&USER, "1 = ?", Vec::<(Value, BindType)>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn is_not_in_uses_a_correlated_subquery() {
        let expr = Expression::is_not_in(&USER, &HERO_POWER, Side::A).unwrap();
        let prepared = prepare(&Criteria::new(&USER).add(expr).unwrap());
        assert_eq!(
            prepared.where_clause,
            r#" WHERE (NOT EXISTS (SELECT 1 FROM "hero_powers" WHERE "hero_powers"."hero_id" = "users"."id"))"#
        );
        let err = Expression::is_not_in(&USER, &HERO_POWER, Side::B).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn ordering_rules() {
        let criteria = Criteria::new(&USER)
            .order_by_group(&["carCount", "cash"], GroupOperator::Add, true)
            .unwrap()
            .then_by("username")
            .unwrap();
        assert_eq!(
            prepare(&criteria).order_by,
            r#" ORDER BY ("users"."car_count" + "users"."cash") DESC, "users"."username""#
        );

        let err = criteria.clone().order_by("id").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = Criteria::new(&USER).then_by("id").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = Criteria::new(&USER)
            .limit(0, 1)
            .unwrap()
            .limit(0, 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn mixed_entity_expressions_are_rejected() {
        let expr = Expression::equal(&ADDRESS, "city", "Rapture").unwrap();
        let err = Criteria::new(&USER).add(expr).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
