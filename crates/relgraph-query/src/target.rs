//! Resolution of a field name to the table that stores it.
//!
//! A field may be declared on the queried type, on one of its ancestors (reached by
//! joining up the parent-link chain) or, when a sub-type is named with
//! [`Target::via`], on that sub-type or anything between it and the queried type
//! (reached by joining down the chain first).

use crate::join::{JoinKind, JoinStep, Place};
use relgraph_core::{EntityMeta, Error, FieldDescriptor, Result};

/// The queried type, optionally narrowed to one of its sub-types.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub meta: &'static EntityMeta,
    pub via: Option<&'static EntityMeta>,
}

impl Target {
    pub const fn of(meta: &'static EntityMeta) -> Self {
        Self { meta, via: None }
    }

    /// Resolve fields through `sub`, which must extend the queried type.
    pub const fn via(mut self, sub: &'static EntityMeta) -> Self {
        self.via = Some(sub);
        self
    }
}

impl From<&'static EntityMeta> for Target {
    fn from(meta: &'static EntityMeta) -> Self {
        Target::of(meta)
    }
}

/// Where a resolved field is stored.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    /// Type that declares the field.
    pub owner: &'static EntityMeta,
    pub field: &'static FieldDescriptor,
    pub place: Place,
}

/// Resolve `field` starting from `target` placed at `base`, appending the joins needed
/// to reach its table.
pub(crate) fn resolve(
    target: Target,
    base: Place,
    field: &str,
    joins: &mut Vec<JoinStep>,
) -> Result<Resolved> {
    let mut visited: Vec<(&'static EntityMeta, Place)> = vec![(target.meta, base)];

    if let Some(sub) = target.via.filter(|sub| !sub.same_as(target.meta)) {
        if !sub.is_or_extends(target.meta) {
            return Err(Error::invalid_argument(format!(
                "{} does not extend {}",
                sub.name, target.meta.name
            )));
        }
        let mut down: Vec<&'static EntityMeta> = sub
            .chain()
            .take_while(|m| !m.same_as(target.meta))
            .collect();
        down.reverse();

        let (mut parent, mut place) = (target.meta, base);
        for child in down {
            let link = child
                .parent_link()
                .ok_or_else(|| Error::invalid_argument(format!("{} has no parent link", child.name)))?;
            joins.push(JoinStep {
                table: child.table,
                kind: JoinKind::Inner,
                base: place,
                base_column: parent.id_column()?,
                join_column: link.require_column()?,
            });
            place = Place::Join(joins.len() - 1);
            visited.push((child, place));
            parent = child;
        }
    }

    let start = target.via.unwrap_or(target.meta);
    let mut previous: Option<(&'static EntityMeta, Place)> = None;
    for current in start.chain() {
        let place = match visited.iter().find(|(m, _)| m.same_as(current)) {
            Some((_, place)) => *place,
            None => {
                let Some((child, child_place)) = previous else {
                    return Err(Error::invalid_argument(format!(
                        "{} cannot be reached from {}",
                        current.name, target.meta.name
                    )));
                };
                let link = child.parent_link().ok_or_else(|| {
                    Error::invalid_argument(format!("{} has no parent link", child.name))
                })?;
                joins.push(JoinStep {
                    table: current.table,
                    kind: JoinKind::Inner,
                    base: child_place,
                    base_column: link.require_column()?,
                    join_column: current.id_column()?,
                });
                Place::Join(joins.len() - 1)
            }
        };
        if let Some(descriptor) = current.field(field) {
            return Ok(Resolved {
                owner: current,
                field: descriptor,
                place,
            });
        }
        previous = Some((current, place));
    }

    Err(Error::invalid_argument(format!(
        "{} has no field '{}'",
        start.name, field
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_core::{ErrorKind, FieldDescriptor, ScalarKind};

    static PERSON: EntityMeta = EntityMeta::root(
        "Person",
        "persons",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::scalar("name", "name", ScalarKind::Text),
        ],
    );

    static EMPLOYEE: EntityMeta = EntityMeta::sub(
        "Employee",
        "employees",
        "person",
        &[
            FieldDescriptor::parent_link("person", "person_id", || &PERSON),
            FieldDescriptor::scalar("salary", "salary", ScalarKind::Float),
        ],
    );

    static MANAGER: EntityMeta = EntityMeta::sub(
        "Manager",
        "managers",
        "employee",
        &[
            FieldDescriptor::parent_link("employee", "employee_id", || &EMPLOYEE),
            FieldDescriptor::scalar("level", "level", ScalarKind::Int),
        ],
    );

    #[test]
    fn own_field_needs_no_join() {
        let mut joins = Vec::new();
        let r = resolve(Target::of(&PERSON), Place::Root, "name", &mut joins).unwrap();
        assert_eq!(r.place, Place::Root);
        assert_eq!(r.owner.name, "Person");
        assert!(joins.is_empty());
    }

    #[test]
    fn inherited_field_joins_up() {
        let mut joins = Vec::new();
        let r = resolve(Target::of(&MANAGER), Place::Root, "name", &mut joins).unwrap();
        assert_eq!(r.owner.name, "Person");
        assert_eq!(r.place, Place::Join(1));
        assert_eq!(
            joins,
            vec![
                JoinStep {
                    table: "employees",
                    kind: JoinKind::Inner,
                    base: Place::Root,
                    base_column: "employee_id",
                    join_column: "person_id",
                },
                JoinStep {
                    table: "persons",
                    kind: JoinKind::Inner,
                    base: Place::Join(0),
                    base_column: "person_id",
                    join_column: "id",
                },
            ]
        );
    }

    #[test]
    fn sub_type_field_joins_down() {
        let mut joins = Vec::new();
        let target = Target::of(&PERSON).via(&MANAGER);
        let r = resolve(target, Place::Root, "level", &mut joins).unwrap();
        assert_eq!(r.owner.name, "Manager");
        assert_eq!(r.place, Place::Join(1));
        assert_eq!(joins[0].table, "employees");
        assert_eq!((joins[0].base_column, joins[0].join_column), ("id", "person_id"));
        assert_eq!(joins[1].table, "managers");
        assert_eq!(joins[1].base, Place::Join(0));
        assert_eq!((joins[1].base_column, joins[1].join_column), ("person_id", "employee_id"));

        let mut joins = Vec::new();
        let r = resolve(target, Place::Root, "name", &mut joins).unwrap();
        assert_eq!(r.place, Place::Root);
        assert_eq!(joins.len(), 2);
    }

    #[test]
    fn unknown_fields_and_unrelated_sub_types_fail() {
        let mut joins = Vec::new();
        let err = resolve(Target::of(&EMPLOYEE), Place::Root, "level", &mut joins).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = resolve(Target::of(&MANAGER).via(&PERSON), Place::Root, "name", &mut joins)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
