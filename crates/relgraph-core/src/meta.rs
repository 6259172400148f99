//! Static entity metadata.
//!
//! Each entity type is described by one `static` [`EntityMeta`]: its table, its
//! [`EntityShape`] and an ordered slice of [`FieldDescriptor`]s. Related types are
//! referenced through `fn() -> &'static EntityMeta` pointers so that statics may refer
//! to each other in both directions.
//!
//! ```
//! use relgraph_core::{EntityMeta, FieldDescriptor, ScalarKind};
//!
//! static ADDRESS: EntityMeta = EntityMeta::root("Address", "addresses", "id", &[
//!     FieldDescriptor::scalar("id", "id", ScalarKind::Int),
//!     FieldDescriptor::scalar("city", "city", ScalarKind::Text),
//!     FieldDescriptor::one_to_many("users", || &USER, "address"),
//! ]);
//!
//! static USER: EntityMeta = EntityMeta::root("User", "users", "id", &[
//!     FieldDescriptor::scalar("id", "id", ScalarKind::Int),
//!     FieldDescriptor::scalar("username", "username", ScalarKind::Text),
//!     FieldDescriptor::many_to_one("address", "address_id", || &ADDRESS),
//! ]);
//!
//! assert_eq!(USER.field("address").unwrap().target().unwrap().name, "Address");
//! assert_eq!(ADDRESS.default_fields(), vec!["id", "city", "users"]);
//! ```

use crate::error::{Error, Result};
use crate::scalar::ScalarKind;
use std::fmt;

/// Resolves a related entity type.
pub type MetaFn = fn() -> &'static EntityMeta;

/// One of the two sides of an association entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// What a field stores and how it relates to other entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Foreign key column referencing another entity's identity.
    ManyToOne,
    /// Collection of entities whose owning many-to-one field points back here.
    OneToMany,
    /// Collection reached through an association entity.
    ManyToMany,
    /// Foreign key column linking a sub-entity row to its immediate parent row.
    ParentLink,
}

impl FieldKind {
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Scalar(_) => "scalar",
            FieldKind::ManyToOne => "many-to-one",
            FieldKind::OneToMany => "one-to-many",
            FieldKind::ManyToMany => "many-to-many",
            FieldKind::ParentLink => "parent-link",
        }
    }

    /// Fields stored in a column of the entity's own table.
    pub const fn has_column(self) -> bool {
        matches!(
            self,
            FieldKind::Scalar(_) | FieldKind::ManyToOne | FieldKind::ParentLink
        )
    }

    pub const fn is_collection(self) -> bool {
        matches!(self, FieldKind::OneToMany | FieldKind::ManyToMany)
    }
}

/// A single declared field.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Storage column (scalar, many-to-one, parent-link).
    pub column: Option<&'static str>,
    /// Related type. For many-to-many this is the association entity.
    pub target: Option<MetaFn>,
    /// Many-to-one field on the target that owns a one-to-many relation.
    pub owning_field: Option<&'static str>,
    /// Side this entity occupies in a many-to-many association.
    pub side: Option<Side>,
    /// Excluded from the default field list.
    pub hidden: bool,
}

impl FieldDescriptor {
    pub const fn scalar(name: &'static str, column: &'static str, kind: ScalarKind) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar(kind),
            column: Some(column),
            target: None,
            owning_field: None,
            side: None,
            hidden: false,
        }
    }

    pub const fn many_to_one(name: &'static str, column: &'static str, target: MetaFn) -> Self {
        Self {
            name,
            kind: FieldKind::ManyToOne,
            column: Some(column),
            target: Some(target),
            owning_field: None,
            side: None,
            hidden: false,
        }
    }

    pub const fn one_to_many(
        name: &'static str,
        target: MetaFn,
        owning_field: &'static str,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::OneToMany,
            column: None,
            target: Some(target),
            owning_field: Some(owning_field),
            side: None,
            hidden: false,
        }
    }

    pub const fn many_to_many(name: &'static str, association: MetaFn, side: Side) -> Self {
        Self {
            name,
            kind: FieldKind::ManyToMany,
            column: None,
            target: Some(association),
            owning_field: None,
            side: Some(side),
            hidden: false,
        }
    }

    pub const fn parent_link(name: &'static str, column: &'static str, parent: MetaFn) -> Self {
        Self {
            name,
            kind: FieldKind::ParentLink,
            column: Some(column),
            target: Some(parent),
            owning_field: None,
            side: None,
            hidden: false,
        }
    }

    /// Leave this field out of default loads.
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn target(&self) -> Option<&'static EntityMeta> {
        self.target.map(|f| f())
    }

    pub const fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.kind {
            FieldKind::Scalar(kind) => Some(kind),
            _ => None,
        }
    }

    /// The storage column, or an error naming the field.
    pub fn require_column(&self) -> Result<&'static str> {
        self.column.ok_or_else(|| {
            Error::invalid_argument(format!("field '{}' has no storage column", self.name))
        })
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("column", &self.column)
            .field("target", &self.target().map(|t| t.name))
            .field("owning_field", &self.owning_field)
            .field("side", &self.side)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// How an entity's identity is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityShape {
    /// Own table with an auto-generated integer primary key.
    Root { primary_key: &'static str },
    /// Own table keyed by a parent-link column holding the parent's identity.
    Sub { parent: &'static str },
    /// Pairing row between two entities, with its own primary key.
    Association {
        primary_key: &'static str,
        side_a: &'static str,
        side_b: &'static str,
    },
}

/// Descriptor for one entity type.
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub shape: EntityShape,
    pub fields: &'static [FieldDescriptor],
}

impl EntityMeta {
    pub const fn root(
        name: &'static str,
        table: &'static str,
        primary_key: &'static str,
        fields: &'static [FieldDescriptor],
    ) -> Self {
        Self {
            name,
            table,
            shape: EntityShape::Root { primary_key },
            fields,
        }
    }

    pub const fn sub(
        name: &'static str,
        table: &'static str,
        parent: &'static str,
        fields: &'static [FieldDescriptor],
    ) -> Self {
        Self {
            name,
            table,
            shape: EntityShape::Sub { parent },
            fields,
        }
    }

    pub const fn association(
        name: &'static str,
        table: &'static str,
        primary_key: &'static str,
        side_a: &'static str,
        side_b: &'static str,
        fields: &'static [FieldDescriptor],
    ) -> Self {
        Self {
            name,
            table,
            shape: EntityShape::Association {
                primary_key,
                side_a,
                side_b,
            },
            fields,
        }
    }

    /// Two descriptors denote the same type.
    pub fn same_as(&self, other: &EntityMeta) -> bool {
        std::ptr::eq(self, other) || self.name == other.name
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Look a field up, failing with `InvalidArgument` when it is not declared here.
    pub fn require_field(&self, name: &str) -> Result<&'static FieldDescriptor> {
        self.field(name).ok_or_else(|| {
            Error::invalid_argument(format!("{} has no field '{}'", self.name, name))
        })
    }

    pub const fn is_sub(&self) -> bool {
        matches!(self.shape, EntityShape::Sub { .. })
    }

    pub const fn is_association(&self) -> bool {
        matches!(self.shape, EntityShape::Association { .. })
    }

    /// Name of the field holding this entity's identity: the primary key, or the
    /// parent link for a sub-entity.
    pub const fn id_field_name(&self) -> &'static str {
        match self.shape {
            EntityShape::Root { primary_key } | EntityShape::Association { primary_key, .. } => {
                primary_key
            }
            EntityShape::Sub { parent } => parent,
        }
    }

    pub fn id_field(&self) -> Result<&'static FieldDescriptor> {
        self.require_field(self.id_field_name())
    }

    /// Column holding this entity's identity in its own table.
    pub fn id_column(&self) -> Result<&'static str> {
        self.id_field()?.require_column()
    }

    /// Primary key field of a root or association entity.
    pub fn primary_key(&self) -> Option<&'static FieldDescriptor> {
        match self.shape {
            EntityShape::Root { primary_key } | EntityShape::Association { primary_key, .. } => {
                self.field(primary_key)
            }
            EntityShape::Sub { .. } => None,
        }
    }

    /// Parent-link field of a sub-entity.
    pub fn parent_link(&self) -> Option<&'static FieldDescriptor> {
        match self.shape {
            EntityShape::Sub { parent } => self.field(parent),
            _ => None,
        }
    }

    /// Immediate parent type of a sub-entity.
    pub fn parent(&self) -> Option<&'static EntityMeta> {
        self.parent_link().and_then(FieldDescriptor::target)
    }

    /// This type followed by its ancestors, nearest first.
    pub fn chain(&'static self) -> Chain {
        Chain { next: Some(self) }
    }

    /// Whether `other` is this type or one of its ancestors.
    pub fn is_or_extends(&'static self, other: &EntityMeta) -> bool {
        self.chain().any(|m| m.same_as(other))
    }

    /// Find the type in this chain that declares `field`.
    pub fn owner_of(&'static self, field: &str) -> Option<(&'static EntityMeta, &'static FieldDescriptor)> {
        self.chain()
            .find_map(|m| m.field(field).map(|f| (m, f)))
    }

    /// Field of an association side.
    pub fn side_field(&self, side: Side) -> Option<&'static FieldDescriptor> {
        match self.shape {
            EntityShape::Association { side_a, side_b, .. } => match side {
                Side::A => self.field(side_a),
                Side::B => self.field(side_b),
            },
            _ => None,
        }
    }

    /// Association side field, or `InvalidArgument` when this is not an association.
    pub fn require_side(&self, side: Side) -> Result<&'static FieldDescriptor> {
        self.side_field(side).ok_or_else(|| {
            Error::invalid_argument(format!("{} is not an association entity", self.name))
        })
    }

    /// Names of all non-hidden fields, in declaration order.
    pub fn default_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| !f.hidden)
            .map(|f| f.name)
            .collect()
    }

    /// Check the structural rules of this descriptor.
    ///
    /// Roots and associations have an integer scalar primary key; sub-entities have a
    /// parent link; association sides are many-to-one fields; many-to-many fields point
    /// at associations; every relational field names its target.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::invalid_argument(format!("{}: {}", self.name, msg)));

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return invalid(format!("field '{}' declared twice", field.name));
            }
            if field.kind.has_column() && field.column.is_none() {
                return invalid(format!("field '{}' needs a column", field.name));
            }
            if !matches!(field.kind, FieldKind::Scalar(_)) && field.target.is_none() {
                return invalid(format!("field '{}' needs a target type", field.name));
            }
            match field.kind {
                FieldKind::OneToMany => {
                    let owning = field.owning_field.unwrap_or_default();
                    let target = field.target().map(|t| t.owner_of(owning));
                    if !matches!(target, Some(Some((_, f))) if f.kind == FieldKind::ManyToOne) {
                        return invalid(format!(
                            "one-to-many '{}' needs a many-to-one owning field on its target",
                            field.name
                        ));
                    }
                }
                FieldKind::ManyToMany => {
                    let association = field.target();
                    let side = field.side.unwrap_or(Side::A);
                    if !association.is_some_and(|a| a.side_field(side).is_some()) {
                        return invalid(format!(
                            "many-to-many '{}' must target an association entity",
                            field.name
                        ));
                    }
                }
                FieldKind::ParentLink if !self.is_sub() => {
                    return invalid(format!("parent link '{}' on a root entity", field.name));
                }
                _ => {}
            }
        }

        match self.shape {
            EntityShape::Root { .. } | EntityShape::Association { .. } => {
                let pk = self.primary_key();
                if !matches!(pk, Some(f) if f.kind == FieldKind::Scalar(ScalarKind::Int)) {
                    return invalid("primary key must be an int scalar field".to_string());
                }
            }
            EntityShape::Sub { .. } => {
                if !matches!(self.parent_link(), Some(f) if f.kind == FieldKind::ParentLink) {
                    return invalid("sub-entity needs a parent-link field".to_string());
                }
            }
        }

        if self.is_association() {
            for side in [Side::A, Side::B] {
                if !matches!(self.side_field(side), Some(f) if f.kind == FieldKind::ManyToOne) {
                    return invalid(format!("association side {:?} must be many-to-one", side));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMeta")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("shape", &self.shape)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Iterator over a type and its ancestors.
pub struct Chain {
    next: Option<&'static EntityMeta>,
}

impl Iterator for Chain {
    type Item = &'static EntityMeta;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}
