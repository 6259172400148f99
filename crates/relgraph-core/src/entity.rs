//! Entity instances and the arena that owns them.
//!
//! An [`EntityGraph`] owns every [`Entity`] created or loaded into it. Relationship
//! slots hold [`EntityId`] / [`CollectionId`] handles into the same graph, so cyclic
//! object graphs are plain data and instance identity is handle equality.
//!
//! ```
//! use relgraph_core::{Entity, EntityGraph, EntityMeta, FieldDescriptor, ScalarKind};
//!
//! static USER: EntityMeta = EntityMeta::root("User", "users", "id", &[
//!     FieldDescriptor::scalar("id", "id", ScalarKind::Int),
//!     FieldDescriptor::scalar("username", "username", ScalarKind::Text),
//! ]);
//!
//! let mut graph = EntityGraph::new();
//! let gordon = graph.insert(Entity::new(&USER).with("username", "Gordon").unwrap());
//! assert_eq!(graph.scalar(gordon, "username").and_then(|v| v.as_str()), Some("Gordon"));
//! assert_eq!(graph.identity(gordon), None);
//! ```

use crate::error::{Error, Result};
use crate::meta::{EntityMeta, EntityShape, FieldDescriptor, FieldKind};
use crate::scalar::ScalarValue;
use std::ops::Index;

/// Handle of an entity inside an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(usize);

/// Handle of a relationship collection inside an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(usize);

impl EntityId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Contents of one field of an entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Slot {
    /// Never assigned or not loaded.
    #[default]
    Unset,
    Null,
    Scalar(ScalarValue),
    /// Foreign key known, related entity not materialized.
    Key(i64),
    Reference(EntityId),
    Collection(CollectionId),
}

impl Slot {
    pub const fn is_unset(&self) -> bool {
        matches!(self, Slot::Unset)
    }

    /// Set to something other than `Unset` or `Null`.
    pub const fn has_value(&self) -> bool {
        !matches!(self, Slot::Unset | Slot::Null)
    }

    fn accepted_by(&self, kind: FieldKind) -> bool {
        match self {
            Slot::Unset | Slot::Null => true,
            Slot::Scalar(_) => matches!(kind, FieldKind::Scalar(_)),
            Slot::Key(_) | Slot::Reference(_) => {
                matches!(kind, FieldKind::ManyToOne | FieldKind::ParentLink)
            }
            Slot::Collection(_) => kind.is_collection(),
        }
    }
}

/// One instance of an entity type: a slot per declared field.
#[derive(Debug, Clone)]
pub struct Entity {
    meta: &'static EntityMeta,
    slots: Vec<Slot>,
}

impl Entity {
    pub fn new(meta: &'static EntityMeta) -> Self {
        Self {
            meta,
            slots: vec![Slot::Unset; meta.fields.len()],
        }
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    /// Slot of a field declared on this entity's own type.
    pub fn slot(&self, field: &str) -> Option<&Slot> {
        self.meta.field_index(field).map(|i| &self.slots[i])
    }

    /// Replace a slot, checking it suits the field kind. Scalars are coerced to the
    /// field's scalar kind.
    pub fn set_slot(&mut self, field: &str, slot: Slot) -> Result<()> {
        let index = self.meta.field_index(field).ok_or_else(|| {
            Error::invalid_argument(format!("{} has no field '{}'", self.meta.name, field))
        })?;
        let descriptor = &self.meta.fields[index];
        if !slot.accepted_by(descriptor.kind) {
            return Err(Error::invalid_argument(format!(
                "{}.{} is a {} field and cannot hold {:?}",
                self.meta.name,
                field,
                descriptor.kind.name(),
                slot
            )));
        }
        let slot = match (slot, descriptor.scalar_kind()) {
            (Slot::Scalar(value), Some(kind)) => Slot::Scalar(kind.coerce(value)?),
            (slot, _) => slot,
        };
        self.slots[index] = slot;
        Ok(())
    }

    /// Assign a scalar field.
    pub fn set(&mut self, field: &str, value: impl Into<ScalarValue>) -> Result<()> {
        self.set_slot(field, Slot::Scalar(value.into()))
    }

    pub fn with(mut self, field: &str, value: impl Into<ScalarValue>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Point a many-to-one or parent link at a stored key.
    pub fn with_key(mut self, field: &str, key: i64) -> Result<Self> {
        self.set_slot(field, Slot::Key(key))?;
        Ok(self)
    }

    /// Point a many-to-one or parent link at an entity of the same graph.
    pub fn with_reference(mut self, field: &str, target: EntityId) -> Result<Self> {
        self.set_slot(field, Slot::Reference(target))?;
        Ok(self)
    }

    pub fn with_null(mut self, field: &str) -> Result<Self> {
        self.set_slot(field, Slot::Null)?;
        Ok(self)
    }

    pub fn scalar(&self, field: &str) -> Option<&ScalarValue> {
        match self.slot(field) {
            Some(Slot::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// Primary key of a root or association entity, when assigned.
    pub fn primary_key(&self) -> Option<i64> {
        match self.meta.shape {
            EntityShape::Root { primary_key } | EntityShape::Association { primary_key, .. } => {
                self.scalar(primary_key).and_then(ScalarValue::as_i64)
            }
            EntityShape::Sub { .. } => None,
        }
    }

    /// Declared fields paired with their slots.
    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldDescriptor, &Slot)> {
        self.meta.fields.iter().zip(self.slots.iter())
    }
}

/// Arena owning entities and relationship collections.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    entities: Vec<Entity>,
    collections: Vec<Vec<EntityId>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn insert(&mut self, entity: Entity) -> EntityId {
        self.entities.push(entity);
        EntityId(self.entities.len() - 1)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0)
    }

    fn entity(&self, id: EntityId) -> Result<&Entity> {
        self.get(id)
            .ok_or_else(|| Error::invalid_argument(format!("no entity {:?} in this graph", id)))
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + use<> {
        (0..self.entities.len()).map(EntityId)
    }

    /// Allocate an empty collection.
    pub fn new_collection(&mut self) -> CollectionId {
        self.collections.push(Vec::new());
        CollectionId(self.collections.len() - 1)
    }

    pub fn collection(&self, id: CollectionId) -> &[EntityId] {
        self.collections.get(id.0).map_or(&[], Vec::as_slice)
    }

    /// Append members to a collection.
    pub fn extend_collection(&mut self, id: CollectionId, members: impl IntoIterator<Item = EntityId>) {
        if let Some(collection) = self.collections.get_mut(id.0) {
            collection.extend(members);
        }
    }

    /// The parent entity of a sub-entity, when materialized in this graph.
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        let entity = self.get(id)?;
        match entity.slot(entity.meta.parent_link()?.name)? {
            Slot::Reference(parent) => Some(*parent),
            _ => None,
        }
    }

    /// Identity key of an entity: its primary key, or for a sub-entity the key reached
    /// by following parent links.
    pub fn identity(&self, id: EntityId) -> Option<i64> {
        let mut current = id;
        loop {
            let entity = self.get(current)?;
            let Some(link) = entity.meta.parent_link() else {
                return entity.primary_key();
            };
            match entity.slot(link.name)? {
                Slot::Key(key) => return Some(*key),
                Slot::Reference(parent) => current = *parent,
                _ => return None,
            }
        }
    }

    /// Key carried by a many-to-one or parent-link slot.
    pub fn key_of(&self, slot: &Slot) -> Option<i64> {
        match slot {
            Slot::Key(key) => Some(*key),
            Slot::Reference(target) => self.identity(*target),
            _ => None,
        }
    }

    /// Find the entity in `id`'s parent chain whose type declares `field`.
    pub fn locate(&self, id: EntityId, field: &str) -> Option<(EntityId, &'static FieldDescriptor)> {
        let mut current = id;
        loop {
            let entity = self.get(current)?;
            if let Some(descriptor) = entity.meta.field(field) {
                return Some((current, descriptor));
            }
            current = self.parent(current)?;
        }
    }

    /// Chain-aware slot lookup.
    pub fn slot(&self, id: EntityId, field: &str) -> Option<&Slot> {
        let (owner, _) = self.locate(id, field)?;
        self.get(owner)?.slot(field)
    }

    /// Chain-aware scalar lookup.
    pub fn scalar(&self, id: EntityId, field: &str) -> Option<&ScalarValue> {
        match self.slot(id, field)? {
            Slot::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Chain-aware many-to-one lookup of a materialized entity.
    pub fn reference(&self, id: EntityId, field: &str) -> Option<EntityId> {
        match self.slot(id, field)? {
            Slot::Reference(target) => Some(*target),
            _ => None,
        }
    }

    /// Chain-aware collection lookup. Empty when the collection was not loaded.
    pub fn related(&self, id: EntityId, field: &str) -> &[EntityId] {
        match self.slot(id, field) {
            Some(Slot::Collection(c)) => self.collection(*c),
            _ => &[],
        }
    }

    /// Chain-aware slot assignment.
    pub fn set_slot(&mut self, id: EntityId, field: &str, slot: Slot) -> Result<()> {
        self.entity(id)?;
        let (owner, _) = self.locate(id, field).ok_or_else(|| {
            Error::invalid_operation(format!(
                "field '{}' is not reachable from entity {:?}",
                field, id
            ))
        })?;
        match self.get_mut(owner) {
            Some(entity) => entity.set_slot(field, slot),
            None => Err(Error::invalid_argument(format!("no entity {:?} in this graph", owner))),
        }
    }

    /// Chain-aware scalar assignment.
    pub fn set(&mut self, id: EntityId, field: &str, value: impl Into<ScalarValue>) -> Result<()> {
        self.set_slot(id, field, Slot::Scalar(value.into()))
    }
}

impl Index<EntityId> for EntityGraph {
    type Output = Entity;

    fn index(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }
}
