//! Per-operation session for relgraph.
//!
//! A [`Session`] lives for one top-level engine call. It is the single gate through which
//! loaded entities enter an [`EntityGraph`]:
//!
//! - **Identity**: at most one entity per (type, identity key); a second row for the same
//!   key reuses the entity already admitted.
//! - **Cycle breaking**: relationship collections are reserved before they are filled, so
//!   a load that loops back to the same owner finds the collection in progress instead of
//!   recursing.
//!
//! # Example
//!
//! ```
//! use relgraph_core::{Entity, EntityGraph, EntityMeta, FieldDescriptor, ScalarKind};
//! use relgraph_session::Session;
//!
//! static USER: EntityMeta = EntityMeta::root("User", "users", "id", &[
//!     FieldDescriptor::scalar("id", "id", ScalarKind::Int),
//! ]);
//!
//! let mut graph = EntityGraph::new();
//! let mut session = Session::new();
//!
//! let first = session.add(&mut graph, Entity::new(&USER).with("id", 1_i64).unwrap(), 1);
//! let second = session.add(&mut graph, Entity::new(&USER).with("id", 1_i64).unwrap(), 1);
//! assert!(first.is_new());
//! assert!(!second.is_new());
//! assert_eq!(first.id(), second.id());
//! assert_eq!(graph.len(), 1);
//! ```

pub mod identity_map;

pub use identity_map::IdentityMap;

use relgraph_core::{CollectionId, Entity, EntityGraph, EntityId, EntityMeta, FieldDescriptor};
use std::collections::HashMap;

/// Which relationship kind a cached collection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    OneToMany,
    ManyToMany,
}

/// Outcome of offering an entity to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First entity for its key; now stored in the graph.
    Added(EntityId),
    /// The key was already taken; the offered entity was discarded.
    Existing(EntityId),
}

impl Admission {
    pub const fn id(self) -> EntityId {
        match self {
            Admission::Added(id) | Admission::Existing(id) => id,
        }
    }

    pub const fn is_new(self) -> bool {
        matches!(self, Admission::Added(_))
    }
}

/// Map sizes, for tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub entities: usize,
    pub one_to_many: usize,
    pub many_to_many: usize,
}

type CollectionKey = (CollectionKind, &'static str, &'static str, i64);

/// Identity map plus relationship collection cache for one operation.
#[derive(Debug, Default)]
pub struct Session {
    identities: IdentityMap,
    collections: HashMap<CollectionKey, CollectionId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity already admitted for `(meta, id)`.
    pub fn lookup(&self, meta: &EntityMeta, id: i64) -> Option<EntityId> {
        self.identities.get(meta, id)
    }

    /// Offer a freshly built entity. It is stored in `graph` only when no entity of its
    /// type is registered under `id`.
    pub fn add(&mut self, graph: &mut EntityGraph, entity: Entity, id: i64) -> Admission {
        let meta = entity.meta();
        if let Some(existing) = self.identities.get(meta, id) {
            tracing::trace!(entity = meta.name, id, "reusing loaded entity");
            return Admission::Existing(existing);
        }
        let stored = graph.insert(entity);
        self.identities.get_or_insert(meta, id, stored);
        Admission::Added(stored)
    }

    /// Admit an entity that already lives in the graph, such as one just written.
    pub fn register(&mut self, meta: &'static EntityMeta, id: i64, entity: EntityId) -> Admission {
        match self.identities.get_or_insert(meta, id, entity) {
            (stored, true) => Admission::Added(stored),
            (stored, false) => Admission::Existing(stored),
        }
    }

    /// Cached collection for a relationship field of the entity `(meta, id)`.
    pub fn lookup_collection(
        &self,
        kind: CollectionKind,
        meta: &EntityMeta,
        field: &FieldDescriptor,
        id: i64,
    ) -> Option<CollectionId> {
        self.collections.get(&(kind, meta.name, field.name, id)).copied()
    }

    /// Allocate and cache an empty collection before it is populated. Returns the cached
    /// collection when one is already reserved.
    pub fn reserve_collection(
        &mut self,
        graph: &mut EntityGraph,
        kind: CollectionKind,
        meta: &'static EntityMeta,
        field: &'static FieldDescriptor,
        id: i64,
    ) -> CollectionId {
        *self
            .collections
            .entry((kind, meta.name, field.name, id))
            .or_insert_with(|| graph.new_collection())
    }

    pub fn stats(&self) -> SessionStats {
        let (mut one_to_many, mut many_to_many) = (0, 0);
        for (kind, ..) in self.collections.keys() {
            match kind {
                CollectionKind::OneToMany => one_to_many += 1,
                CollectionKind::ManyToMany => many_to_many += 1,
            }
        }
        SessionStats {
            entities: self.identities.len(),
            one_to_many,
            many_to_many,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_core::{ScalarKind, Side, Slot};

    static ADDRESS: EntityMeta = EntityMeta::root(
        "Address",
        "addresses",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::one_to_many("users", || &USER, "address"),
        ],
    );

    static USER: EntityMeta = EntityMeta::root(
        "User",
        "users",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::many_to_one("address", "address_id", || &ADDRESS),
            FieldDescriptor::many_to_many("teams", || &MEMBERSHIP, Side::A),
        ],
    );

    static MEMBERSHIP: EntityMeta = EntityMeta::association(
        "Membership",
        "memberships",
        "id",
        "user",
        "team",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::many_to_one("user", "user_id", || &USER),
            FieldDescriptor::many_to_one("team", "team_id", || &USER),
        ],
    );

    fn user(id: i64) -> Entity {
        Entity::new(&USER).with("id", id).unwrap()
    }

    #[test]
    fn duplicate_rows_reuse_the_first_entity() {
        let mut graph = EntityGraph::new();
        let mut session = Session::new();

        let first = session.add(&mut graph, user(1), 1);
        let other = session.add(&mut graph, user(2), 2);
        let again = session.add(&mut graph, user(1), 1);

        assert_eq!(again, Admission::Existing(first.id()));
        assert_ne!(first.id(), other.id());
        assert_eq!(session.lookup(&USER, 2), Some(other.id()));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn register_admits_stored_entities() {
        let mut graph = EntityGraph::new();
        let mut session = Session::new();
        let stored = graph.insert(user(5));

        assert!(session.register(&USER, 5, stored).is_new());
        let loaded = session.add(&mut graph, user(5), 5);
        assert_eq!(loaded, Admission::Existing(stored));
    }

    #[test]
    fn reserved_collections_are_visible_before_population() {
        let mut graph = EntityGraph::new();
        let mut session = Session::new();
        let users = ADDRESS.field("users").unwrap();

        assert!(session.lookup_collection(CollectionKind::OneToMany, &ADDRESS, users, 1).is_none());
        let reserved =
            session.reserve_collection(&mut graph, CollectionKind::OneToMany, &ADDRESS, users, 1);
        assert_eq!(
            session.lookup_collection(CollectionKind::OneToMany, &ADDRESS, users, 1),
            Some(reserved)
        );
        assert!(graph.collection(reserved).is_empty());

        let again =
            session.reserve_collection(&mut graph, CollectionKind::OneToMany, &ADDRESS, users, 1);
        assert_eq!(again, reserved);

        let address = graph.insert(Entity::new(&ADDRESS));
        graph.set_slot(address, "users", Slot::Collection(reserved)).unwrap();
        let member = session.add(&mut graph, user(3), 3).id();
        graph.extend_collection(reserved, [member]);
        assert_eq!(graph.related(address, "users"), &[member]);
    }

    #[test]
    fn collection_kinds_are_separate() {
        let mut graph = EntityGraph::new();
        let mut session = Session::new();
        let teams = USER.field("teams").unwrap();

        session.add(&mut graph, user(1), 1);
        session.reserve_collection(&mut graph, CollectionKind::ManyToMany, &USER, teams, 1);
        assert!(session.lookup_collection(CollectionKind::OneToMany, &USER, teams, 1).is_none());
        assert_eq!(
            session.stats(),
            SessionStats {
                entities: 1,
                one_to_many: 0,
                many_to_many: 1,
            }
        );
    }
}
