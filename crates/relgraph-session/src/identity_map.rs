//! Identity map from (entity type, identity key) to an arena handle.
//!
//! The map guarantees that within one session each stored row corresponds to exactly
//! one entity in the [`EntityGraph`](relgraph_core::EntityGraph). Type names give each
//! entity type its own key space, so a sub-entity and its parent share a key without
//! colliding.

use relgraph_core::{EntityId, EntityMeta};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Identity map for entities loaded or saved during one operation.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(&'static str, i64), EntityId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle registered for `(meta, key)`.
    pub fn get(&self, meta: &EntityMeta, key: i64) -> Option<EntityId> {
        self.entries.get(&(meta.name, key)).copied()
    }

    pub fn contains(&self, meta: &EntityMeta, key: i64) -> bool {
        self.entries.contains_key(&(meta.name, key))
    }

    /// Register `id` unless the key is taken. Returns the handle now registered and
    /// whether it is the one passed in.
    pub fn get_or_insert(&mut self, meta: &'static EntityMeta, key: i64, id: EntityId) -> (EntityId, bool) {
        match self.entries.entry((meta.name, key)) {
            Entry::Occupied(existing) => (*existing.get(), false),
            Entry::Vacant(slot) => {
                slot.insert(id);
                (id, true)
            }
        }
    }

    /// Forget an entry. Returns whether one was present.
    pub fn remove(&mut self, meta: &EntityMeta, key: i64) -> bool {
        self.entries.remove(&(meta.name, key)).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
