//! Registry of declared entity types and facts derived from their metadata.
//!
//! Derived facts are computed on first request and cached for the registry's lifetime.
//! Lookups take a read lock; only the first caller for a type takes the write lock.

use crate::error::{Error, Result};
use crate::meta::{EntityMeta, FieldDescriptor, FieldKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A mutual foreign-key pair that would block deleting a row of the source type.
///
/// `field` is a many-to-one on the source type pointing at some row `x`; `other_field`
/// is a many-to-one declared on `other` (the target of `field` or one of its ancestors)
/// pointing back at the source type or one of its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct PointingBack {
    pub field: &'static FieldDescriptor,
    pub other: &'static EntityMeta,
    pub other_field: &'static FieldDescriptor,
}

#[derive(Default)]
pub struct Registry {
    entities: Vec<&'static EntityMeta>,
    by_name: HashMap<&'static str, &'static EntityMeta>,
    pointing_back: RwLock<HashMap<&'static str, Arc<[PointingBack]>>>,
    default_fields: RwLock<HashMap<&'static str, Arc<[&'static str]>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a type. Registering the same descriptor twice is a no-op.
    pub fn register(&mut self, meta: &'static EntityMeta) -> Result<()> {
        if let Some(existing) = self.by_name.get(meta.name) {
            if std::ptr::eq(*existing, meta) {
                return Ok(());
            }
            return Err(Error::invalid_argument(format!(
                "entity name '{}' is already registered",
                meta.name
            )));
        }
        meta.validate()?;
        tracing::debug!(entity = meta.name, table = meta.table, "registered entity");
        self.entities.push(meta);
        self.by_name.insert(meta.name, meta);
        Ok(())
    }

    /// Builder form of [`Registry::register`].
    pub fn with(mut self, meta: &'static EntityMeta) -> Result<Self> {
        self.register(meta)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&'static EntityMeta> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, meta: &EntityMeta) -> bool {
        self.by_name.contains_key(meta.name)
    }

    /// Fail with `InvalidArgument` unless `meta` was registered.
    pub fn require(&self, meta: &EntityMeta) -> Result<()> {
        if self.contains(meta) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "entity '{}' is not registered",
                meta.name
            )))
        }
    }

    pub fn entities(&self) -> &[&'static EntityMeta] {
        &self.entities
    }

    /// Non-hidden field names of `meta`.
    pub fn default_fields(&self, meta: &'static EntityMeta) -> Arc<[&'static str]> {
        read_through(&self.default_fields, meta.name, || {
            meta.default_fields().into()
        })
    }

    /// Mutual foreign-key pairs to clear before deleting a row of `meta`.
    pub fn pointing_back(&self, meta: &'static EntityMeta) -> Arc<[PointingBack]> {
        read_through(&self.pointing_back, meta.name, || {
            let pairs = compute_pointing_back(meta);
            tracing::debug!(entity = meta.name, pairs = pairs.len(), "derived pointing-back pairs");
            pairs.into()
        })
    }
}

fn read_through<V: ?Sized>(
    cache: &RwLock<HashMap<&'static str, Arc<V>>>,
    key: &'static str,
    compute: impl FnOnce() -> Arc<V>,
) -> Arc<V> {
    {
        let map = cache.read().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = map.get(key) {
            return Arc::clone(hit);
        }
    }
    let value = compute();
    let mut map = cache.write().unwrap_or_else(|e| e.into_inner());
    Arc::clone(map.entry(key).or_insert(value))
}

fn compute_pointing_back(meta: &'static EntityMeta) -> Vec<PointingBack> {
    let mut pairs = Vec::new();
    for field in meta.fields.iter().filter(|f| f.kind == FieldKind::ManyToOne) {
        let Some(target) = field.target() else {
            continue;
        };
        for other in target.chain() {
            for other_field in other.fields.iter().filter(|f| f.kind == FieldKind::ManyToOne) {
                if other_field
                    .target()
                    .is_some_and(|back| meta.is_or_extends(back))
                {
                    pairs.push(PointingBack {
                        field,
                        other,
                        other_field,
                    });
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::scalar::ScalarKind;

    static HOUSE: EntityMeta = EntityMeta::root(
        "House",
        "houses",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::many_to_one("owner", "owner_id", || &OWNER),
        ],
    );

    static OWNER: EntityMeta = EntityMeta::root(
        "Owner",
        "owners",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::many_to_one("home", "home_id", || &HOUSE),
            FieldDescriptor::scalar("note", "note", ScalarKind::Text).hidden(),
        ],
    );

    static LONER: EntityMeta = EntityMeta::root(
        "Loner",
        "loners",
        "id",
        &[
            FieldDescriptor::scalar("id", "id", ScalarKind::Int),
            FieldDescriptor::many_to_one("house", "house_id", || &HOUSE),
        ],
    );

    static FAKE_HOUSE: EntityMeta = EntityMeta::root(
        "House",
        "other_houses",
        "id",
        &[FieldDescriptor::scalar("id", "id", ScalarKind::Int)],
    );

    #[test]
    fn mutual_foreign_keys_are_found() {
        let registry = Registry::new().with(&HOUSE).unwrap().with(&OWNER).unwrap();
        let pairs = registry.pointing_back(&HOUSE);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].field.name, "owner");
        assert_eq!(pairs[0].other.name, "Owner");
        assert_eq!(pairs[0].other_field.name, "home");

        let again = registry.pointing_back(&HOUSE);
        assert!(Arc::ptr_eq(&pairs, &again));
    }

    #[test]
    fn one_way_references_need_no_fixup() {
        let registry = Registry::new().with(&LONER).unwrap();
        assert!(registry.pointing_back(&LONER).is_empty());
    }

    #[test]
    fn registration_rules() {
        let mut registry = Registry::new();
        registry.register(&HOUSE).unwrap();
        registry.register(&HOUSE).unwrap();
        assert_eq!(registry.entities().len(), 1);

        let err = registry.register(&FAKE_HOUSE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(registry.require(&OWNER).is_err());
        assert_eq!(registry.get("House").unwrap().table, "houses");
    }

    #[test]
    fn default_fields_skip_hidden() {
        let registry = Registry::new().with(&OWNER).unwrap();
        assert_eq!(&*registry.default_fields(&OWNER), &["id", "home"]);
    }
}
