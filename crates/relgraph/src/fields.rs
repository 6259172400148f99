//! Routing of a field selection across a sub-entity chain.
//!
//! A sub-entity's table only stores the fields its own type declares. Anything else in
//! a selection belongs to an ancestor and travels up with the parent-link recursion.

use relgraph_core::{EntityMeta, Error, FieldDescriptor, Registry, Result};

/// Fields stored in the entity's own table, and what to pass on to its parent.
#[derive(Debug)]
pub(crate) struct Routed {
    pub own: Vec<&'static FieldDescriptor>,
    /// `None` lets the parent use its default field list.
    pub parent: Option<Vec<String>>,
}

/// Fields read by a load: the selection, or every non-hidden field.
pub(crate) fn for_read(
    registry: &Registry,
    meta: &'static EntityMeta,
    selection: Option<&[String]>,
) -> Result<Routed> {
    match selection {
        Some(names) => split(meta, names),
        None => Ok(Routed {
            own: registry
                .default_fields(meta)
                .iter()
                .filter_map(|name| meta.field(name))
                .collect(),
            parent: None,
        }),
    }
}

/// Fields written by an insert or update: the selection, or every declared field.
/// Unassigned slots are skipped later, so hidden fields only reach the database when
/// the caller set them.
pub(crate) fn for_write(meta: &'static EntityMeta, selection: Option<&[String]>) -> Result<Routed> {
    match selection {
        Some(names) => split(meta, names),
        None => Ok(Routed {
            own: meta.fields.iter().collect(),
            parent: None,
        }),
    }
}

fn split(meta: &'static EntityMeta, names: &[String]) -> Result<Routed> {
    let mut own = Vec::new();
    let mut inherited = Vec::new();
    for name in names {
        if let Some(field) = meta.field(name) {
            if !own.iter().any(|f: &&FieldDescriptor| f.name == field.name) {
                own.push(field);
            }
        } else if meta.owner_of(name).is_some() {
            inherited.push(name.clone());
        } else {
            return Err(Error::invalid_argument(format!(
                "{} has no field '{}'",
                meta.name, name
            )));
        }
    }
    Ok(Routed {
        own,
        parent: meta.is_sub().then_some(inherited),
    })
}
