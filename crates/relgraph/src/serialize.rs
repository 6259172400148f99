//! JSON rendering of loaded entity graphs.
//!
//! Each entity is written in full the first time it is reached; later encounters,
//! including the ones closing a cycle, become `{"$ref": "<Type>#<id>"}`. Entities without
//! an identity are tokenized by their position in the graph (`<Type>@<index>`).

use relgraph_core::{EntityGraph, EntityId, Error, Formats, Result, ScalarValue, Slot};
use serde_json::{Map, Number, Value as Json};
use std::collections::HashMap;

/// Render one entity and everything reachable from it.
pub fn to_json(graph: &EntityGraph, entity: EntityId, formats: &Formats) -> Result<Json> {
    Serializer::new(graph, formats).entity(entity)
}

/// Render a list of entities sharing one table of already-written entities.
pub fn list_to_json(graph: &EntityGraph, entities: &[EntityId], formats: &Formats) -> Result<Json> {
    let mut serializer = Serializer::new(graph, formats);
    entities
        .iter()
        .map(|&e| serializer.entity(e))
        .collect::<Result<Vec<_>>>()
        .map(Json::Array)
}

struct Serializer<'g> {
    graph: &'g EntityGraph,
    formats: &'g Formats,
    written: HashMap<EntityId, String>,
}

impl<'g> Serializer<'g> {
    fn new(graph: &'g EntityGraph, formats: &'g Formats) -> Self {
        Self {
            graph,
            formats,
            written: HashMap::new(),
        }
    }

    fn entity(&mut self, id: EntityId) -> Result<Json> {
        if let Some(token) = self.written.get(&id) {
            let mut reference = Map::new();
            reference.insert("$ref".to_string(), Json::String(token.clone()));
            return Ok(Json::Object(reference));
        }

        let graph = self.graph;
        let entity = graph
            .get(id)
            .ok_or_else(|| Error::invalid_argument(format!("no entity {:?} in this graph", id)))?;
        let name = entity.meta().name;
        let token = match graph.identity(id) {
            Some(key) => format!("{}#{}", name, key),
            None => format!("{}@{}", name, id.index()),
        };
        self.written.insert(id, token);

        let mut object = Map::new();
        object.insert("$type".to_string(), Json::String(name.to_string()));
        for (field, slot) in entity.fields() {
            let value = match slot {
                Slot::Unset => continue,
                Slot::Null => Json::Null,
                Slot::Scalar(value) => self.scalar(value)?,
                Slot::Key(key) => Json::from(*key),
                Slot::Reference(target) => self.entity(*target)?,
                Slot::Collection(collection) => Json::Array(
                    graph
                        .collection(*collection)
                        .iter()
                        .map(|&member| self.entity(member))
                        .collect::<Result<_>>()?,
                ),
            };
            object.insert(field.name.to_string(), value);
        }
        Ok(Json::Object(object))
    }

    fn scalar(&self, value: &ScalarValue) -> Result<Json> {
        Ok(match value {
            ScalarValue::Int(v) => Json::from(*v),
            ScalarValue::Enum(v) => Json::from(*v),
            ScalarValue::Bool(v) => Json::Bool(*v),
            ScalarValue::Float(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
            other => Json::String(other.to_string_with(self.formats)?),
        })
    }
}
