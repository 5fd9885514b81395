//! Runtime entity representation and the reserved property-edge convention.
//!
//! A [`SerializedGraph`] is what the serializer produces and the
//! deserializer consumes: entity 0 is the root, every other entity is a
//! synthetic sub-entity reachable from it through [`PropertyEdge`]s.

use std::collections::BTreeMap;

use crate::model::PropertyMap;
use crate::schema::EntityKind;

/// Prefix of every synthetic property-edge label.
pub const PROPERTY_EDGE_PREFIX: &str = "__PROPERTY__";
/// Suffix of every synthetic property-edge label.
pub const PROPERTY_EDGE_SUFFIX: &str = "__";
/// Property on a property edge holding the element position of an ordered
/// collection member.
pub const ORDINAL_PROPERTY: &str = "__ordinal";
/// Stored property holding an entity's [`EntityId`](crate::EntityId).
pub const ID_PROPERTY: &str = "Id";

/// `HomeAddress` → `__PROPERTY__HomeAddress__`.
pub fn property_edge_label(property: &str) -> String {
    format!("{PROPERTY_EDGE_PREFIX}{property}{PROPERTY_EDGE_SUFFIX}")
}

/// Inverse of [`property_edge_label`]; `None` for ordinary relationship types.
pub fn edge_label_property_name(label: &str) -> Option<&str> {
    label
        .strip_prefix(PROPERTY_EDGE_PREFIX)?
        .strip_suffix(PROPERTY_EDGE_SUFFIX)
        .filter(|name| !name.is_empty())
}

pub fn is_property_edge(label: &str) -> bool {
    edge_label_property_name(label).is_some()
}

/// Index of an entity within a [`SerializedGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef(pub usize);

/// Complex property slot of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexRef {
    One(EntityRef),
    Many { ordered: bool, items: Vec<EntityRef> },
}

/// Labeled entity with classified properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub type_name: &'static str,
    pub kind: EntityKind,
    /// Most specific label.
    pub label: String,
    /// Every label to store: `label` followed by ancestor labels.
    pub labels: Vec<String>,
    pub simple_properties: PropertyMap,
    /// Keyed by storage name.
    pub complex_properties: BTreeMap<String, ComplexRef>,
}

impl Entity {
    pub fn new(type_name: &'static str, kind: EntityKind, labels: Vec<String>) -> Self {
        Self {
            type_name,
            kind,
            label: labels.first().cloned().unwrap_or_default(),
            labels,
            simple_properties: PropertyMap::new(),
            complex_properties: BTreeMap::new(),
        }
    }
}

/// Parent → child link for a decomposed Complex property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEdge {
    pub parent: EntityRef,
    pub child: EntityRef,
    /// Reserved-prefix edge label.
    pub label: String,
    /// Position within an ordered collection.
    pub ordinal: Option<usize>,
}

/// Root entity, synthetic children and the edges between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializedGraph {
    pub entities: Vec<Entity>,
    pub edges: Vec<PropertyEdge>,
}

impl SerializedGraph {
    pub fn root(&self) -> Option<&Entity> {
        self.entities.first()
    }

    pub fn entity(&self, at: EntityRef) -> Option<&Entity> {
        self.entities.get(at.0)
    }

    pub fn push(&mut self, entity: Entity) -> EntityRef {
        self.entities.push(entity);
        EntityRef(self.entities.len() - 1)
    }

    /// Synthetic sub-entities (everything but the root).
    pub fn children(&self) -> impl Iterator<Item = (EntityRef, &Entity)> {
        self.entities.iter().enumerate().skip(1).map(|(i, e)| (EntityRef(i), e))
    }

    /// Edges leaving `parent`.
    pub fn edges_from(&self, parent: EntityRef) -> impl Iterator<Item = &PropertyEdge> {
        self.edges.iter().filter(move |e| e.parent == parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_label_round_trip() {
        let label = property_edge_label("HomeAddress");
        assert_eq!(label, "__PROPERTY__HomeAddress__");
        assert_eq!(edge_label_property_name(&label), Some("HomeAddress"));
        assert!(is_property_edge(&label));
    }

    #[test]
    fn test_ordinary_types_are_not_property_edges() {
        assert!(!is_property_edge("KNOWS"));
        assert!(!is_property_edge("__PROPERTY____"));
        assert_eq!(edge_label_property_name("__PROPERTY__x"), None);
    }
}
