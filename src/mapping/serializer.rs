//! EntitySerializer: one typed node or relationship into a root entity
//! plus synthetic sub-entities for its Complex properties.

use std::any::{Any, TypeId};

use tracing::trace;

use crate::model::Value;
use crate::schema::{
    EntityKind, Field, GraphType, ModelRegistry, PropertyDescriptor, Record, TypeDescriptor,
};
use crate::{MappingError, Result};
use super::classify::PropertyClass;
use super::entity::{
    ComplexRef, Entity, EntityRef, ID_PROPERTY, PropertyEdge, SerializedGraph, property_edge_label,
};

/// Stateless apart from the per-call ancestor stack.
pub struct EntitySerializer<'r> {
    registry: &'r ModelRegistry,
    max_depth: usize,
}

struct Walk {
    graph: SerializedGraph,
    /// Objects on the path from the root to the entity being built.
    ancestors: Vec<(TypeId, usize)>,
}

impl<'r> EntitySerializer<'r> {
    pub fn new(registry: &'r ModelRegistry) -> Self {
        Self { registry, max_depth: registry.classifier().max_depth() }
    }

    pub fn serialize<T: GraphType>(&self, value: &T) -> Result<SerializedGraph> {
        let descriptor = self.registry.descriptor::<T>()?;
        self.serialize_erased(&descriptor, value)
    }

    pub(crate) fn serialize_erased(&self, descriptor: &TypeDescriptor, object: &dyn Any) -> Result<SerializedGraph> {
        let record = descriptor.to_record(object)?;
        let mut walk = Walk { graph: SerializedGraph::default(), ancestors: Vec::new() };
        let root = self.entity(descriptor, record, &mut walk, 0, descriptor.short_name())?;

        if descriptor.kind != EntityKind::Complex {
            let id = descriptor
                .entity_id(object)
                .ok_or_else(|| MappingError::TypeMismatch {
                    expected: descriptor.type_name.to_owned(),
                    got: "another type".to_owned(),
                })?;
            if id.is_empty() {
                return Err(MappingError::Validation {
                    property: ID_PROPERTY.to_owned(),
                    reason: "entity id is empty".to_owned(),
                }
                .into());
            }
            walk.graph.entities[root.0]
                .simple_properties
                .insert(ID_PROPERTY.to_owned(), Value::String(id.as_str().to_owned()));
        }

        trace!(
            type_name = descriptor.type_name,
            entities = walk.graph.entities.len(),
            edges = walk.graph.edges.len(),
            "serialized entity"
        );
        Ok(walk.graph)
    }

    fn entity(
        &self,
        descriptor: &TypeDescriptor,
        mut record: Record,
        walk: &mut Walk,
        depth: usize,
        path: &str,
    ) -> Result<EntityRef> {
        if depth > self.max_depth {
            return Err(MappingError::DepthExceeded { limit: self.max_depth, path: path.to_owned() }.into());
        }
        let identity = record.identity();
        if let Some(identity) = identity {
            if walk.ancestors.contains(&identity) {
                return Err(MappingError::CyclicReference(path.to_owned()).into());
            }
            walk.ancestors.push(identity);
        }

        let labels = self.registry.labels_for(descriptor);
        let at = walk.graph.push(Entity::new(descriptor.type_name, descriptor.kind, labels));

        for property in descriptor.persisted_properties() {
            let field = record.remove(&property.name).unwrap_or(Field::Null);
            let class = property
                .class()
                .cloned()
                .ok_or_else(|| MappingError::Unregistered(descriptor.type_name.to_owned()))?;
            match class {
                PropertyClass::Simple => {
                    let value = simple_value(property, field)?;
                    if !value.is_null() {
                        walk.graph.entities[at.0]
                            .simple_properties
                            .insert(property.storage_name().to_owned(), value);
                    }
                }
                PropertyClass::Complex { object, collection } => {
                    check_required(property, field.is_null())?;
                    let child_descriptor = self.registry.describe(&object)?;
                    let child_path = format!("{path}.{}", property.name);
                    let edge_label = property_edge_label(property.storage_name());
                    let slot = match (field, collection) {
                        (Field::Null, _) | (Field::Value(Value::Null), _) => None,
                        (Field::Object(child), None) => {
                            let child = self.entity(&child_descriptor, child, walk, depth + 1, &child_path)?;
                            walk.graph.edges.push(PropertyEdge { parent: at, child, label: edge_label, ordinal: None });
                            Some(ComplexRef::One(child))
                        }
                        (Field::Objects(children), Some(kind)) => {
                            let ordered = kind == crate::schema::CollectionKind::Ordered;
                            let mut items = Vec::with_capacity(children.len());
                            for (i, child) in children.into_iter().enumerate() {
                                let item_path = format!("{child_path}[{i}]");
                                let child = self.entity(&child_descriptor, child, walk, depth + 1, &item_path)?;
                                walk.graph.edges.push(PropertyEdge {
                                    parent: at,
                                    child,
                                    label: edge_label.clone(),
                                    ordinal: ordered.then_some(i),
                                });
                                items.push(child);
                            }
                            Some(ComplexRef::Many { ordered, items })
                        }
                        (other, _) => {
                            return Err(MappingError::Binding {
                                property: property.name.clone(),
                                reason: format!("expected a decomposable value, got {}", other.kind()),
                            }
                            .into());
                        }
                    };
                    if let Some(slot) = slot {
                        walk.graph.entities[at.0]
                            .complex_properties
                            .insert(property.storage_name().to_owned(), slot);
                    }
                }
            }
        }
        if identity.is_some() {
            walk.ancestors.pop();
        }
        Ok(at)
    }
}

fn simple_value(property: &PropertyDescriptor, field: Field) -> Result<Value> {
    let value = match field {
        Field::Null => Value::Null,
        Field::Value(v) => v,
        other => {
            return Err(MappingError::Binding {
                property: property.name.clone(),
                reason: format!("Simple property produced {}", other.kind()),
            }
            .into());
        }
    };
    check_required(property, value.is_null())?;
    for rule in &property.config.validations {
        rule.check(&value).map_err(|reason| MappingError::Validation { property: property.name.clone(), reason })?;
    }
    Ok(value)
}

fn check_required(property: &PropertyDescriptor, is_null: bool) -> Result<()> {
    if property.config.required && is_null {
        return Err(MappingError::Validation {
            property: property.name.clone(),
            reason: "required property is null".to_owned(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityId, NodeType, Validation};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Address {
        street: String,
        city: String,
    }
    impl GraphType for Address {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::complex::<Self>()
                .label("Address")
                .property::<String>("Street")
                .property::<String>("City")
                .build()
        }
        fn to_record(&self) -> Result<Record> {
            Record::of(self).with("Street", &self.street)?.with("City", &self.city)
        }
        fn from_record(mut r: Record) -> Result<Self> {
            Ok(Self { street: r.take("Street")?, city: r.take("City")? })
        }
    }
    crate::impl_complex_property!(Address);

    struct Person {
        id: EntityId,
        first_name: String,
        age: i32,
        home: Option<Address>,
        previous: Vec<Address>,
    }
    impl GraphType for Person {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::node::<Self>()
                .label("Person")
                .property::<String>("FirstName")
                .required()
                .validate(Validation::MinLength(1))
                .property::<i32>("Age")
                .property::<Option<Address>>("HomeAddress")
                .property::<Vec<Address>>("PreviousAddresses")
                .build()
        }
        fn to_record(&self) -> Result<Record> {
            Record::of(self)
                .with("FirstName", &self.first_name)?
                .with("Age", &self.age)?
                .with("HomeAddress", &self.home)?
                .with("PreviousAddresses", &self.previous)
        }
        fn from_record(mut r: Record) -> Result<Self> {
            Ok(Self {
                id: r.take("Id")?,
                first_name: r.take("FirstName")?,
                age: r.take("Age")?,
                home: r.take("HomeAddress")?,
                previous: r.take("PreviousAddresses")?,
            })
        }
    }
    impl NodeType for Person {
        fn id(&self) -> &EntityId { &self.id }
    }

    fn alice() -> Person {
        Person {
            id: EntityId::from("p-1"),
            first_name: "Alice".into(),
            age: 30,
            home: Some(Address { street: "123 Main St".into(), city: "Portland".into() }),
            previous: vec![],
        }
    }

    #[test]
    fn test_person_with_address() {
        let registry = ModelRegistry::new();
        let graph = EntitySerializer::new(&registry).serialize(&alice()).unwrap();

        assert_eq!(graph.entities.len(), 2);
        let root = graph.root().unwrap();
        assert_eq!(root.label, "Person");
        assert_eq!(root.simple_properties.get("FirstName"), Some(&Value::from("Alice")));
        assert_eq!(root.simple_properties.get("Age"), Some(&Value::Int(30)));
        assert_eq!(root.simple_properties.get("Id"), Some(&Value::from("p-1")));
        assert_eq!(root.simple_properties.len(), 3);

        assert_eq!(graph.edges, vec![PropertyEdge {
            parent: EntityRef(0),
            child: EntityRef(1),
            label: "__PROPERTY__HomeAddress__".into(),
            ordinal: None,
        }]);
        let address = graph.entity(EntityRef(1)).unwrap();
        assert_eq!(address.label, "Address");
        assert_eq!(address.simple_properties.get("City"), Some(&Value::from("Portland")));
    }

    #[test]
    fn test_ordered_collection_gets_ordinals() {
        let registry = ModelRegistry::new();
        let mut person = alice();
        person.home = None;
        person.previous = vec![
            Address { street: "1 A St".into(), city: "X".into() },
            Address { street: "2 B St".into(), city: "Y".into() },
        ];
        let graph = EntitySerializer::new(&registry).serialize(&person).unwrap();
        let ordinals: Vec<_> = graph.edges.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![Some(0), Some(1)]);
        assert_eq!(
            graph.root().unwrap().complex_properties.get("PreviousAddresses"),
            Some(&ComplexRef::Many { ordered: true, items: vec![EntityRef(1), EntityRef(2)] })
        );
    }

    #[test]
    fn test_required_and_validation() {
        let registry = ModelRegistry::new();
        let mut person = alice();
        person.first_name.clear();
        let err = EntitySerializer::new(&registry).serialize(&person).unwrap_err();
        assert!(matches!(err, crate::Error::Mapping(MappingError::Validation { .. })), "{err}");
    }
}
