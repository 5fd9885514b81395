//! EntityDeserializer: rebuild a typed instance from a root entity and its
//! synthetic children.
//!
//! Complex properties are always reconstructed in full. Navigation
//! properties are left empty; the hydrator fills them.

use std::any::Any;

use crate::model::Value;
use crate::schema::{Field, GraphType, ModelRegistry, Record, TypeDescriptor, ID_FIELD};
use crate::{MappingError, Result};
use super::classify::PropertyClass;
use super::entity::{ComplexRef, EntityRef, ID_PROPERTY, SerializedGraph};

pub struct EntityDeserializer<'r> {
    registry: &'r ModelRegistry,
    max_depth: usize,
}

impl<'r> EntityDeserializer<'r> {
    pub fn new(registry: &'r ModelRegistry) -> Self {
        Self { registry, max_depth: registry.classifier().max_depth() }
    }

    /// Rebuild the root of `graph` as `T`.
    pub fn deserialize<T: GraphType>(&self, graph: &SerializedGraph) -> Result<T> {
        let descriptor = self.registry.descriptor::<T>()?;
        let record = self.record(&descriptor, graph, EntityRef(0))?;
        T::from_record(record)
    }

    /// Field bag for the entity at `at`, including the reserved `Id` field
    /// for nodes and relationships.
    pub fn record(&self, descriptor: &TypeDescriptor, graph: &SerializedGraph, at: EntityRef) -> Result<Record> {
        let mut record = self.record_at(descriptor, graph, at, 0)?;
        let root = graph
            .entity(at)
            .ok_or_else(|| crate::Error::NotFound(format!("entity {} in serialized graph", at.0)))?;
        if let Some(id) = root.simple_properties.get(ID_PROPERTY) {
            record.insert(ID_FIELD, Field::Value(id.clone()));
        }
        Ok(record)
    }

    /// Construct the described type from `record`.
    pub(crate) fn construct(&self, descriptor: &TypeDescriptor, record: Record) -> Result<Box<dyn Any + Send + Sync>> {
        descriptor.construct(record)
    }

    fn record_at(&self, descriptor: &TypeDescriptor, graph: &SerializedGraph, at: EntityRef, depth: usize) -> Result<Record> {
        if depth > self.max_depth {
            return Err(MappingError::DepthExceeded {
                limit: self.max_depth,
                path: descriptor.type_name.to_owned(),
            }
            .into());
        }
        let entity = graph
            .entity(at)
            .ok_or_else(|| crate::Error::NotFound(format!("entity {} in serialized graph", at.0)))?;

        let mut record = Record::new();
        for property in descriptor.persisted_properties() {
            let class = property
                .class()
                .ok_or_else(|| MappingError::Unregistered(descriptor.type_name.to_owned()))?;
            let field = match class {
                PropertyClass::Simple => match entity.simple_properties.get(property.storage_name()) {
                    Some(Value::Null) | None => Field::Null,
                    Some(v) => Field::Value(v.clone()),
                },
                PropertyClass::Complex { object, .. } => {
                    let child_descriptor = self.registry.describe(object)?;
                    match entity.complex_properties.get(property.storage_name()) {
                        None => Field::Null,
                        Some(ComplexRef::One(child)) => {
                            Field::Object(self.record_at(&child_descriptor, graph, *child, depth + 1)?)
                        }
                        Some(ComplexRef::Many { items, .. }) => {
                            let mut records = Vec::with_capacity(items.len());
                            for child in items {
                                records.push(self.record_at(&child_descriptor, graph, *child, depth + 1)?);
                            }
                            Field::Objects(records)
                        }
                    }
                }
            };
            record.insert(property.name.clone(), field);
        }
        Ok(record)
    }
}
