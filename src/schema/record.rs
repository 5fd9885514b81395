//! Record: the type-erased field bag exchanged between a domain type and
//! the mapping engine.
//!
//! A domain type writes its declared properties into a `Record` and is
//! rebuilt from one. Simple values are already encoded; Complex values are
//! nested records.

use std::any::TypeId;

use crate::mapping::codec::GraphProperty;
use crate::model::Value;
use crate::{MappingError, Result};

/// One field of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Absent value (`None`, or a Complex property with no child entity).
    Null,
    /// Encoded Simple value.
    Value(Value),
    /// Decomposed Complex value.
    Object(Record),
    /// Collection of decomposed Complex values, in declaration order.
    Objects(Vec<Record>),
}

impl Field {
    pub fn kind(&self) -> &'static str {
        match self {
            Field::Null => "null",
            Field::Value(_) => "value",
            Field::Object(_) => "object",
            Field::Objects(_) => "objects",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null | Field::Value(Value::Null))
    }
}

/// Ordered name → field bag.
///
/// `identity` is the type and address of the object the record was taken
/// from; the serializer uses it to detect an object that contains itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Field)>,
    identity: Option<(TypeId, usize)>,
}

fn identity_of<T: 'static>(source: &T) -> (TypeId, usize) {
    (TypeId::of::<T>(), source as *const T as usize)
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty record tagged with the identity of `source`.
    pub fn of<T: 'static>(source: &T) -> Self {
        Self {
            fields: Vec::new(),
            identity: Some(identity_of(source)),
        }
    }

    pub fn identity(&self) -> Option<(TypeId, usize)> {
        self.identity
    }

    pub(crate) fn set_identity<T: 'static>(&mut self, source: &T) {
        self.identity = Some(identity_of(source));
    }

    /// Encode `value` and store it under `name`.
    pub fn put<P: GraphProperty>(&mut self, name: &str, value: &P) -> Result<()> {
        let field = value.to_field().map_err(|e| e.in_property(name))?;
        self.insert(name, field);
        Ok(())
    }

    /// Builder form of [`put`](Self::put).
    pub fn with<P: GraphProperty>(mut self, name: &str, value: &P) -> Result<Self> {
        self.put(name, value)?;
        Ok(self)
    }

    /// Remove `name` and decode it. A missing field decodes as `Field::Null`.
    pub fn take<P: GraphProperty>(&mut self, name: &str) -> Result<P> {
        let field = self.remove(name).unwrap_or(Field::Null);
        P::from_field(field).map_err(|e| e.in_property(name))
    }

    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }
}

impl crate::Error {
    /// Attach the property name to a binding failure that lacks one.
    pub(crate) fn in_property(self, name: &str) -> Self {
        match self {
            crate::Error::Mapping(MappingError::Binding { property, reason }) if property.is_empty() => {
                crate::Error::Mapping(MappingError::Binding { property: name.to_owned(), reason })
            }
            crate::Error::Mapping(MappingError::TypeMismatch { expected, got }) => {
                crate::Error::Mapping(MappingError::Binding {
                    property: name.to_owned(),
                    reason: format!("expected {expected}, got {got}"),
                })
            }
            other => other,
        }
    }
}
