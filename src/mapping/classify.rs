//! TypeClassifier: structural Simple/Complex classification.
//!
//! A property is **Simple** when its declared type is a scalar family or a
//! single-level collection of scalars; nullability is transparent. It is
//! **Complex** when the type is a concrete, constructible described type of
//! kind [`EntityKind::Complex`] (or a collection of one) whose own
//! properties classify in turn. Nested Complex types are allowed up to
//! `max_depth` levels; a type that reaches itself is rejected. Any other
//! shape is a [`MappingError`].

use std::any::TypeId;

use crate::schema::{CollectionKind, EntityKind, ObjectShape, TypeShape};
use crate::MappingError;

/// Outcome of classifying one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyClass {
    Simple,
    Complex {
        object: ObjectShape,
        /// `Some` when the property is a collection of Complex values.
        collection: Option<CollectionKind>,
    },
}

impl PropertyClass {
    pub fn is_simple(&self) -> bool {
        matches!(self, PropertyClass::Simple)
    }

    pub fn is_complex(&self) -> bool {
        !self.is_simple()
    }
}

/// Stateless classifier parameterised by the nesting limit.
#[derive(Debug, Clone, Copy)]
pub struct TypeClassifier {
    max_depth: usize,
}

impl Default for TypeClassifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_COMPLEX_DEPTH)
    }
}

impl TypeClassifier {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Scalar, or one level of collection over a scalar.
    pub fn is_simple(&self, shape: &TypeShape) -> bool {
        match shape.non_null() {
            TypeShape::Scalar(_) => true,
            TypeShape::Collection { element, .. } => matches!(element.non_null(), TypeShape::Scalar(_)),
            _ => false,
        }
    }

    pub fn is_complex(&self, shape: &TypeShape) -> bool {
        !self.is_simple(shape) && self.classify("?", "?", shape).is_ok()
    }

    /// Classify property `property` of `owner`.
    pub fn classify(&self, owner: &str, property: &str, shape: &TypeShape) -> Result<PropertyClass, MappingError> {
        if self.is_simple(shape) {
            return Ok(PropertyClass::Simple);
        }
        let path = format!("{owner}.{property}");
        let mut visiting = Vec::new();
        match shape.non_null() {
            TypeShape::Object(object) => {
                self.check_complex(object, &path, &mut visiting, 1)?;
                Ok(PropertyClass::Complex { object: *object, collection: None })
            }
            TypeShape::Collection { kind, element } => match element.non_null() {
                TypeShape::Object(_) if nullable(element) => {
                    Err(unsupported(owner, property, NULLABLE_ELEMENTS))
                }
                TypeShape::Object(object) => {
                    self.check_complex(object, &path, &mut visiting, 1)?;
                    Ok(PropertyClass::Complex { object: *object, collection: Some(*kind) })
                }
                other => Err(unsupported(owner, property, &format!(
                    "collections nest only one level (element type {})",
                    other.describe()
                ))),
            },
            other => Err(unsupported(owner, property, &format!("{} is neither Simple nor Complex", other.describe()))),
        }
    }

    fn check_complex(
        &self,
        object: &ObjectShape,
        path: &str,
        visiting: &mut Vec<TypeId>,
        depth: usize,
    ) -> Result<(), MappingError> {
        if depth > self.max_depth {
            return Err(MappingError::DepthExceeded { limit: self.max_depth, path: path.to_owned() });
        }
        if visiting.contains(&object.type_id) {
            return Err(MappingError::CyclicReference(path.to_owned()));
        }

        let descriptor = (object.describe)();
        match descriptor.kind {
            EntityKind::Complex => {}
            EntityKind::Node | EntityKind::Relationship => {
                return Err(MappingError::UnsupportedType {
                    type_name: descriptor.type_name.to_owned(),
                    property: path.to_owned(),
                    reason: format!("{:?} types cannot be property values", descriptor.kind),
                });
            }
        }
        if descriptor.is_abstract {
            return Err(MappingError::NotConstructible(descriptor.type_name.to_owned()));
        }

        visiting.push(object.type_id);
        for property in descriptor.persisted_properties() {
            if self.is_simple(&property.shape) {
                continue;
            }
            let nested_path = format!("{path}.{}", property.name);
            let nested = match property.shape.non_null() {
                TypeShape::Object(o) => *o,
                TypeShape::Collection { element, .. } => match element.non_null() {
                    TypeShape::Object(_) if nullable(element) => {
                        return Err(unsupported(descriptor.type_name, &property.name, NULLABLE_ELEMENTS));
                    }
                    TypeShape::Object(o) => *o,
                    other => {
                        return Err(unsupported(descriptor.type_name, &property.name, &format!(
                            "collections nest only one level (element type {})",
                            other.describe()
                        )));
                    }
                },
                other => {
                    return Err(unsupported(descriptor.type_name, &property.name, &format!(
                        "{} is neither Simple nor Complex",
                        other.describe()
                    )));
                }
            };
            self.check_complex(&nested, &nested_path, visiting, depth + 1)?;
        }
        visiting.pop();
        Ok(())
    }
}

const NULLABLE_ELEMENTS: &str = "collections of Complex values cannot hold nulls";

fn nullable(shape: &TypeShape) -> bool {
    matches!(shape, TypeShape::Nullable(_))
}

fn unsupported(owner: &str, property: &str, reason: &str) -> MappingError {
    MappingError::UnsupportedType {
        type_name: owner.to_owned(),
        property: property.to_owned(),
        reason: reason.to_owned(),
    }
}
