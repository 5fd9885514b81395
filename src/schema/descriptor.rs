//! Type descriptors: the per-type metadata the mapping engine runs on.
//!
//! A descriptor is built once per type by its [`GraphType::descriptor`]
//! impl and cached in the [`ModelRegistry`](super::ModelRegistry). Nothing
//! inspects a type at call time; serialization and deserialization only
//! walk descriptors.

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mapping::classify::PropertyClass;
use crate::mapping::codec::GraphProperty;
use crate::model::{Direction, Value};
use crate::{MappingError, Result};
use super::identity::{Endpoint, EntityId, Navigation};
use super::record::Record;
use super::{GraphType, NodeType, RelationshipType};

// ============================================================================
// Shapes
// ============================================================================

/// Scalar families a Simple property can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Integer,
    Float,
    Decimal,
    Char,
    String,
    Bytes,
    Uri,
    Id,
    Enum,
    Date,
    Time,
    DateTime,
    LocalDateTime,
    Duration,
    Point,
}

/// Whether a collection preserves element order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    Ordered,
    Unordered,
}

/// Reference to a described (Complex, Node or Relationship) type.
#[derive(Clone, Copy)]
pub struct ObjectShape {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub describe: fn() -> TypeDescriptor,
}

impl ObjectShape {
    pub fn of<T: GraphType>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            describe: T::descriptor,
        }
    }
}

impl PartialEq for ObjectShape {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for ObjectShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.type_name)
    }
}

/// Declared shape of a property type.
///
/// Classification into Simple/Complex is a pure function of this value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    Scalar(ScalarKind),
    Nullable(Box<TypeShape>),
    Collection { kind: CollectionKind, element: Box<TypeShape> },
    Object(ObjectShape),
    /// A shape the mapper has no encoding for (maps, tuples, ...).
    Unsupported(&'static str),
}

impl TypeShape {
    pub fn ordered(element: TypeShape) -> Self {
        TypeShape::Collection { kind: CollectionKind::Ordered, element: Box::new(element) }
    }

    pub fn unordered(element: TypeShape) -> Self {
        TypeShape::Collection { kind: CollectionKind::Unordered, element: Box::new(element) }
    }

    /// Strip any number of `Nullable` wrappers.
    pub fn non_null(&self) -> &TypeShape {
        match self {
            TypeShape::Nullable(inner) => inner.non_null(),
            other => other,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TypeShape::Scalar(kind) => format!("{kind:?}"),
            TypeShape::Nullable(inner) => format!("Option<{}>", inner.describe()),
            TypeShape::Collection { kind: CollectionKind::Ordered, element } => format!("List<{}>", element.describe()),
            TypeShape::Collection { kind: CollectionKind::Unordered, element } => format!("Set<{}>", element.describe()),
            TypeShape::Object(o) => o.type_name.to_owned(),
            TypeShape::Unsupported(what) => (*what).to_owned(),
        }
    }
}

// ============================================================================
// Property configuration
// ============================================================================

/// Value constraint checked on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Validation {
    MinLength(usize),
    MaxLength(usize),
    Range { min: f64, max: f64 },
}

impl Validation {
    /// Check `value`; nulls pass (use `required` to reject them).
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::List(l) => Some(l.len()),
            Value::Bytes(b) => Some(b.len()),
            _ => None,
        };
        match (self, value) {
            (_, Value::Null) => Ok(()),
            (Validation::MinLength(min), _) => match len {
                Some(n) if n < *min => Err(format!("length {n} is below minimum {min}")),
                Some(_) => Ok(()),
                None => Err(format!("{} has no length", value.type_name())),
            },
            (Validation::MaxLength(max), _) => match len {
                Some(n) if n > *max => Err(format!("length {n} exceeds maximum {max}")),
                Some(_) => Ok(()),
                None => Err(format!("{} has no length", value.type_name())),
            },
            // Decimals are stored as strings.
            (Validation::Range { min, max }, _) => match value
                .as_float()
                .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
            {
                Some(v) if v < *min || v > *max => Err(format!("{v} outside [{min}, {max}]")),
                Some(_) => Ok(()),
                None => Err(format!("{} is not numeric", value.type_name())),
            },
        }
    }
}

/// Per-property overrides: stored name, indexing, constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfig {
    /// Stored property name; defaults to the declared name.
    pub name: Option<String>,
    pub indexed: bool,
    pub unique: bool,
    pub required: bool,
    /// Never persisted, never read back.
    pub ignored: bool,
    pub validations: Vec<Validation>,
}

impl PropertyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.indexed = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// The three kinds of described types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Node,
    Relationship,
    Complex,
}

/// One declared property.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub shape: TypeShape,
    pub config: PropertyConfig,
    pub(crate) class: Option<PropertyClass>,
}

impl PropertyDescriptor {
    /// Name the property is stored under.
    pub fn storage_name(&self) -> &str {
        self.config.name.as_deref().unwrap_or(&self.name)
    }

    /// Simple/Complex classification, available once registered.
    pub fn class(&self) -> Option<&PropertyClass> {
        self.class.as_ref()
    }
}

/// Relationship-typed navigation property on a node.
#[derive(Debug, Clone)]
pub struct NavigationDescriptor {
    pub name: String,
    pub relationship: ObjectShape,
    /// `None` follows the relationship type's own direction.
    pub direction: Option<Direction>,
}

/// Type-erased accessors captured when the descriptor is built.
#[derive(Clone, Copy)]
pub(crate) struct ObjectVTable {
    pub to_record: fn(&dyn Any) -> Result<Record>,
    pub from_record: fn(Record) -> Result<Box<dyn Any + Send + Sync>>,
    pub entity_id: fn(&dyn Any) -> Option<&EntityId>,
    pub navigation_mut: for<'a> fn(&'a mut dyn Any, &str) -> Option<&'a mut Navigation>,
    pub endpoints: fn(&dyn Any) -> Option<(&Endpoint, &Endpoint)>,
    pub endpoints_mut: fn(&mut dyn Any) -> Option<(&mut Endpoint, &mut Endpoint)>,
}

/// Everything the engine knows about one type.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub kind: EntityKind,
    pub label: String,
    pub base: Option<ObjectShape>,
    pub is_abstract: bool,
    pub properties: Vec<PropertyDescriptor>,
    pub navigations: Vec<NavigationDescriptor>,
    /// Relationship types only.
    pub direction: Direction,
    /// Relationship types only: declared endpoint node types.
    pub source: Option<ObjectShape>,
    pub target: Option<ObjectShape>,
    pub(crate) vtable: ObjectVTable,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("base", &self.base)
            .field("properties", &self.properties)
            .field("navigations", &self.navigations)
            .finish()
    }
}

impl TypeDescriptor {
    pub fn node<T: NodeType>() -> DescriptorBuilder {
        DescriptorBuilder::new::<T>(EntityKind::Node, ObjectVTable {
            to_record: erased_to_record::<T>,
            from_record: erased_from_record::<T>,
            entity_id: node_id::<T>,
            navigation_mut: node_navigation::<T>,
            endpoints: no_endpoints,
            endpoints_mut: no_endpoints_mut,
        })
    }

    pub fn relationship<T: RelationshipType>() -> DescriptorBuilder {
        DescriptorBuilder::new::<T>(EntityKind::Relationship, ObjectVTable {
            to_record: erased_to_record::<T>,
            from_record: erased_from_record::<T>,
            entity_id: relationship_id::<T>,
            navigation_mut: no_navigation,
            endpoints: relationship_endpoints::<T>,
            endpoints_mut: relationship_endpoints_mut::<T>,
        })
    }

    pub fn complex<T: GraphType>() -> DescriptorBuilder {
        DescriptorBuilder::new::<T>(EntityKind::Complex, ObjectVTable {
            to_record: erased_to_record::<T>,
            from_record: erased_from_record::<T>,
            entity_id: no_id,
            navigation_mut: no_navigation,
            endpoints: no_endpoints,
            endpoints_mut: no_endpoints_mut,
        })
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationDescriptor> {
        self.navigations.iter().find(|n| n.name == name)
    }

    /// Properties that take part in persistence.
    pub fn persisted_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| !p.config.ignored)
    }

    /// Short type name without the module path.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }

    pub(crate) fn to_record(&self, object: &dyn Any) -> Result<Record> {
        (self.vtable.to_record)(object)
    }

    pub(crate) fn construct(&self, record: Record) -> Result<Box<dyn Any + Send + Sync>> {
        if self.is_abstract {
            return Err(MappingError::NotConstructible(self.type_name.to_owned()).into());
        }
        (self.vtable.from_record)(record)
    }

    pub(crate) fn entity_id<'a>(&self, object: &'a dyn Any) -> Option<&'a EntityId> {
        (self.vtable.entity_id)(object)
    }

    pub(crate) fn navigation_mut<'a>(&self, object: &'a mut dyn Any, name: &str) -> Option<&'a mut Navigation> {
        (self.vtable.navigation_mut)(object, name)
    }

    pub(crate) fn endpoints<'a>(&self, object: &'a dyn Any) -> Option<(&'a Endpoint, &'a Endpoint)> {
        (self.vtable.endpoints)(object)
    }

    pub(crate) fn endpoints_mut<'a>(&self, object: &'a mut dyn Any) -> Option<(&'a mut Endpoint, &'a mut Endpoint)> {
        (self.vtable.endpoints_mut)(object)
    }
}

/// Default label: the module-qualified type name with path separators and
/// generic punctuation replaced by `_`.
pub fn default_label(type_name: &str) -> String {
    let mut label = String::with_capacity(type_name.len());
    let mut last_sep = false;
    for c in type_name.chars() {
        if c.is_alphanumeric() {
            label.push(c);
            last_sep = false;
        } else if !last_sep && !label.is_empty() {
            label.push('_');
            last_sep = true;
        }
    }
    while label.ends_with('_') {
        label.pop();
    }
    label
}

pub(crate) fn short_type_name(type_name: &'static str) -> &'static str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent descriptor builder. Property modifiers (`named`, `indexed`, ...)
/// apply to the most recently declared property.
pub struct DescriptorBuilder {
    descriptor: TypeDescriptor,
}

impl DescriptorBuilder {
    fn new<T: GraphType>(kind: EntityKind, vtable: ObjectVTable) -> Self {
        let type_name = std::any::type_name::<T>();
        Self {
            descriptor: TypeDescriptor {
                type_id: TypeId::of::<T>(),
                type_name,
                kind,
                label: default_label(type_name),
                base: None,
                is_abstract: false,
                properties: Vec::new(),
                navigations: Vec::new(),
                direction: Direction::Outgoing,
                source: None,
                target: None,
                vtable,
            },
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.descriptor.label = label.into();
        self
    }

    /// Declare `B` as the base type for label-driven polymorphic reads.
    pub fn extends<B: GraphType>(mut self) -> Self {
        self.descriptor.base = Some(ObjectShape::of::<B>());
        self
    }

    /// The type can be requested but never instantiated.
    pub fn abstract_type(mut self) -> Self {
        self.descriptor.is_abstract = true;
        self
    }

    pub fn property<P: GraphProperty>(mut self, name: impl Into<String>) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.into(),
            shape: P::shape(),
            config: PropertyConfig::default(),
            class: None,
        });
        self
    }

    /// Replace the configuration of the last declared property.
    pub fn configured(mut self, config: PropertyConfig) -> Self {
        if let Some(last) = self.descriptor.properties.last_mut() {
            last.config = config;
        }
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.modify_last(|c| c.name = Some(name))
    }

    pub fn indexed(self) -> Self {
        self.modify_last(|c| c.indexed = true)
    }

    pub fn unique(self) -> Self {
        self.modify_last(|c| {
            c.unique = true;
            c.indexed = true;
        })
    }

    pub fn required(self) -> Self {
        self.modify_last(|c| c.required = true)
    }

    pub fn ignored(self) -> Self {
        self.modify_last(|c| c.ignored = true)
    }

    pub fn validate(self, validation: Validation) -> Self {
        self.modify_last(|c| c.validations.push(validation))
    }

    /// Navigation following `R` in `R`'s own direction.
    pub fn navigation<R: RelationshipType>(mut self, name: impl Into<String>) -> Self {
        self.descriptor.navigations.push(NavigationDescriptor {
            name: name.into(),
            relationship: ObjectShape::of::<R>(),
            direction: None,
        });
        self
    }

    pub fn navigation_towards<R: RelationshipType>(mut self, name: impl Into<String>, direction: Direction) -> Self {
        self.descriptor.navigations.push(NavigationDescriptor {
            name: name.into(),
            relationship: ObjectShape::of::<R>(),
            direction: Some(direction),
        });
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.descriptor.direction = direction;
        self
    }

    /// Declare the node types at each end of a relationship. Hydration
    /// resolves endpoint labels within these types; undeclared ends match
    /// any registered node type.
    pub fn endpoints<S: NodeType, T: NodeType>(mut self) -> Self {
        self.descriptor.source = Some(ObjectShape::of::<S>());
        self.descriptor.target = Some(ObjectShape::of::<T>());
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }

    fn modify_last(mut self, f: impl FnOnce(&mut PropertyConfig)) -> Self {
        if let Some(last) = self.descriptor.properties.last_mut() {
            f(&mut last.config);
        }
        self
    }
}

// ============================================================================
// Erased accessors
// ============================================================================

fn mismatch<T>() -> crate::Error {
    MappingError::TypeMismatch {
        expected: std::any::type_name::<T>().to_owned(),
        got: "another type".to_owned(),
    }
    .into()
}

fn erased_to_record<T: GraphType>(object: &dyn Any) -> Result<Record> {
    let value = object.downcast_ref::<T>().ok_or_else(mismatch::<T>)?;
    let mut record = value.to_record()?;
    record.set_identity(value);
    Ok(record)
}

fn erased_from_record<T: GraphType>(record: Record) -> Result<Box<dyn Any + Send + Sync>> {
    Ok(Box::new(T::from_record(record)?))
}

fn node_id<T: NodeType>(object: &dyn Any) -> Option<&EntityId> {
    object.downcast_ref::<T>().map(NodeType::id)
}

fn relationship_id<T: RelationshipType>(object: &dyn Any) -> Option<&EntityId> {
    object.downcast_ref::<T>().map(RelationshipType::id)
}

fn no_id(_: &dyn Any) -> Option<&EntityId> {
    None
}

fn node_navigation<'a, T: NodeType>(object: &'a mut dyn Any, name: &str) -> Option<&'a mut Navigation> {
    object.downcast_mut::<T>().and_then(|n| n.navigation_mut(name))
}

fn no_navigation<'a>(_: &'a mut dyn Any, _: &str) -> Option<&'a mut Navigation> {
    None
}

fn relationship_endpoints<T: RelationshipType>(object: &dyn Any) -> Option<(&Endpoint, &Endpoint)> {
    object.downcast_ref::<T>().map(|r| (r.source(), r.target()))
}

fn relationship_endpoints_mut<T: RelationshipType>(object: &mut dyn Any) -> Option<(&mut Endpoint, &mut Endpoint)> {
    object.downcast_mut::<T>().map(|r| r.endpoints_mut())
}

fn no_endpoints(_: &dyn Any) -> Option<(&Endpoint, &Endpoint)> {
    None
}

fn no_endpoints_mut(_: &mut dyn Any) -> Option<(&mut Endpoint, &mut Endpoint)> {
    None
}
