//! # Mapping engine
//!
//! Typed objects ⇄ labeled entities with classified properties.
//!
//! ```text
//! write: object ─► EntitySerializer ─► SerializedGraph ─► backend
//!                    │  TypeClassifier (cached per property)
//!                    └─ PropertyCodec
//! read:  backend ─► SerializedGraph ─► LabelResolver ─► EntityDeserializer ─► object
//! ```

pub mod classify;
pub mod codec;
pub mod deserializer;
pub mod entity;
pub mod resolver;
pub mod serializer;

pub use classify::{PropertyClass, TypeClassifier};
pub use codec::{Bytes, GraphProperty, Uri};
pub use deserializer::EntityDeserializer;
pub use entity::{
    ComplexRef, Entity, EntityRef, PropertyEdge, SerializedGraph, edge_label_property_name,
    is_property_edge, property_edge_label, ID_PROPERTY, ORDINAL_PROPERTY, PROPERTY_EDGE_PREFIX,
    PROPERTY_EDGE_SUFFIX,
};
pub use resolver::LabelResolver;
pub use serializer::EntitySerializer;
