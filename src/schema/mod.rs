//! # Schema
//!
//! The typed side of the mapping: the traits domain types implement, the
//! descriptors they publish, and the registry that caches them.
//!
//! ```rust
//! use graph_model::{EntityId, GraphType, NodeType, Record, TypeDescriptor, Result};
//!
//! struct Person {
//!     id: EntityId,
//!     name: String,
//! }
//!
//! impl GraphType for Person {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::node::<Self>()
//!             .label("Person")
//!             .property::<String>("Name")
//!             .build()
//!     }
//!
//!     fn to_record(&self) -> Result<Record> {
//!         Record::of(self).with("Name", &self.name)
//!     }
//!
//!     fn from_record(mut record: Record) -> Result<Self> {
//!         Ok(Self { id: record.take("Id")?, name: record.take("Name")? })
//!     }
//! }
//!
//! impl NodeType for Person {
//!     fn id(&self) -> &EntityId { &self.id }
//! }
//! ```

pub mod descriptor;
pub mod identity;
pub mod record;
pub mod registry;

pub use descriptor::{
    CollectionKind, DescriptorBuilder, EntityKind, NavigationDescriptor, ObjectShape,
    PropertyConfig, PropertyDescriptor, ScalarKind, TypeDescriptor, TypeShape, Validation,
    default_label,
};
pub use identity::{Endpoint, EndpointNode, EntityId, Navigation, StagedNode};
pub use record::{Field, Record};
pub use registry::{ModelRegistry, TypeConfig};

use crate::Result;

/// Record key the entity id is bound under.
pub const ID_FIELD: &str = "Id";
/// Record key of a relationship's source entity id.
pub const SOURCE_ID_FIELD: &str = "SourceId";
/// Record key of a relationship's target entity id.
pub const TARGET_ID_FIELD: &str = "TargetId";

/// A type the mapper can describe, decompose and rebuild.
///
/// `to_record` writes every declared property; `from_record` is the
/// construction path. Node and relationship types also receive their
/// reserved fields ([`ID_FIELD`], [`SOURCE_ID_FIELD`], [`TARGET_ID_FIELD`]).
pub trait GraphType: Send + Sync + Sized + 'static {
    fn descriptor() -> TypeDescriptor;
    fn to_record(&self) -> Result<Record>;
    fn from_record(record: Record) -> Result<Self>;
}

/// Graph node.
pub trait NodeType: GraphType {
    fn id(&self) -> &EntityId;

    /// Slot for a declared navigation property.
    fn navigation_mut(&mut self, _name: &str) -> Option<&mut Navigation> {
        None
    }
}

/// Graph relationship.
pub trait RelationshipType: GraphType {
    fn id(&self) -> &EntityId;
    fn source(&self) -> &Endpoint;
    fn target(&self) -> &Endpoint;
    fn endpoints_mut(&mut self) -> (&mut Endpoint, &mut Endpoint);

    fn source_id(&self) -> &EntityId {
        self.source().id()
    }

    fn target_id(&self) -> &EntityId {
        self.target().id()
    }
}
