//! # Property Graph Model
//!
//! Storage-level DTOs exchanged with a [`StorageBackend`](crate::StorageBackend).
//! The mapping layer turns typed domain objects into these and back.
//!
//! Design rule: this module is pure data. No I/O or async.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use path::Path;
pub use value::{Value, IsoDuration, Point};
pub use property_map::{PropertyMap, property_map};
