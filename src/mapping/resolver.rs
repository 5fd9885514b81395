//! LabelResolver: pick the concrete type to materialize for a stored
//! label set.
//!
//! Candidates are the requested type and its registered subtypes (or every
//! registered type of the entity kind when nothing specific is requested).
//! The winner is the most-derived candidate whose own label is stored.
//! Types from unrelated hierarchies interoperate by sharing a label.

use std::sync::Arc;

use tracing::trace;

use crate::schema::{EntityKind, ModelRegistry, ObjectShape, TypeDescriptor};
use crate::{Error, MappingError, Result};

pub struct LabelResolver<'r> {
    registry: &'r ModelRegistry,
}

impl<'r> LabelResolver<'r> {
    pub fn new(registry: &'r ModelRegistry) -> Self {
        Self { registry }
    }

    /// Resolve against `requested` and its subtypes.
    pub fn resolve(&self, stored: &[String], requested: &ObjectShape) -> Result<Arc<TypeDescriptor>> {
        let requested_descriptor = self.registry.describe(requested)?;
        let candidates = self.registry.with_subtypes(requested_descriptor.type_id);
        self.pick(stored, candidates, requested.type_name)
    }

    /// Resolve against every registered type of `kind`.
    pub fn resolve_any(&self, stored: &[String], kind: EntityKind) -> Result<Arc<TypeDescriptor>> {
        let candidates = self.registry.types_of_kind(kind);
        self.pick(stored, candidates, &format!("{kind:?}"))
    }

    fn pick(&self, stored: &[String], candidates: Vec<Arc<TypeDescriptor>>, wanted: &str) -> Result<Arc<TypeDescriptor>> {
        let mut best: Vec<(usize, Arc<TypeDescriptor>)> = Vec::new();
        for candidate in candidates {
            if !stored.iter().any(|l| *l == candidate.label) {
                continue;
            }
            let depth = self.registry.derivation_depth(&candidate);
            match best.first() {
                Some((d, _)) if depth < *d => {}
                Some((d, _)) if depth == *d => best.push((depth, candidate)),
                _ => best = vec![(depth, candidate)],
            }
        }

        match best.len() {
            0 => Err(Error::NotFound(format!("no {wanted} matches labels {stored:?}"))),
            1 => {
                let (_, chosen) = best.remove(0);
                trace!(labels = ?stored, resolved = chosen.type_name, "resolved label");
                Ok(chosen)
            }
            _ => Err(MappingError::AmbiguousType {
                labels: stored.to_vec(),
                candidates: best.iter().map(|(_, d)| d.type_name.to_owned()).collect(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityId, GraphType, NodeType, Record};

    macro_rules! node {
        ($name:ident, $label:literal $(, extends $base:ident)?) => {
            struct $name {
                id: EntityId,
            }
            impl GraphType for $name {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::node::<Self>().label($label)$(.extends::<$base>())?.build()
                }
                fn to_record(&self) -> Result<Record> { Ok(Record::of(self)) }
                fn from_record(mut r: Record) -> Result<Self> { Ok(Self { id: r.take("Id")? }) }
            }
            impl NodeType for $name {
                fn id(&self) -> &EntityId { &self.id }
            }
        };
    }

    node!(Vehicle, "Vehicle");
    node!(Car, "Car", extends Vehicle);
    node!(SportsCar, "SportsCar", extends Car);
    node!(Truck, "Truck", extends Vehicle);
    node!(OtherCar, "Car");
    node!(Gadget, "Gadget");
    node!(OtherGadget, "Gadget");

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_most_derived_wins() {
        let registry = ModelRegistry::new();
        registry.descriptor::<SportsCar>().unwrap();
        registry.descriptor::<Truck>().unwrap();
        let resolver = LabelResolver::new(&registry);

        let d = resolver
            .resolve(&labels(&["SportsCar", "Car", "Vehicle"]), &ObjectShape::of::<Vehicle>())
            .unwrap();
        assert_eq!(d.label, "SportsCar");

        let d = resolver.resolve(&labels(&["Car", "Vehicle"]), &ObjectShape::of::<Vehicle>()).unwrap();
        assert_eq!(d.label, "Car");
    }

    #[test]
    fn test_requested_type_bounds_candidates() {
        let registry = ModelRegistry::new();
        registry.descriptor::<Car>().unwrap();
        registry.descriptor::<OtherCar>().unwrap();
        let resolver = LabelResolver::new(&registry);

        let d = resolver.resolve(&labels(&["Car"]), &ObjectShape::of::<OtherCar>()).unwrap();
        assert_eq!(d.type_id, std::any::TypeId::of::<OtherCar>());

        let err = resolver.resolve(&labels(&["Truck"]), &ObjectShape::of::<Car>()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err}");
    }

    #[test]
    fn test_equal_depth_candidates_are_ambiguous() {
        let registry = ModelRegistry::new();
        registry.descriptor::<Gadget>().unwrap();
        registry.descriptor::<OtherGadget>().unwrap();
        let err = LabelResolver::new(&registry)
            .resolve_any(&labels(&["Gadget"]), EntityKind::Node)
            .unwrap_err();
        match err {
            Error::Mapping(MappingError::AmbiguousType { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected {other}"),
        }
    }
}
