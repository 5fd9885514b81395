//! Configuration registry.
//!
//! Process-wide, read-mostly store of [`TypeDescriptor`]s. A type is
//! registered the first time the engine meets it, together with everything
//! it reaches (base type, Complex property types, navigation relationship
//! types, relationship endpoint types). Registration classifies every
//! property once; later reads only look descriptors up.
//!
//! Reads clone an `Arc` snapshot under a short read lock. Mutations
//! (`configure_*`, `clear`, first-time registration) build a new snapshot
//! and swap it in under the single write lock, so a failed registration
//! leaves the registry untouched.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mapping::classify::{PropertyClass, TypeClassifier};
use crate::{MappingError, Result};
use super::descriptor::{EntityKind, ObjectShape, PropertyConfig, TypeDescriptor, TypeShape};
use super::{GraphType, NodeType, RelationshipType};

/// Programmatic configuration for one type, applied over the descriptor
/// the type publishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    pub label: Option<String>,
    /// Keyed by declared property name. Replaces the declared config.
    pub properties: HashMap<String, PropertyConfig>,
}

impl TypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, config: PropertyConfig) -> Self {
        self.properties.insert(name.into(), config);
        self
    }
}

#[derive(Clone, Default)]
struct RegistryState {
    types: HashMap<TypeId, Arc<TypeDescriptor>>,
    /// label → types whose own label it is, in registration order.
    by_label: HashMap<String, Vec<TypeId>>,
    /// base → direct subtypes.
    subtypes: HashMap<TypeId, Vec<TypeId>>,
    overrides: HashMap<TypeId, TypeConfig>,
    /// Shapes of every registered type, kept so a reconfiguration can
    /// rebuild descriptors without the caller's type parameter.
    shapes: HashMap<TypeId, ObjectShape>,
}

impl RegistryState {
    fn reindex(&mut self) {
        self.by_label.clear();
        self.subtypes.clear();
        let mut ordered: Vec<&Arc<TypeDescriptor>> = self.types.values().collect();
        ordered.sort_by_key(|d| d.type_name);
        for d in ordered {
            self.by_label.entry(d.label.clone()).or_default().push(d.type_id);
            if let Some(base) = d.base {
                self.subtypes.entry(base.type_id).or_default().push(d.type_id);
            }
        }
    }
}

/// Descriptor cache, label index and subtype index.
pub struct ModelRegistry {
    state: RwLock<Arc<RegistryState>>,
    classifier: TypeClassifier,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        f.debug_struct("ModelRegistry")
            .field("types", &state.types.len())
            .field("labels", &state.by_label.len())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::with_classifier(TypeClassifier::default())
    }

    pub fn with_classifier(classifier: TypeClassifier) -> Self {
        Self {
            state: RwLock::new(Arc::new(RegistryState::default())),
            classifier,
        }
    }

    pub fn classifier(&self) -> &TypeClassifier {
        &self.classifier
    }

    fn snapshot(&self) -> Arc<RegistryState> {
        Arc::clone(&self.state.read())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Descriptor of `T`, registering it on first use.
    pub fn descriptor<T: GraphType>(&self) -> Result<Arc<TypeDescriptor>> {
        self.describe(&ObjectShape::of::<T>())
    }

    /// Descriptor for `shape`, registering it on first use.
    pub fn describe(&self, shape: &ObjectShape) -> Result<Arc<TypeDescriptor>> {
        if let Some(d) = self.snapshot().types.get(&shape.type_id) {
            return Ok(Arc::clone(d));
        }
        self.mutate(|state, classifier| register_closure(state, classifier, *shape))?;
        self.get(shape.type_id)
            .ok_or_else(|| MappingError::Unregistered(shape.type_name.to_owned()).into())
    }

    /// Registered descriptor by type id.
    pub fn get(&self, type_id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.snapshot().types.get(&type_id).cloned()
    }

    pub fn is_registered<T: GraphType>(&self) -> bool {
        self.snapshot().types.contains_key(&TypeId::of::<T>())
    }

    /// Types whose own label is `label`.
    pub fn by_label(&self, label: &str) -> Vec<Arc<TypeDescriptor>> {
        let state = self.snapshot();
        state
            .by_label
            .get(label)
            .map(|ids| ids.iter().filter_map(|id| state.types.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Every registered type of `kind`, ordered by type name.
    pub fn types_of_kind(&self, kind: EntityKind) -> Vec<Arc<TypeDescriptor>> {
        let state = self.snapshot();
        let mut out: Vec<_> = state.types.values().filter(|d| d.kind == kind).cloned().collect();
        out.sort_by_key(|d| d.type_name);
        out
    }

    /// `type_id` itself (if registered) followed by all transitive subtypes.
    pub fn with_subtypes(&self, type_id: TypeId) -> Vec<Arc<TypeDescriptor>> {
        let state = self.snapshot();
        let mut out = Vec::new();
        let mut stack = vec![type_id];
        let mut seen = Vec::new();
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(d) = state.types.get(&id) {
                out.push(Arc::clone(d));
            }
            if let Some(children) = state.subtypes.get(&id) {
                stack.extend(children.iter().rev().copied());
            }
        }
        out
    }

    /// Number of base-type links between `descriptor` and its root type.
    pub fn derivation_depth(&self, descriptor: &TypeDescriptor) -> usize {
        let state = self.snapshot();
        let mut depth = 0;
        let mut current = descriptor.base;
        while let Some(base) = current {
            depth += 1;
            current = state.types.get(&base.type_id).and_then(|d| d.base);
            if depth > state.types.len() {
                break;
            }
        }
        depth
    }

    /// Labels written for an entity of `descriptor`'s type: its own label
    /// followed by each ancestor's label.
    pub fn labels_for(&self, descriptor: &TypeDescriptor) -> Vec<String> {
        let state = self.snapshot();
        let mut labels = vec![descriptor.label.clone()];
        let mut current = descriptor.base;
        while let Some(base) = current {
            let Some(d) = state.types.get(&base.type_id) else { break };
            if !labels.contains(&d.label) {
                labels.push(d.label.clone());
            }
            current = d.base;
            if labels.len() > state.types.len() + 1 {
                break;
            }
        }
        labels
    }

    /// Whether `descriptor` is `ancestor` or derives from it.
    pub fn is_assignable_to(&self, descriptor: &TypeDescriptor, ancestor: TypeId) -> bool {
        if descriptor.type_id == ancestor {
            return true;
        }
        let state = self.snapshot();
        let mut current = descriptor.base;
        let mut hops = 0;
        while let Some(base) = current {
            if base.type_id == ancestor {
                return true;
            }
            current = state.types.get(&base.type_id).and_then(|d| d.base);
            hops += 1;
            if hops > state.types.len() {
                break;
            }
        }
        false
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn configure_node<T: NodeType>(&self, config: TypeConfig) -> Result<()> {
        self.configure(ObjectShape::of::<T>(), config)
    }

    pub fn configure_relationship<T: RelationshipType>(&self, config: TypeConfig) -> Result<()> {
        self.configure(ObjectShape::of::<T>(), config)
    }

    pub fn configure_complex<T: GraphType>(&self, config: TypeConfig) -> Result<()> {
        self.configure(ObjectShape::of::<T>(), config)
    }

    fn configure(&self, shape: ObjectShape, config: TypeConfig) -> Result<()> {
        let declared = (shape.describe)();
        for name in config.properties.keys() {
            if declared.property(name).is_none() {
                return Err(MappingError::Binding {
                    property: name.clone(),
                    reason: format!("{} declares no such property", declared.type_name),
                }
                .into());
            }
        }
        debug!(type_name = shape.type_name, label = ?config.label, "configuring type");
        self.mutate(|state, classifier| {
            state.overrides.insert(shape.type_id, config);
            // Rebuild every registered descriptor so dependants see the new
            // label and storage names.
            let shapes: Vec<ObjectShape> = state.shapes.values().copied().collect();
            state.types.clear();
            register_closure(state, classifier, shape)?;
            for s in shapes {
                register_closure(state, classifier, s)?;
            }
            Ok(())
        })
    }

    /// Drop every descriptor and every override.
    pub fn clear(&self) {
        *self.state.write() = Arc::new(RegistryState::default());
        debug!("model registry cleared");
    }

    fn mutate(&self, f: impl FnOnce(&mut RegistryState, &TypeClassifier) -> Result<()>) -> Result<()> {
        let mut guard = self.state.write();
        let mut next = RegistryState::clone(&guard);
        f(&mut next, &self.classifier)?;
        next.reindex();
        *guard = Arc::new(next);
        Ok(())
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Register `root` and every type it reaches.
fn register_closure(state: &mut RegistryState, classifier: &TypeClassifier, root: ObjectShape) -> Result<()> {
    let mut pending = vec![root];
    while let Some(shape) = pending.pop() {
        if state.types.contains_key(&shape.type_id) {
            continue;
        }
        let descriptor = build_descriptor(state, classifier, shape)?;
        pending.extend(reachable(&descriptor));
        debug!(
            type_name = descriptor.type_name,
            kind = ?descriptor.kind,
            label = %descriptor.label,
            properties = descriptor.properties.len(),
            "registered type"
        );
        state.shapes.insert(shape.type_id, shape);
        state.types.insert(shape.type_id, Arc::new(descriptor));
    }
    Ok(())
}

fn build_descriptor(state: &RegistryState, classifier: &TypeClassifier, shape: ObjectShape) -> Result<TypeDescriptor> {
    let mut descriptor = (shape.describe)();
    if let Some(config) = state.overrides.get(&shape.type_id) {
        if let Some(label) = &config.label {
            descriptor.label = label.clone();
        }
        for property in &mut descriptor.properties {
            if let Some(c) = config.properties.get(&property.name) {
                property.config = c.clone();
            }
        }
    }

    let owner = descriptor.short_name();
    for property in &mut descriptor.properties {
        if property.config.ignored {
            continue;
        }
        let class = classifier.classify(owner, &property.name, &property.shape)?;
        if descriptor.kind == EntityKind::Relationship && class.is_complex() {
            return Err(MappingError::UnsupportedType {
                type_name: descriptor.type_name.to_owned(),
                property: property.name.clone(),
                reason: "relationship properties must be Simple".to_owned(),
            }
            .into());
        }
        property.class = Some(class);
    }
    Ok(descriptor)
}

fn reachable(descriptor: &TypeDescriptor) -> Vec<ObjectShape> {
    let mut out = Vec::new();
    out.extend(descriptor.base);
    for property in descriptor.persisted_properties() {
        if let Some(PropertyClass::Complex { object, .. }) = &property.class {
            out.push(*object);
        } else if let TypeShape::Object(o) = property.shape.non_null() {
            out.push(*o);
        }
    }
    out.extend(descriptor.navigations.iter().map(|n| n.relationship));
    out.extend(descriptor.source);
    out.extend(descriptor.target);
    out
}
