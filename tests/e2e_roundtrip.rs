//! Write-then-read round trips through the full pipeline.

mod common;

use common::{Address, Person};
use graph_model::mapping::{
    ComplexRef, EntityDeserializer, EntitySerializer, PROPERTY_EDGE_PREFIX, property_edge_label,
};
use graph_model::{
    Bytes, Direction, EntityId, Error, Graph, GraphType, MappingError, ModelRegistry, NodeType, Record,
    Result, StorageBackend, TxMode, TypeDescriptor, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn alice() -> Person {
    Person {
        home_address: Some(Address::new("123 Main St", "Portland")),
        ..Person::new("Alice", 30)
    }
}

// ============================================================================
// 1. The Person/Address example
// ============================================================================

#[test]
fn test_person_serializes_to_root_and_address_child() {
    let registry = ModelRegistry::new();
    let graph = EntitySerializer::new(&registry).serialize(&alice()).unwrap();

    assert_eq!(graph.entities.len(), 2);
    let root = graph.root().unwrap();
    assert_eq!(root.label, "Person");
    assert_eq!(root.simple_properties.get("FirstName"), Some(&Value::from("Alice")));
    assert_eq!(root.simple_properties.get("Age"), Some(&Value::Int(30)));
    assert!(matches!(root.complex_properties.get("HomeAddress"), Some(ComplexRef::One(_))));

    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].label, "__PROPERTY__HomeAddress__");
    assert!(graph.edges[0].label.starts_with(PROPERTY_EDGE_PREFIX));
    let child = &graph.entities[graph.edges[0].child.0];
    assert_eq!(child.label, "Address");
    assert_eq!(child.simple_properties.get("City"), Some(&Value::from("Portland")));
}

#[tokio::test]
async fn test_person_round_trips_through_memory_backend() {
    let graph = Graph::open_memory().await.unwrap();
    let person = alice();
    graph.create_node(&person, None, None).await.unwrap();

    let read = graph.get_node::<Person>(&person.id, None, None).await.unwrap();
    let back = read.root::<Person>().unwrap();
    assert_eq!(back.id, person.id);
    assert_eq!(back.first_name, "Alice");
    assert_eq!(back.age, 30);
    assert_eq!(back.home_address, Some(Address::new("123 Main St", "Portland")));
    assert!(!back.knows.is_loaded());

    let tx = graph.transaction(TxMode::ReadOnly).await.unwrap();
    assert_eq!(graph.backend().node_count(tx_inner(&tx)).await.unwrap(), 2);
}

#[tokio::test]
async fn test_ordered_complex_collection_keeps_order() {
    let graph = Graph::open_memory().await.unwrap();
    let person = Person {
        previous_addresses: vec![
            Address::new("1 First Ave", "Austin"),
            Address::new("2 Second St", "Boston"),
            Address::new("3 Third Rd", "Chicago"),
            Address::new("4 Fourth Ln", "Denver"),
        ],
        ..Person::new("Bob", 41)
    };
    graph.create_node(&person, None, None).await.unwrap();

    let back = graph.get_node::<Person>(&person.id, None, None).await.unwrap().into_root::<Person>().unwrap();
    assert_eq!(back.previous_addresses, person.previous_addresses);
    assert_eq!(back.home_address, None);
}

#[tokio::test]
async fn test_update_replaces_simple_and_complex_properties() {
    let graph = Graph::open_memory().await.unwrap();
    let mut person = alice();
    person.previous_addresses = vec![Address::new("9 Old Rd", "Salem")];
    graph.create_node(&person, None, None).await.unwrap();

    person.age = 31;
    person.home_address = Some(Address::new("500 Oak Ave", "Seattle"));
    person.previous_addresses.clear();
    graph.update_node(&person, None, None).await.unwrap();

    let back = graph.get_node::<Person>(&person.id, None, None).await.unwrap().into_root::<Person>().unwrap();
    assert_eq!(back.age, 31);
    assert_eq!(back.home_address, Some(Address::new("500 Oak Ave", "Seattle")));
    assert!(back.previous_addresses.is_empty());

    let tx = graph.transaction(TxMode::ReadOnly).await.unwrap();
    assert_eq!(graph.backend().node_count(tx_inner(&tx)).await.unwrap(), 2, "old sub-entities removed");
}

#[tokio::test]
async fn test_delete_removes_node_and_sub_entities() {
    let graph = Graph::open_memory().await.unwrap();
    let person = alice();
    graph.create_node(&person, None, None).await.unwrap();
    graph.delete_node::<Person>(&person.id, None, None).await.unwrap();

    let err = graph.get_node::<Person>(&person.id, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    let tx = graph.transaction(TxMode::ReadOnly).await.unwrap();
    assert_eq!(graph.backend().node_count(tx_inner(&tx)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_id_is_a_conflict() {
    let graph = Graph::open_memory().await.unwrap();
    let person = alice();
    graph.create_node(&person, None, None).await.unwrap();
    let err = graph.create_node(&person, None, None).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");
}

#[tokio::test]
async fn test_property_edges_are_outgoing_from_parent() {
    let graph = Graph::open_memory().await.unwrap();
    let person = alice();
    graph.create_node(&person, None, None).await.unwrap();

    let tx = graph.transaction(TxMode::ReadOnly).await.unwrap();
    let inner = tx_inner(&tx);
    let root = graph.backend().nodes_by_label(inner, "Person").await.unwrap().remove(0);
    let edges = graph
        .backend()
        .get_relationships(inner, root.id, Direction::Outgoing, Some(&property_edge_label("HomeAddress")))
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    let child = graph.backend().get_node(inner, edges[0].dst).await.unwrap().unwrap();
    assert!(child.has_label("Address"));
    assert!(child.get("Id").is_none(), "sub-entities are not addressable");
}

fn tx_inner<'a>(tx: &'a graph_model::GraphTransaction<'_, graph_model::MemoryBackend>) -> &'a <graph_model::MemoryBackend as StorageBackend>::Tx {
    tx.backend_tx().unwrap()
}

// ============================================================================
// 2. Simple-only round trip (property)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    id: EntityId,
    sensor: String,
    count: i64,
    level: f64,
    active: bool,
    note: Option<String>,
    samples: Vec<i32>,
}

impl GraphType for Reading {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::node::<Self>()
            .label("Reading")
            .property::<String>("Sensor")
            .property::<i64>("Count")
            .property::<f64>("Level")
            .property::<bool>("Active")
            .property::<Option<String>>("Note")
            .property::<Vec<i32>>("Samples")
            .build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self)
            .with("Sensor", &self.sensor)?
            .with("Count", &self.count)?
            .with("Level", &self.level)?
            .with("Active", &self.active)?
            .with("Note", &self.note)?
            .with("Samples", &self.samples)
    }

    fn from_record(mut r: Record) -> Result<Self> {
        Ok(Self {
            id: r.take("Id")?,
            sensor: r.take("Sensor")?,
            count: r.take("Count")?,
            level: r.take("Level")?,
            active: r.take("Active")?,
            note: r.take("Note")?,
            samples: r.take("Samples")?,
        })
    }
}

impl NodeType for Reading {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

prop_compose! {
    fn reading()(
        sensor in "[a-zA-Z0-9 _-]{0,24}",
        count in any::<i64>(),
        level in -1.0e9f64..1.0e9,
        active in any::<bool>(),
        note in proptest::option::of("[a-z]{1,12}"),
        samples in proptest::collection::vec(any::<i32>(), 0..8),
    ) -> Reading {
        Reading { id: EntityId::new(), sensor, count, level, active, note, samples }
    }
}

proptest! {
    #[test]
    fn prop_simple_only_round_trip(x in reading()) {
        let registry = ModelRegistry::new();
        let serialized = EntitySerializer::new(&registry).serialize(&x).unwrap();
        prop_assert_eq!(serialized.entities.len(), 1);
        let back: Reading = EntityDeserializer::new(&registry).deserialize(&serialized).unwrap();
        prop_assert_eq!(back, x);
    }
}

#[test]
fn test_empty_id_is_rejected() {
    let registry = ModelRegistry::new();
    let mut person = alice();
    person.id = EntityId::from("");
    let err = EntitySerializer::new(&registry).serialize(&person).unwrap_err();
    assert!(matches!(err, Error::Mapping(MappingError::Validation { .. })), "{err}");
}

// ============================================================================
// 3. Nested Complex values
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Tag {
    name: String,
}

impl GraphType for Tag {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::complex::<Self>().label("Tag").property::<String>("Name").build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self).with("Name", &self.name)
    }

    fn from_record(mut r: Record) -> Result<Self> {
        Ok(Self { name: r.take("Name")? })
    }
}

/// Single-field wrapper: shares its address with the `Tag` inside.
#[derive(Debug, Clone, PartialEq)]
struct Label {
    tag: Tag,
}

impl GraphType for Label {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::complex::<Self>().label("Label").property::<Tag>("Tag").build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self).with("Tag", &self.tag)
    }

    fn from_record(mut r: Record) -> Result<Self> {
        Ok(Self { tag: r.take("Tag")? })
    }
}

/// Zero-sized: every element of a `Vec<Marker>` has the same address.
#[derive(Debug, Clone, PartialEq)]
struct Marker;

impl GraphType for Marker {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::complex::<Self>().label("Marker").build()
    }

    fn to_record(&self) -> Result<Record> {
        Ok(Record::of(self))
    }

    fn from_record(_: Record) -> Result<Self> {
        Ok(Marker)
    }
}

graph_model::impl_complex_property!(Tag, Label, Marker);

/// The Complex value is laid out first, at the node's own address.
#[repr(C)]
#[derive(Debug, Clone, PartialEq)]
struct Shelf {
    label: Label,
    id: EntityId,
    history: Vec<Label>,
    markers: Vec<Marker>,
    price: rust_decimal::Decimal,
    blob: Bytes,
}

impl GraphType for Shelf {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::node::<Self>()
            .label("Shelf")
            .property::<Label>("Label")
            .property::<Vec<Label>>("History")
            .property::<Vec<Marker>>("Markers")
            .property::<rust_decimal::Decimal>("Price")
            .property::<Bytes>("Blob")
            .build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self)
            .with("Label", &self.label)?
            .with("History", &self.history)?
            .with("Markers", &self.markers)?
            .with("Price", &self.price)?
            .with("Blob", &self.blob)
    }

    fn from_record(mut r: Record) -> Result<Self> {
        Ok(Self {
            label: r.take("Label")?,
            id: r.take("Id")?,
            history: r.take("History")?,
            markers: r.take("Markers")?,
            price: r.take("Price")?,
            blob: r.take("Blob")?,
        })
    }
}

impl NodeType for Shelf {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

fn label(name: &str) -> Label {
    Label { tag: Tag { name: name.into() } }
}

fn shelf() -> Shelf {
    Shelf {
        label: label("front"),
        id: EntityId::new(),
        history: vec![label("old"), label("older")],
        markers: vec![Marker, Marker, Marker],
        price: "1234567890123.4567".parse().unwrap(),
        blob: Bytes(vec![1, 2, 3]),
    }
}

#[test]
fn test_nested_complex_serializes_each_level() {
    let registry = ModelRegistry::new();
    let value = shelf();
    let graph = EntitySerializer::new(&registry).serialize(&value).unwrap();

    // root, Label + Tag, 2 x (Label + Tag), 3 markers
    assert_eq!(graph.entities.len(), 1 + 2 + 4 + 3);
    let root = graph.root().unwrap();
    assert_eq!(root.simple_properties.get("Price"), Some(&Value::from("1234567890123.4567")));
    assert_eq!(root.simple_properties.get("Blob"), Some(&Value::Bytes(vec![1, 2, 3])));

    let back: Shelf = EntityDeserializer::new(&registry).deserialize(&graph).unwrap();
    assert_eq!(back, value);
}

#[tokio::test]
async fn test_nested_complex_round_trips_through_memory_backend() {
    let graph = Graph::open_memory().await.unwrap();
    let value = shelf();
    graph.create_node(&value, None, None).await.unwrap();

    let back = graph.get_node::<Shelf>(&value.id, None, None).await.unwrap().into_root::<Shelf>().unwrap();
    assert_eq!(back, value);
    assert_eq!(back.history[1].tag.name, "older");
}

#[derive(Debug)]
struct Drawer {
    id: EntityId,
    slots: Vec<Option<Tag>>,
}

impl GraphType for Drawer {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::node::<Self>().label("Drawer").property::<Vec<Option<Tag>>>("Slots").build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self).with("Slots", &self.slots)
    }

    fn from_record(mut r: Record) -> Result<Self> {
        Ok(Self { id: r.take("Id")?, slots: r.take("Slots")? })
    }
}

impl NodeType for Drawer {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

#[test]
fn test_collection_of_optional_complex_is_unsupported() {
    let registry = ModelRegistry::new();
    let drawer = Drawer { id: EntityId::new(), slots: vec![None, Some(Tag { name: "a".into() })] };
    let err = EntitySerializer::new(&registry).serialize(&drawer).unwrap_err();
    assert!(matches!(err, Error::Mapping(MappingError::UnsupportedType { .. })), "{err}");
}
