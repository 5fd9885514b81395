//! Shared model types for the integration tests.

#![allow(dead_code)]

use graph_model::{
    Endpoint, EntityId, GraphType, Navigation, NodeType, Record, RelationshipType, Result,
    TypeDescriptor,
};

// ============================================================================
// Address (Complex)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl Address {
    pub fn new(street: &str, city: &str) -> Self {
        Self { street: street.into(), city: city.into() }
    }
}

impl GraphType for Address {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::complex::<Self>()
            .label("Address")
            .property::<String>("Street")
            .property::<String>("City")
            .build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self).with("Street", &self.street)?.with("City", &self.city)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self { street: record.take("Street")?, city: record.take("City")? })
    }
}

graph_model::impl_complex_property!(Address);

// ============================================================================
// Person / Employee (Node)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Person {
    pub id: EntityId,
    pub first_name: String,
    pub age: i32,
    pub home_address: Option<Address>,
    pub previous_addresses: Vec<Address>,
    pub knows: Navigation,
}

impl Person {
    pub fn new(first_name: &str, age: i32) -> Self {
        Self { first_name: first_name.into(), age, ..Self::default() }
    }
}

impl GraphType for Person {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::node::<Self>()
            .label("Person")
            .property::<String>("FirstName")
            .property::<i32>("Age")
            .property::<Option<Address>>("HomeAddress")
            .property::<Vec<Address>>("PreviousAddresses")
            .navigation::<Knows>("Knows")
            .build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self)
            .with("FirstName", &self.first_name)?
            .with("Age", &self.age)?
            .with("HomeAddress", &self.home_address)?
            .with("PreviousAddresses", &self.previous_addresses)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("Id")?,
            first_name: record.take("FirstName")?,
            age: record.take("Age")?,
            home_address: record.take("HomeAddress")?,
            previous_addresses: record.take("PreviousAddresses")?,
            knows: Navigation::default(),
        })
    }
}

impl NodeType for Person {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn navigation_mut(&mut self, name: &str) -> Option<&mut Navigation> {
        match name {
            "Knows" => Some(&mut self.knows),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Employee {
    pub id: EntityId,
    pub first_name: String,
    pub age: i32,
    pub company: String,
}

impl GraphType for Employee {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::node::<Self>()
            .label("Employee")
            .extends::<Person>()
            .property::<String>("FirstName")
            .property::<i32>("Age")
            .property::<String>("Company")
            .build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self)
            .with("FirstName", &self.first_name)?
            .with("Age", &self.age)?
            .with("Company", &self.company)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("Id")?,
            first_name: record.take("FirstName")?,
            age: record.take("Age")?,
            company: record.take("Company")?,
        })
    }
}

impl NodeType for Employee {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

// ============================================================================
// Knows (Relationship)
// ============================================================================

#[derive(Debug, Clone)]
pub struct Knows {
    pub id: EntityId,
    pub since: i32,
    pub source: Endpoint,
    pub target: Endpoint,
}

impl Knows {
    pub fn between(source: &Person, target: &Person, since: i32) -> Self {
        Self {
            id: EntityId::new(),
            since,
            source: Endpoint::new(source.id.clone()),
            target: Endpoint::new(target.id.clone()),
        }
    }
}

impl GraphType for Knows {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::relationship::<Self>()
            .label("KNOWS")
            .endpoints::<Person, Person>()
            .property::<i32>("Since")
            .build()
    }

    fn to_record(&self) -> Result<Record> {
        Record::of(self).with("Since", &self.since)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("Id")?,
            since: record.take("Since")?,
            source: Endpoint::new(record.take::<EntityId>("SourceId")?),
            target: Endpoint::new(record.take::<EntityId>("TargetId")?),
        })
    }
}

impl RelationshipType for Knows {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn source(&self) -> &Endpoint {
        &self.source
    }

    fn target(&self) -> &Endpoint {
        &self.target
    }

    fn endpoints_mut(&mut self) -> (&mut Endpoint, &mut Endpoint) {
        (&mut self.source, &mut self.target)
    }
}

// ============================================================================
// Two unrelated hierarchies sharing one label
// ============================================================================

pub mod staff {
    use super::*;

    #[derive(Debug, Clone, Default)]
    pub struct Manager {
        pub id: EntityId,
        pub first_name: String,
        pub reports: i64,
    }

    impl GraphType for Manager {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::node::<Self>()
                .label("Graph_Manager")
                .property::<String>("FirstName")
                .named("first")
                .property::<i64>("Reports")
                .build()
        }

        fn to_record(&self) -> Result<Record> {
            Record::of(self).with("FirstName", &self.first_name)?.with("Reports", &self.reports)
        }

        fn from_record(mut record: Record) -> Result<Self> {
            Ok(Self { id: record.take("Id")?, first_name: record.take("FirstName")?, reports: record.take("Reports")? })
        }
    }

    impl NodeType for Manager {
        fn id(&self) -> &EntityId {
            &self.id
        }
    }
}

pub mod org {
    use super::*;

    #[derive(Debug, Clone, Default)]
    pub struct SomeoneWhoIsManager {
        pub id: EntityId,
        pub first_name: String,
    }

    impl GraphType for SomeoneWhoIsManager {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::node::<Self>()
                .label("Graph_Manager")
                .property::<String>("FirstName")
                .named("first")
                .build()
        }

        fn to_record(&self) -> Result<Record> {
            Record::of(self).with("FirstName", &self.first_name)
        }

        fn from_record(mut record: Record) -> Result<Self> {
            Ok(Self { id: record.take("Id")?, first_name: record.take("FirstName")? })
        }
    }

    impl NodeType for SomeoneWhoIsManager {
        fn id(&self) -> &EntityId {
            &self.id
        }
    }
}
