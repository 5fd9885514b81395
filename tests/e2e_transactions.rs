//! Transaction lifecycle and implicit-transaction atomicity.

mod common;

use common::{Address, Knows, Person};
use graph_model::index::IndexType;
use graph_model::model::property_map;
use graph_model::{
    Endpoint, EntityId, Error, ErrorFamily, Graph, GraphOperationOptions, PropertyConfig,
    StorageBackend, TxMode, TxState, TypeConfig, Value,
};
use pretty_assertions::assert_eq;

async fn node_count(graph: &Graph<graph_model::MemoryBackend>) -> u64 {
    let tx = graph.transaction(TxMode::ReadOnly).await.unwrap();
    graph.backend().node_count(tx.backend_tx().unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_failed_implicit_operation_leaves_no_trace() {
    let graph = Graph::open_memory().await.unwrap();
    let staged = Person { home_address: Some(Address::new("8 Elm St", "Reno")), ..Person::new("New", 40) };
    let staged_id = staged.id.clone();
    let rel = Knows {
        id: EntityId::new(),
        since: 2024,
        source: Endpoint::to(staged),
        target: Endpoint::new("does-not-exist"),
    };

    let options = GraphOperationOptions::new().create_missing_nodes(true);
    let err = graph.create_relationship(&rel, Some(&options), None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");

    assert_eq!(node_count(&graph).await, 0, "cascaded source was rolled back");
    let err = graph.get_node::<Person>(&staged_id, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_explicit_transaction_commit_and_rollback() {
    let graph = Graph::open_memory().await.unwrap();
    let kept = Person::new("Kept", 1);
    let dropped = Person::new("Dropped", 2);

    let mut tx = graph.transaction(TxMode::ReadWrite).await.unwrap();
    graph.create_node(&kept, None, Some(&mut tx)).await.unwrap();
    let inside = graph.get_node::<Person>(&kept.id, None, Some(&mut tx)).await.unwrap();
    assert_eq!(inside.root::<Person>().unwrap().first_name, "Kept");
    tx.commit().await.unwrap();
    assert_eq!(tx.state(), TxState::Committed);

    let mut tx = graph.transaction(TxMode::ReadWrite).await.unwrap();
    graph.create_node(&dropped, None, Some(&mut tx)).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(tx.state(), TxState::RolledBack);

    assert!(graph.get_node::<Person>(&kept.id, None, None).await.is_ok());
    assert!(graph.get_node::<Person>(&dropped.id, None, None).await.is_err());
}

#[tokio::test]
async fn test_supplied_transaction_is_not_committed_by_operation() {
    let graph = Graph::open_memory().await.unwrap();
    let person = Person::new("Pending", 3);
    {
        let mut tx = graph.transaction(TxMode::ReadWrite).await.unwrap();
        graph.create_node(&person, None, Some(&mut tx)).await.unwrap();
        assert!(tx.is_active());
    }
    assert_eq!(node_count(&graph).await, 0, "dropping an active transaction rolls back");
}

#[tokio::test]
async fn test_finished_transaction_rejects_use() {
    let graph = Graph::open_memory().await.unwrap();
    let mut tx = graph.transaction(TxMode::ReadWrite).await.unwrap();
    tx.commit().await.unwrap();

    let err = graph.create_node(&Person::new("Late", 4), None, Some(&mut tx)).await.unwrap_err();
    assert!(matches!(err, Error::Transaction(_)), "{err}");
    assert_eq!(err.family(), ErrorFamily::Transaction);
    assert_eq!(tx.commit().await.unwrap_err().family(), ErrorFamily::Transaction);
}

#[tokio::test]
async fn test_read_only_transaction_refuses_writes() {
    let graph = Graph::open_memory().await.unwrap();
    let mut tx = graph.transaction(TxMode::ReadOnly).await.unwrap();
    let err = graph.create_node(&Person::new("Nope", 5), None, Some(&mut tx)).await.unwrap_err();
    assert_eq!(err.family(), ErrorFamily::Transaction);
}

#[tokio::test]
async fn test_ensure_schema_creates_indexes_and_constraints() {
    let graph = Graph::open_memory().await.unwrap();
    graph
        .registry()
        .configure_node::<Person>(TypeConfig::new().property("FirstName", PropertyConfig::new().indexed()))
        .unwrap();
    graph.ensure_schema().await.unwrap();
    assert_eq!(
        graph.backend().indexes(),
        vec![("Person".to_string(), "FirstName".to_string(), IndexType::BTree)]
    );

    let person = Person::new("Solo", 6);
    graph.create_node(&person, None, None).await.unwrap();

    let mut tx = graph.transaction(TxMode::ReadWrite).await.unwrap();
    let inner = tx.backend_tx_mut().unwrap();
    let err = graph
        .backend()
        .create_node(inner, &["Person"], property_map([("Id", Value::from(person.id.as_str()))]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");
}
