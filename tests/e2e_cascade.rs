//! Cascade policy for relationship endpoints.

mod common;

use common::{Knows, Person};
use graph_model::{Endpoint, EntityId, Error, Graph, GraphOperationOptions, RelationshipType};
use pretty_assertions::assert_eq;

fn knows_new_person(from: &Person, to: Person) -> Knows {
    Knows { id: EntityId::new(), since: 2020, source: Endpoint::new(from.id.clone()), target: Endpoint::to(to) }
}

#[tokio::test]
async fn test_missing_target_fails_without_cascade() {
    let graph = Graph::open_memory().await.unwrap();
    let ann = Person::new("Ann", 30);
    graph.create_node(&ann, None, None).await.unwrap();

    let bob = Person::new("Bob", 25);
    let bob_id = bob.id.clone();
    let rel = knows_new_person(&ann, bob);
    let err = graph.create_relationship(&rel, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");

    let err = graph.get_node::<Person>(&bob_id, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_missing_target_is_created_with_cascade() {
    let graph = Graph::open_memory().await.unwrap();
    let ann = Person::new("Ann", 30);
    graph.create_node(&ann, None, None).await.unwrap();

    let bob = Person::new("Bob", 25);
    let bob_id = bob.id.clone();
    let rel = knows_new_person(&ann, bob);
    let options = GraphOperationOptions::new().create_missing_nodes(true);
    graph.create_relationship(&rel, Some(&options), None).await.unwrap();

    let read = graph
        .get_node::<Person>(&ann.id, Some(&GraphOperationOptions::new().with_depth(1)), None)
        .await
        .unwrap();
    let root = read.root::<Person>().unwrap();
    let knows: Vec<&Knows> = root.knows.iter(read.graph()).collect();
    assert_eq!(knows.len(), 1);
    assert_eq!(knows[0].target_id(), &bob_id);
    let target = knows[0].target().resolve::<Person>(read.graph()).unwrap();
    assert_eq!(target.first_name, "Bob");
    assert_eq!(target.age, 25);
}

#[tokio::test]
async fn test_existing_endpoint_left_untouched_unless_asked() {
    let graph = Graph::open_memory().await.unwrap();
    let ann = Person::new("Ann", 30);
    let bob = Person::new("Bob", 25);
    graph.create_node(&ann, None, None).await.unwrap();
    graph.create_node(&bob, None, None).await.unwrap();

    let older = Person { age: 26, ..bob.clone() };
    let rel = knows_new_person(&ann, older.clone());
    graph.create_relationship(&rel, None, None).await.unwrap();
    let stored = graph.get_node::<Person>(&bob.id, None, None).await.unwrap().into_root::<Person>().unwrap();
    assert_eq!(stored.age, 25);

    let oldest = Person { age: 27, ..bob.clone() };
    let rel = knows_new_person(&ann, oldest);
    let options = GraphOperationOptions::new().update_existing_nodes(true);
    graph.create_relationship(&rel, Some(&options), None).await.unwrap();
    let stored = graph.get_node::<Person>(&bob.id, None, None).await.unwrap().into_root::<Person>().unwrap();
    assert_eq!(stored.age, 27);
}

#[tokio::test]
async fn test_update_relationship_moves_endpoints() {
    let graph = Graph::open_memory().await.unwrap();
    let [a, b, c] = [Person::new("A", 1), Person::new("B", 2), Person::new("C", 3)];
    for p in [&a, &b, &c] {
        graph.create_node(p, None, None).await.unwrap();
    }
    let mut rel = Knows::between(&a, &b, 2000);
    graph.create_relationship(&rel, None, None).await.unwrap();

    rel.since = 2005;
    rel.target.set_id(c.id.clone());
    graph.update_relationship(&rel, None, None).await.unwrap();

    let back = graph.get_relationship::<Knows>(&rel.id, None, None).await.unwrap().into_root::<Knows>().unwrap();
    assert_eq!(back.since, 2005);
    assert_eq!(back.target_id(), &c.id);

    let read = graph
        .get_node::<Person>(&a.id, Some(&GraphOperationOptions::new().with_depth(1)), None)
        .await
        .unwrap();
    assert_eq!(read.root::<Person>().unwrap().knows.len(), 1);

    graph.delete_relationship::<Knows>(&rel.id, None, None).await.unwrap();
    let err = graph.get_relationship::<Knows>(&rel.id, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_deleting_node_detaches_relationships() {
    let graph = Graph::open_memory().await.unwrap();
    let a = Person::new("A", 1);
    let b = Person::new("B", 2);
    graph.create_node(&a, None, None).await.unwrap();
    graph.create_node(&b, None, None).await.unwrap();
    let rel = Knows::between(&a, &b, 2000);
    graph.create_relationship(&rel, None, None).await.unwrap();

    graph.delete_node::<Person>(&b.id, None, None).await.unwrap();
    let err = graph.get_relationship::<Knows>(&rel.id, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let read = graph
        .get_node::<Person>(&a.id, Some(&GraphOperationOptions::new().with_depth(1)), None)
        .await
        .unwrap();
    assert!(read.root::<Person>().unwrap().knows.is_empty());
}
