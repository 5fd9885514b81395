//! Node queries and multi-step traversals.

mod common;

use common::{Employee, Knows, Person};
use graph_model::{Direction, EntityId, Error, Graph, GraphOperationOptions, MappingError, MemoryBackend, RelationshipType};
use pretty_assertions::assert_eq;

async fn people() -> (Graph<MemoryBackend>, Vec<Person>) {
    let graph = Graph::open_memory().await.unwrap();
    let folks = vec![
        Person::new("Dana", 44),
        Person::new("Abe", 17),
        Person::new("Cleo", 35),
        Person::new("Bea", 35),
    ];
    for p in &folks {
        graph.create_node(p, None, None).await.unwrap();
    }
    for pair in folks.windows(2) {
        graph.create_relationship(&Knows::between(&pair[0], &pair[1], 2000), None, None).await.unwrap();
    }
    (graph, folks)
}

fn names<'a>(it: impl Iterator<Item = &'a Person>) -> Vec<String> {
    it.map(|p| p.first_name.clone()).collect()
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_filter_order_and_page() {
    let (graph, _) = people().await;
    let results = graph
        .nodes::<Person>()
        .filter(|p| p.age >= 18)
        .order_by_descending(|p| p.age)
        .then_by(|p| p.first_name.clone())
        .to_list(None, None)
        .await
        .unwrap();
    assert_eq!(names(results.iter()), vec!["Dana", "Bea", "Cleo"]);

    let page = graph
        .nodes::<Person>()
        .order_by(|p| p.first_name.clone())
        .skip(1)
        .take(2)
        .to_list(None, None)
        .await
        .unwrap()
        .into_vec()
        .unwrap();
    assert_eq!(names(page.iter()), vec!["Bea", "Cleo"]);
}

#[tokio::test]
async fn test_where_property_matches_stored_values() {
    let (graph, _) = people().await;
    let query = graph.nodes::<Person>().where_property("Age", 35);
    assert_eq!(query.count(None, None).await.unwrap(), 2);

    let err = query.single_or_default(None, None).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");

    let one = graph
        .nodes::<Person>()
        .where_property("FirstName", "Abe")
        .single_or_default(None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one.root::<Person>().unwrap().age, 17);

    let none = graph
        .nodes::<Person>()
        .where_property("FirstName", "Zed")
        .first_or_default(None, None)
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_query_hydrates_with_options() {
    let (graph, folks) = people().await;
    let options = GraphOperationOptions::new().with_depth(1);
    let first = graph
        .nodes::<Person>()
        .where_property("FirstName", "Dana")
        .first_or_default(Some(&options), None)
        .await
        .unwrap()
        .unwrap();
    let dana = first.root::<Person>().unwrap();
    let knows: Vec<&Knows> = dana.knows.iter(first.graph()).collect();
    assert_eq!(knows.len(), 1);
    assert_eq!(knows[0].target().resolve::<Person>(first.graph()).unwrap().id, folks[1].id);
}

#[tokio::test]
async fn test_query_over_base_includes_subtypes() {
    let (graph, _) = people().await;
    let employee = Employee { id: EntityId::new(), first_name: "Eli".into(), age: 50, company: "Acme".into() };
    graph.create_node(&employee, None, None).await.unwrap();

    let results = graph.nodes::<Person>().to_list(None, None).await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().count(), 4, "the Employee row is not a Person value");
    let derived = results.keys().iter().filter_map(|k| results.graph().get::<Employee>(*k)).count();
    assert_eq!(derived, 1);
}

#[tokio::test]
async fn test_filter_and_order_apply_to_subtype_rows() {
    let (graph, _) = people().await;
    for (name, age) in [("Eli", 50), ("Kid", 5)] {
        let employee = Employee { id: EntityId::new(), first_name: name.into(), age, company: "Acme".into() };
        graph.create_node(&employee, None, None).await.unwrap();
    }
    let name_of = |results: &graph_model::QueryResults<Person>| -> Vec<String> {
        results
            .keys()
            .iter()
            .map(|k| match results.graph().get::<Person>(*k) {
                Some(p) => p.first_name.clone(),
                None => results.graph().get::<Employee>(*k).unwrap().first_name.clone(),
            })
            .collect()
    };

    let older = graph.nodes::<Person>().filter(|p| p.age > 40).to_list(None, None).await.unwrap();
    let mut found = name_of(&older);
    found.sort();
    assert_eq!(found, vec!["Dana", "Eli"]);

    let ordered = graph
        .nodes::<Person>()
        .order_by(|p| p.age)
        .then_by(|p| p.first_name.clone())
        .to_list(None, None)
        .await
        .unwrap();
    assert_eq!(name_of(&ordered), vec!["Kid", "Abe", "Bea", "Cleo", "Dana", "Eli"]);
}

// ============================================================================
// Traversals
// ============================================================================

#[tokio::test]
async fn test_single_step_with_hop_range() {
    let (graph, folks) = people().await;
    let result = graph
        .traverse::<Person>(&folks[0].id)
        .step::<Knows, Person>(Direction::Outgoing, 1, 2)
        .unwrap()
        .include_paths()
        .execute(None, None)
        .await
        .unwrap();
    assert_eq!(names(result.nodes_as::<Person>()), vec!["Abe", "Cleo"]);
    assert_eq!(result.paths.len(), 2);
    assert_eq!(result.paths[1].len(), 2);
}

#[tokio::test]
async fn test_chained_steps_and_depth_limit() {
    let (graph, folks) = people().await;
    let chained = graph
        .traverse::<Person>(&folks[0].id)
        .out::<Knows, Person>()
        .unwrap()
        .out::<Knows, Person>()
        .unwrap()
        .execute(None, None)
        .await
        .unwrap();
    assert_eq!(names(chained.nodes_as::<Person>()), vec!["Cleo"]);
    assert!(chained.paths.is_empty());

    let limited = graph
        .traverse::<Person>(&folks[0].id)
        .step::<Knows, Person>(Direction::Outgoing, 1, 3)
        .unwrap()
        .with_depth_limit(1)
        .execute(None, None)
        .await
        .unwrap();
    assert_eq!(names(limited.nodes_as::<Person>()), vec!["Abe"]);
}

#[tokio::test]
async fn test_incoming_step_and_zero_min() {
    let (graph, folks) = people().await;
    let result = graph
        .traverse::<Person>(&folks[2].id)
        .step::<Knows, Person>(Direction::Incoming, 0, 1)
        .unwrap()
        .execute(None, None)
        .await
        .unwrap();
    assert_eq!(names(result.nodes_as::<Person>()), vec!["Cleo", "Abe"]);
}

#[tokio::test]
async fn test_invalid_step_bounds_are_rejected() {
    let graph = Graph::open_memory().await.unwrap();
    let start = EntityId::new();

    let err = graph.traverse::<Person>(&start).step::<Knows, Person>(Direction::Outgoing, -1, 2).err().unwrap();
    assert!(matches!(err, Error::Mapping(MappingError::Binding { .. })), "{err}");

    let err = graph.traverse::<Person>(&start).step::<Knows, Person>(Direction::Outgoing, 3, 2).err().unwrap();
    assert!(err.to_string().contains("max_depth"), "{err}");
}
