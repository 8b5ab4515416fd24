use super::*;

fn sample(path: &std::path::Path) -> GraphStore {
    let mut store = GraphStore::open(path).unwrap();
    store.upsert_node("Artificial Intelligence", "concept", "d1-0");
    store.upsert_node("Computer Science", "concept", "d1-0");
    store.upsert_node("Machine Learning", "concept", "d1-1");
    store.upsert_node("Linguistics", "concept", "d2-0");
    store.upsert_edge("Artificial Intelligence", "Computer Science", "co-occurs", 1.0);
    store.upsert_edge("Artificial Intelligence", "Machine Learning", "co-occurs", 1.0);
    store.upsert_edge("Machine Learning", "Linguistics", "co-occurs", 1.0);
    store
}

#[test]
fn test_upsert_merges_nodes_and_edges() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = sample(&tmp.path().join("g.graphml"));

    store.upsert_node("Artificial Intelligence", "concept", "d3-0");
    store.upsert_edge("Artificial Intelligence", "Computer Science", "co-occurs", 2.0);

    let stats = store.stats();
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.edges, 3);

    let sub = store.neighborhood("Artificial Intelligence", 1).unwrap();
    let edge = sub
        .edges
        .iter()
        .find(|(a, b, _)| {
            (a == "Artificial Intelligence" && b == "Computer Science")
                || (a == "Computer Science" && b == "Artificial Intelligence")
        })
        .unwrap();
    assert!((edge.2.weight - 3.0).abs() < 1e-6);
}

#[test]
fn test_neighborhood_depth() {
    let tmp = tempfile::tempdir().unwrap();
    let store = sample(&tmp.path().join("g.graphml"));

    let one_hop = store.neighborhood("Artificial Intelligence", 1).unwrap();
    let labels: Vec<&str> = one_hop.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["Artificial Intelligence", "Computer Science", "Machine Learning"]
    );

    let two_hop = store.neighborhood("Artificial Intelligence", 2).unwrap();
    assert_eq!(two_hop.nodes.len(), 4);

    assert!(store.neighborhood("Nonexistent", 1).is_none());
}

#[test]
fn test_graphml_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("g.graphml");
    {
        let store = sample(&path);
        store.persist().unwrap();
    }

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("<graphml"));
    assert!(raw.contains("edgedefault=\"undirected\""));

    let reloaded = GraphStore::open(&path).unwrap();
    let stats = reloaded.stats();
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.edges, 3);

    let sub = reloaded.neighborhood("Machine Learning", 1).unwrap();
    assert_eq!(sub.nodes.len(), 3);
    let node = sub
        .nodes
        .iter()
        .find(|n| n.label == "Machine Learning")
        .unwrap();
    assert_eq!(node.chunk_ids, vec!["d1-1"]);
}

#[test]
fn test_remove_chunks_drops_orphaned_nodes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = sample(&tmp.path().join("g.graphml"));

    let doomed: std::collections::HashSet<String> = ["d2-0".to_string()].into_iter().collect();
    store.remove_chunks(&doomed);

    assert_eq!(store.stats().nodes, 3);
    assert!(store.neighborhood("Linguistics", 1).is_none());
}

#[test]
fn test_clear_and_empty_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("g.graphml");
    let mut store = sample(&path);

    let before = store.clear().unwrap();
    assert_eq!(before.nodes, 4);
    assert_eq!(store.stats().nodes, 0);

    let reloaded = GraphStore::open(&path).unwrap();
    assert_eq!(reloaded.stats().nodes, 0);
}

#[test]
fn test_labels_by_degree() {
    let tmp = tempfile::tempdir().unwrap();
    let store = sample(&tmp.path().join("g.graphml"));

    let labels = store.labels_by_degree();
    assert_eq!(labels[0].0, "Artificial Intelligence");
    assert_eq!(labels[0].1, 2);
}

#[test]
fn test_corrupt_file_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("g.graphml");
    std::fs::write(&path, "<graphml><graph><edge source=\"a\" target=\"b\"/>").unwrap();

    assert!(matches!(
        GraphStore::open(&path),
        Err(GraphError::Corrupt { .. })
    ));
}
