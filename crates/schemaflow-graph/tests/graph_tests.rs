use proptest::prelude::*;
use schemaflow_graph::{GraphError, NodeId, NodeKind, WorkflowGraph};
use serde_json::json;

proptest! {
    #[test]
    fn prop_graph_remains_acyclic(
        node_count in 1..20usize,
        edges in proptest::collection::vec((0..20usize, 0..20usize), 0..60)
    ) {
        let mut graph = WorkflowGraph::new();
        let nodes: Vec<NodeId> = (0..node_count)
            .map(|i| graph.add_node(NodeKind::Transform, format!("n{i}"), json!({})))
            .collect();

        for (from_idx, to_idx) in edges {
            if from_idx < nodes.len() && to_idx < nodes.len() {
                let before = graph.edge_count();
                match graph.add_edge(nodes[from_idx], nodes[to_idx], None) {
                    Ok(_) => prop_assert_eq!(graph.edge_count(), before + 1),
                    Err(_) => prop_assert_eq!(graph.edge_count(), before),
                }
                prop_assert!(graph.topological_order().is_ok());
            }
        }
    }

    #[test]
    fn prop_topological_order_covers_every_node(node_count in 1..30usize) {
        let mut graph = WorkflowGraph::new();
        let nodes: Vec<NodeId> = (0..node_count)
            .map(|_| graph.add_node(NodeKind::Filter, "f", json!({})))
            .collect();
        for pair in nodes.windows(2) {
            graph.add_edge(pair[0], pair[1], None).unwrap();
        }

        let order = graph.topological_order().unwrap();
        prop_assert_eq!(order, nodes);
    }
}

#[test]
fn test_rejects_simple_cycle() {
    let mut graph = WorkflowGraph::new();
    let n1 = graph.add_node(NodeKind::Filter, "a", json!({}));
    let n2 = graph.add_node(NodeKind::Filter, "b", json!({}));
    let n3 = graph.add_node(NodeKind::Filter, "c", json!({}));

    graph.add_edge(n1, n2, None).unwrap();
    graph.add_edge(n2, n3, None).unwrap();

    // Cycle: n3 -> n1
    assert!(matches!(
        graph.add_edge(n3, n1, None),
        Err(GraphError::CycleDetected { .. })
    ));
    assert!(graph.would_create_cycle(n3, n1));
    assert!(!graph.would_create_cycle(n1, n3));
}

#[test]
fn test_unknown_node_rejected() {
    let mut graph = WorkflowGraph::new();
    let n1 = graph.add_node(NodeKind::FileUpload, "a", json!({}));
    let ghost = NodeId::new();

    assert_eq!(
        graph.add_edge(n1, ghost, None),
        Err(GraphError::NodeNotFound(ghost))
    );
}

#[test]
fn test_snapshot_from_json_document() {
    let doc = json!({
        "nodes": [
            { "id": "6f1c8a34-6a8e-4c53-9d43-2b0e6e9b8a01", "kind": "file_upload", "label": "sales.xlsx" },
            { "id": "6f1c8a34-6a8e-4c53-9d43-2b0e6e9b8a02", "kind": "ai_analysis", "label": "summarise",
              "config": { "prompt": "Summarise revenue by region" } }
        ],
        "edges": [
            { "id": "0b8d7f10-1111-4a3b-8c9d-000000000001",
              "source": "6f1c8a34-6a8e-4c53-9d43-2b0e6e9b8a01",
              "target": "6f1c8a34-6a8e-4c53-9d43-2b0e6e9b8a02",
              "sheet": "Q1" }
        ]
    });

    let snapshot = serde_json::from_value(doc).unwrap();
    let graph = WorkflowGraph::from_snapshot(snapshot).unwrap();

    assert_eq!(graph.node_count(), 2);
    let edge = graph.edges().next().unwrap();
    assert_eq!(edge.sheet.as_deref(), Some("Q1"));
    let ai = graph.node(edge.target).unwrap();
    assert_eq!(ai.kind, NodeKind::AiAnalysis);
    assert_eq!(ai.config["prompt"], "Summarise revenue by region");
}
