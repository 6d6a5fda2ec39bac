//! Workflow inspection: validate a snapshot and list it upstream-first

use schemaflow_graph::{
    EdgeId, GraphError, NodeId, NodeKind, WorkflowGraph, WorkflowId, WorkflowSnapshot,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeLine {
    pub edge: EdgeId,
    pub target: NodeId,
    pub target_label: String,
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeLine {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub inputs: usize,
    pub outputs: Vec<EdgeLine>,
}

/// A validated workflow in topological order
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub workflow: WorkflowId,
    pub nodes: Vec<NodeLine>,
    pub entry_nodes: Vec<NodeId>,
    pub exit_nodes: Vec<NodeId>,
}

impl InspectReport {
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("Workflow {}\n", self.workflow));
        report.push_str(&format!(
            "{} nodes, {} entry, {} exit\n\n",
            self.nodes.len(),
            self.entry_nodes.len(),
            self.exit_nodes.len()
        ));

        for (i, node) in self.nodes.iter().enumerate() {
            report.push_str(&format!(
                "{}. [{}] {} ({} input(s))\n",
                i + 1,
                node.kind,
                node.label,
                node.inputs
            ));
            for edge in &node.outputs {
                match &edge.sheet {
                    Some(sheet) => {
                        report.push_str(&format!("     -> {} [{sheet}]\n", edge.target_label));
                    }
                    None => report.push_str(&format!("     -> {}\n", edge.target_label)),
                }
            }
        }
        report
    }
}

/// Validate a snapshot and describe it
///
/// # Errors
/// Whatever rebuilding the graph rejects (unknown nodes, cycles, ...).
pub fn inspect(snapshot: WorkflowSnapshot) -> Result<InspectReport, GraphError> {
    let graph = WorkflowGraph::from_snapshot(snapshot)?;
    let order = graph.topological_order()?;

    let nodes = order
        .into_iter()
        .filter_map(|id| graph.node(id))
        .map(|node| NodeLine {
            id: node.id,
            kind: node.kind,
            label: node.label.clone(),
            inputs: graph.incoming(node.id).len(),
            outputs: graph
                .outgoing(node.id)
                .into_iter()
                .map(|edge| EdgeLine {
                    edge: edge.id,
                    target: edge.target,
                    target_label: graph
                        .node(edge.target)
                        .map(|n| n.label.clone())
                        .unwrap_or_default(),
                    sheet: edge.sheet.clone(),
                })
                .collect(),
        })
        .collect();

    Ok(InspectReport {
        workflow: graph.id(),
        nodes,
        entry_nodes: graph.entry_nodes(),
        exit_nodes: graph.exit_nodes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemaflow_graph::Edge;
    use schemaflow_test_utils::{diamond_workflow, linear_workflow};

    #[test]
    fn lists_nodes_upstream_first() {
        let (graph, ids) = linear_workflow();

        let report = inspect(graph.snapshot()).unwrap();

        let order: Vec<_> = report.nodes.iter().map(|n| n.id).collect();
        assert_eq!(order, ids);
        assert_eq!(report.entry_nodes, vec![ids[0]]);
        assert_eq!(report.exit_nodes, vec![ids[3]]);
        assert_eq!(report.nodes[0].inputs, 0);
        assert_eq!(report.nodes[0].outputs[0].target_label, "region = EU");

        let text = report.generate_text();
        assert!(text.contains("1. [file_upload] sales.xlsx (0 input(s))"));
        assert!(text.contains("-> summarise"));
    }

    #[test]
    fn diamond_join_counts_inputs() {
        let (graph, [upload, .., sheet]) = diamond_workflow();

        let report = inspect(graph.snapshot()).unwrap();

        assert_eq!(report.nodes.first().map(|n| n.id), Some(upload));
        let last = report.nodes.last().unwrap();
        assert_eq!(last.id, sheet);
        assert_eq!(last.inputs, 2);
        assert!(last.outputs.is_empty());
    }

    #[test]
    fn rejects_cyclic_snapshot() {
        let (graph, [_, filter, _, sheet]) = diamond_workflow();
        let mut snapshot = graph.snapshot();
        // sheet -> filter closes filter -> sheet -> filter
        snapshot.edges.push(Edge::new(sheet, filter, None));

        let err = inspect(snapshot).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
    }
}
