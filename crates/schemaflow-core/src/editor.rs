//! Workflow editor
//!
//! Owns the node graph and keeps downstream schemas in sync with it: every
//! edit that changes what flows along an edge queues (or cancels) schema
//! propagation for that edge's node pair.

use crate::error::CoreError;
use parking_lot::{RwLock, RwLockReadGuard};
use schemaflow_graph::{Edge, EdgeId, Node, NodeId, NodeKind, WorkflowGraph, WorkflowSnapshot};
use schemaflow_propagation::{SchemaPropagator, TaskId};
use serde::Serialize;

/// Result of drawing an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub edge: EdgeId,
    /// Propagation task queued for the edge's node pair
    pub task: TaskId,
}

/// Graph plus the propagator that feeds it schemas
#[derive(Debug)]
pub struct WorkflowEditor {
    graph: RwLock<WorkflowGraph>,
    propagator: SchemaPropagator,
}

impl WorkflowEditor {
    /// Create an editor over an empty graph
    #[must_use]
    pub fn new(propagator: SchemaPropagator) -> Self {
        Self::with_graph(WorkflowGraph::new(), propagator)
    }

    /// Wrap an existing graph; nothing is queued
    #[must_use]
    pub fn with_graph(graph: WorkflowGraph, propagator: SchemaPropagator) -> Self {
        Self {
            graph: RwLock::new(graph),
            propagator,
        }
    }

    pub fn add_node(
        &self,
        kind: NodeKind,
        label: impl Into<String>,
        config: serde_json::Value,
    ) -> NodeId {
        let id = self.graph.write().add_node(kind, label, config);
        tracing::debug!(node = %id, kind = %kind, "node added");
        id
    }

    /// Draw an edge and queue schema propagation along it
    ///
    /// Propagation is tracked per node pair. A second edge between the same
    /// nodes refreshes the pair's task with its own sheet, so only the most
    /// recently connected sheet is delivered.
    ///
    /// # Errors
    /// - `CoreError::Graph` if the edge is rejected (unknown node, cycle, ...)
    /// - `CoreError::Propagation` if the propagator is shut down; the edge
    ///   is not kept
    pub fn connect(
        &self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
    ) -> Result<Connection, CoreError> {
        let mut graph = self.graph.write();
        let edge = graph.add_edge(source, target, sheet.clone())?;

        match self.propagator.enqueue(source, target, sheet) {
            Ok(task) => {
                tracing::info!(%source, %target, edge = %edge, task = %task, "nodes connected");
                Ok(Connection { edge, task })
            }
            Err(e) => {
                graph.remove_edge(edge)?;
                Err(e.into())
            }
        }
    }

    /// Remove an edge and stop propagating along it
    ///
    /// If another edge still joins the same nodes, propagation is re-queued
    /// for that edge's sheet instead.
    ///
    /// # Errors
    /// - `CoreError::Graph` if the edge does not exist
    pub fn disconnect(&self, edge: EdgeId) -> Result<Edge, CoreError> {
        let mut graph = self.graph.write();
        let removed = graph.remove_edge(edge)?;

        let remaining = graph
            .outgoing(removed.source)
            .into_iter()
            .find(|e| e.target == removed.target)
            .map(|e| e.sheet.clone());

        let cancelled = self.propagator.cancel_pair(removed.source, removed.target);
        if let Some(sheet) = remaining {
            self.propagator
                .enqueue(removed.source, removed.target, sheet)?;
        }

        tracing::info!(
            source = %removed.source,
            target = %removed.target,
            edge = %edge,
            cancelled,
            "nodes disconnected"
        );
        Ok(removed)
    }

    /// Delete a node with its edges and every task touching it
    ///
    /// # Errors
    /// - `CoreError::Graph` if the node does not exist
    pub fn remove_node(&self, node: NodeId) -> Result<(Node, Vec<Edge>), CoreError> {
        let removed = self.graph.write().remove_node(node)?;
        let cancelled = self.propagator.cancel_node(node);
        tracing::info!(
            node = %node,
            edges = removed.1.len(),
            cancelled,
            "node removed"
        );
        Ok(removed)
    }

    /// A node's schema changed: re-queue propagation to every direct child
    ///
    /// # Errors
    /// - `CoreError::Graph` if the node does not exist
    /// - `CoreError::Propagation` if the propagator is shut down
    pub fn schema_updated(&self, node: NodeId) -> Result<Vec<TaskId>, CoreError> {
        let outgoing: Vec<Edge> = {
            let graph = self.graph.read();
            if !graph.contains_node(node) {
                return Err(schemaflow_graph::GraphError::NodeNotFound(node).into());
            }
            graph.outgoing(node).into_iter().cloned().collect()
        };

        let tasks = outgoing
            .into_iter()
            .map(|edge| self.propagator.enqueue(edge.source, edge.target, edge.sheet))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(node = %node, queued = tasks.len(), "schema updated");
        Ok(tasks)
    }

    /// Replace the graph with a snapshot and queue every edge
    ///
    /// Edges are queued in topological order of their source node, so
    /// upstream pairs are attempted first. Tasks for nodes of the previous
    /// graph are cancelled.
    ///
    /// Each node pair gets one task, returned once. When parallel edges join
    /// the same pair, the sheet of the last one queued is delivered.
    ///
    /// # Errors
    /// - `CoreError::Graph` if the snapshot is invalid (the current graph
    ///   is kept)
    /// - `CoreError::Propagation` if the propagator is shut down
    pub fn load(&self, snapshot: WorkflowSnapshot) -> Result<Vec<TaskId>, CoreError> {
        let incoming = WorkflowGraph::from_snapshot(snapshot)?;
        let order = incoming.topological_order()?;

        let mut graph = self.graph.write();
        for node in graph.nodes() {
            self.propagator.cancel_node(node.id);
        }
        *graph = incoming;

        let mut tasks = Vec::with_capacity(graph.edge_count());
        for node in order {
            for edge in graph.outgoing(node) {
                let task = self
                    .propagator
                    .enqueue(edge.source, edge.target, edge.sheet.clone())?;
                if !tasks.contains(&task) {
                    tasks.push(task);
                }
            }
        }

        tracing::info!(
            workflow = %graph.id(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "workflow loaded"
        );
        Ok(tasks)
    }

    /// Read access to the graph
    ///
    /// Hold the guard briefly; edits block while it is alive.
    pub fn graph(&self) -> RwLockReadGuard<'_, WorkflowGraph> {
        self.graph.read()
    }

    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.graph.read().snapshot()
    }

    #[inline]
    #[must_use]
    pub fn propagator(&self) -> &SchemaPropagator {
        &self.propagator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemaflow_graph::GraphError;
    use schemaflow_propagation::{InMemorySchemaStore, PropagationError, TaskStatus};
    use schemaflow_test_utils::{manual_config, setup_propagator, RecordingNotifier};
    use serde_json::json;
    use std::sync::Arc;

    fn editor() -> WorkflowEditor {
        WorkflowEditor::new(setup_propagator(
            manual_config(),
            Arc::new(InMemorySchemaStore::new()),
            Arc::new(RecordingNotifier::new()),
        ))
    }

    #[tokio::test]
    async fn connect_queues_propagation() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "sales.xlsx", json!({}));
        let filter = editor.add_node(NodeKind::Filter, "EU only", json!({}));

        let connection = editor.connect(upload, filter, Some("Q1".into())).unwrap();

        let task = editor.propagator().task(connection.task).unwrap();
        assert_eq!(task.source, upload);
        assert_eq!(task.target, filter);
        assert_eq!(task.sheet.as_deref(), Some("Q1"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(editor.graph().edge_count(), 1);
    }

    #[tokio::test]
    async fn rejected_edge_queues_nothing() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "a.csv", json!({}));
        let other = editor.add_node(NodeKind::FileUpload, "b.csv", json!({}));

        let err = editor.connect(other, upload, None).unwrap_err();
        assert_eq!(err, CoreError::Graph(GraphError::InvalidTarget(upload)));
        assert!(editor.propagator().tasks().is_empty());
    }

    #[tokio::test]
    async fn connect_after_shutdown_keeps_graph_unchanged() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "a.csv", json!({}));
        let filter = editor.add_node(NodeKind::Filter, "f", json!({}));
        editor.propagator().shutdown();

        let err = editor.connect(upload, filter, None).unwrap_err();
        assert_eq!(err, CoreError::Propagation(PropagationError::ShutDown));
        assert_eq!(editor.graph().edge_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_cancels_pair() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "a.csv", json!({}));
        let filter = editor.add_node(NodeKind::Filter, "f", json!({}));
        let connection = editor.connect(upload, filter, None).unwrap();

        let edge = editor.disconnect(connection.edge).unwrap();

        assert_eq!(edge.id, connection.edge);
        assert!(editor.propagator().task(connection.task).is_none());
        assert!(matches!(
            editor.disconnect(connection.edge),
            Err(CoreError::Graph(GraphError::EdgeNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn disconnect_requeues_remaining_sheet() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "book.xlsx", json!({}));
        let sheet = editor.add_node(NodeKind::Spreadsheet, "out", json!({}));
        let q1 = editor.connect(upload, sheet, Some("Q1".into())).unwrap();
        editor.connect(upload, sheet, Some("Q2".into())).unwrap();

        editor.disconnect(q1.edge).unwrap();

        let tasks = editor.propagator().tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].sheet.as_deref(), Some("Q2"));
    }

    #[tokio::test]
    async fn remove_node_cancels_its_tasks() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "a.csv", json!({}));
        let filter = editor.add_node(NodeKind::Filter, "f", json!({}));
        let sheet = editor.add_node(NodeKind::Spreadsheet, "s", json!({}));
        editor.connect(upload, filter, None).unwrap();
        editor.connect(filter, sheet, None).unwrap();
        let direct = editor.connect(upload, sheet, None).unwrap();

        let (node, edges) = editor.remove_node(filter).unwrap();

        assert_eq!(node.id, filter);
        assert_eq!(edges.len(), 2);
        let remaining: Vec<_> = editor.propagator().tasks().iter().map(|t| t.id).collect();
        assert_eq!(remaining, vec![direct.task]);
    }

    #[tokio::test]
    async fn schema_updated_requeues_children() {
        let editor = editor();
        let upload = editor.add_node(NodeKind::FileUpload, "a.csv", json!({}));
        let filter = editor.add_node(NodeKind::Filter, "f", json!({}));
        let analysis = editor.add_node(NodeKind::AiAnalysis, "summary", json!({}));
        let first = editor.connect(upload, filter, None).unwrap();
        let second = editor.connect(upload, analysis, None).unwrap();

        let tasks = editor.schema_updated(upload).unwrap();

        // Pending tasks are refreshed in place
        assert_eq!(tasks, vec![first.task, second.task]);
        assert!(editor.schema_updated(filter).unwrap().is_empty());

        let ghost = NodeId::new();
        assert_eq!(
            editor.schema_updated(ghost),
            Err(CoreError::Graph(GraphError::NodeNotFound(ghost)))
        );
    }
}
