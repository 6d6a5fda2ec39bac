//! Workflow graph
//!
//! Nodes and edges are kept in insertion order (what the editor renders);
//! a `petgraph` map mirrors the connectivity for cycle checks and ordering.
//! The graph is always acyclic: `add_edge` rejects edges that would close a
//! cycle and leaves the graph untouched on any error.

use crate::error::GraphError;
use crate::types::{Edge, EdgeId, Node, NodeId, NodeKind, WorkflowId};
use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// Serializable form of a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    #[serde(default)]
    pub id: WorkflowId,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Directed acyclic graph of workflow nodes
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    id: WorkflowId,
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    // Weight counts parallel edges (different sheets) between a pair
    connectivity: DiGraphMap<NodeId, usize>,
}

impl WorkflowGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(WorkflowId::new())
    }

    /// Create an empty graph with a known ID
    #[must_use]
    pub fn with_id(id: WorkflowId) -> Self {
        Self {
            id,
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            connectivity: DiGraphMap::new(),
        }
    }

    /// Get the workflow ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add a node and return its ID
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        label: impl Into<String>,
        config: serde_json::Value,
    ) -> NodeId {
        let node = Node::new(kind, label, config);
        let id = node.id;
        self.connectivity.add_node(id);
        self.nodes.insert(id, node);
        id
    }

    /// Insert a fully formed node
    ///
    /// # Errors
    /// - `GraphError::DuplicateNode` if the ID is already present
    pub fn insert_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let id = node.id;
        self.connectivity.add_node(id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node together with every edge touching it
    ///
    /// Returns the node and the removed edges.
    ///
    /// # Errors
    /// - `GraphError::NodeNotFound` if the node is unknown
    pub fn remove_node(&mut self, id: NodeId) -> Result<(Node, Vec<Edge>), GraphError> {
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))?;

        let incident: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches(id))
            .map(|e| e.id)
            .collect();

        let removed = incident
            .into_iter()
            .filter_map(|edge_id| self.edges.shift_remove(&edge_id))
            .collect();

        self.connectivity.remove_node(id);
        Ok((node, removed))
    }

    /// Connect `source` to `target`, optionally restricted to one sheet
    ///
    /// # Errors
    /// - `GraphError::NodeNotFound` if either end is unknown
    /// - `GraphError::SelfLoop` if `source == target`
    /// - `GraphError::InvalidTarget` if the target does not take input
    /// - `GraphError::DuplicateEdge` if the same connection exists
    /// - `GraphError::CycleDetected` if the edge would close a cycle
    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
    ) -> Result<EdgeId, GraphError> {
        self.insert_edge(Edge::new(source, target, sheet))
    }

    /// Insert a fully formed edge, applying the same checks as `add_edge`
    ///
    /// # Errors
    /// See [`WorkflowGraph::add_edge`].
    pub fn insert_edge(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        let (source, target) = (edge.source, edge.target);

        if !self.nodes.contains_key(&source) {
            return Err(GraphError::NodeNotFound(source));
        }
        let target_node = self
            .nodes
            .get(&target)
            .ok_or(GraphError::NodeNotFound(target))?;

        if source == target {
            return Err(GraphError::SelfLoop(source));
        }

        if !target_node.kind.accepts_input() {
            return Err(GraphError::InvalidTarget(target));
        }

        if self
            .edges
            .values()
            .any(|e| e.id == edge.id || e.connects(source, target, edge.sheet.as_deref()))
        {
            return Err(GraphError::DuplicateEdge {
                from: source,
                to: target,
            });
        }

        if self.would_create_cycle(source, target) {
            return Err(GraphError::CycleDetected {
                from: source,
                to: target,
            });
        }

        match self.connectivity.edge_weight_mut(source, target) {
            Some(count) => *count += 1,
            None => {
                self.connectivity.add_edge(source, target, 1);
            }
        }

        let id = edge.id;
        self.edges.insert(id, edge);
        Ok(id)
    }

    /// Remove an edge
    ///
    /// # Errors
    /// - `GraphError::EdgeNotFound` if the edge is unknown
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = self
            .edges
            .shift_remove(&id)
            .ok_or(GraphError::EdgeNotFound(id))?;

        let remaining = match self.connectivity.edge_weight_mut(edge.source, edge.target) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.connectivity.remove_edge(edge.source, edge.target);
        }

        Ok(edge)
    }

    /// Check if adding `source -> target` would create a cycle
    ///
    /// This is a preview; the graph is not modified.
    #[must_use]
    pub fn would_create_cycle(&self, source: NodeId, target: NodeId) -> bool {
        if source == target {
            return true;
        }
        if !self.connectivity.contains_node(source) || !self.connectivity.contains_node(target) {
            return false;
        }
        // A path back from target to source closes the loop
        has_path_connecting(&self.connectivity, target, source, None)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutable access to a node (for config edits)
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// All edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    /// Edges pointing into `node`
    #[must_use]
    pub fn incoming(&self, node: NodeId) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.target == node).collect()
    }

    /// Edges leaving `node`
    #[must_use]
    pub fn outgoing(&self, node: NodeId) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.source == node).collect()
    }

    /// Direct predecessors of `node`
    #[must_use]
    pub fn upstream(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Direct successors of `node`
    #[must_use]
    pub fn downstream(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: NodeId, direction: Direction) -> Vec<NodeId> {
        if !self.connectivity.contains_node(node) {
            return Vec::new();
        }
        self.connectivity
            .neighbors_directed(node, direction)
            .collect()
    }

    /// Every node reachable from `node`, excluding `node` itself
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        if !self.connectivity.contains_node(node) {
            return Vec::new();
        }
        let mut dfs = Dfs::new(&self.connectivity, node);
        let mut out = Vec::new();
        while let Some(next) = dfs.next(&self.connectivity) {
            if next != node {
                out.push(next);
            }
        }
        out
    }

    /// Nodes ordered so that every edge points forward
    ///
    /// # Errors
    /// - `GraphError::CycleDetected` if the graph is cyclic (cannot happen
    ///   through the public API, kept for snapshots built by hand)
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        toposort(&self.connectivity, None).map_err(|cycle| {
            let node = cycle.node_id();
            GraphError::CycleDetected {
                from: node,
                to: node,
            }
        })
    }

    /// Nodes with no predecessors
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .copied()
            .filter(|n| {
                self.connectivity
                    .neighbors_directed(*n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Nodes with no successors
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .copied()
            .filter(|n| {
                self.connectivity
                    .neighbors_directed(*n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Serializable copy of the graph
    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.id,
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Rebuild a graph from a snapshot, validating every edge
    ///
    /// # Errors
    /// Any error `insert_node` or `insert_edge` would return.
    pub fn from_snapshot(snapshot: WorkflowSnapshot) -> Result<Self, GraphError> {
        let mut graph = Self::with_id(snapshot.id);
        for node in snapshot.nodes {
            graph.insert_node(node)?;
        }
        for edge in snapshot.edges {
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}
