//! Error types for workflow graph editing

use crate::types::{EdgeId, NodeId};

/// Graph construction and editing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Node not in the graph
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge not in the graph
    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Node ID already used
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// Same source, target and sheet already connected
    #[error("edge already exists: {from} -> {to}")]
    DuplicateEdge { from: NodeId, to: NodeId },

    /// Edge from a node to itself
    #[error("self loop on node {0}")]
    SelfLoop(NodeId),

    /// Target node does not take input
    #[error("node {0} does not accept input")]
    InvalidTarget(NodeId),

    /// Edge would close a cycle
    #[error("cycle detected: {from} -> {to}")]
    CycleDetected { from: NodeId, to: NodeId },
}
