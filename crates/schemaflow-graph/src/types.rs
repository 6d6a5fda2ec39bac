//! Core graph types
//!
//! Identifiers, node kinds, nodes and edges of a workflow.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate new node ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Generate new edge ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique workflow identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node does in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Uploaded spreadsheet, parsed by the backend
    FileUpload,
    /// Row filter on a chosen column
    Filter,
    /// Prompted language-model analysis of the incoming table
    AiAnalysis,
    /// Spreadsheet generation (output)
    Spreadsheet,
    /// Generic column transform
    Transform,
}

impl NodeKind {
    /// Whether edges may point into this node
    #[inline]
    #[must_use]
    pub fn accepts_input(self) -> bool {
        !matches!(self, NodeKind::FileUpload)
    }

    /// Stable name used in logs and reports
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::FileUpload => "file_upload",
            NodeKind::Filter => "filter",
            NodeKind::AiAnalysis => "ai_analysis",
            NodeKind::Spreadsheet => "spreadsheet",
            NodeKind::Transform => "transform",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    /// Free-form node configuration (picked column, prompt, output name, ...)
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Node {
    /// Create a node with a fresh ID
    #[must_use]
    pub fn new(kind: NodeKind, label: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            label: label.into(),
            config,
        }
    }
}

/// Directed data/schema flow between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Restricts the flow to one sheet of the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl Edge {
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, sheet: Option<String>) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            sheet,
        }
    }

    /// Whether this edge connects `source` to `target` on the same sheet
    #[inline]
    #[must_use]
    pub fn connects(&self, source: NodeId, target: NodeId, sheet: Option<&str>) -> bool {
        self.source == source && self.target == target && self.sheet.as_deref() == sheet
    }

    /// Whether this edge touches `node` at either end
    #[inline]
    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_upload_is_a_pure_source() {
        assert!(!NodeKind::FileUpload.accepts_input());
        assert!(NodeKind::Filter.accepts_input());
        assert!(NodeKind::Spreadsheet.accepts_input());
    }

    #[test]
    fn node_kind_serializes_snake_case() {
        let json = serde_json::to_string(&NodeKind::AiAnalysis).unwrap();
        assert_eq!(json, "\"ai_analysis\"");
        assert_eq!(NodeKind::AiAnalysis.to_string(), "ai_analysis");
    }

    #[test]
    fn edge_connects_respects_sheet() {
        let a = NodeId::new();
        let b = NodeId::new();
        let edge = Edge::new(a, b, Some("Sheet1".into()));

        assert!(edge.connects(a, b, Some("Sheet1")));
        assert!(!edge.connects(a, b, None));
        assert!(edge.touches(a));
        assert!(!edge.touches(NodeId::new()));
    }
}
