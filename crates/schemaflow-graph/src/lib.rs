//! SchemaFlow Graph
//!
//! The data model behind the workflow editor:
//! - Nodes (file upload, filter, AI analysis, spreadsheet output, ...)
//! - Directed edges carrying data and schema between nodes
//! - Tabular schemas (columns, inferred types, sample rows) per sheet
//! - Schema inference from spreadsheet rows converted to JSON
//!
//! # Example
//!
//! ```rust
//! use schemaflow_graph::{NodeKind, WorkflowGraph};
//! use serde_json::json;
//!
//! let mut graph = WorkflowGraph::new();
//! let upload = graph.add_node(NodeKind::FileUpload, "sales.xlsx", json!({}));
//! let filter = graph.add_node(NodeKind::Filter, "region = EU", json!({ "column": "region" }));
//! graph.add_edge(upload, filter, Some("Q1".to_string())).unwrap();
//!
//! assert_eq!(graph.downstream(upload), vec![filter]);
//! ```

#![allow(missing_docs)]

pub mod error;
pub mod graph;
pub mod infer;
pub mod schema;
pub mod types;

pub use error::GraphError;
pub use graph::{WorkflowGraph, WorkflowSnapshot};
pub use infer::{infer_column_type, infer_sheet_schema};
pub use schema::{Column, ColumnType, NodeSchema, SheetSchema};
pub use types::{Edge, EdgeId, Node, NodeId, NodeKind, WorkflowId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
