//! SchemaFlow Core - the workflow editor
//!
//! [`WorkflowEditor`] ties the node graph to the schema propagator:
//! - Drawing an edge queues propagation for the node pair
//! - Removing an edge or node cancels its queued work
//! - A node whose schema changed re-queues its direct children
//! - Loading a saved workflow queues every edge, upstream first
//!
//! # Example
//!
//! ```rust,ignore
//! use schemaflow_core::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemorySchemaStore::new());
//! let propagator = SchemaPropagator::new(
//!     PropagationConfig::new(),
//!     store.clone(),
//!     Arc::new(TracingNotifier),
//! )?;
//! let editor = WorkflowEditor::new(propagator);
//!
//! let upload = editor.add_node(NodeKind::FileUpload, "sales.xlsx", json!({}));
//! let filter = editor.add_node(NodeKind::Filter, "region = EU", json!({}));
//! let connection = editor.connect(upload, filter, None)?;
//! println!("queued {}", connection.task);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod editor;
pub mod error;

pub use editor::{Connection, WorkflowEditor};
pub use error::CoreError;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building workflows
    pub use crate::{Connection, CoreError, WorkflowEditor};
    pub use schemaflow_graph::{NodeId, NodeKind, NodeSchema, WorkflowGraph, WorkflowSnapshot};
    pub use schemaflow_propagation::{
        InMemorySchemaStore, PropagationConfig, SchemaPropagator, TaskId, TaskStatus,
        TracingNotifier,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
