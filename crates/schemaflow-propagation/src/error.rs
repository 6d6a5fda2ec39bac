//! Error types for schema propagation
//!
//! Separates:
//! - Store errors (the external platform), classified retryable or permanent
//! - Queue errors (unknown task, illegal status transition)
//! - Configuration errors

use crate::task::{TaskId, TaskStatus};
use schemaflow_graph::NodeId;

/// Errors reported by a [`SchemaStore`](crate::store::SchemaStore)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Node has no schema row at all
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Source schema lacks the requested sheet
    #[error("sheet '{sheet}' not found on node {node}")]
    SheetNotFound { node: NodeId, sheet: String },

    /// Platform refused the write (permissions, constraint violation)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Platform temporarily unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Request timed out
    #[error("store request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl StoreError {
    /// Check if the failed call is worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Main propagation error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropagationError {
    /// Store call failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Task ID not in the queue
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Status change not allowed by the task state machine
    #[error("illegal transition: {from:?} -> {to:?}")]
    IllegalTransition { from: TaskStatus, to: TaskStatus },

    /// Propagator was shut down
    #[error("propagator shut down")]
    ShutDown,
}

impl PropagationError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Invalid propagation configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field failed validation
    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
