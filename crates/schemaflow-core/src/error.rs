//! Error types for the workflow editor

use schemaflow_graph::GraphError;
use schemaflow_propagation::PropagationError;

/// Main editor error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Graph edit rejected
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Propagation could not be queued
    #[error("propagation error: {0}")]
    Propagation(#[from] PropagationError),
}

impl CoreError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Graph(_) => false,
            Self::Propagation(e) => e.is_retryable(),
        }
    }
}
